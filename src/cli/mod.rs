//! Command-line interface module.

mod args;
pub mod check;
pub mod manage;
pub mod new;
pub mod run;

pub use args::{Cli, Commands, RunArgs};
