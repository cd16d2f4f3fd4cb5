//! Core types - pure abstractions shared across the codebase.

mod app_id;
mod locks;
mod priority;
mod state;

pub use app_id::AppId;
pub use locks::{OperationGuard, OperationLocks};
pub use priority::Priority;
pub use state::{is_shutdown, setup_shutdown_handler};
