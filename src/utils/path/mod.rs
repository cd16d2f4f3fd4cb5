//! Path utilities.
//!
//! - [`fs`]: Filesystem path normalization (`normalize_path`, `resolve_path`, `relative_key`)

pub mod fs;

pub use fs::{normalize_path, relative_key, resolve_path};
