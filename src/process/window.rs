//! Window boundary between the scheduler and app code.

use std::fmt;
use std::time::Duration;

use crate::compiler::Fault;

/// A window owned by an app process.
///
/// Rendering is out of scope: `draw` gives the app its paint hook, nothing
/// more. Every call happens on the owner thread.
pub trait AppWindow {
    fn title(&self) -> &str;

    fn is_visible(&self) -> bool;

    fn update(&mut self, dt: Duration) -> Result<(), Fault>;

    fn draw(&mut self) -> Result<(), Fault>;

    /// The app asked for this window to close.
    fn close_requested(&self) -> bool {
        false
    }

    /// Release the window. Called exactly once, when it leaves its process.
    fn close(&mut self);
}

macro_rules! id_type {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(ProcessId, "pid:");
id_type!(WindowId, "wid:");
