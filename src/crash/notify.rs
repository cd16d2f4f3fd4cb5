//! User-facing crash notifications.

use std::path::Path;

use anyhow::Result;

use crate::logger::status_error;

/// Delivers a short crash summary to the user.
///
/// `report` points at the written report when there is one, so a front end
/// can make the summary clickable.
pub trait Notifier: Send + Sync {
    fn notify(&self, summary: &str, report: Option<&Path>) -> Result<()>;
}

/// Prints the summary as the terminal status block.
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, summary: &str, report: Option<&Path>) -> Result<()> {
        let detail = report
            .map(|path| format!("report: {}", path.display()))
            .unwrap_or_default();
        status_error(summary, &detail);
        Ok(())
    }
}
