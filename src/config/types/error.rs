//! Errors raised while loading `hotdesk.toml`.

use std::fmt;
use std::path::PathBuf;

use owo_colors::OwoColorize;
use thiserror::Error;

use super::FieldPath;
use crate::utils::plural::plural_count;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("{0}")]
    Diagnostics(ConfigDiagnostics),
}

/// One rejected field value.
#[derive(Debug, Clone)]
pub struct FieldIssue {
    pub field: FieldPath,
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {} {}", self.field, self.message)?;
        match &self.hint {
            Some(hint) => write!(f, " {}", format_args!("({hint})").dimmed()),
            None => Ok(()),
        }
    }
}

/// Every invalid field found in one validation pass.
///
/// Sections push into a shared collector so the user sees all problems of
/// an edit at once rather than one per run.
#[derive(Debug, Default)]
pub struct ConfigDiagnostics {
    issues: Vec<FieldIssue>,
}

impl ConfigDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: FieldPath, message: impl Into<String>) {
        self.issues.push(FieldIssue {
            field,
            message: message.into(),
            hint: None,
        });
    }

    pub fn error_with_hint(&mut self, field: FieldPath, message: impl Into<String>, hint: impl Into<String>) {
        self.issues.push(FieldIssue {
            field,
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn errors(&self) -> &[FieldIssue] {
        &self.issues
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.issues.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ConfigDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heading = format!("invalid config ({})", plural_count(self.issues.len(), "field"));
        write!(f, "{}", heading.red().bold())?;
        for issue in &self.issues {
            write!(f, "\n{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigDiagnostics {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_error_names_file() {
        let err = ConfigError::Io(
            PathBuf::from("hotdesk.toml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        assert!(err.to_string().contains("hotdesk.toml"));
    }

    #[test]
    fn test_diagnostics_collect() {
        let mut diag = ConfigDiagnostics::new();
        assert!(diag.is_empty());
        diag.error(FieldPath::new("reload.debounce_ms"), "must be greater than 0");
        diag.error_with_hint(FieldPath::new("scheduler.tick_ms"), "too large", "use 16");

        assert_eq!(diag.len(), 2);
        assert_eq!(diag.errors()[1].hint.as_deref(), Some("use 16"));
        let text = diag.into_result().unwrap_err().to_string();
        assert!(text.contains("invalid config (2 fields)"));
        assert!(text.contains("scheduler.tick_ms"));
        assert!(text.contains("(use 16)"));
    }
}
