//! Compile diagnostics.

use std::fmt;

/// Diagnostic codes.
pub mod code {
    pub const SYNTAX: &str = "E0001";
    pub const DUPLICATE_TYPE: &str = "E0002";
    pub const DUPLICATE_METHOD: &str = "E0003";
    pub const UNKNOWN_FUNCTION: &str = "E0004";
    pub const UNKNOWN_TYPE: &str = "E0005";
    pub const ARITY: &str = "E0006";
    pub const UNDECLARED: &str = "E0007";
    pub const DUPLICATE_PARAM: &str = "E0008";
    pub const VERSION: &str = "E0100";
    pub const UNIT_NAME: &str = "E0101";
    pub const NO_SOURCES: &str = "E0102";
    pub const MANIFEST: &str = "E0103";
    pub const UNKNOWN_LIBRARY: &str = "W0001";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Position inside a source file (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// Source location, keyed by the file's path relative to the app root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub span: Span,
}

/// A single compiler diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            location: None,
        }
    }

    pub fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    pub fn at(mut self, file: impl Into<String>, span: Span) -> Self {
        self.location = Some(Location {
            file: file.into(),
            span,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = &self.location {
            write!(f, "{}:{}:{}: ", loc.file, loc.span.line, loc.span.col)?;
        }
        let label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{label}[{}]: {}", self.code, self.message)
    }
}

/// Check whether any diagnostic is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

/// Render diagnostics one per line (for logs and status blocks).
pub fn render(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
