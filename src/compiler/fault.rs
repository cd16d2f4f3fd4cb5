//! Faults raised while executing app code.
//!
//! Every frame of a fault carries the name of the compiled unit it ran in,
//! which is how a crash is attributed to its owning app.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// App code called `fail(..)`
    Raised,
    /// Operand or argument of the wrong type
    Type,
    DivideByZero,
    IndexOutOfRange,
    StackOverflow,
    /// Invocation exceeded its step budget (runaway loop)
    BudgetExhausted,
    /// A value or invocation grew past its memory cap
    ResourceExhausted,
    /// Window builtin called with no window in scope
    NoWindow,
    /// Failure outside app code
    Host,
}

impl FaultKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Raised => "AppError",
            Self::Type => "TypeError",
            Self::DivideByZero => "DivideByZero",
            Self::IndexOutOfRange => "IndexOutOfRange",
            Self::StackOverflow => "StackOverflow",
            Self::BudgetExhausted => "BudgetExhausted",
            Self::ResourceExhausted => "ResourceExhausted",
            Self::NoWindow => "NoWindow",
            Self::Host => "HostError",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One active call at the time of the fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Compiled unit name (`CALC`, `CALC_1a2b3c4d`)
    pub unit: Arc<str>,
    pub type_name: String,
    pub method: String,
    pub file: String,
    pub line: u32,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "at {}.{} ({}:{}) in {}",
            self.type_name, self.method, self.file, self.line, self.unit
        )
    }
}

/// An uncaught fault. Frames are innermost first.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub frames: Vec<Frame>,
}

impl Fault {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }

    /// A fault that did not originate in app code.
    pub fn host(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Host, message)
    }

    /// Check whether any frame ran in a unit matching `pred`.
    pub fn any_unit(&self, mut pred: impl FnMut(&str) -> bool) -> bool {
        self.frames.iter().any(|frame| pred(&frame.unit))
    }

    /// Stack trace text, one frame per line.
    pub fn stack_text(&self) -> String {
        self.frames
            .iter()
            .map(|frame| format!("  {frame}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
