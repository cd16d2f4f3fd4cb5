//! Runtime values of app code.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use super::fault::{Fault, FaultKind};

/// Largest string a value may hold.
pub const MAX_TEXT_BYTES: usize = 16 << 20;

/// Most elements one list may hold.
pub const MAX_LIST_LEN: usize = 1 << 20;

/// Deepest nesting of lists inside lists.
pub const MAX_LIST_NESTING: usize = 64;

/// Window description produced by an app entry point.
///
/// This is the "window-shaped" result of a window factory; rendering and
/// layout of its contents belong to the host UI, not the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub visible: bool,
}

impl WindowSpec {
    pub const DEFAULT_WIDTH: u32 = 640;
    pub const DEFAULT_HEIGHT: u32 = 480;

    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    List(Vec<Value>),
    Window(WindowSpec),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Window(_) => "window",
        }
    }

    pub fn str(s: impl AsRef<str>) -> Self {
        Self::Str(Arc::from(s.as_ref()))
    }

    /// A string value, rejected past [`MAX_TEXT_BYTES`].
    pub fn text(s: String) -> Result<Self, Fault> {
        check_text_len(s.len())?;
        Ok(Self::Str(Arc::from(s)))
    }

    /// A list value, rejected past [`MAX_LIST_LEN`] or [`MAX_LIST_NESTING`].
    pub fn list(items: Vec<Value>) -> Result<Self, Fault> {
        check_list_len(items.len())?;
        let depth = 1 + items.iter().map(Value::depth).max().unwrap_or(0);
        if depth > MAX_LIST_NESTING {
            return Err(Fault::new(
                FaultKind::ResourceExhausted,
                format!("lists nested deeper than {MAX_LIST_NESTING}"),
            ));
        }
        Ok(Self::List(items))
    }

    /// Levels of list nesting; scalars are 0.
    pub fn depth(&self) -> usize {
        match self {
            Self::List(items) => 1 + items.iter().map(Value::depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Bytes of list storage a deep copy of this value allocates.
    ///
    /// Strings are shared on copy and count nothing.
    pub fn footprint(&self) -> usize {
        match self {
            Self::List(items) => items
                .iter()
                .fold(items.len() * size_of::<Value>(), |acc, item| acc.saturating_add(item.footprint())),
            _ => 0,
        }
    }

    /// Display text, bounded by [`MAX_TEXT_BYTES`].
    pub fn to_text(&self) -> Result<String, Fault> {
        match self {
            Self::Str(s) => Ok(s.to_string()),
            other => format_text(format_args!("{other}")),
        }
    }

    pub fn into_window(self) -> Option<WindowSpec> {
        match self {
            Self::Window(spec) => Some(spec),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Window(spec) => write!(f, "<window \"{}\">", spec.title),
        }
    }
}

fn too_large(what: &str, limit: usize) -> Fault {
    Fault::new(FaultKind::ResourceExhausted, format!("{what} exceeds {limit}"))
}

pub fn check_text_len(len: usize) -> Result<(), Fault> {
    if len > MAX_TEXT_BYTES {
        return Err(too_large("string length", MAX_TEXT_BYTES));
    }
    Ok(())
}

pub fn check_list_len(len: usize) -> Result<(), Fault> {
    if len > MAX_LIST_LEN {
        return Err(too_large("list length", MAX_LIST_LEN));
    }
    Ok(())
}

/// `fmt::Write` sink that refuses to grow past [`MAX_TEXT_BYTES`].
#[derive(Default)]
struct CappedText(String);

impl fmt::Write for CappedText {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.0.len() + s.len() > MAX_TEXT_BYTES {
            return Err(fmt::Error);
        }
        self.0.try_reserve(s.len()).map_err(|_| fmt::Error)?;
        self.0.push_str(s);
        Ok(())
    }
}

/// Format into a string, faulting instead of allocating past the cap.
pub fn format_text(args: fmt::Arguments<'_>) -> Result<String, Fault> {
    let mut out = CappedText::default();
    out.write_fmt(args)
        .map_err(|_| too_large("string length", MAX_TEXT_BYTES))?;
    Ok(out.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_numbers() {
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(-2.5).to_string(), "-2.5");
    }

    #[test]
    fn test_display_list() {
        let list = Value::List(vec![Value::Number(1.0), Value::str("a"), Value::Nil]);
        assert_eq!(list.to_string(), "[1, a, nil]");
    }

    #[test]
    fn test_text_cap() {
        let long = "x".repeat(MAX_TEXT_BYTES);
        assert!(Value::text(long.clone()).is_ok());
        let err = format_text(format_args!("{long}!")).unwrap_err();
        assert_eq!(err.kind, FaultKind::ResourceExhausted);
    }

    #[test]
    fn test_list_nesting_cap() {
        let mut value = Value::Nil;
        for _ in 0..MAX_LIST_NESTING {
            value = Value::list(vec![value]).unwrap();
        }
        assert_eq!(value.depth(), MAX_LIST_NESTING);
        let err = Value::list(vec![value]).unwrap_err();
        assert_eq!(err.kind, FaultKind::ResourceExhausted);
    }

    #[test]
    fn test_footprint_counts_nested_slots() {
        let inner = Value::List(vec![Value::Nil; 3]);
        let outer = Value::List(vec![inner.clone(), inner]);
        assert_eq!(outer.footprint(), 8 * size_of::<Value>());
        assert_eq!(Value::str("abc").footprint(), 0);
    }
}
