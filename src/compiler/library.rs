//! Host builtin libraries and the compiler's reference sets.
//!
//! A library is a named group of builtins. The compiler links the fixed set
//! into every unit, plus whichever optional libraries a manifest lists in its
//! dependencies. A call to a builtin from an unlinked library does not
//! resolve.

use rustc_hash::FxHashMap;

use super::fault::{Fault, FaultKind};
use super::interp::ExecEnv;
use super::value::{self, Value, WindowSpec};

type BuiltinFn = fn(&mut ExecEnv<'_>, Vec<Value>) -> Result<Value, Fault>;

/// A host function callable from app code.
pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub func: BuiltinFn,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

impl Builtin {
    pub fn accepts(&self, argc: usize) -> bool {
        (self.min_args..=self.max_args).contains(&argc)
    }

    pub fn arity_label(&self) -> String {
        if self.min_args == self.max_args {
            self.min_args.to_string()
        } else {
            format!("{}..={}", self.min_args, self.max_args)
        }
    }
}

#[derive(Debug)]
pub struct Library {
    pub name: &'static str,
    pub builtins: &'static [Builtin],
}

macro_rules! builtin {
    ($name:literal, $min:expr, $max:expr, $func:expr) => {
        Builtin {
            name: $name,
            min_args: $min,
            max_args: $max,
            func: $func,
        }
    };
}

pub static CORE: Library = Library {
    name: "core",
    builtins: &[
        builtin!("print", 0, 8, core_print),
        builtin!("len", 1, 1, core_len),
        builtin!("str", 1, 1, |env, args| text(env, args[0].to_text()?)),
        builtin!("num", 1, 1, core_num),
        builtin!("window", 1, 3, core_window),
        builtin!("fail", 1, 1, |_, args| {
            Err(Fault::new(FaultKind::Raised, args[0].to_text()?))
        }),
        builtin!("set_title", 1, 1, |env, args| {
            let title = args[0].to_text()?;
            env.window()?.spec.title = title;
            Ok(Value::Nil)
        }),
        builtin!("set_visible", 1, 1, |env, args| {
            let visible = bool_arg("set_visible", &args[0])?;
            env.window()?.spec.visible = visible;
            Ok(Value::Nil)
        }),
        builtin!("close_window", 0, 0, |env, _| {
            env.window()?.close_requested = true;
            Ok(Value::Nil)
        }),
    ],
};

pub static MATH: Library = Library {
    name: "math",
    builtins: &[
        builtin!("abs", 1, 1, |_, a| Ok(Value::Number(num_arg("abs", &a[0])?.abs()))),
        builtin!("floor", 1, 1, |_, a| Ok(Value::Number(num_arg("floor", &a[0])?.floor()))),
        builtin!("sqrt", 1, 1, |_, a| Ok(Value::Number(num_arg("sqrt", &a[0])?.sqrt()))),
        builtin!("min", 2, 2, |_, a| {
            Ok(Value::Number(num_arg("min", &a[0])?.min(num_arg("min", &a[1])?)))
        }),
        builtin!("max", 2, 2, |_, a| {
            Ok(Value::Number(num_arg("max", &a[0])?.max(num_arg("max", &a[1])?)))
        }),
        builtin!("clamp", 3, 3, |_, a| {
            let (x, lo, hi) = (
                num_arg("clamp", &a[0])?,
                num_arg("clamp", &a[1])?,
                num_arg("clamp", &a[2])?,
            );
            Ok(Value::Number(x.max(lo).min(hi)))
        }),
    ],
};

pub static TEXT: Library = Library {
    name: "text",
    builtins: &[
        builtin!("upper", 1, 1, |env, a| text(env, a[0].to_text()?.to_uppercase())),
        builtin!("lower", 1, 1, |env, a| text(env, a[0].to_text()?.to_lowercase())),
        builtin!("concat", 1, 8, |env, a| {
            let mut joined = String::new();
            for part in &a {
                let part = part.to_text()?;
                value::check_text_len(joined.len() + part.len())?;
                joined.push_str(&part);
            }
            text(env, joined)
        }),
        builtin!("contains", 2, 2, |_, a| {
            Ok(Value::Bool(a[0].to_text()?.contains(&a[1].to_text()?)))
        }),
        builtin!("repeat", 2, 2, |env, a| {
            let base = a[0].to_text()?;
            let count = index_arg("repeat", &a[1])?;
            let len = base.len().checked_mul(count).unwrap_or(usize::MAX);
            value::check_text_len(len)?;
            text(env, base.repeat(count))
        }),
    ],
};

pub static LIST: Library = Library {
    name: "list",
    builtins: &[
        builtin!("push", 2, 2, |env, mut a| {
            let item = a.pop().unwrap_or(Value::Nil);
            match a.pop() {
                Some(Value::List(mut items)) => {
                    value::check_list_len(items.len() + 1)?;
                    env.charge(size_of::<Value>())?;
                    items.push(item);
                    Value::list(items)
                }
                other => Err(type_fault("push", "list", other.as_ref())),
            }
        }),
        builtin!("get", 2, 2, |_, a| {
            let Value::List(items) = &a[0] else {
                return Err(type_fault("get", "list", Some(&a[0])));
            };
            let index = index_arg("get", &a[1])?;
            items.get(index).cloned().ok_or_else(|| {
                Fault::new(
                    FaultKind::IndexOutOfRange,
                    format!("index {index} out of range for list of length {}", items.len()),
                )
            })
        }),
        builtin!("range", 1, 1, |env, a| {
            let n = index_arg("range", &a[0])?;
            value::check_list_len(n)?;
            env.charge(n * size_of::<Value>())?;
            Ok(Value::List((0..n).map(|i| Value::Number(i as f64)).collect()))
        }),
    ],
};

/// Libraries linked into every unit.
pub static FIXED: &[&Library] = &[&CORE];

/// Libraries linked on request, keyed by name.
pub static OPTIONAL: &[&Library] = &[&MATH, &TEXT, &LIST];

/// Reference sets resolved once when the compiler is built.
#[derive(Debug)]
pub struct ReferenceSet {
    fixed: Vec<&'static Library>,
    optional: FxHashMap<&'static str, &'static Library>,
}

impl Default for ReferenceSet {
    fn default() -> Self {
        Self::new(FIXED, OPTIONAL)
    }
}

impl ReferenceSet {
    pub fn new(fixed: &[&'static Library], optional: &[&'static Library]) -> Self {
        Self {
            fixed: fixed.to_vec(),
            optional: optional.iter().map(|lib| (lib.name, *lib)).collect(),
        }
    }

    /// Builtins visible to a unit that requests `names`.
    ///
    /// Unknown optional names are ignored so manifests written for newer
    /// hosts still load. Earlier libraries win on name clashes.
    pub fn link<S: AsRef<str>>(&self, names: &[S]) -> FxHashMap<&'static str, &'static Builtin> {
        let requested = names
            .iter()
            .filter_map(|name| self.optional.get(name.as_ref().trim()).copied());

        let mut table = FxHashMap::default();
        for lib in self.fixed.iter().copied().chain(requested) {
            for builtin in lib.builtins {
                table.entry(builtin.name).or_insert(builtin);
            }
        }
        table
    }

    pub fn optional_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.optional.keys().copied()
    }
}

// ----------------------------------------------------------------------------
// helpers
// ----------------------------------------------------------------------------

fn type_fault(func: &str, expected: &str, got: Option<&Value>) -> Fault {
    let got = got.map_or("nothing", Value::type_name);
    Fault::new(
        FaultKind::Type,
        format!("{func}: expected {expected}, got {got}"),
    )
}

fn num_arg(func: &str, value: &Value) -> Result<f64, Fault> {
    match value {
        Value::Number(n) => Ok(*n),
        other => Err(type_fault(func, "number", Some(other))),
    }
}

fn bool_arg(func: &str, value: &Value) -> Result<bool, Fault> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(type_fault(func, "bool", Some(other))),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn index_arg(func: &str, value: &Value) -> Result<usize, Fault> {
    let n = num_arg(func, value)?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(Fault::new(
            FaultKind::Type,
            format!("{func}: expected a non-negative integer, got {n}"),
        ));
    }
    Ok(n as usize)
}

/// A fresh string charged to the invocation.
fn text(env: &mut ExecEnv<'_>, s: String) -> Result<Value, Fault> {
    env.charge(s.len())?;
    Value::text(s)
}

fn core_print(env: &mut ExecEnv<'_>, args: Vec<Value>) -> Result<Value, Fault> {
    let line = args
        .iter()
        .map(Value::to_text)
        .collect::<Result<Vec<_>, _>>()?
        .join(" ");
    env.charge(line.len())?;
    env.output.push(line);
    Ok(Value::Nil)
}

fn core_len(_: &mut ExecEnv<'_>, args: Vec<Value>) -> Result<Value, Fault> {
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        other => return Err(type_fault("len", "string or list", Some(other))),
    };
    Ok(Value::Number(len as f64))
}

fn core_num(_: &mut ExecEnv<'_>, args: Vec<Value>) -> Result<Value, Fault> {
    match &args[0] {
        Value::Number(n) => Ok(Value::Number(*n)),
        Value::Str(s) => s.trim().parse().map(Value::Number).map_err(|_| {
            Fault::new(FaultKind::Type, format!("num: `{s}` is not a number"))
        }),
        other => Err(type_fault("num", "string or number", Some(other))),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn core_window(_: &mut ExecEnv<'_>, args: Vec<Value>) -> Result<Value, Fault> {
    let mut spec = WindowSpec::new(args[0].to_text()?);
    if let Some(width) = args.get(1) {
        spec.width = num_arg("window", width)?.max(0.0) as u32;
    }
    if let Some(height) = args.get(2) {
        spec.height = num_arg("window", height)?.max(0.0) as u32;
    }
    Ok(Value::Window(spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_fixed_only() {
        let refs = ReferenceSet::default();
        let table = refs.link::<&str>(&[]);
        assert!(table.contains_key("window"));
        assert!(!table.contains_key("sqrt"));
    }

    #[test]
    fn test_link_optional_and_unknown_ignored() {
        let refs = ReferenceSet::default();
        let table = refs.link(&["math", "does-not-exist"]);
        assert!(table.contains_key("sqrt"));
        assert!(!table.contains_key("upper"));
    }

    #[test]
    fn test_builtin_arity() {
        let refs = ReferenceSet::default();
        let table = refs.link::<&str>(&[]);
        let window = table["window"];
        assert!(window.accepts(1) && window.accepts(3));
        assert!(!window.accepts(0) && !window.accepts(4));
        assert_eq!(window.arity_label(), "1..=3");
    }

    #[test]
    fn test_window_builtin() {
        let mut env = ExecEnv::default();
        let value = core_window(&mut env, vec![Value::str("Calc"), Value::Number(320.0)]).unwrap();
        let spec = value.into_window().unwrap();
        assert_eq!((spec.title.as_str(), spec.width, spec.height), ("Calc", 320, 480));
    }

    #[test]
    fn test_window_ops_need_window() {
        let mut env = ExecEnv::default();
        let err = (CORE.builtins.iter().find(|b| b.name == "close_window").unwrap().func)(&mut env, vec![])
            .unwrap_err();
        assert_eq!(err.kind, FaultKind::NoWindow);
    }

    fn call(name: &str, env: &mut ExecEnv<'_>, args: Vec<Value>) -> Result<Value, Fault> {
        let refs = ReferenceSet::default();
        let table = refs.link(&["text", "list"]);
        (table[name].func)(env, args)
    }

    #[test]
    fn test_repeat_past_cap_faults() {
        let mut env = ExecEnv::default();
        let err = call("repeat", &mut env, vec![Value::str("ab"), Value::Number(1e20)]).unwrap_err();
        assert_eq!(err.kind, FaultKind::ResourceExhausted);

        let ok = call("repeat", &mut env, vec![Value::str("ab"), Value::Number(3.0)]).unwrap();
        assert_eq!(ok, Value::str("ababab"));
    }

    #[test]
    fn test_range_and_push_past_cap_fault() {
        let mut env = ExecEnv::default();
        let err = call("range", &mut env, vec![Value::Number(1e18)]).unwrap_err();
        assert_eq!(err.kind, FaultKind::ResourceExhausted);

        let full = Value::List(vec![Value::Nil; value::MAX_LIST_LEN]);
        let err = call("push", &mut env, vec![full, Value::Nil]).unwrap_err();
        assert_eq!(err.kind, FaultKind::ResourceExhausted);
    }

    #[test]
    fn test_concat_past_cap_faults() {
        let mut env = ExecEnv::default();
        let half = Value::text("x".repeat(value::MAX_TEXT_BYTES / 2 + 1)).unwrap();
        let err = call("concat", &mut env, vec![half.clone(), half]).unwrap_err();
        assert_eq!(err.kind, FaultKind::ResourceExhausted);
    }
}
