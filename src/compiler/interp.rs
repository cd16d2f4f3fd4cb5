//! Tree-walking interpreter for resolved units.
//!
//! Each invocation runs with a fresh frame stack, a call depth limit and a
//! step budget, so a runaway app faults instead of hanging the host thread.
//! Faults raised anywhere below carry a snapshot of the frame stack.

use rustc_hash::FxHashMap;

use super::ast::{BinaryOp, Block, Callee, Expr, ExprKind, Stmt, UnaryOp};
use super::fault::{Fault, FaultKind, Frame};
use super::unit::CompiledUnit;
use super::value::{self, Value, WindowSpec};

/// Maximum nested method calls per invocation.
pub const MAX_DEPTH: usize = 128;

/// Maximum nested expression and block evaluation per invocation.
pub const MAX_EVAL_DEPTH: usize = 512;

/// Bytes of strings and list storage one invocation may allocate.
pub const ALLOC_BUDGET: usize = 256 << 20;

/// Statements executed per invocation before the budget faults.
pub const STEP_BUDGET: u64 = 1_000_000;

/// Live state of a window owned by an app process.
#[derive(Debug, Clone)]
pub struct WindowState {
    pub spec: WindowSpec,
    pub close_requested: bool,
}

impl WindowState {
    pub fn new(spec: WindowSpec) -> Self {
        Self {
            spec,
            close_requested: false,
        }
    }
}

/// Host side of an invocation: the window in scope and captured output.
#[derive(Debug, Default)]
pub struct ExecEnv<'w> {
    pub window: Option<&'w mut WindowState>,
    /// Lines written by `print`.
    pub output: Vec<String>,
    allocated: usize,
}

impl<'w> ExecEnv<'w> {
    pub fn with_window(window: &'w mut WindowState) -> Self {
        Self {
            window: Some(window),
            ..Self::default()
        }
    }

    /// Count `bytes` against the invocation's [`ALLOC_BUDGET`].
    pub(crate) fn charge(&mut self, bytes: usize) -> Result<(), Fault> {
        self.allocated = self.allocated.saturating_add(bytes);
        if self.allocated > ALLOC_BUDGET {
            return Err(Fault::new(
                FaultKind::ResourceExhausted,
                format!("allocated more than {ALLOC_BUDGET} bytes"),
            ));
        }
        Ok(())
    }

    pub(crate) fn window(&mut self) -> Result<&mut WindowState, Fault> {
        self.window
            .as_deref_mut()
            .ok_or_else(|| Fault::new(FaultKind::NoWindow, "no window is associated with this call"))
    }
}

enum Flow {
    Normal,
    Return(Value),
}

type Scopes = Vec<FxHashMap<String, Value>>;

pub(super) struct Interpreter<'u, 'e, 'w> {
    unit: &'u CompiledUnit,
    env: &'e mut ExecEnv<'w>,
    frames: Vec<Frame>,
    steps: u64,
    depth: usize,
}

impl<'u, 'e, 'w> Interpreter<'u, 'e, 'w> {
    pub(super) fn new(unit: &'u CompiledUnit, env: &'e mut ExecEnv<'w>) -> Self {
        Self {
            unit,
            env,
            frames: Vec::new(),
            steps: 0,
            depth: 0,
        }
    }

    /// Build a fault carrying the current stack, innermost frame first.
    fn fault(&self, kind: FaultKind, message: impl Into<String>) -> Fault {
        self.attach(Fault::new(kind, message))
    }

    fn attach(&self, mut fault: Fault) -> Fault {
        if fault.frames.is_empty() {
            fault.frames = self.frames.iter().rev().cloned().collect();
        }
        fault
    }

    pub(super) fn call(&mut self, type_index: usize, method_index: usize, args: Vec<Value>) -> Result<Value, Fault> {
        if self.frames.len() >= MAX_DEPTH {
            return Err(self.fault(
                FaultKind::StackOverflow,
                format!("call depth exceeded {MAX_DEPTH}"),
            ));
        }

        let unit = self.unit;
        let program = unit.program();
        let ty = &program.types[type_index];
        let method = &ty.methods[method_index];

        self.frames.push(Frame {
            unit: unit.shared_name(),
            type_name: ty.name.clone(),
            method: method.name.clone(),
            file: program.files[ty.file].clone(),
            line: method.span.line,
        });

        let locals = method.params.iter().cloned().zip(args).collect();
        let mut scopes: Scopes = vec![locals];
        let flow = self.block(&method.body, &mut scopes)?;

        self.frames.pop();
        Ok(match flow {
            Flow::Return(value) => value,
            Flow::Normal => Value::Nil,
        })
    }

    fn block(&mut self, block: &Block, scopes: &mut Scopes) -> Result<Flow, Fault> {
        for stmt in block {
            if let Flow::Return(value) = self.stmt(stmt, scopes)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn nested(&mut self, block: &Block, scopes: &mut Scopes) -> Result<Flow, Fault> {
        self.descend()?;
        scopes.push(FxHashMap::default());
        let flow = self.block(block, scopes);
        scopes.pop();
        self.depth -= 1;
        flow
    }

    fn descend(&mut self) -> Result<(), Fault> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(self.fault(
                FaultKind::StackOverflow,
                format!("evaluation nested deeper than {MAX_EVAL_DEPTH}"),
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn tick(&mut self, line: u32) -> Result<(), Fault> {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
        self.steps += 1;
        if self.steps > STEP_BUDGET {
            return Err(self.fault(
                FaultKind::BudgetExhausted,
                format!("exceeded {STEP_BUDGET} steps"),
            ));
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt, scopes: &mut Scopes) -> Result<Flow, Fault> {
        self.tick(stmt.span().line)?;
        match stmt {
            Stmt::Let { name, value, .. } => {
                let value = self.eval(value, scopes)?;
                if let Some(scope) = scopes.last_mut() {
                    scope.insert(name.clone(), value);
                }
            }
            Stmt::Assign { name, value, .. } => {
                let value = self.eval(value, scopes)?;
                match scopes.iter_mut().rev().find_map(|scope| scope.get_mut(name)) {
                    Some(slot) => *slot = value,
                    None => return Err(self.fault(FaultKind::Host, format!("unbound variable `{name}`"))),
                }
            }
            Stmt::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                if self.condition(cond, scopes)? {
                    return self.nested(then, scopes);
                } else if let Some(otherwise) = otherwise {
                    return self.nested(otherwise, scopes);
                }
            }
            Stmt::While { cond, body, .. } => {
                while self.condition(cond, scopes)? {
                    if let Flow::Return(value) = self.nested(body, scopes)? {
                        return Ok(Flow::Return(value));
                    }
                    self.tick(cond.span.line)?;
                }
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr, scopes)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Expr(expr) => {
                self.eval(expr, scopes)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn condition(&mut self, expr: &Expr, scopes: &mut Scopes) -> Result<bool, Fault> {
        match self.eval(expr, scopes)? {
            Value::Bool(b) => Ok(b),
            other => Err(self.fault(
                FaultKind::Type,
                format!("condition must be bool, got {}", other.type_name()),
            )),
        }
    }

    fn eval(&mut self, expr: &Expr, scopes: &mut Scopes) -> Result<Value, Fault> {
        self.descend()?;
        let value = self.eval_kind(expr, scopes);
        self.depth -= 1;
        value
    }

    fn eval_kind(&mut self, expr: &Expr, scopes: &mut Scopes) -> Result<Value, Fault> {
        match &expr.kind {
            ExprKind::Nil => Ok(Value::Nil),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item, scopes))
                    .collect::<Result<Vec<_>, _>>()?;
                self.charge(items.len() * size_of::<Value>())?;
                Value::list(items).map_err(|fault| self.attach(fault))
            }
            ExprKind::Var(name) => {
                let value = scopes
                    .iter()
                    .rev()
                    .find_map(|scope| scope.get(name))
                    .cloned()
                    .ok_or_else(|| self.fault(FaultKind::Host, format!("unbound variable `{name}`")))?;
                self.charge(value.footprint())?;
                Ok(value)
            }
            ExprKind::Unary(op, operand) => {
                let value = self.eval(operand, scopes)?;
                match (op, value) {
                    (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (op, other) => {
                        let symbol = if *op == UnaryOp::Neg { "-" } else { "!" };
                        Err(self.fault(
                            FaultKind::Type,
                            format!("cannot apply `{symbol}` to {}", other.type_name()),
                        ))
                    }
                }
            }
            ExprKind::Binary(BinaryOp::And, lhs, rhs) => {
                Ok(Value::Bool(self.condition(lhs, scopes)? && self.condition(rhs, scopes)?))
            }
            ExprKind::Binary(BinaryOp::Or, lhs, rhs) => {
                Ok(Value::Bool(self.condition(lhs, scopes)? || self.condition(rhs, scopes)?))
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, scopes)?;
                let rhs = self.eval(rhs, scopes)?;
                self.binary(*op, lhs, rhs)
            }
            ExprKind::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, scopes))
                    .collect::<Result<Vec<_>, _>>()?;
                match callee {
                    Callee::Method {
                        type_index,
                        method_index,
                    } => self.call(*type_index, *method_index, args),
                    Callee::Builtin(builtin) => {
                        (builtin.func)(self.env, args).map_err(|fault| self.attach(fault))
                    }
                    Callee::Unresolved(path) => Err(self.fault(
                        FaultKind::Host,
                        format!("call to unresolved `{}`", path.join(".")),
                    )),
                }
            }
        }
    }

    fn charge(&mut self, bytes: usize) -> Result<(), Fault> {
        self.env.charge(bytes).map_err(|fault| self.attach(fault))
    }

    fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, Fault> {
        use Value::{Bool, List, Number, Str};

        let value = match (op, lhs, rhs) {
            (BinaryOp::Add, Number(a), Number(b)) => Number(a + b),
            (BinaryOp::Add, List(mut a), List(b)) => {
                value::check_list_len(a.len() + b.len()).map_err(|fault| self.attach(fault))?;
                self.charge((a.len() + b.len()) * size_of::<Value>())?;
                a.extend(b);
                List(a)
            }
            (BinaryOp::Add, a @ Str(_), b) | (BinaryOp::Add, a, b @ Str(_)) => {
                let text = value::format_text(format_args!("{a}{b}")).map_err(|fault| self.attach(fault))?;
                self.charge(text.len())?;
                Value::str(text)
            }
            (BinaryOp::Sub, Number(a), Number(b)) => Number(a - b),
            (BinaryOp::Mul, Number(a), Number(b)) => Number(a * b),
            (BinaryOp::Div | BinaryOp::Rem, Number(_), Number(b)) if b == 0.0 => {
                return Err(self.fault(FaultKind::DivideByZero, "division by zero"));
            }
            (BinaryOp::Div, Number(a), Number(b)) => Number(a / b),
            (BinaryOp::Rem, Number(a), Number(b)) => Number(a % b),
            (BinaryOp::Eq, a, b) => Bool(a == b),
            (BinaryOp::Ne, a, b) => Bool(a != b),
            (BinaryOp::Lt, Number(a), Number(b)) => Bool(a < b),
            (BinaryOp::Le, Number(a), Number(b)) => Bool(a <= b),
            (BinaryOp::Gt, Number(a), Number(b)) => Bool(a > b),
            (BinaryOp::Ge, Number(a), Number(b)) => Bool(a >= b),
            (BinaryOp::Lt, Str(a), Str(b)) => Bool(a < b),
            (BinaryOp::Le, Str(a), Str(b)) => Bool(a <= b),
            (BinaryOp::Gt, Str(a), Str(b)) => Bool(a > b),
            (BinaryOp::Ge, Str(a), Str(b)) => Bool(a >= b),
            (op, a, b) => {
                return Err(self.fault(
                    FaultKind::Type,
                    format!(
                        "cannot apply `{}` to {} and {}",
                        op.symbol(),
                        a.type_name(),
                        b.type_name()
                    ),
                ));
            }
        };
        Ok(value)
    }
}
