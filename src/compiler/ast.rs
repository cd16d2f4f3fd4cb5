//! Syntax tree of app sources.
//!
//! The parser produces this tree with every call left as
//! [`Callee::Unresolved`]; the resolver rewrites callees in place, and the
//! resolved tree is what a compiled unit executes.

use std::sync::Arc;

use super::diagnostic::Span;
use super::library::Builtin;

/// One parsed source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the app root (diagnostic identity).
    pub path: String,
    pub types: Vec<TypeDecl>,
}

/// `type Name.Space { ... }`
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub span: Span,
    pub methods: Vec<MethodDecl>,
    /// Index into the program's file table, filled when the program is built.
    pub file: usize,
}

/// `fn Name(params) { ... }`
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    pub span: Span,
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone)]
pub enum Stmt {
    Let {
        name: String,
        value: Expr,
        span: Span,
    },
    Assign {
        name: String,
        value: Expr,
        span: Span,
    },
    If {
        cond: Expr,
        then: Block,
        otherwise: Option<Block>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Block,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Expr(Expr),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Self::Let { span, .. }
            | Self::Assign { span, .. }
            | Self::If { span, .. }
            | Self::While { span, .. }
            | Self::Return { span, .. } => *span,
            Self::Expr(expr) => expr.span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    List(Vec<Expr>),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call { callee: Callee, args: Vec<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// Call target.
#[derive(Debug, Clone)]
pub enum Callee {
    /// Name path as written (`Foo` or `Calc.Util.Foo`).
    Unresolved(Vec<String>),
    /// Method of a user type, by index into the program tables.
    Method { type_index: usize, method_index: usize },
    /// Host builtin from a linked library.
    Builtin(&'static Builtin),
}
