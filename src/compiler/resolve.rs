//! Name resolution and static checks.
//!
//! Turns parsed files into a [`Program`]: builds the type and method tables,
//! binds every call to a user method or a linked builtin, and checks arity
//! and variable declarations. All problems are reported as diagnostics; the
//! caller decides whether the program is usable.

use rustc_hash::{FxHashMap, FxHashSet};

use super::ast::{Block, Callee, Expr, ExprKind, SourceFile, Stmt, TypeDecl};
use super::diagnostic::{Diagnostic, Span, code};
use super::library::Builtin;

/// Resolved program: type table plus lookup indexes.
#[derive(Debug, Default)]
pub struct Program {
    /// Source file keys, indexed by [`TypeDecl::file`].
    pub files: Vec<String>,
    pub types: Vec<TypeDecl>,
    type_index: FxHashMap<String, usize>,
    method_index: Vec<FxHashMap<String, usize>>,
}

impl Program {
    pub fn find_type(&self, name: &str) -> Option<usize> {
        self.type_index.get(name).copied()
    }

    pub fn find_method(&self, type_index: usize, name: &str) -> Option<usize> {
        self.method_index.get(type_index)?.get(name).copied()
    }
}

type Builtins = FxHashMap<&'static str, &'static Builtin>;

/// Build and check a program from parsed files.
pub fn build_program(files: Vec<SourceFile>, builtins: &Builtins) -> (Program, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut program = Program::default();

    for (file_index, file) in files.into_iter().enumerate() {
        program.files.push(file.path);
        for mut ty in file.types {
            ty.file = file_index;
            let path = &program.files[file_index];

            if program.type_index.contains_key(&ty.name) {
                diagnostics.push(
                    Diagnostic::error(
                        code::DUPLICATE_TYPE,
                        format!("type `{}` is defined more than once", ty.name),
                    )
                    .at(path.as_str(), ty.span),
                );
                continue;
            }

            let methods = index_methods(&ty, path, &mut diagnostics);
            program.type_index.insert(ty.name.clone(), program.types.len());
            program.method_index.push(methods);
            program.types.push(ty);
        }
    }

    let arities: Vec<Vec<usize>> = program
        .types
        .iter()
        .map(|ty| ty.methods.iter().map(|m| m.params.len()).collect())
        .collect();

    let mut checker = Checker {
        type_index: &program.type_index,
        method_index: &program.method_index,
        arities: &arities,
        builtins,
        diagnostics: &mut diagnostics,
        file: "",
        current_type: 0,
        scopes: Vec::new(),
    };

    for (type_index, ty) in program.types.iter_mut().enumerate() {
        checker.file = &program.files[ty.file];
        checker.current_type = type_index;
        for method in &mut ty.methods {
            checker.scopes = vec![method.params.iter().cloned().collect()];
            checker.block(&mut method.body);
        }
    }

    (program, diagnostics)
}

fn index_methods(ty: &TypeDecl, path: &str, diagnostics: &mut Vec<Diagnostic>) -> FxHashMap<String, usize> {
    let mut methods = FxHashMap::default();
    for (index, method) in ty.methods.iter().enumerate() {
        if methods.contains_key(&method.name) {
            diagnostics.push(
                Diagnostic::error(
                    code::DUPLICATE_METHOD,
                    format!("method `{}` is defined more than once in `{}`", method.name, ty.name),
                )
                .at(path, method.span),
            );
            continue;
        }
        methods.insert(method.name.clone(), index);

        let mut seen = FxHashSet::default();
        for param in &method.params {
            if !seen.insert(param.as_str()) {
                diagnostics.push(
                    Diagnostic::error(
                        code::DUPLICATE_PARAM,
                        format!("parameter `{param}` of `{}` is declared twice", method.name),
                    )
                    .at(path, method.span),
                );
            }
        }
    }
    methods
}

struct Checker<'a> {
    type_index: &'a FxHashMap<String, usize>,
    method_index: &'a [FxHashMap<String, usize>],
    arities: &'a [Vec<usize>],
    builtins: &'a Builtins,
    diagnostics: &'a mut Vec<Diagnostic>,
    file: &'a str,
    current_type: usize,
    scopes: Vec<FxHashSet<String>>,
}

impl Checker<'_> {
    fn error(&mut self, code: &'static str, span: Span, message: String) {
        self.diagnostics
            .push(Diagnostic::error(code, message).at(self.file, span));
    }

    fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn block(&mut self, block: &mut Block) {
        for stmt in block {
            self.stmt(stmt);
        }
    }

    fn nested(&mut self, block: &mut Block) {
        self.scopes.push(FxHashSet::default());
        self.block(block);
        self.scopes.pop();
    }

    fn stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Let { name, value, .. } => {
                self.expr(value);
                if let Some(scope) = self.scopes.last_mut() {
                    scope.insert(name.clone());
                }
            }
            Stmt::Assign { name, value, span } => {
                self.expr(value);
                if !self.is_declared(name) {
                    let message = format!("assignment to undeclared variable `{name}`");
                    self.error(code::UNDECLARED, *span, message);
                }
            }
            Stmt::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                self.expr(cond);
                self.nested(then);
                if let Some(otherwise) = otherwise {
                    self.nested(otherwise);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.expr(cond);
                self.nested(body);
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::Expr(expr) => self.expr(expr),
        }
    }

    fn expr(&mut self, expr: &mut Expr) {
        let span = expr.span;
        match &mut expr.kind {
            ExprKind::Nil | ExprKind::Bool(_) | ExprKind::Number(_) | ExprKind::Str(_) => {}
            ExprKind::List(items) => items.iter_mut().for_each(|item| self.expr(item)),
            ExprKind::Var(name) => {
                if !self.is_declared(name) {
                    let message = format!("use of undeclared variable `{name}`");
                    self.error(code::UNDECLARED, span, message);
                }
            }
            ExprKind::Unary(_, operand) => self.expr(operand),
            ExprKind::Binary(_, lhs, rhs) => {
                self.expr(lhs);
                self.expr(rhs);
            }
            ExprKind::Call { callee, args } => {
                args.iter_mut().for_each(|arg| self.expr(arg));
                if let Callee::Unresolved(path) = callee
                    && let Some(resolved) = self.resolve_call(path, args.len(), span)
                {
                    *callee = resolved;
                }
            }
        }
    }

    fn resolve_call(&mut self, path: &[String], argc: usize, span: Span) -> Option<Callee> {
        let (type_index, method) = match path {
            [name] => {
                if let Some(method_index) = self.method_index[self.current_type].get(name) {
                    (self.current_type, *method_index)
                } else if let Some(builtin) = self.builtins.get(name.as_str()).copied() {
                    if !builtin.accepts(argc) {
                        let message = format!(
                            "`{name}` takes {} argument(s) but {argc} were supplied",
                            builtin.arity_label()
                        );
                        self.error(code::ARITY, span, message);
                        return None;
                    }
                    return Some(Callee::Builtin(builtin));
                } else {
                    self.error(code::UNKNOWN_FUNCTION, span, format!("cannot find function `{name}`"));
                    return None;
                }
            }
            [qualifier @ .., name] => {
                let type_name = qualifier.join(".");
                let Some(type_index) = self.type_index.get(&type_name).copied() else {
                    self.error(code::UNKNOWN_TYPE, span, format!("cannot find type `{type_name}`"));
                    return None;
                };
                let Some(method_index) = self.method_index[type_index].get(name).copied() else {
                    let message = format!("type `{type_name}` has no method `{name}`");
                    self.error(code::UNKNOWN_FUNCTION, span, message);
                    return None;
                };
                (type_index, method_index)
            }
            [] => return None,
        };

        let expected = self.arities[type_index][method];
        if expected != argc {
            let message = format!(
                "`{}` takes {expected} argument(s) but {argc} were supplied",
                path.join(".")
            );
            self.error(code::ARITY, span, message);
            return None;
        }

        Some(Callee::Method {
            type_index,
            method_index: method,
        })
    }
}
