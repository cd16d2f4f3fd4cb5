//! Recursive-descent parser for app sources.
//!
//! ```text
//! file    := ("type" path "{" method* "}")*
//! method  := "fn" IDENT "(" (IDENT ("," IDENT)*)? ")" block
//! block   := "{" stmt* "}"
//! stmt    := "let" IDENT "=" expr ";"
//!          | IDENT "=" expr ";"
//!          | "if" expr block ("else" (block | if-stmt))?
//!          | "while" expr block
//!          | "return" expr? ";"
//!          | expr ";"
//! expr    := or ; precedence: || < && < == != < comparisons < + - < * / % < unary
//! primary := NUMBER | STRING | true | false | nil | "[" list "]" | "(" expr ")"
//!          | path ("(" args ")")?
//! ```
//!
//! Parsing stops at the first syntax error of a file. Blocks and
//! expressions nested past [`MAX_NESTING`] are a syntax error, which keeps
//! every later pass over the tree within a fixed recursion depth.

use super::ast::{BinaryOp, Block, Callee, Expr, ExprKind, MethodDecl, SourceFile, Stmt, TypeDecl, UnaryOp};
use super::diagnostic::{Diagnostic, Span, code};
use super::lexer::{Tok, Token, tokenize};

/// Parse one source file.
pub fn parse_file(path: &str, text: &str) -> Result<SourceFile, Diagnostic> {
    let tokens = tokenize(text).map_err(|e| Diagnostic::error(code::SYNTAX, e.message).at(path, e.span))?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
    }
    .file(path)
        .map_err(|(message, span)| Diagnostic::error(code::SYNTAX, message).at(path, span))
}

/// Deepest nesting of blocks and of expression trees.
pub const MAX_NESTING: usize = 256;

type PResult<T> = Result<T, (String, Span)>;

/// An expression and the height of its tree.
type Measured = (Expr, usize);

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open recursive productions.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> PResult<Span> {
        if self.check(&tok) {
            Ok(self.advance().span)
        } else {
            Err(self.unexpected(&tok.describe()))
        }
    }

    fn too_deep(span: Span) -> (String, Span) {
        (format!("nesting deeper than {MAX_NESTING} levels"), span)
    }

    fn enter(&mut self) -> PResult<()> {
        if self.depth >= MAX_NESTING {
            return Err(Self::too_deep(self.span()));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn unexpected(&self, wanted: &str) -> (String, Span) {
        (
            format!("expected {wanted}, found {}", self.peek().describe()),
            self.span(),
        )
    }

    fn ident(&mut self) -> PResult<String> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// `a.b.c`
    fn path(&mut self) -> PResult<Vec<String>> {
        let mut segments = vec![self.ident()?];
        while self.eat(&Tok::Dot) {
            segments.push(self.ident()?);
        }
        Ok(segments)
    }

    // ------------------------------------------------------------------
    // items
    // ------------------------------------------------------------------

    fn file(mut self, path: &str) -> PResult<SourceFile> {
        let mut types = Vec::new();
        while !self.check(&Tok::Eof) {
            types.push(self.type_decl()?);
        }
        Ok(SourceFile {
            path: path.to_string(),
            types,
        })
    }

    fn type_decl(&mut self) -> PResult<TypeDecl> {
        if !self.check(&Tok::Type) {
            return Err(self.unexpected("`type`"));
        }
        let span = self.advance().span;
        let name = self.path()?.join(".");
        self.expect(Tok::LBrace)?;

        let mut methods = Vec::new();
        while !self.eat(&Tok::RBrace) {
            methods.push(self.method()?);
        }

        Ok(TypeDecl {
            name,
            span,
            methods,
            file: 0,
        })
    }

    fn method(&mut self) -> PResult<MethodDecl> {
        if !self.check(&Tok::Fn) {
            return Err(self.unexpected("`fn` or `}`"));
        }
        let span = self.advance().span;
        let name = self.ident()?;

        self.expect(Tok::LParen)?;
        let mut params = Vec::new();
        if !self.check(&Tok::RParen) {
            loop {
                params.push(self.ident()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen)?;

        let body = self.block()?;
        Ok(MethodDecl {
            name,
            params,
            body,
            span,
        })
    }

    // ------------------------------------------------------------------
    // statements
    // ------------------------------------------------------------------

    fn block(&mut self) -> PResult<Block> {
        self.expect(Tok::LBrace)?;
        self.enter()?;
        let mut stmts = Vec::new();
        while !self.eat(&Tok::RBrace) {
            if self.check(&Tok::Eof) {
                return Err(self.unexpected("`}`"));
            }
            stmts.push(self.stmt()?);
        }
        self.leave();
        Ok(stmts)
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        let span = self.span();
        match self.peek() {
            Tok::Let => {
                self.advance();
                let name = self.ident()?;
                self.expect(Tok::Assign)?;
                let value = self.expr()?;
                self.expect(Tok::Semi)?;
                Ok(Stmt::Let { name, value, span })
            }
            Tok::If => self.if_stmt(),
            Tok::While => {
                self.advance();
                let cond = self.expr()?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body, span })
            }
            Tok::Return => {
                self.advance();
                let value = if self.check(&Tok::Semi) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(Tok::Semi)?;
                Ok(Stmt::Return { value, span })
            }
            Tok::Ident(name)
                if self.tokens.get(self.pos + 1).map(|t| &t.tok) == Some(&Tok::Assign) =>
            {
                let name = name.clone();
                self.advance();
                self.advance();
                let value = self.expr()?;
                self.expect(Tok::Semi)?;
                Ok(Stmt::Assign { name, value, span })
            }
            _ => {
                let expr = self.expr()?;
                self.expect(Tok::Semi)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        let span = self.expect(Tok::If)?;
        self.enter()?;
        let cond = self.expr()?;
        let then = self.block()?;
        let otherwise = if self.eat(&Tok::Else) {
            if self.check(&Tok::If) {
                Some(vec![self.if_stmt()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };
        self.leave();
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
            span,
        })
    }

    // ------------------------------------------------------------------
    // expressions
    // ------------------------------------------------------------------

    fn expr(&mut self) -> PResult<Expr> {
        Ok(self.nested_expr()?.0)
    }

    fn nested_expr(&mut self) -> PResult<Measured> {
        self.enter()?;
        let measured = self.binary(0)?;
        self.leave();
        Ok(measured)
    }

    // Operator chains are parsed in a loop, so their height is checked
    // here rather than by `enter`.
    fn binary(&mut self, min_level: u8) -> PResult<Measured> {
        let (mut lhs, mut height) = self.unary()?;
        while let Some((op, level)) = binary_op(self.peek()) {
            if level < min_level {
                break;
            }
            let span = self.advance().span;
            let (rhs, rhs_height) = self.binary(level + 1)?;
            height = height.max(rhs_height) + 1;
            if height > MAX_NESTING {
                return Err(Self::too_deep(span));
            }
            lhs = Expr {
                kind: ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)),
                span,
            };
        }
        Ok((lhs, height))
    }

    fn unary(&mut self) -> PResult<Measured> {
        let op = match self.peek() {
            Tok::Minus => UnaryOp::Neg,
            Tok::Bang => UnaryOp::Not,
            _ => return self.primary(),
        };
        let span = self.advance().span;
        self.enter()?;
        let (operand, height) = self.unary()?;
        self.leave();
        let expr = Expr {
            kind: ExprKind::Unary(op, Box::new(operand)),
            span,
        };
        Ok((expr, height + 1))
    }

    fn primary(&mut self) -> PResult<Measured> {
        let span = self.span();
        let kind = match self.peek().clone() {
            Tok::Number(n) => {
                self.advance();
                ExprKind::Number(n)
            }
            Tok::Str(s) => {
                self.advance();
                ExprKind::Str(s)
            }
            Tok::True => {
                self.advance();
                ExprKind::Bool(true)
            }
            Tok::False => {
                self.advance();
                ExprKind::Bool(false)
            }
            Tok::Nil => {
                self.advance();
                ExprKind::Nil
            }
            Tok::LParen => {
                self.advance();
                let inner = self.nested_expr()?;
                self.expect(Tok::RParen)?;
                return Ok(inner);
            }
            Tok::LBracket => {
                self.advance();
                let (items, height) = self.args(Tok::RBracket)?;
                return Ok((Expr { kind: ExprKind::List(items), span }, height + 1));
            }
            Tok::Ident(_) => {
                let path = self.path()?;
                if self.eat(&Tok::LParen) {
                    let (args, height) = self.args(Tok::RParen)?;
                    let kind = ExprKind::Call {
                        callee: Callee::Unresolved(path),
                        args,
                    };
                    return Ok((Expr { kind, span }, height + 1));
                } else if path.len() == 1 {
                    ExprKind::Var(path.into_iter().next().unwrap_or_default())
                } else {
                    return Err(self.unexpected("`(` after qualified name"));
                }
            }
            _ => return Err(self.unexpected("expression")),
        };
        Ok((Expr { kind, span }, 1))
    }

    /// Comma-separated expressions up to (and including) `close`, with the
    /// tallest one's height.
    fn args(&mut self, close: Tok) -> PResult<(Vec<Expr>, usize)> {
        let mut args = Vec::new();
        let mut height = 0;
        if self.eat(&close) {
            return Ok((args, height));
        }
        loop {
            let (arg, arg_height) = self.nested_expr()?;
            args.push(arg);
            height = height.max(arg_height);
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok((args, height))
    }
}

/// Binary operator and its precedence level (higher binds tighter).
fn binary_op(tok: &Tok) -> Option<(BinaryOp, u8)> {
    let op = match tok {
        Tok::OrOr => (BinaryOp::Or, 0),
        Tok::AndAnd => (BinaryOp::And, 1),
        Tok::EqEq => (BinaryOp::Eq, 2),
        Tok::NotEq => (BinaryOp::Ne, 2),
        Tok::Lt => (BinaryOp::Lt, 3),
        Tok::Le => (BinaryOp::Le, 3),
        Tok::Gt => (BinaryOp::Gt, 3),
        Tok::Ge => (BinaryOp::Ge, 3),
        Tok::Plus => (BinaryOp::Add, 4),
        Tok::Minus => (BinaryOp::Sub, 4),
        Tok::Star => (BinaryOp::Mul, 5),
        Tok::Slash => (BinaryOp::Div, 5),
        Tok::Percent => (BinaryOp::Rem, 5),
        _ => return None,
    };
    Some(op)
}
