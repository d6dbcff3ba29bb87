//! Expression engine
//!
//! A small expression/statement language evaluated directly against the
//! scoped context: directive expressions, event handler bodies and inline
//! component logic all go through [`parse_expression`] / [`parse_program`]
//! and the tree-walking [`Interpreter`].

mod ast;
mod deps;
mod interp;
mod intrinsics;
mod lexer;
mod parser;
mod token;

use std::fmt;
use std::rc::Rc;

pub use ast::{
    AssignOp, Ast, AstId, AstKind, AstNode, BinaryOp, Literal, LogicalOp, Pattern, UnaryOp,
    UpdateOp, VarKind,
};
pub use deps::{
    extract_dependencies, is_ignored_root, scoped_dependencies, scoped_node_dependencies,
};
pub use interp::{CALLBACK_FN, Interpreter, MAX_CALL_DEPTH, RemoteCall};
pub use intrinsics::{ARRAY_INTRINSICS, is_array_intrinsic};
pub use lexer::Lexer;
pub use parser::{ParseError, Parser};
pub use token::{Span, TemplatePart, Token, TokenKind};

use crate::{EvalError, Scope};

/// Parsed source with its arena
pub struct Program {
    ast: Ast,
    root: AstId,
    source: String,
}

impl Program {
    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    pub fn root(&self) -> AstId {
        self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Top-level statements (a single expression has none)
    pub fn statements(&self) -> &[AstId] {
        match self.ast.kind(self.root) {
            AstKind::Program { body } => body,
            _ => &[],
        }
    }

    /// Source text covered by a node
    pub fn text(&self, id: AstId) -> &str {
        let span = self.ast.get(id).span;
        self.source
            .get(span.start as usize..span.end as usize)
            .unwrap_or_default()
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("source", &self.source)
            .field("nodes", &self.ast.len())
            .finish()
    }
}

/// A single parsed expression, cheap to clone
#[derive(Clone)]
pub struct Expression(Rc<Program>);

impl Expression {
    pub fn parse(source: &str) -> Result<Self, EvalError> {
        parse_expression(source)
    }

    pub fn program(&self) -> &Rc<Program> {
        &self.0
    }

    pub fn root(&self) -> AstId {
        self.0.root
    }

    pub fn source(&self) -> &str {
        &self.0.source
    }

    /// Plain assignment (`a = b`, `a += 1`)
    pub fn is_assignment(&self) -> bool {
        matches!(self.0.ast.kind(self.0.root), AstKind::Assign { .. })
    }

    /// Bare identifier, e.g. `isBusy`
    pub fn as_identifier(&self) -> Option<&str> {
        match self.0.ast.kind(self.0.root) {
            AstKind::Ident { name } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expression({:?})", self.0.source)
    }
}

/// Parse one expression
pub fn parse_expression(source: &str) -> Result<Expression, EvalError> {
    let (ast, root) = Parser::new(source).parse_single_expression()?;
    Ok(Expression(Rc::new(Program {
        ast,
        root,
        source: source.to_string(),
    })))
}

/// Parse a statement list (handler bodies, inline logic)
pub fn parse_program(source: &str) -> Result<Rc<Program>, EvalError> {
    let (ast, root) = Parser::new(source).parse_program()?;
    Ok(Rc::new(Program {
        ast,
        root,
        source: source.to_string(),
    }))
}

/// User-defined function value
pub struct Closure {
    pub name: Option<String>,
    pub program: Rc<Program>,
    pub params: Vec<String>,
    pub body: AstId,
    /// Body is a bare expression rather than a block
    pub expression_body: bool,
    /// Scope captured at creation
    pub scope: Scope,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Closure({}({}))",
            self.name.as_deref().unwrap_or("anonymous"),
            self.params.join(", ")
        )
    }
}
