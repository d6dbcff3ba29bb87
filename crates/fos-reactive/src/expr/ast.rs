//! Expression AST
//!
//! Arena-allocated nodes for directive expressions and inline logic.

use super::token::Span;

/// Index into an [`Ast`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AstId(pub(crate) u32);

impl AstId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// AST arena
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<AstNode>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: AstKind, span: Span) -> AstId {
        let id = AstId(self.nodes.len() as u32);
        self.nodes.push(AstNode { kind, span });
        id
    }

    pub fn get(&self, id: AstId) -> &AstNode {
        &self.nodes[id.index()]
    }

    pub fn kind(&self, id: AstId) -> &AstKind {
        &self.nodes[id.index()].kind
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug)]
pub struct AstNode {
    pub kind: AstKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(Box<str>),
    Bool(bool),
    Null,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Const,
    Let,
    Var,
}

/// Binding target of a declaration
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(Box<str>),
    /// `[a, , b]`
    Array(Vec<Option<Box<str>>>),
}

impl Pattern {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Pattern::Ident(name) => vec![name],
            Pattern::Array(items) => items.iter().flatten().map(|n| &**n).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstKind {
    // Statements
    Program { body: Vec<AstId> },
    ExprStmt { expr: AstId },
    Block { body: Vec<AstId> },
    Return { argument: Option<AstId> },
    If {
        test: AstId,
        consequent: AstId,
        alternate: Option<AstId>,
    },
    VarDecl {
        kind: VarKind,
        target: Pattern,
        init: Option<AstId>,
    },
    FunctionDecl {
        name: Box<str>,
        params: Vec<Box<str>>,
        body: AstId,
    },
    Empty,

    // Expressions
    Ident { name: Box<str> },
    Literal { value: Literal },
    Template {
        quasis: Vec<Box<str>>,
        exprs: Vec<AstId>,
    },
    Array { elements: Vec<AstId> },
    Object { props: Vec<(Box<str>, AstId)> },
    Spread { argument: AstId },
    Member {
        object: AstId,
        property: Box<str>,
        optional: bool,
    },
    Index {
        object: AstId,
        index: AstId,
        optional: bool,
    },
    Call {
        callee: AstId,
        args: Vec<AstId>,
        optional: bool,
    },
    Unary { op: UnaryOp, argument: AstId },
    Update {
        op: UpdateOp,
        prefix: bool,
        argument: AstId,
    },
    Binary {
        op: BinaryOp,
        left: AstId,
        right: AstId,
    },
    Logical {
        op: LogicalOp,
        left: AstId,
        right: AstId,
    },
    Conditional {
        test: AstId,
        consequent: AstId,
        alternate: AstId,
    },
    Assign {
        op: AssignOp,
        target: AstId,
        value: AstId,
    },
    Arrow {
        params: Vec<Box<str>>,
        body: AstId,
        expression: bool,
    },
}
