//! Token Types

/// Source span (byte offsets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Token with kind and span
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Piece of a template literal
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Str(String),
    /// Interpolated source and its byte offset in the original input
    Expr(String, u32),
}

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    String(Box<str>),
    Template(Vec<TemplatePart>),
    Identifier(Box<str>),

    // Keywords
    True,
    False,
    Null,
    Undefined,
    Const,
    Let,
    Var,
    Function,
    Return,
    If,
    Else,
    Typeof,

    // Punctuators
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Dot,
    DotDotDot,
    QuestionDot,
    Question,
    QuestionQuestion,
    AmpersandAmpersand,
    PipePipe,
    Bang,
    Eq,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    LessThan,
    LessThanEq,
    GreaterThan,
    GreaterThanEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusEq,
    MinusEq,
    PlusPlus,
    MinusMinus,
    Arrow,

    /// Unrecognized input
    Error(Box<str>),
    Eof,
}

/// Keyword lookup
pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
    Some(match s {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "undefined" => TokenKind::Undefined,
        "const" => TokenKind::Const,
        "let" => TokenKind::Let,
        "var" => TokenKind::Var,
        "function" => TokenKind::Function,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "typeof" => TokenKind::Typeof,
        _ => return None,
    })
}
