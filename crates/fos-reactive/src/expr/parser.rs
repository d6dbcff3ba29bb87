//! Expression Parser
//!
//! Recursive-descent parser producing an arena [`Ast`]. Covers the
//! expression subset used by directives plus the statements found in
//! inline component logic (declarations, `if`, `return`, blocks).

use super::ast::{
    AssignOp, Ast, AstId, AstKind, BinaryOp, Literal, LogicalOp, Pattern, UnaryOp, UpdateOp,
    VarKind,
};
use super::lexer::Lexer;
use super::token::{Span, TemplatePart, Token, TokenKind};
use crate::EvalError;

/// Parser error
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl From<ParseError> for EvalError {
    fn from(err: ParseError) -> Self {
        EvalError::Syntax {
            message: err.message,
            offset: err.span.start,
        }
    }
}

/// Expression parser
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    previous: Token,
    ast: Ast,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self::with_ast(source, 0, Ast::new())
    }

    /// Parser appending into an existing arena (template interpolations)
    fn with_ast(source: &'src str, base: u32, ast: Ast) -> Self {
        let mut lexer = Lexer::with_offset(source, base);
        let current = lexer.next_token();
        Self {
            lexer,
            current: current.clone(),
            previous: current,
            ast,
        }
    }

    fn advance(&mut self) {
        self.previous = std::mem::replace(&mut self.current, self.lexer.next_token());
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current.kind) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind) -> Result<(), ParseError> {
        if self.check(&kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("Expected {:?}, got {:?}", kind, self.current.kind)))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let message = match &self.current.kind {
            TokenKind::Error(lex) => format!("{}: {}", message.into(), lex),
            _ => message.into(),
        };
        ParseError {
            message,
            span: self.current.span,
        }
    }

    fn node(&mut self, kind: AstKind, start: Span) -> AstId {
        self.ast.push(kind, start.merge(self.previous.span))
    }

    /// Parse a statement list
    pub fn parse_program(mut self) -> Result<(Ast, AstId), ParseError> {
        let start = self.current.span;
        let mut body = Vec::new();
        while !self.check(&TokenKind::Eof) {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        let root = self.node(AstKind::Program { body }, start);
        Ok((self.ast, root))
    }

    /// Parse exactly one expression
    pub fn parse_single_expression(mut self) -> Result<(Ast, AstId), ParseError> {
        let root = self.parse_expression()?;
        self.eat(&TokenKind::Semicolon);
        if !self.check(&TokenKind::Eof) {
            return Err(self.error(format!("Unexpected token {:?}", self.current.kind)));
        }
        Ok((self.ast, root))
    }

    // ---- statements ----

    fn parse_statement(&mut self) -> Result<AstId, ParseError> {
        match &self.current.kind {
            TokenKind::Const | TokenKind::Let | TokenKind::Var => self.parse_variable_declaration(),
            TokenKind::Function => self.parse_function_declaration(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::LBrace => self.parse_block_statement(),
            TokenKind::Semicolon => {
                let start = self.current.span;
                self.advance();
                Ok(self.node(AstKind::Empty, start))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_variable_declaration(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let kind = match self.current.kind {
            TokenKind::Const => VarKind::Const,
            TokenKind::Let => VarKind::Let,
            _ => VarKind::Var,
        };
        self.advance();

        let target = if self.eat(&TokenKind::LBracket) {
            let mut items = Vec::new();
            while !self.check(&TokenKind::RBracket) {
                if self.eat(&TokenKind::Comma) {
                    items.push(None);
                    continue;
                }
                items.push(Some(self.parse_identifier_name()?));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.consume(TokenKind::RBracket)?;
            Pattern::Array(items)
        } else {
            Pattern::Ident(self.parse_identifier_name()?)
        };

        let init = if self.eat(&TokenKind::Eq) {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        self.eat(&TokenKind::Semicolon);

        Ok(self.node(AstKind::VarDecl { kind, target, init }, start))
    }

    fn parse_function_declaration(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        self.advance(); // function
        let name = self.parse_identifier_name()?;
        let params = self.parse_parameters()?;
        let body = self.parse_block_statement()?;
        Ok(self.node(AstKind::FunctionDecl { name, params, body }, start))
    }

    fn parse_parameters(&mut self) -> Result<Vec<Box<str>>, ParseError> {
        self.consume(TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            params.push(self.parse_identifier_name()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_if_statement(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        self.advance(); // if
        self.consume(TokenKind::LParen)?;
        let test = self.parse_expression()?;
        self.consume(TokenKind::RParen)?;
        let consequent = self.parse_statement()?;
        let alternate = if self.eat(&TokenKind::Else) {
            Some(self.parse_statement()?)
        } else {
            None
        };
        Ok(self.node(
            AstKind::If {
                test,
                consequent,
                alternate,
            },
            start,
        ))
    }

    fn parse_return_statement(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        self.advance(); // return
        let argument = if self.check(&TokenKind::Semicolon)
            || self.check(&TokenKind::RBrace)
            || self.check(&TokenKind::Eof)
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.eat(&TokenKind::Semicolon);
        Ok(self.node(AstKind::Return { argument }, start))
    }

    fn parse_block_statement(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        self.consume(TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.error("Unterminated block"));
            }
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            body.push(self.parse_statement()?);
        }
        self.consume(TokenKind::RBrace)?;
        Ok(self.node(AstKind::Block { body }, start))
    }

    fn parse_expression_statement(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let expr = self.parse_expression()?;
        self.eat(&TokenKind::Semicolon);
        Ok(self.node(AstKind::ExprStmt { expr }, start))
    }

    // ---- expressions ----

    fn parse_expression(&mut self) -> Result<AstId, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<AstId, ParseError> {
        if self.arrow_ahead() {
            return self.parse_arrow();
        }

        let start = self.current.span;
        let target = self.parse_conditional()?;
        let op = match self.current.kind {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusEq => AssignOp::AddAssign,
            TokenKind::MinusEq => AssignOp::SubAssign,
            _ => return Ok(target),
        };
        if !matches!(
            self.ast.kind(target),
            AstKind::Ident { .. } | AstKind::Member { .. } | AstKind::Index { .. }
        ) {
            return Err(self.error("Invalid assignment target"));
        }
        self.advance();
        let value = self.parse_assignment()?;
        Ok(self.node(AstKind::Assign { op, target, value }, start))
    }

    /// `x =>` or `(a, b) =>` at the current position
    fn arrow_ahead(&self) -> bool {
        match &self.current.kind {
            TokenKind::Identifier(_) => {
                matches!(self.lexer.clone().next_token().kind, TokenKind::Arrow)
            }
            TokenKind::LParen => {
                let mut lookahead = self.lexer.clone();
                let mut depth = 1usize;
                loop {
                    match lookahead.next_token().kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                }
                matches!(lookahead.next_token().kind, TokenKind::Arrow)
            }
            _ => false,
        }
    }

    fn parse_arrow(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let params = if self.check(&TokenKind::LParen) {
            self.parse_parameters()?
        } else {
            vec![self.parse_identifier_name()?]
        };
        self.consume(TokenKind::Arrow)?;
        let (body, expression) = if self.check(&TokenKind::LBrace) {
            (self.parse_block_statement()?, false)
        } else {
            (self.parse_assignment()?, true)
        };
        Ok(self.node(
            AstKind::Arrow {
                params,
                body,
                expression,
            },
            start,
        ))
    }

    fn parse_conditional(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let test = self.parse_nullish()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.consume(TokenKind::Colon)?;
        let alternate = self.parse_assignment()?;
        Ok(self.node(
            AstKind::Conditional {
                test,
                consequent,
                alternate,
            },
            start,
        ))
    }

    fn parse_nullish(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let mut left = self.parse_logical_or()?;
        while self.eat(&TokenKind::QuestionQuestion) {
            let right = self.parse_logical_or()?;
            left = self.node(
                AstKind::Logical {
                    op: LogicalOp::Nullish,
                    left,
                    right,
                },
                start,
            );
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let mut left = self.parse_logical_and()?;
        while self.eat(&TokenKind::PipePipe) {
            let right = self.parse_logical_and()?;
            left = self.node(
                AstKind::Logical {
                    op: LogicalOp::Or,
                    left,
                    right,
                },
                start,
            );
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let mut left = self.parse_equality()?;
        while self.eat(&TokenKind::AmpersandAmpersand) {
            let right = self.parse_equality()?;
            left = self.node(
                AstKind::Logical {
                    op: LogicalOp::And,
                    left,
                    right,
                },
                start,
            );
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.current.kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                TokenKind::EqEqEq => BinaryOp::StrictEq,
                TokenKind::NotEqEq => BinaryOp::StrictNotEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = self.node(AstKind::Binary { op, left, right }, start);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current.kind {
                TokenKind::LessThan => BinaryOp::Lt,
                TokenKind::LessThanEq => BinaryOp::LtEq,
                TokenKind::GreaterThan => BinaryOp::Gt,
                TokenKind::GreaterThanEq => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = self.node(AstKind::Binary { op, left, right }, start);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.node(AstKind::Binary { op, left, right }, start);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current.kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.node(AstKind::Binary { op, left, right }, start);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let op = match self.current.kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Typeof => UnaryOp::Typeof,
            TokenKind::PlusPlus | TokenKind::MinusMinus => {
                let op = if self.check(&TokenKind::PlusPlus) {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                self.advance();
                let argument = self.parse_unary()?;
                return Ok(self.node(
                    AstKind::Update {
                        op,
                        prefix: true,
                        argument,
                    },
                    start,
                ));
            }
            _ => return self.parse_postfix(),
        };
        self.advance();
        let argument = self.parse_unary()?;
        Ok(self.node(AstKind::Unary { op, argument }, start))
    }

    fn parse_postfix(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let argument = self.parse_call()?;
        let op = match self.current.kind {
            TokenKind::PlusPlus => UpdateOp::Increment,
            TokenKind::MinusMinus => UpdateOp::Decrement,
            _ => return Ok(argument),
        };
        self.advance();
        Ok(self.node(
            AstKind::Update {
                op,
                prefix: false,
                argument,
            },
            start,
        ))
    }

    fn parse_call(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let mut expr = self.parse_primary()?;
        loop {
            match self.current.kind {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_property_name()?;
                    expr = self.node(
                        AstKind::Member {
                            object: expr,
                            property,
                            optional: false,
                        },
                        start,
                    );
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    expr = match self.current.kind {
                        TokenKind::LParen => {
                            let args = self.parse_arguments()?;
                            self.node(
                                AstKind::Call {
                                    callee: expr,
                                    args,
                                    optional: true,
                                },
                                start,
                            )
                        }
                        TokenKind::LBracket => {
                            self.advance();
                            let index = self.parse_expression()?;
                            self.consume(TokenKind::RBracket)?;
                            self.node(
                                AstKind::Index {
                                    object: expr,
                                    index,
                                    optional: true,
                                },
                                start,
                            )
                        }
                        _ => {
                            let property = self.parse_property_name()?;
                            self.node(
                                AstKind::Member {
                                    object: expr,
                                    property,
                                    optional: true,
                                },
                                start,
                            )
                        }
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.consume(TokenKind::RBracket)?;
                    expr = self.node(
                        AstKind::Index {
                            object: expr,
                            index,
                            optional: false,
                        },
                        start,
                    );
                }
                TokenKind::LParen => {
                    let args = self.parse_arguments()?;
                    expr = self.node(
                        AstKind::Call {
                            callee: expr,
                            args,
                            optional: false,
                        },
                        start,
                    );
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<AstId>, ParseError> {
        self.consume(TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            args.push(self.parse_element()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RParen)?;
        Ok(args)
    }

    /// Argument or array element, allowing spread
    fn parse_element(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        if self.eat(&TokenKind::DotDotDot) {
            let argument = self.parse_assignment()?;
            return Ok(self.node(AstKind::Spread { argument }, start));
        }
        self.parse_assignment()
    }

    fn parse_primary(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        let literal = match &self.current.kind {
            TokenKind::Number(n) => Some(Literal::Number(*n)),
            TokenKind::String(s) => Some(Literal::String(s.clone())),
            TokenKind::True => Some(Literal::Bool(true)),
            TokenKind::False => Some(Literal::Bool(false)),
            TokenKind::Null => Some(Literal::Null),
            TokenKind::Undefined => Some(Literal::Undefined),
            _ => None,
        };
        if let Some(value) = literal {
            self.advance();
            return Ok(self.node(AstKind::Literal { value }, start));
        }

        match self.current.kind.clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(self.node(AstKind::Ident { name }, start))
            }
            TokenKind::Template(parts) => {
                self.advance();
                self.parse_template(parts, start)
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.consume(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Function => {
                self.advance();
                if matches!(self.current.kind, TokenKind::Identifier(_)) {
                    self.advance();
                }
                let params = self.parse_parameters()?;
                let body = self.parse_block_statement()?;
                Ok(self.node(
                    AstKind::Arrow {
                        params,
                        body,
                        expression: false,
                    },
                    start,
                ))
            }
            _ => Err(self.error(format!("Unexpected token {:?}", self.current.kind))),
        }
    }

    fn parse_template(&mut self, parts: Vec<TemplatePart>, start: Span) -> Result<AstId, ParseError> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        let mut pending = String::new();
        for part in parts {
            match part {
                TemplatePart::Str(text) => pending.push_str(&text),
                TemplatePart::Expr(src, offset) => {
                    quasis.push(std::mem::take(&mut pending).into_boxed_str());
                    let ast = std::mem::take(&mut self.ast);
                    let (ast, id) = Parser::with_ast(&src, offset, ast).parse_single_expression()?;
                    self.ast = ast;
                    exprs.push(id);
                }
            }
        }
        quasis.push(pending.into_boxed_str());
        Ok(self.node(AstKind::Template { quasis, exprs }, start))
    }

    fn parse_array_literal(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        self.consume(TokenKind::LBracket)?;
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            elements.push(self.parse_element()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RBracket)?;
        Ok(self.node(AstKind::Array { elements }, start))
    }

    fn parse_object_literal(&mut self) -> Result<AstId, ParseError> {
        let start = self.current.span;
        self.consume(TokenKind::LBrace)?;
        let mut props = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let prop_start = self.current.span;
            if self.eat(&TokenKind::DotDotDot) {
                let argument = self.parse_assignment()?;
                let spread = self.node(AstKind::Spread { argument }, prop_start);
                props.push((Box::from(""), spread));
            } else {
                let key: Box<str> = match self.current.kind.clone() {
                    TokenKind::String(s) => {
                        self.advance();
                        s
                    }
                    TokenKind::Number(n) => {
                        self.advance();
                        crate::value::format_number(n).into()
                    }
                    _ => self.parse_property_name()?,
                };
                let value = if self.eat(&TokenKind::Colon) {
                    self.parse_assignment()?
                } else {
                    // shorthand `{ key }`
                    self.node(AstKind::Ident { name: key.clone() }, prop_start)
                };
                props.push((key, value));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.consume(TokenKind::RBrace)?;
        Ok(self.node(AstKind::Object { props }, start))
    }

    fn parse_identifier_name(&mut self) -> Result<Box<str>, ParseError> {
        match &self.current.kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("Expected identifier, got {other:?}"))),
        }
    }

    /// Identifier after `.`; keywords are allowed as property names
    fn parse_property_name(&mut self) -> Result<Box<str>, ParseError> {
        let name = match &self.current.kind {
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::True => "true".into(),
            TokenKind::False => "false".into(),
            TokenKind::Null => "null".into(),
            TokenKind::Undefined => "undefined".into(),
            TokenKind::Const => "const".into(),
            TokenKind::Let => "let".into(),
            TokenKind::Var => "var".into(),
            TokenKind::Function => "function".into(),
            TokenKind::Return => "return".into(),
            TokenKind::If => "if".into(),
            TokenKind::Else => "else".into(),
            TokenKind::Typeof => "typeof".into(),
            other => return Err(self.error(format!("Expected property name, got {other:?}"))),
        };
        self.advance();
        Ok(name)
    }
}
