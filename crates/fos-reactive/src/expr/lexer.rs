//! Expression Lexer
//!
//! Tokenizes directive expressions, handler bodies and inline logic.

use std::iter::Peekable;
use std::str::Chars;

use super::token::{Span, TemplatePart, Token, TokenKind, keyword_from_str};

/// Lexer over a source string
#[derive(Clone)]
pub struct Lexer<'src> {
    source: &'src str,
    chars: Peekable<Chars<'src>>,
    pos: u32,
    /// Offset added to every span (for embedded sources)
    base: u32,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source code
    pub fn new(source: &'src str) -> Self {
        Self::with_offset(source, 0)
    }

    /// Lexer whose spans are shifted by `base`
    pub fn with_offset(source: &'src str, base: u32) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            pos: 0,
            base,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.pos as usize..].chars();
        iter.next();
        iter.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos += c.len_utf8() as u32;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.advance();
                    }
                }
                Some('/') if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    while let Some(c) = self.advance() {
                        if c == '*' && self.peek() == Some('/') {
                            self.advance();
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();
        let start = self.pos;

        let Some(c) = self.advance() else {
            return Token::new(TokenKind::Eof, self.span(start));
        };

        let kind = match c {
            c if c.is_alphabetic() || c == '_' || c == '$' => self.scan_identifier(start),
            '0'..='9' => self.scan_number(start),
            '"' | '\'' => self.scan_string(c),
            '`' => self.scan_template(),
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '.' => {
                if self.peek() == Some('.') && self.peek_next() == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::DotDotDot
                } else if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.scan_number(start)
                } else {
                    TokenKind::Dot
                }
            }
            '?' => {
                if self.eat('?') {
                    TokenKind::QuestionQuestion
                } else if self.peek() == Some('.')
                    && !self.peek_next().is_some_and(|c| c.is_ascii_digit())
                {
                    self.advance();
                    TokenKind::QuestionDot
                } else {
                    TokenKind::Question
                }
            }
            '&' if self.eat('&') => TokenKind::AmpersandAmpersand,
            '|' if self.eat('|') => TokenKind::PipePipe,
            '!' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::NotEqEq
                    } else {
                        TokenKind::NotEq
                    }
                } else {
                    TokenKind::Bang
                }
            }
            '=' => {
                if self.eat('=') {
                    if self.eat('=') {
                        TokenKind::EqEqEq
                    } else {
                        TokenKind::EqEq
                    }
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Eq
                }
            }
            '<' => {
                if self.eat('=') {
                    TokenKind::LessThanEq
                } else {
                    TokenKind::LessThan
                }
            }
            '>' => {
                if self.eat('=') {
                    TokenKind::GreaterThanEq
                } else {
                    TokenKind::GreaterThan
                }
            }
            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::MinusEq
                } else {
                    TokenKind::Minus
                }
            }
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            other => TokenKind::Error(format!("unexpected character '{other}'").into()),
        };

        Token::new(kind, self.span(start))
    }

    fn span(&self, start: u32) -> Span {
        Span::new(self.base + start, self.base + self.pos)
    }

    fn scan_identifier(&mut self, start: u32) -> TokenKind {
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
        {
            self.advance();
        }
        let text = &self.source[start as usize..self.pos as usize];
        keyword_from_str(text).unwrap_or_else(|| TokenKind::Identifier(text.into()))
    }

    fn scan_number(&mut self, start: u32) -> TokenKind {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '.' || c == '_')
        {
            self.advance();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.advance();
            if matches!(self.peek(), Some('+' | '-')) {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        let text: String = self.source[start as usize..self.pos as usize]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        match text.parse::<f64>() {
            Ok(n) => TokenKind::Number(n),
            Err(_) => TokenKind::Error(format!("invalid number '{text}'").into()),
        }
    }

    fn scan_escape(&mut self, out: &mut String) {
        match self.advance() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }

    fn scan_string(&mut self, quote: char) -> TokenKind {
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return TokenKind::Error("unterminated string".into()),
                Some(c) if c == quote => break,
                Some('\\') => self.scan_escape(&mut value),
                Some(c) => value.push(c),
            }
        }
        TokenKind::String(value.into())
    }

    fn scan_template(&mut self) -> TokenKind {
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return TokenKind::Error("unterminated template literal".into()),
                Some('`') => break,
                Some('\\') => self.scan_escape(&mut text),
                Some('$') if self.peek() == Some('{') => {
                    self.advance();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Str(std::mem::take(&mut text)));
                    }
                    let expr_start = self.pos;
                    let mut depth = 1usize;
                    let mut quote: Option<char> = None;
                    loop {
                        let Some(c) = self.advance() else {
                            return TokenKind::Error("unterminated template expression".into());
                        };
                        match (quote, c) {
                            (Some(q), c) if c == q => quote = None,
                            (Some(_), '\\') => {
                                self.advance();
                            }
                            (Some(_), _) => {}
                            (None, '"' | '\'' | '`') => quote = Some(c),
                            (None, '{') => depth += 1,
                            (None, '}') => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    let src = &self.source[expr_start as usize..self.pos as usize - 1];
                    parts.push(TemplatePart::Expr(src.to_string(), self.base + expr_start));
                }
                Some(c) => text.push(c),
            }
        }
        if !text.is_empty() {
            parts.push(TemplatePart::Str(text));
        }
        TokenKind::Template(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lexer.next_token();
            if t.kind == TokenKind::Eof {
                break;
            }
            out.push(t.kind);
        }
        out
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a?.b ?? c === !d"),
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::QuestionDot,
                TokenKind::Identifier("b".into()),
                TokenKind::QuestionQuestion,
                TokenKind::Identifier("c".into()),
                TokenKind::EqEqEq,
                TokenKind::Bang,
                TokenKind::Identifier("d".into()),
            ]
        );
    }

    #[test]
    fn test_ternary_with_decimal_not_optional_chain() {
        assert_eq!(
            kinds("x?.5:1"),
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::Question,
                TokenKind::Number(0.5),
                TokenKind::Colon,
                TokenKind::Number(1.0),
            ]
        );
    }

    #[test]
    fn test_strings_and_comments() {
        assert_eq!(
            kinds("'it\\'s' /* c */ \"x\" // tail"),
            vec![
                TokenKind::String("it's".into()),
                TokenKind::String("x".into()),
            ]
        );
    }

    #[test]
    fn test_template_parts() {
        let toks = kinds("`a ${b + '}'} c`");
        assert_eq!(
            toks,
            vec![TokenKind::Template(vec![
                TemplatePart::Str("a ".into()),
                TemplatePart::Expr("b + '}'".into(), 5),
                TemplatePart::Str(" c".into()),
            ])]
        );
    }

    #[test]
    fn test_keywords_and_arrow() {
        assert_eq!(
            kinds("const f = (x) => typeof x"),
            vec![
                TokenKind::Const,
                TokenKind::Identifier("f".into()),
                TokenKind::Eq,
                TokenKind::LParen,
                TokenKind::Identifier("x".into()),
                TokenKind::RParen,
                TokenKind::Arrow,
                TokenKind::Typeof,
                TokenKind::Identifier("x".into()),
            ]
        );
    }
}
