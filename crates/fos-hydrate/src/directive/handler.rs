//! Inline event handlers

use std::rc::Rc;
use std::time::Duration;

use fos_dom::NodeId;
use fos_reactive::expr::{CALLBACK_FN, Program, parse_program};

use super::is_identifier;
use crate::ScopeRef;

/// Compiled `on<event>` attribute
#[derive(Debug, Clone)]
pub struct Handler {
    pub event: String,
    /// Element carrying the attribute
    pub node: NodeId,
    pub body: Rc<Program>,
    pub scope: ScopeRef,
    pub debounce: Option<Duration>,
    pub hooks: RequestHooks,
}

/// What follows a server callback once its reply is in
#[derive(Debug, Clone, Default)]
pub enum AfterRequest {
    #[default]
    None,
    /// `@close`: keep the page as it is, no refresh
    Close,
    Run(Rc<Program>),
}

/// `before-request` / `after-request` hooks of a handler's element
#[derive(Debug, Clone, Default)]
pub struct RequestHooks {
    pub before: Option<Rc<Program>>,
    pub after: AfterRequest,
}

impl RequestHooks {
    /// Compile hook attribute values; a hook that fails to parse is dropped
    pub fn compile(before: Option<&str>, after: Option<&str>) -> Self {
        let before = before.and_then(compile_hook);
        let after = match after.map(str::trim) {
            None | Some("") => AfterRequest::None,
            Some(close) if close.starts_with("@close") => AfterRequest::Close,
            Some(source) => compile_hook(source).map_or(AfterRequest::None, AfterRequest::Run),
        };
        Self { before, after }
    }

    /// Any hook present; hooked callbacks skip the page refresh
    pub fn is_set(&self) -> bool {
        self.before.is_some() || !matches!(self.after, AfterRequest::None)
    }
}

fn compile_hook(source: &str) -> Option<Rc<Program>> {
    if source.trim().is_empty() {
        return None;
    }
    match parse_program(&normalize_handler(source)) {
        Ok(program) => Some(program),
        Err(err) => {
            tracing::warn!("invalid request hook {:?}: {}", source, err);
            None
        }
    }
}

/// Rewrite an inline handler into a statement list run with `event` bound:
/// arrow forms are unwrapped, a bare function name is called with the
/// event, `Foo->bar(…)` / `Foo::bar(…)` become server callbacks and `this`
/// refers to the event target.
pub fn normalize_handler(source: &str) -> String {
    let source = source.trim();
    if is_identifier(source) && source != "this" {
        return format!("{source}(event)");
    }
    let body = match unwrap_arrow(source) {
        Some((Some(param), body)) if param != "event" => format!("let {param} = event; {body}"),
        Some((_, body)) => body.to_string(),
        None => source.to_string(),
    };
    rewrite_calls(&body)
}

/// `(e) => body`, `e => body`, `() => { … }`
fn unwrap_arrow(source: &str) -> Option<(Option<&str>, &str)> {
    let (head, body) = source.split_once("=>")?;
    let head = head.trim();
    let param = match head.strip_prefix('(').and_then(|h| h.strip_suffix(')')) {
        Some(inner) if inner.trim().is_empty() => None,
        Some(inner) if is_identifier(inner.trim()) => Some(inner.trim()),
        Some(_) => return None,
        None if is_identifier(head) => Some(head),
        None => return None,
    };
    let body = body.trim();
    let body = body
        .strip_prefix('{')
        .and_then(|b| b.strip_suffix('}'))
        .unwrap_or(body);
    Some((param, body.trim()))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Token-level rewrite skipping string literals
fn rewrite_calls(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len() + 16);
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if matches!(c, '"' | '\'' | '`') {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(chars.len());
            out.extend(&chars[start..i]);
            continue;
        }

        let starts_word = (c.is_alphabetic() || c == '_' || c == '$')
            && (i == 0 || !(is_ident_char(chars[i - 1]) || chars[i - 1] == '.'));
        if !starts_word {
            out.push(c);
            i += 1;
            continue;
        }

        let word_end = scan_ident(&chars, i);
        let word: String = chars[i..word_end].iter().collect();
        if word == "this" {
            out.push_str("event.target");
            i = word_end;
            continue;
        }
        if let Some((method, after_paren)) = server_method(&chars, word_end) {
            out.push_str(&format!("{CALLBACK_FN}(\"{word}->{method}\""));
            let next = chars[after_paren..].iter().position(|c| !c.is_whitespace());
            if next.map(|n| chars[after_paren + n]) != Some(')') {
                out.push_str(", ");
            }
            i = after_paren;
            continue;
        }
        out.push_str(&word);
        i = word_end;
    }
    out
}

fn scan_ident(chars: &[char], start: usize) -> usize {
    let mut end = start;
    while end < chars.len() && is_ident_char(chars[end]) {
        end += 1;
    }
    end
}

/// `->name(` or `::name(` right after a class name; yields the method and
/// the index after `(`
fn server_method(chars: &[char], at: usize) -> Option<(String, usize)> {
    let op: String = chars.get(at..at + 2)?.iter().collect();
    if op != "->" && op != "::" {
        return None;
    }
    let start = at + 2;
    let end = scan_ident(chars, start);
    if end == start {
        return None;
    }
    let mut paren = end;
    while paren < chars.len() && chars[paren].is_whitespace() {
        paren += 1;
    }
    if chars.get(paren) != Some(&'(') {
        return None;
    }
    Some((chars[start..end].iter().collect(), paren + 1))
}
