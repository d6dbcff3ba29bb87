//! Directive Compiler
//!
//! Attribute names, directive value grammars and the pure pieces of the
//! compiler: mustache templates, handler normalization and keyed diffing.
//! Registration against a live page happens in [`crate::Page`].

mod handler;
mod keyed;
mod template;

use std::time::Duration;

use fos_dom::{DomTree, NodeId};
use fos_reactive::expr::Expression;
use fos_reactive::{Hierarchy, ROOT_COMPONENT};

use crate::{HydrateError, HydrateResult, RuntimeConfig};

pub use handler::{AfterRequest, Handler, RequestHooks, normalize_handler};
pub use keyed::{ItemKey, KeyDiff, diff_keys, item_keys};
pub use template::{Segment, Template};

/// Fully prefixed directive attribute names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveNames {
    pub prefix: String,
    pub component: String,
    pub if_: String,
    pub elseif: String,
    pub else_: String,
    pub for_: String,
    pub bind: String,
    /// `pp-bind-` for one-way attribute bindings
    pub bind_attr: String,
    pub spread: String,
    pub ref_: String,
    pub init_state: String,
    pub debounce: String,
    pub sync: String,
    pub suspense: String,
    pub visibility: String,
    pub display: String,
    pub before_request: String,
    pub after_request: String,
    pub autofocus: String,
    pub append_params: String,
    pub append_params_sync: String,
    pub loading_url: String,
    pub loading_content: String,
    pub loading_transition: String,
}

impl DirectiveNames {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            prefix: config.attribute_prefix.clone(),
            component: config.attr("component"),
            if_: config.attr("if"),
            elseif: config.attr("elseif"),
            else_: config.attr("else"),
            for_: config.attr("for"),
            bind: config.attr("bind"),
            bind_attr: config.attr("bind-"),
            spread: config.attr("bind-spread"),
            ref_: config.attr("ref"),
            init_state: config.attr("init-state"),
            debounce: config.attr("debounce"),
            sync: config.attr("sync"),
            suspense: config.attr("suspense"),
            visibility: config.attr("visibility"),
            display: config.attr("display"),
            before_request: config.attr("before-request"),
            after_request: config.attr("after-request"),
            autofocus: config.attr("autofocus"),
            append_params: config.attr("append-params"),
            append_params_sync: config.attr("append-params-sync"),
            loading_url: config.attr("loading-url"),
            loading_content: config.attr("loading-content"),
            loading_transition: config.attr("loading-transition"),
        }
    }

    pub fn is_directive(&self, attr: &str) -> bool {
        attr.starts_with(&self.prefix)
    }

    /// Target attribute of `pp-bind-<attr>`, spread excluded
    pub fn bound_attr<'a>(&self, attr: &'a str) -> Option<&'a str> {
        if attr == self.spread {
            return None;
        }
        attr.strip_prefix(self.bind_attr.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Component chain of `node`, outermost first, rooted at `app`
    pub fn hierarchy_of(&self, tree: &DomTree, node: NodeId) -> Hierarchy {
        let mut chain: Vec<String> = std::iter::once(node)
            .chain(tree.ancestors(node))
            .filter_map(|n| tree.attr(n, &self.component))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
        chain.reverse();
        if chain.first().map(String::as_str) != Some(ROOT_COMPONENT) {
            chain.insert(0, ROOT_COMPONENT.to_string());
        }
        Hierarchy::from_components(chain)
    }

    /// Is `node` a `<template>` carrying a loop directive
    pub fn is_loop_template(&self, tree: &DomTree, node: NodeId) -> bool {
        tree.is_tag(node, "template") && tree.has_attr(node, &self.for_)
    }

    /// `root` and its descendants in document order, without the inert
    /// content of loop templates, scripts and styles
    pub fn live_nodes(&self, tree: &DomTree, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            out.push(node);
            if self.is_loop_template(tree, node)
                || tree.is_tag(node, "script")
                || tree.is_tag(node, "style")
            {
                continue;
            }
            let start = stack.len();
            stack.extend(tree.children(node));
            stack[start..].reverse();
        }
        out
    }
}

/// `(item, idx) in expr` / `item in expr`
#[derive(Debug, Clone)]
pub struct LoopSpec {
    pub item: String,
    pub index: Option<String>,
    pub source: Expression,
}

impl LoopSpec {
    pub fn parse(attr: &str, value: &str) -> HydrateResult<Self> {
        let invalid = |message: &str| HydrateError::Directive {
            attr: attr.to_string(),
            message: format!("{message} in {value:?}"),
        };
        let (head, source) = value
            .split_once(" in ")
            .ok_or_else(|| invalid("missing `in`"))?;

        let head = head.trim();
        let head = head
            .strip_prefix('(')
            .and_then(|h| h.strip_suffix(')'))
            .unwrap_or(head);
        let mut names = head.split(',').map(str::trim);
        let item = names
            .next()
            .filter(|n| is_identifier(n))
            .ok_or_else(|| invalid("bad item name"))?
            .to_string();
        let index = match names.next() {
            Some(n) if is_identifier(n) => Some(n.to_string()),
            Some(_) => return Err(invalid("bad index name")),
            None => None,
        };
        if names.next().is_some() {
            return Err(invalid("too many loop variables"));
        }

        let source = Expression::parse(source.trim())
            .map_err(|e| invalid(&format!("bad source expression ({e})")))?;
        Ok(Self {
            item,
            index,
            source,
        })
    }
}

/// Branch expressions may be wrapped in `{…}`
pub fn strip_braces(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .map(str::trim)
        .unwrap_or(value)
}

/// `300ms`, `1s`, `2m` or a bare millisecond count
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (number, unit) = match value.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(at) => value.split_at(at),
        None => (value, "ms"),
    };
    let amount: f64 = number.parse().ok()?;
    let millis = match unit.trim() {
        "ms" => amount,
        "s" => amount * 1000.0,
        "m" => amount * 60_000.0,
        _ => return None,
    };
    Some(Duration::from_millis(millis as u64))
}

/// Value parses as a JSON object
pub fn json_object(value: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let value = value.trim();
    if !value.starts_with('{') {
        return None;
    }
    match serde_json::from_str(value) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}
