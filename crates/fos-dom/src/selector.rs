//! Simple selectors
//!
//! Compound selectors only (`div#main.card[data-x="1"]`), with comma lists.
//! Combinators are not supported.

use crate::{DomTree, ElementData, NodeId};

/// One part of a compound selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorPart {
    /// Universal selector (*)
    Universal,
    /// Tag name (div, span, etc.)
    Tag(String),
    /// Class selector (.class)
    Class(String),
    /// ID selector (#id)
    Id(String),
    /// Attribute presence ([attr])
    HasAttr(String),
    /// Attribute equality ([attr="value"])
    AttrEquals(String, String),
}

impl SelectorPart {
    fn matches(&self, el: &ElementData) -> bool {
        match self {
            SelectorPart::Universal => true,
            SelectorPart::Tag(tag) => el.is(tag),
            SelectorPart::Class(class) => el.classes().any(|c| c == class),
            SelectorPart::Id(id) => el.id() == Some(id.as_str()),
            SelectorPart::HasAttr(name) => el.has_attr(name),
            SelectorPart::AttrEquals(name, value) => el.get_attr(name) == Some(value.as_str()),
        }
    }
}

/// A comma-separated list of compound selectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    alternatives: Vec<Vec<SelectorPart>>,
}

impl Selector {
    /// Parse a selector, `None` on malformed input
    pub fn parse(input: &str) -> Option<Self> {
        let mut alternatives = Vec::new();
        for alt in input.split(',') {
            let alt = alt.trim();
            if alt.is_empty() {
                return None;
            }
            alternatives.push(parse_compound(alt)?);
        }
        Some(Self { alternatives })
    }

    /// Build a `[name="value"]` selector without parsing
    pub fn attr_equals(name: &str, value: &str) -> Self {
        Self {
            alternatives: vec![vec![SelectorPart::AttrEquals(
                name.to_string(),
                value.to_string(),
            )]],
        }
    }

    /// Check an element against the selector
    pub fn matches(&self, tree: &DomTree, id: NodeId) -> bool {
        let Some(el) = tree.element(id) else {
            return false;
        };
        self.alternatives
            .iter()
            .any(|parts| parts.iter().all(|p| p.matches(el)))
    }

    /// First matching descendant of `root`
    pub fn query(&self, tree: &DomTree, root: NodeId) -> Option<NodeId> {
        tree.descendants(root)
            .into_iter()
            .find(|n| self.matches(tree, *n))
    }

    /// All matching descendants of `root` in document order
    pub fn query_all(&self, tree: &DomTree, root: NodeId) -> Vec<NodeId> {
        tree.descendants(root)
            .into_iter()
            .filter(|n| self.matches(tree, *n))
            .collect()
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn parse_compound(input: &str) -> Option<Vec<SelectorPart>> {
    let chars: Vec<char> = input.chars().collect();
    let mut parts = Vec::new();
    let mut i = 0;

    let ident = |start: usize| -> (String, usize) {
        let mut end = start;
        while end < chars.len() && is_ident_char(chars[end]) {
            end += 1;
        }
        (chars[start..end].iter().collect(), end)
    };

    while i < chars.len() {
        match chars[i] {
            '*' => {
                parts.push(SelectorPart::Universal);
                i += 1;
            }
            '#' | '.' => {
                let (name, end) = ident(i + 1);
                if name.is_empty() {
                    return None;
                }
                parts.push(if chars[i] == '#' {
                    SelectorPart::Id(name)
                } else {
                    SelectorPart::Class(name)
                });
                i = end;
            }
            '[' => {
                let close = chars[i..].iter().position(|c| *c == ']')? + i;
                let body: String = chars[i + 1..close].iter().collect();
                parts.push(parse_attr(&body)?);
                i = close + 1;
            }
            c if is_ident_char(c) => {
                let (name, end) = ident(i);
                parts.push(SelectorPart::Tag(name.to_ascii_lowercase()));
                i = end;
            }
            _ => return None,
        }
    }
    (!parts.is_empty()).then_some(parts)
}

fn parse_attr(body: &str) -> Option<SelectorPart> {
    match body.split_once('=') {
        None => {
            let name = body.trim();
            (!name.is_empty()).then(|| SelectorPart::HasAttr(name.to_string()))
        }
        Some((name, value)) => {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some(SelectorPart::AttrEquals(
                name.trim().to_string(),
                value.to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compound() {
        let sel = Selector::parse("div#main.card[data-x=\"1\"]").unwrap();
        assert_eq!(
            sel.alternatives[0],
            vec![
                SelectorPart::Tag("div".into()),
                SelectorPart::Id("main".into()),
                SelectorPart::Class("card".into()),
                SelectorPart::AttrEquals("data-x".into(), "1".into()),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_combinators() {
        assert!(Selector::parse("div > p").is_none());
        assert!(Selector::parse("").is_none());
    }

    #[test]
    fn test_query() {
        let mut tree = DomTree::new();
        let a = tree.create_element_with_attrs("div", &[("pp-sync", "list")]);
        let b = tree.create_element_with_attrs("span", &[("class", "x y")]);
        tree.append_child(NodeId::ROOT, a).unwrap();
        tree.append_child(a, b).unwrap();

        let sync = Selector::attr_equals("pp-sync", "list");
        assert_eq!(sync.query(&tree, NodeId::ROOT), Some(a));

        let class = Selector::parse(".y, #none").unwrap();
        assert_eq!(class.query_all(&tree, NodeId::ROOT), vec![b]);
    }
}
