//! fOS DOM - Document Object Model
//!
//! Arena-allocated document tree used by the hydration runtime. Besides
//! markup structure, elements carry the live state a browser keeps outside
//! of attributes (form values, caret, media position, scroll offsets) so it
//! can be preserved across reconciliation.

mod document;
mod node;
mod selector;
mod state;
mod tree;

pub use document::Document;
pub use node::{Attribute, ElementData, Node, NodeData};
pub use selector::{Selector, SelectorPart};
pub use state::{ElementState, ScrollOffset, Selection};
pub use tree::{Children, DomTree};

/// Node identifier (index into arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Root (document) node ID
    pub const ROOT: NodeId = NodeId(0);

    /// Sentinel for "no node"
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check if this refers to a node
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::NONE
    }

    /// Raw arena index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// DOM operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("invalid hierarchy: cannot insert {child:?} under {parent:?}")]
    InvalidHierarchy { parent: NodeId, child: NodeId },

    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),

    #[error("option index {index} out of range ({len} options)")]
    OptionOutOfRange { index: usize, len: usize },
}

pub type DomResult<T> = Result<T, DomError>;

/// Attributes that are reflected both as a property and as attribute presence.
pub const BOOLEAN_ATTRIBUTES: &[&str] = &[
    "allowfullscreen",
    "async",
    "autofocus",
    "autoplay",
    "checked",
    "controls",
    "default",
    "defer",
    "disabled",
    "formnovalidate",
    "hidden",
    "inert",
    "ismap",
    "itemscope",
    "loop",
    "multiple",
    "muted",
    "nomodule",
    "novalidate",
    "open",
    "playsinline",
    "readonly",
    "required",
    "reversed",
    "selected",
    "truespeed",
];

/// Check whether an attribute name is a boolean attribute
pub fn is_boolean_attribute(name: &str) -> bool {
    BOOLEAN_ATTRIBUTES.contains(&name.to_ascii_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_sentinels() {
        assert!(NodeId::ROOT.is_valid());
        assert!(!NodeId::NONE.is_valid());
        assert_eq!(NodeId::ROOT.index(), 0);
    }

    #[test]
    fn test_boolean_attribute_lookup() {
        assert!(is_boolean_attribute("disabled"));
        assert!(is_boolean_attribute("Checked"));
        assert!(!is_boolean_attribute("value"));
    }
}
