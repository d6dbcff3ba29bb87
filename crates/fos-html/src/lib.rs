//! fOS HTML
//!
//! Markup in and out of the arena DOM: html5ever parsing of full documents
//! and body fragments, plus a serializer for `innerHTML`/`outerHTML`.

mod parser;
mod serializer;

pub use fos_dom::{Document, DomTree, NodeId};
pub use parser::{Fragment, HtmlParser};
pub use serializer::HtmlSerializer;

/// Parse a full document
pub fn parse(html: &str) -> Document {
    HtmlParser::new().parse(html)
}

/// Parse markup meant for the inside of `<body>`
pub fn parse_fragment(html: &str) -> Result<Fragment, ParseError> {
    HtmlParser::new().parse_fragment(html)
}

/// Serialize the children of a node
pub fn inner_html(tree: &DomTree, id: NodeId) -> String {
    HtmlSerializer::new().serialize_inner(tree, id)
}

/// Serialize a node including itself
pub fn outer_html(tree: &DomTree, id: NodeId) -> String {
    HtmlSerializer::new().serialize_outer(tree, id)
}

/// Parse error
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("parsed document has no body")]
    MissingBody,
}
