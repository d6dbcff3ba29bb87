//! HTML5 Parser implementation
//!
//! Uses html5ever's RcDom and converts it to the arena DOM. Template
//! contents become ordinary (inert) children of the `<template>` element so
//! directive compilation can clone them.

use fos_dom::{Document, DomTree, NodeId};
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

use crate::ParseError;

/// Elements whose whitespace-only text is significant
const PRESERVE_WHITESPACE: &[&str] = &["pre", "textarea", "script", "style"];

/// Body children parsed into a detached document
#[derive(Debug)]
pub struct Fragment {
    pub document: Document,
    /// Top-level nodes, in order, still attached to the fragment body
    pub nodes: Vec<NodeId>,
    pub body: NodeId,
}

/// HTML5 parser
pub struct HtmlParser;

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self
    }

    /// Parse HTML string into a Document
    pub fn parse(&self, html: &str) -> Document {
        self.parse_with_url(html, "about:blank")
    }

    /// Parse HTML with a base URL
    pub fn parse_with_url(&self, html: &str, url: &str) -> Document {
        tracing::debug!("Parsing HTML document: {}", url);

        let dom = parse_document(RcDom::default(), Default::default()).one(html);

        let mut document = Document::new(url);
        self.convert_node(&dom.document, document.tree_mut(), NodeId::ROOT, false);

        tracing::debug!("Parsed {} nodes", document.tree().len());
        document
    }

    /// Parse markup as the content of a `<body>`
    pub fn parse_fragment(&self, html: &str) -> Result<Fragment, ParseError> {
        let document = self.parse(&format!("<!DOCTYPE html><html><head></head><body>{html}</body></html>"));
        let body = document.body().ok_or(ParseError::MissingBody)?;
        let nodes = document.tree().children(body).collect();
        Ok(Fragment {
            document,
            nodes,
            body,
        })
    }

    /// Convert an RcDom node to our DOM format
    fn convert_node(&self, handle: &Handle, tree: &mut DomTree, parent: NodeId, keep_ws: bool) {
        match &handle.data {
            RcNodeData::Document => {
                for child in handle.children.borrow().iter() {
                    self.convert_node(child, tree, parent, keep_ws);
                }
            }
            RcNodeData::Doctype {
                name,
                public_id,
                system_id,
            } => {
                let id = tree.create_doctype(name, public_id, system_id);
                self.attach(tree, parent, id);
            }
            RcNodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                if keep_ws || !text.trim().is_empty() {
                    let id = tree.create_text(text);
                    self.attach(tree, parent, id);
                }
            }
            RcNodeData::Comment { contents } => {
                let id = tree.create_comment(contents.to_string());
                self.attach(tree, parent, id);
            }
            RcNodeData::Element {
                name,
                attrs,
                template_contents,
                ..
            } => {
                let tag = name.local.to_string();
                let pairs: Vec<(String, String)> = attrs
                    .borrow()
                    .iter()
                    .map(|a| (a.name.local.to_string(), a.value.to_string()))
                    .collect();
                let refs: Vec<(&str, &str)> = pairs
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                let id = tree.create_element_with_attrs(&tag, &refs);
                self.attach(tree, parent, id);

                let keep = keep_ws || PRESERVE_WHITESPACE.contains(&tag.as_str());
                if let Some(contents) = template_contents.borrow().as_ref() {
                    for child in contents.children.borrow().iter() {
                        self.convert_node(child, tree, id, keep);
                    }
                }
                for child in handle.children.borrow().iter() {
                    self.convert_node(child, tree, id, keep);
                }
            }
            RcNodeData::ProcessingInstruction { .. } => {}
        }
    }

    fn attach(&self, tree: &mut DomTree, parent: NodeId, id: NodeId) {
        if let Err(err) = tree.append_child(parent, id) {
            tracing::warn!("Dropping node during parse: {}", err);
        }
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}
