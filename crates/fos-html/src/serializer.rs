//! HTML Serialization (innerHTML/outerHTML)

use fos_dom::{DomTree, NodeData, NodeId};

/// Void elements (no end tag)
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Raw text elements (no escaping for content)
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// HTML serializer
#[derive(Debug, Default)]
pub struct HtmlSerializer;

impl HtmlSerializer {
    pub fn new() -> Self {
        Self
    }

    /// Serialize innerHTML of a node (children only)
    pub fn serialize_inner(&self, tree: &DomTree, id: NodeId) -> String {
        let mut output = String::new();
        for child in tree.children(id) {
            self.serialize_node(tree, child, &mut output);
        }
        output
    }

    /// Serialize outerHTML of a node (including the node itself)
    pub fn serialize_outer(&self, tree: &DomTree, id: NodeId) -> String {
        let mut output = String::new();
        self.serialize_node(tree, id, &mut output);
        output
    }

    fn serialize_node(&self, tree: &DomTree, id: NodeId, output: &mut String) {
        let Some(node) = tree.get(id) else {
            return;
        };

        match &node.data {
            NodeData::Document => {
                for child in tree.children(id) {
                    self.serialize_node(tree, child, output);
                }
            }
            NodeData::Element(elem) => {
                let tag = elem.name.as_str();
                output.push('<');
                output.push_str(tag);
                for attr in &elem.attrs {
                    output.push(' ');
                    output.push_str(&attr.name);
                    if !attr.value.is_empty() {
                        output.push_str("=\"");
                        escape_attribute(&attr.value, output);
                        output.push('"');
                    }
                }
                output.push('>');
                if VOID_ELEMENTS.contains(&tag) {
                    return;
                }
                if RAW_TEXT_ELEMENTS.contains(&tag) {
                    output.push_str(&tree.text_content(id));
                } else {
                    for child in tree.children(id) {
                        self.serialize_node(tree, child, output);
                    }
                }
                output.push_str("</");
                output.push_str(tag);
                output.push('>');
            }
            NodeData::Text(text) => escape_text(text, output),
            NodeData::Comment(text) => {
                output.push_str("<!--");
                output.push_str(text);
                output.push_str("-->");
            }
            NodeData::Doctype { name, .. } => {
                output.push_str("<!DOCTYPE ");
                output.push_str(name);
                output.push('>');
            }
        }
    }
}

/// Escape text content for HTML
fn escape_text(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

/// Escape attribute value
fn escape_attribute(text: &str, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            _ => output.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_escapes() {
        let mut tree = DomTree::new();
        let p = tree.create_element_with_attrs("p", &[("title", "a\"b"), ("hidden", "")]);
        tree.append_child(NodeId::ROOT, p).unwrap();
        tree.set_text_content(p, "1 < 2").unwrap();
        assert_eq!(
            HtmlSerializer::new().serialize_outer(&tree, p),
            "<p title=\"a&quot;b\" hidden>1 &lt; 2</p>"
        );
    }

    #[test]
    fn test_void_and_inner() {
        let mut tree = DomTree::new();
        let div = tree.create_element("div");
        let br = tree.create_element("br");
        tree.append_child(NodeId::ROOT, div).unwrap();
        tree.append_child(div, br).unwrap();
        assert_eq!(HtmlSerializer::new().serialize_inner(&tree, div), "<br>");
    }
}
