//! DOM Tree (arena-based allocation)
//!
//! Detached nodes stay in the arena; a node is part of the document only
//! while its ancestor chain reaches [`NodeId::ROOT`].

use crate::{DomError, DomResult, ElementData, Node, NodeData, NodeId};

/// Arena-based DOM tree
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<Node>,
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DomTree {
    /// Create a tree holding only the document node
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::document()],
        }
    }

    /// Get a node by ID
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Get a mutable node by ID
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    /// Number of nodes in the arena, detached ones included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&self, id: NodeId) -> DomResult<&Node> {
        self.get(id).ok_or(DomError::NodeNotFound(id))
    }

    fn node_mut(&mut self, id: NodeId) -> DomResult<&mut Node> {
        self.get_mut(id).ok_or(DomError::NodeNotFound(id))
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    // === Creation ===

    /// Create a detached element
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(Node::element(name))
    }

    /// Create a detached element with attributes
    pub fn create_element_with_attrs(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let mut data = ElementData::new(name);
        for (k, v) in attrs {
            data.set_attr(k, v);
        }
        self.alloc(Node::with_data(NodeData::Element(data)))
    }

    /// Create a detached text node
    pub fn create_text(&mut self, content: impl Into<String>) -> NodeId {
        self.alloc(Node::text(content))
    }

    /// Create a detached comment node
    pub fn create_comment(&mut self, content: impl Into<String>) -> NodeId {
        self.alloc(Node::comment(content))
    }

    /// Create a detached doctype node
    pub fn create_doctype(&mut self, name: &str, public_id: &str, system_id: &str) -> NodeId {
        self.alloc(Node::with_data(NodeData::Doctype {
            name: name.to_string(),
            public_id: public_id.to_string(),
            system_id: system_id.to_string(),
        }))
    }

    // === Element access ===

    /// Element data of a node
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(Node::as_element)
    }

    /// Mutable element data of a node
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.get_mut(id).and_then(Node::as_element_mut)
    }

    /// Lowercase tag name
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|e| e.name.as_str())
    }

    /// Check the tag name of a node
    pub fn is_tag(&self, id: NodeId, tag: &str) -> bool {
        self.element(id).is_some_and(|e| e.is(tag))
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|e| e.get_attr(name))
    }

    pub fn has_attr(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|e| e.has_attr(name))
    }

    /// Set an attribute, returns true if the value changed
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> DomResult<bool> {
        let el = self.element_mut(id).ok_or(DomError::NotAnElement(id))?;
        Ok(el.set_attr(name, value))
    }

    /// Remove an attribute, returns the previous value
    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> DomResult<Option<String>> {
        let el = self.element_mut(id).ok_or(DomError::NotAnElement(id))?;
        Ok(el.remove_attr(name))
    }

    // === Navigation ===

    fn link(&self, id: NodeId, pick: fn(&Node) -> NodeId) -> Option<NodeId> {
        self.get(id).map(pick).filter(|n| n.is_valid())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.link(id, |n| n.parent)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.link(id, |n| n.first_child)
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.link(id, |n| n.last_child)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.link(id, |n| n.next_sibling)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.link(id, |n| n.prev_sibling)
    }

    /// Iterate direct children
    pub fn children(&self, id: NodeId) -> Children<'_> {
        Children {
            tree: self,
            next: self.first_child(id).unwrap_or(NodeId::NONE),
        }
    }

    /// Direct element children
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .filter(|c| self.element(*c).is_some())
            .collect()
    }

    /// All descendants in document order, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).collect();
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let start = stack.len();
            stack.extend(self.children(next));
            stack[start..].reverse();
        }
        out
    }

    /// Ancestor chain from the parent upward
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            out.push(p);
            current = self.parent(p);
        }
        out
    }

    /// Nearest inclusive ancestor matching a predicate
    pub fn closest(&self, id: NodeId, pred: impl Fn(&DomTree, NodeId) -> bool) -> Option<NodeId> {
        if pred(self, id) {
            return Some(id);
        }
        self.ancestors(id).into_iter().find(|a| pred(self, *a))
    }

    /// Check if `ancestor` contains `id` (inclusive)
    pub fn contains(&self, ancestor: NodeId, id: NodeId) -> bool {
        ancestor == id || self.ancestors(id).contains(&ancestor)
    }

    /// Attached to the document root
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.contains(NodeId::ROOT, id)
    }

    // === Mutation ===

    /// Unlink a node from its parent and siblings
    pub fn detach(&mut self, id: NodeId) -> DomResult<()> {
        let (parent, prev, next) = {
            let n = self.node(id)?;
            (n.parent, n.prev_sibling, n.next_sibling)
        };
        if let Some(p) = self.get_mut(prev) {
            p.next_sibling = next;
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = next;
        }
        if let Some(n) = self.get_mut(next) {
            n.prev_sibling = prev;
        } else if let Some(par) = self.get_mut(parent) {
            par.last_child = prev;
        }
        let n = self.node_mut(id)?;
        n.parent = NodeId::NONE;
        n.prev_sibling = NodeId::NONE;
        n.next_sibling = NodeId::NONE;
        Ok(())
    }

    /// Append `child` as last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference` (append when `None`)
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> DomResult<()> {
        self.node(parent)?;
        self.node(child)?;
        if self.contains(child, parent) {
            return Err(DomError::InvalidHierarchy { parent, child });
        }
        if let Some(r) = reference {
            if self.parent(r) != Some(parent) {
                return Err(DomError::InvalidHierarchy { parent, child: r });
            }
            if r == child {
                return Ok(());
            }
        }
        self.detach(child)?;

        let prev = match reference {
            Some(r) => self.node(r)?.prev_sibling,
            None => self.node(parent)?.last_child,
        };
        let next = reference.unwrap_or(NodeId::NONE);
        {
            let c = self.node_mut(child)?;
            c.parent = parent;
            c.prev_sibling = prev;
            c.next_sibling = next;
        }
        match self.get_mut(prev) {
            Some(p) => p.next_sibling = child,
            None => self.node_mut(parent)?.first_child = child,
        }
        match self.get_mut(next) {
            Some(n) => n.prev_sibling = child,
            None => self.node_mut(parent)?.last_child = child,
        }
        Ok(())
    }

    /// Insert `child` right after `reference` under the same parent
    pub fn insert_after(&mut self, reference: NodeId, child: NodeId) -> DomResult<()> {
        let parent = self.parent(reference).ok_or(DomError::InvalidHierarchy {
            parent: NodeId::NONE,
            child: reference,
        })?;
        let next = self.next_sibling(reference);
        self.insert_before(parent, child, next)
    }

    /// Swap `old` for `new` in place
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> DomResult<()> {
        let parent = self.parent(old).ok_or(DomError::InvalidHierarchy {
            parent: NodeId::NONE,
            child: old,
        })?;
        self.insert_before(parent, new, Some(old))?;
        self.detach(old)
    }

    /// Detach every child of `id`
    pub fn clear_children(&mut self, id: NodeId) -> DomResult<()> {
        while let Some(c) = self.first_child(id) {
            self.detach(c)?;
        }
        Ok(())
    }

    // === Text ===

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(t) = self.get(id).and_then(Node::as_text) {
            return t.to_string();
        }
        self.descendants(id)
            .into_iter()
            .filter_map(|d| self.get(d).and_then(Node::as_text))
            .collect()
    }

    /// Replace the content of a text node, returns true if it changed
    pub fn set_text(&mut self, id: NodeId, text: &str) -> DomResult<bool> {
        match &mut self.node_mut(id)?.data {
            NodeData::Text(t) | NodeData::Comment(t) => {
                if t == text {
                    return Ok(false);
                }
                *t = text.to_string();
                Ok(true)
            }
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    /// Replace all children with a single text node
    pub fn set_text_content(&mut self, id: NodeId, text: &str) -> DomResult<()> {
        if self.node(id)?.is_text() {
            return self.set_text(id, text).map(|_| ());
        }
        if self.text_content(id) == text && self.children(id).count() == 1 {
            return Ok(());
        }
        self.clear_children(id)?;
        if !text.is_empty() {
            let t = self.create_text(text);
            self.append_child(id, t)?;
        }
        Ok(())
    }

    // === Cloning ===

    /// Deep-copy a subtree into a new detached subtree of this arena
    pub fn deep_clone(&mut self, id: NodeId) -> DomResult<NodeId> {
        let copy = self.node(id)?.detached_copy();
        let new_id = self.alloc(copy);
        let children: Vec<NodeId> = self.children(id).collect();
        for child in children {
            let c = self.deep_clone(child)?;
            self.append_child(new_id, c)?;
        }
        Ok(new_id)
    }

    /// Deep-copy a subtree from another tree into this arena, detached
    pub fn import_node(&mut self, src: &DomTree, id: NodeId) -> DomResult<NodeId> {
        let copy = src.node(id)?.detached_copy();
        let new_id = self.alloc(copy);
        for child in src.children(id) {
            let c = self.import_node(src, child)?;
            self.append_child(new_id, c)?;
        }
        tracing::trace!("Imported node {:?} as {:?}", id, new_id);
        Ok(new_id)
    }
}

/// Iterator over direct children
pub struct Children<'a> {
    tree: &'a DomTree,
    next: NodeId,
}

impl Iterator for Children<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next;
        let node = self.tree.get(current)?;
        self.next = node.next_sibling;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DomTree, NodeId, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let ul = tree.create_element("ul");
        tree.append_child(NodeId::ROOT, ul).unwrap();
        let a = tree.create_element("li");
        let b = tree.create_element("li");
        tree.append_child(ul, a).unwrap();
        tree.append_child(ul, b).unwrap();
        (tree, ul, a, b)
    }

    #[test]
    fn test_append_and_children() {
        let (tree, ul, a, b) = sample();
        assert_eq!(tree.children(ul).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(tree.parent(a), Some(ul));
        assert_eq!(tree.next_sibling(a), Some(b));
        assert_eq!(tree.prev_sibling(b), Some(a));
    }

    #[test]
    fn test_insert_before_and_after() {
        let (mut tree, ul, a, b) = sample();
        let c = tree.create_element("li");
        tree.insert_before(ul, c, Some(b)).unwrap();
        assert_eq!(tree.children(ul).collect::<Vec<_>>(), vec![a, c, b]);

        let d = tree.create_element("li");
        tree.insert_after(b, d).unwrap();
        assert_eq!(tree.last_child(ul), Some(d));
    }

    #[test]
    fn test_detach_relinks_siblings() {
        let (mut tree, ul, a, b) = sample();
        tree.detach(a).unwrap();
        assert_eq!(tree.first_child(ul), Some(b));
        assert_eq!(tree.prev_sibling(b), None);
        assert!(!tree.is_connected(a));
        assert!(tree.is_connected(b));
    }

    #[test]
    fn test_cycle_rejected() {
        let (mut tree, ul, a, _) = sample();
        assert!(matches!(
            tree.append_child(a, ul),
            Err(DomError::InvalidHierarchy { .. })
        ));
    }

    #[test]
    fn test_descendants_document_order() {
        let (mut tree, ul, a, b) = sample();
        let t = tree.create_text("x");
        tree.append_child(a, t).unwrap();
        assert_eq!(tree.descendants(ul), vec![a, t, b]);
    }

    #[test]
    fn test_text_content() {
        let (mut tree, ul, a, _) = sample();
        tree.set_text_content(a, "hello").unwrap();
        assert_eq!(tree.text_content(ul), "hello");
        let t = tree.first_child(a).unwrap();
        assert!(!tree.set_text(t, "hello").unwrap());
        assert!(tree.set_text(t, "bye").unwrap());
    }

    #[test]
    fn test_deep_clone_and_import() {
        let (mut tree, ul, a, _) = sample();
        tree.set_attr(a, "key", "1").unwrap();
        let copy = tree.deep_clone(ul).unwrap();
        assert!(!tree.is_connected(copy));
        assert_eq!(tree.children(copy).count(), 2);

        let mut other = DomTree::new();
        let imported = other.import_node(&tree, ul).unwrap();
        let first = other.first_child(imported).unwrap();
        assert_eq!(other.attr(first, "key"), Some("1"));
    }
}
