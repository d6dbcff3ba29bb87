//! Integration tests for fos-dom
//!
//! Tree mutation, selectors and live state working together.

use fos_dom::*;

fn list(items: &[&str]) -> (Document, NodeId) {
    let mut doc = Document::new("about:blank");
    let tree = doc.tree_mut();
    let ul = tree.create_element("ul");
    tree.append_child(NodeId::ROOT, ul).unwrap();
    for key in items {
        let li = tree.create_element_with_attrs("li", &[("key", key)]);
        tree.append_child(ul, li).unwrap();
        tree.set_text_content(li, key).unwrap();
    }
    (doc, ul)
}

// ============================================================================
// MUTATION TESTS
// ============================================================================

#[test]
fn test_reorder_by_reinsertion() {
    let (mut doc, ul) = list(&["a", "b", "c"]);
    let tree = doc.tree_mut();
    let c = tree.last_child(ul).unwrap();
    let a = tree.first_child(ul).unwrap();
    tree.insert_before(ul, c, Some(a)).unwrap();
    assert_eq!(tree.text_content(ul), "cab");
}

#[test]
fn test_replace_node() {
    let (mut doc, ul) = list(&["a", "b"]);
    let tree = doc.tree_mut();
    let a = tree.first_child(ul).unwrap();
    let z = tree.create_element("li");
    tree.set_text_content(z, "z").unwrap();
    tree.replace(a, z).unwrap();
    assert_eq!(tree.text_content(ul), "zb");
    assert!(!tree.is_connected(a));
}

#[test]
fn test_clear_children() {
    let (mut doc, ul) = list(&["a", "b", "c"]);
    doc.tree_mut().clear_children(ul).unwrap();
    assert_eq!(doc.tree().children(ul).count(), 0);
    assert_eq!(doc.tree().first_child(ul), None);
    assert_eq!(doc.tree().last_child(ul), None);
}

// ============================================================================
// SELECTOR TESTS
// ============================================================================

#[test]
fn test_keyed_lookup() {
    let (doc, _) = list(&["a", "b", "c"]);
    let sel = Selector::parse("li[key=\"b\"]").unwrap();
    let found = sel.query(doc.tree(), NodeId::ROOT).unwrap();
    assert_eq!(doc.tree().text_content(found), "b");
}

#[test]
fn test_closest_keyed_ancestor() {
    let (mut doc, ul) = list(&["a"]);
    let li = doc.tree().first_child(ul).unwrap();
    let input = doc.tree_mut().create_element("input");
    doc.tree_mut().append_child(li, input).unwrap();
    let keyed = doc.tree().closest(input, |t, n| t.has_attr(n, "key"));
    assert_eq!(keyed, Some(li));
}

// ============================================================================
// LIVE STATE TESTS
// ============================================================================

#[test]
fn test_scroll_state_survives_attribute_changes() {
    let (mut doc, ul) = list(&["a"]);
    doc.scroll_to(ul, ScrollOffset::new(40.0, 0.0)).unwrap();
    doc.tree_mut().set_attr(ul, "class", "tall").unwrap();
    assert_eq!(doc.scroll(ul).top, 40.0);
}
