//! Reconciliation
//!
//! Morphs a live subtree into freshly fetched markup node by node, so
//! nodes that survive keep their identity and their live state. Keyed
//! children (`key`, or `pp-sync-script` for scripts) are matched by key,
//! the rest by position and kind.
//!
//! Some elements carry state the markup cannot express:
//! - `script`, `canvas` and `data-nomorph` elements are never updated
//! - a focused `input`/`textarea`/`select` is left untouched
//! - an unfocused `input`/`textarea` takes the incoming value
//! - an unfocused `select` takes the incoming options but keeps the live
//!   selected index
//! - `details` keeps its open state, media keeps position and play state

use std::collections::{HashMap, HashSet, VecDeque};

use fos_dom::{Document, DomResult, DomTree, NodeData, NodeId, ScrollOffset};

/// Attributes whose template tokens are scrubbed before reconciliation
pub const TEMPLATE_VALUE_ATTRS: &[&str] = &["value", "checked", "selected"];

/// Head entries rendered per page and removed on navigation
const DYNAMIC_HEAD_ATTRS: &[&str] = &["pp-dynamic-meta", "pp-dynamic-link", "pp-dynamic-script"];

const SYNC_SCRIPT_ATTR: &str = "pp-sync-script";

/// Remove form-state attributes that still hold `{{ }}` tokens so the live
/// value wins during morphing
pub fn scrub_template_values(tree: &mut DomTree, root: NodeId) -> usize {
    let mut scrubbed = 0;
    for node in tree.descendants(root) {
        for attr in TEMPLATE_VALUE_ATTRS {
            if tree.attr(node, attr).is_some_and(|v| v.contains("{{"))
                && tree.remove_attr(node, attr).is_ok()
            {
                scrubbed += 1;
            }
        }
    }
    scrubbed
}

fn node_key(tree: &DomTree, id: NodeId) -> Option<String> {
    if let Some(sync) = tree.attr(id, SYNC_SCRIPT_ATTR) {
        return Some(format!("{SYNC_SCRIPT_ATTR}:{sync}"));
    }
    tree.attr(id, "key").map(str::to_string)
}

fn compatible(live: &DomTree, l: NodeId, src: &DomTree, s: NodeId) -> bool {
    match (live.get(l).map(|n| &n.data), src.get(s).map(|n| &n.data)) {
        (Some(NodeData::Element(a)), Some(NodeData::Element(b))) => a.name == b.name,
        (Some(NodeData::Text(_)), Some(NodeData::Text(_)))
        | (Some(NodeData::Comment(_)), Some(NodeData::Comment(_)))
        | (Some(NodeData::Doctype { .. }), Some(NodeData::Doctype { .. })) => true,
        _ => false,
    }
}

/// Make the attributes of `l` equal to those of `s`
fn sync_attributes(live: &mut DomTree, l: NodeId, src: &DomTree, s: NodeId) -> DomResult<()> {
    let incoming = src.element(s).map(|e| e.attrs.clone()).unwrap_or_default();
    let stale: Vec<String> = live
        .element(l)
        .map(|e| {
            e.attrs
                .iter()
                .filter(|a| !incoming.iter().any(|b| b.name == a.name))
                .map(|a| a.name.clone())
                .collect()
        })
        .unwrap_or_default();
    for name in stale {
        live.remove_attr(l, &name)?;
    }
    for attr in incoming {
        live.set_attr(l, &attr.name, &attr.value)?;
    }
    Ok(())
}

/// Morph one live node into the shape of `s`
fn morph_node(live: &mut Document, l: NodeId, src: &DomTree, s: NodeId) -> DomResult<()> {
    let tree = live.tree();
    if let Some(text) = src.get(s).and_then(|n| match &n.data {
        NodeData::Text(t) | NodeData::Comment(t) => Some(t.as_str()),
        _ => None,
    }) {
        live.tree_mut().set_text(l, text)?;
        return Ok(());
    }
    let Some(tag) = tree.tag_name(l).map(str::to_string) else {
        return Ok(());
    };
    if matches!(tag.as_str(), "script" | "canvas") || tree.has_attr(l, "data-nomorph") {
        return Ok(());
    }
    let focused = live.is_focused(l);

    match tag.as_str() {
        "input" | "textarea" | "select" if focused => Ok(()),
        "input" => {
            let checked = live.checked(l);
            if let Some(el) = live.tree_mut().element_mut(l) {
                el.state.checked = Some(checked);
            }
            sync_attributes(live.tree_mut(), l, src, s)?;
            let incoming = src.attr(s, "value").unwrap_or_default();
            live.set_value(l, incoming)?;
            Ok(())
        }
        "textarea" => {
            sync_attributes(live.tree_mut(), l, src, s)?;
            let incoming = src.text_content(s);
            morph_children(live, l, src, s)?;
            live.set_value(l, &incoming)?;
            Ok(())
        }
        "select" => {
            let index = live.selected_index(l);
            sync_attributes(live.tree_mut(), l, src, s)?;
            morph_children(live, l, src, s)?;
            if let Some(index) = index.filter(|&i| i < live.options(l).len()) {
                live.set_selected_index(l, index)?;
            }
            Ok(())
        }
        "details" => {
            let open = live.open(l);
            sync_attributes(live.tree_mut(), l, src, s)?;
            morph_children(live, l, src, s)?;
            live.set_boolean(l, "open", open)?;
            Ok(())
        }
        "audio" | "video" => {
            let state = live.tree().element(l).map(|e| (e.state.current_time, e.state.playing));
            sync_attributes(live.tree_mut(), l, src, s)?;
            morph_children(live, l, src, s)?;
            if let (Some((time, playing)), Some(el)) = (state, live.tree_mut().element_mut(l)) {
                el.state.current_time = time;
                el.state.playing = playing;
            }
            Ok(())
        }
        _ => {
            sync_attributes(live.tree_mut(), l, src, s)?;
            morph_children(live, l, src, s)
        }
    }
}

/// Morph the children of live node `lp` into those of `sp` in `src`
pub fn morph_children(live: &mut Document, lp: NodeId, src: &DomTree, sp: NodeId) -> DomResult<()> {
    let incoming: Vec<NodeId> = src.children(sp).collect();
    let existing: Vec<NodeId> = live.tree().children(lp).collect();
    let mut keyed: HashMap<String, NodeId> = existing
        .iter()
        .filter_map(|&l| node_key(live.tree(), l).map(|k| (k, l)))
        .collect();
    let mut used: HashSet<NodeId> = HashSet::new();

    let mut next = live.tree().first_child(lp);
    for s in incoming {
        // skip over live nodes already claimed by a key match
        while let Some(n) = next.filter(|n| used.contains(n)) {
            next = live.tree().next_sibling(n);
        }
        let target = match node_key(src, s) {
            Some(key) => keyed.remove(&key).filter(|&l| compatible(live.tree(), l, src, s)),
            None => next.filter(|&l| {
                node_key(live.tree(), l).is_none() && compatible(live.tree(), l, src, s)
            }),
        };

        let placed = match target {
            Some(l) => {
                morph_node(live, l, src, s)?;
                if next != Some(l) {
                    live.tree_mut().insert_before(lp, l, next)?;
                }
                l
            }
            None => {
                let fresh = live.tree_mut().import_node(src, s)?;
                live.tree_mut().insert_before(lp, fresh, next)?;
                fresh
            }
        };
        used.insert(placed);
        next = live.tree().next_sibling(placed);
    }

    for l in existing {
        if !used.contains(&l) && live.tree().parent(l) == Some(lp) {
            live.tree_mut().detach(l)?;
        }
    }
    Ok(())
}

/// Morph the live `<body>` into the body of `incoming`
pub fn morph_body(live: &mut Document, incoming: &Document) -> DomResult<()> {
    let (Some(lb), Some(sb)) = (live.body(), incoming.body()) else {
        return Ok(());
    };
    sync_attributes(live.tree_mut(), lb, incoming.tree(), sb)?;
    morph_children(live, lb, incoming.tree(), sb)
}

fn head_match(tree: &DomTree, head: NodeId, pred: impl Fn(&DomTree, NodeId) -> bool) -> Option<NodeId> {
    tree.children(head).find(|&c| pred(tree, c))
}

fn is_icon(tree: &DomTree, node: NodeId) -> bool {
    tree.is_tag(node, "link")
        && tree
            .attr(node, "rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("icon")))
}

/// Bring `<head>` in line with the incoming document: title, named meta
/// tags, the icon and per-page dynamic entries
pub fn reconcile_head(live: &mut Document, incoming: &Document) -> DomResult<()> {
    let (Some(head), Some(src_head)) = (live.head(), incoming.head()) else {
        return Ok(());
    };
    let src = incoming.tree();

    let dynamic: Vec<NodeId> = live
        .tree()
        .children(head)
        .filter(|&c| DYNAMIC_HEAD_ATTRS.iter().any(|a| live.tree().has_attr(c, a)))
        .collect();
    for node in dynamic {
        live.tree_mut().detach(node)?;
    }

    for s in src.element_children(src_head) {
        let tree = live.tree();
        let title = head_match(tree, head, |t, c| t.is_tag(c, "title"));
        let existing = match src.tag_name(s).unwrap_or_default() {
            "script" if src.has_attr(s, "pp-dynamic-script") => None,
            "link" if src.has_attr(s, "pp-dynamic-link") => None,
            "meta" if src.has_attr(s, "pp-dynamic-meta") => None,
            "meta" => {
                if src.has_attr(s, "charset") || src.attr(s, "name") == Some("viewport") {
                    continue;
                }
                let key = ["name", "property"]
                    .into_iter()
                    .find_map(|a| src.attr(s, a).map(|v| (a, v)));
                let Some((attr, value)) = key else {
                    continue;
                };
                head_match(tree, head, |t, c| t.is_tag(c, "meta") && t.attr(c, attr) == Some(value))
            }
            "title" => title,
            "link" if is_icon(src, s) => head_match(tree, head, is_icon),
            _ => continue,
        };

        let fresh = live.tree_mut().import_node(src, s)?;
        match existing {
            Some(old) => live.tree_mut().replace(old, fresh)?,
            None if src.is_tag(s, "meta") && !src.has_attr(s, "pp-dynamic-meta") => match title {
                Some(title) => live.tree_mut().insert_after(title, fresh)?,
                None => live.tree_mut().append_child(head, fresh)?,
            },
            None => live.tree_mut().append_child(head, fresh)?,
        }
    }
    Ok(())
}

/// Element scroll key: `#id`, else the class list, else the tag
fn scroll_key(tree: &DomTree, node: NodeId) -> Option<String> {
    let el = tree.element(node)?;
    if let Some(id) = el.id().filter(|id| !id.is_empty()) {
        return Some(format!("#{id}"));
    }
    let classes: Vec<&str> = el.classes().collect();
    if !classes.is_empty() {
        return Some(format!(".{}", classes.join(".")));
    }
    Some(el.name.clone())
}

/// Scroll offsets of the window and of every scrolled element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrollSnapshot {
    pub window: ScrollOffset,
    pub elements: Vec<(String, ScrollOffset)>,
}

impl ScrollSnapshot {
    pub fn capture(document: &Document) -> Self {
        let tree = document.tree();
        let elements = tree
            .descendants(document.root())
            .into_iter()
            .filter_map(|node| {
                let offset = document.scroll(node);
                if !offset.is_scrolled() {
                    return None;
                }
                scroll_key(tree, node).map(|key| (key, offset))
            })
            .collect();
        Self {
            window: document.window_scroll(),
            elements,
        }
    }

    /// Reapply offsets; elements sharing a key are matched in document
    /// order
    pub fn restore(&self, document: &mut Document) {
        document.scroll_window_to(self.window);
        let mut queues: HashMap<&str, VecDeque<ScrollOffset>> = HashMap::new();
        for (key, offset) in &self.elements {
            queues.entry(key.as_str()).or_default().push_back(*offset);
        }
        if queues.is_empty() {
            return;
        }
        let targets: Vec<(NodeId, ScrollOffset)> = document
            .tree()
            .descendants(document.root())
            .into_iter()
            .filter_map(|node| {
                let key = scroll_key(document.tree(), node)?;
                let offset = queues.get_mut(key.as_str())?.pop_front()?;
                Some((node, offset))
            })
            .collect();
        for (node, offset) in targets {
            if let Err(err) = document.scroll_to(node, offset) {
                tracing::debug!("scroll not restored: {}", err);
            }
        }
    }
}
