//! Keyed loop rendering
//!
//! Items keep their nodes across renders: kept keys are moved into place
//! and re-bound to their new index, new keys get fresh clones of the
//! template, removed keys are detached together with their bindings.

use std::collections::HashMap;

use fos_dom::{NodeId, Selection};
use fos_reactive::{BindingId, Value};

use crate::directive::{ItemKey, diff_keys, item_keys};
use crate::page::{ItemRef, LoopId, LoopItem, LoopState};
use crate::{HydrateResult, Page};

/// Outcome of placing one render's items
struct Placement {
    /// Roots of kept items whose index or value moved
    changed: Vec<NodeId>,
    /// Items rendered for the first time
    fresh: Vec<(ItemKey, Vec<NodeId>)>,
}

impl Page {
    /// Re-render one loop against the current value of its source
    pub(crate) fn render_loop(&mut self, id: LoopId) -> HydrateResult<()> {
        let Some(state) = self.loops.get(&id) else {
            return Ok(());
        };
        if !self.document.tree().is_connected(state.marker) {
            return Ok(());
        }
        let (scope, source) = (state.scope.clone(), state.spec.source.clone());

        let array_path = self.loop_array_path(&scope, &source);
        let value = match &array_path {
            Some(path) => self.reactive.store.get(path),
            None => self.eval(&source, &scope),
        };
        let items = match value {
            Value::Array(items) => items,
            other if other.is_nullish() => Vec::new(),
            other => {
                tracing::warn!(
                    "loop source `{}` is {}, not an array",
                    source.source(),
                    other.type_of()
                );
                Vec::new()
            }
        };

        let focus = self.focused_item_node(id);
        let Some(mut state) = self.loops.remove(&id) else {
            return Ok(());
        };
        let path_moved = state.array_path != array_path;
        state.array_path = array_path;
        let placed = self.place_items(&mut state, items, path_moved);
        self.loops.insert(id, state);
        let placed = placed?;

        self.prune_detached();

        let changed = self.bindings_within(&placed.changed);
        self.apply_all(&changed, true)?;

        for (key, nodes) in placed.fresh {
            let item = ItemRef { loop_id: id, key };
            let ids = self.compile_item(&nodes, &item);
            self.apply_all(&ids, false)?;
        }

        if let Some((node, selection)) = focus {
            self.restore_focus(node, selection);
        }
        Ok(())
    }

    fn place_items(
        &mut self,
        state: &mut LoopState,
        items: Vec<Value>,
        path_moved: bool,
    ) -> HydrateResult<Placement> {
        let keys = item_keys(&items);
        let previous: Vec<ItemKey> = state.items.iter().map(|i| i.key.clone()).collect();
        let diff = diff_keys(&previous, &keys);

        let mut old: HashMap<ItemKey, LoopItem> = state
            .items
            .drain(..)
            .map(|item| (item.key.clone(), item))
            .collect();
        let tree = self.document.tree_mut();
        for key in &diff.delete {
            if let Some(item) = old.remove(key) {
                for node in item.nodes {
                    tree.detach(node)?;
                }
            }
        }

        let mut placement = Placement {
            changed: Vec::new(),
            fresh: Vec::new(),
        };
        for (index, (key, value)) in keys.into_iter().zip(items).enumerate() {
            match old.remove(&key) {
                Some(mut entry) => {
                    if path_moved || entry.index != index || entry.item != value {
                        placement.changed.extend(entry.nodes.iter().copied());
                    }
                    entry.index = index;
                    entry.item = value;
                    state.items.push(entry);
                }
                None => {
                    let children: Vec<NodeId> = tree.children(state.template).collect();
                    let nodes = children
                        .into_iter()
                        .map(|child| tree.deep_clone(child))
                        .collect::<Result<Vec<_>, _>>()?;
                    placement.fresh.push((key.clone(), nodes.clone()));
                    state.items.push(LoopItem {
                        key,
                        index,
                        item: value,
                        nodes,
                    });
                }
            }
        }
        for stale in old.into_values() {
            for node in stale.nodes {
                tree.detach(node)?;
            }
        }

        let mut cursor = state.marker;
        for node in state.items.iter().flat_map(|item| item.nodes.iter().copied()) {
            if tree.next_sibling(cursor) != Some(node) {
                tree.insert_after(cursor, node)?;
            }
            cursor = node;
        }

        tracing::debug!(
            "rendered {} items: {} inserted, {} moved, {} deleted",
            state.items.len(),
            diff.insert.len(),
            diff.update.len(),
            diff.delete.len()
        );
        Ok(placement)
    }

    /// Apply bindings; `rescope` recomputes their dependencies afterwards
    fn apply_all(&mut self, ids: &[BindingId], rescope: bool) -> HydrateResult<()> {
        for &id in ids {
            self.rendered.push(id);
            if let Err(err) = self.apply_binding(id) {
                if err.is_fatal() {
                    return Err(err);
                }
                tracing::warn!("binding {} failed: {}", id.index(), err);
            }
            if rescope {
                self.refresh_deps(id);
            }
        }
        Ok(())
    }

    /// Focused node inside one of the loop's items, with its caret
    fn focused_item_node(&self, id: LoopId) -> Option<(NodeId, Option<Selection>)> {
        let active = self.document.active_element()?;
        let tree = self.document.tree();
        let state = self.loops.get(&id)?;
        state
            .items
            .iter()
            .flat_map(|item| item.nodes.iter())
            .any(|&root| tree.contains(root, active))
            .then(|| (active, self.document.selection(active)))
    }

    fn restore_focus(&mut self, node: NodeId, selection: Option<Selection>) {
        if !self.document.tree().is_connected(node) {
            self.document.blur();
            return;
        }
        if !self.document.is_focused(node) {
            self.document.focus(node);
        }
        if let Some(selection) = selection {
            if let Err(err) = self.document.set_selection(node, selection) {
                tracing::debug!("caret not restored: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use fos_dom::Selector;
    use fos_reactive::Path;

    use super::*;
    use crate::{RuntimeConfig, hydrate_document};

    fn hydrated(markup: &str) -> Page {
        let page = RefCell::new(Page::from_html(markup, RuntimeConfig::default()));
        smol::block_on(hydrate_document(&page)).unwrap();
        page.into_inner()
    }

    fn items(ids: &[f64]) -> Value {
        Value::Array(
            ids.iter()
                .map(|&id| {
                    Value::object([
                        ("id", Value::from(id)),
                        ("title", Value::from(format!("t{id}"))),
                    ])
                })
                .collect(),
        )
    }

    fn rows(page: &Page) -> Vec<NodeId> {
        Selector::parse("li")
            .map(|s| s.query_all(page.document.tree(), page.document.root()))
            .unwrap_or_default()
    }

    fn texts(page: &Page) -> Vec<String> {
        rows(page)
            .into_iter()
            .map(|li| page.document.tree().text_content(li))
            .collect()
    }

    const LIST: &str = r#"<body><ul pp-init-state='{"todos": []}'><template pp-for="todo in todos"><li>{{ todo.title }}</li></template></ul></body>"#;

    #[test]
    fn test_keyed_reorder_keeps_nodes() {
        let mut page = hydrated(LIST);
        let todos = Path::parse("app.todos");
        page.reactive.store.write(&todos, items(&[1.0, 2.0, 3.0])).unwrap();
        page.flush_all().unwrap();
        assert_eq!(texts(&page), ["t1", "t2", "t3"]);
        let before = rows(&page);

        page.reactive.store.write(&todos, items(&[3.0, 1.0, 4.0])).unwrap();
        page.flush_all().unwrap();
        assert_eq!(texts(&page), ["t3", "t1", "t4"]);
        let after = rows(&page);
        assert_eq!(after[0], before[2]);
        assert_eq!(after[1], before[0]);
        assert!(!page.document.tree().is_connected(before[1]));
    }

    #[test]
    fn test_item_field_write_updates_row() {
        let mut page = hydrated(LIST);
        let todos = Path::parse("app.todos");
        page.reactive.store.write(&todos, items(&[1.0, 2.0])).unwrap();
        page.flush_all().unwrap();
        let before = rows(&page);

        page.reactive
            .store
            .write(&Path::parse("app.todos.1.title"), Value::from("renamed"))
            .unwrap();
        page.flush_all().unwrap();
        assert_eq!(texts(&page), ["t1", "renamed"]);
        assert_eq!(rows(&page), before);
    }

    #[test]
    fn test_item_field_write_applies_each_binding_once() {
        let mut page = hydrated(LIST);
        let todos = Path::parse("app.todos");
        page.reactive.store.write(&todos, items(&[1.0, 2.0])).unwrap();
        page.flush_all().unwrap();

        page.reactive
            .store
            .write(&Path::parse("app.todos.0.title"), Value::from("first"))
            .unwrap();
        let stats = page.flush().unwrap();
        assert_eq!(texts(&page), ["first", "t2"]);
        // the loop re-render already refreshed the row text
        assert_eq!(stats.bindings_updated, 1);
        assert!(page.rendered.is_empty());
    }

    #[test]
    fn test_focus_survives_rerender() {
        let mut page = hydrated(
            r#"<body><div pp-init-state='{"rows": []}'><template pp-for="row in rows"><input value="{{ row.title }}"></template></div></body>"#,
        );
        let path = Path::parse("app.rows");
        page.reactive.store.write(&path, items(&[1.0, 2.0])).unwrap();
        page.flush_all().unwrap();

        let inputs = Selector::parse("input")
            .map(|s| s.query_all(page.document.tree(), page.document.root()))
            .unwrap_or_default();
        let second = inputs[1];
        page.document.focus(second);
        page.document.set_selection(second, Selection::caret(1)).unwrap();

        page.reactive.store.write(&path, items(&[2.0, 1.0, 5.0])).unwrap();
        page.flush_all().unwrap();
        assert!(page.document.is_focused(second));
        assert_eq!(page.document.selection(second), Some(Selection::caret(1)));
        assert_eq!(page.document.value(second), "t2");
    }

    #[test]
    fn test_nested_loop_and_conditional_in_item() {
        let mut page = hydrated(
            r#"<body pp-init-state='{"groups": [{"id": "a", "tags": ["x", "y"], "open": true}, {"id": "b", "tags": ["z"], "open": false}]}'>
            <template pp-for="(group, i) in groups"><section><h2 pp-if="group.open">{{ i }}:{{ group.id }}</h2>
            <template pp-for="tag in group.tags"><li>{{ group.id }}/{{ tag }}</li></template></section></template></body>"#,
        );
        assert_eq!(texts(&page), ["a/x", "a/y", "b/z"]);
        let headings = Selector::parse("h2")
            .map(|s| s.query_all(page.document.tree(), page.document.root()))
            .unwrap_or_default();
        assert_eq!(headings.len(), 2);
        assert!(!page.document.is_hidden(headings[0]));
        assert!(page.document.is_hidden(headings[1]));
        assert_eq!(page.document.tree().text_content(headings[0]), "0:a");

        page.reactive
            .store
            .write(&Path::parse("app.groups.1.open"), Value::Bool(true))
            .unwrap();
        page.flush_all().unwrap();
        assert!(!page.document.is_hidden(headings[1]));
    }

    #[test]
    fn test_non_array_source_renders_nothing() {
        let page = hydrated(
            r#"<body pp-init-state='{"n": 5}'><template pp-for="x in n"><li>{{ x }}</li></template></body>"#,
        );
        assert!(rows(&page).is_empty());
    }
}
