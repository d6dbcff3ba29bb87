//! Suspense hints
//!
//! While a server callback is in flight, elements marked `suspense` show
//! a pending form: plain text replaces their text (or an input's value), a
//! JSON object is applied as patch operations. On a form, `"disabled": true`
//! disables every control, and `targets` patches other elements by
//! selector. Everything touched is saved first and put back by
//! [`Suspense::restore`]. Original children are re-attached, so bindings on
//! them stay live.

use fos_dom::{Document, NodeId, Selector};
use serde_json::Value as Json;

use crate::directive::json_object;
use crate::runtime::apply_patch;
use crate::{HydrateResult, Page};

const FORM_CONTROLS: &[&str] = &["input", "button", "select", "textarea"];

#[derive(Debug)]
struct SavedElement {
    node: NodeId,
    attrs: Vec<(String, String)>,
    children: Vec<NodeId>,
    value: Option<String>,
}

impl SavedElement {
    fn capture(document: &Document, node: NodeId) -> Option<Self> {
        let tree = document.tree();
        let element = tree.element(node)?;
        let is_control = ["input", "textarea", "select"]
            .iter()
            .any(|tag| element.is(tag));
        Some(Self {
            node,
            attrs: element
                .attrs
                .iter()
                .map(|a| (a.name.clone(), a.value.clone()))
                .collect(),
            children: tree.children(node).collect(),
            value: is_control.then(|| document.value(node)),
        })
    }

    fn restore(self, document: &mut Document) -> HydrateResult<()> {
        if !document.tree().is_connected(self.node) {
            return Ok(());
        }
        let tree = document.tree_mut();
        let current: Vec<String> = tree
            .element(self.node)
            .map(|e| e.attrs.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default();
        for name in current.iter().filter(|n| !self.attrs.iter().any(|(k, _)| k == *n)) {
            tree.remove_attr(self.node, name)?;
        }
        for (name, value) in &self.attrs {
            tree.set_attr(self.node, name, value)?;
        }
        let unchanged = tree.children(self.node).eq(self.children.iter().copied());
        if !unchanged {
            tree.clear_children(self.node)?;
            for child in self.children {
                tree.detach(child)?;
                tree.append_child(self.node, child)?;
            }
        }
        if let Some(value) = self.value {
            document.set_value(self.node, &value)?;
        }
        Ok(())
    }
}

/// Saved state of everything a suspense hint changed
#[derive(Debug, Default)]
pub struct Suspense {
    saved: Vec<SavedElement>,
}

impl Suspense {
    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    pub fn len(&self) -> usize {
        self.saved.len()
    }

    fn save(&mut self, document: &Document, node: NodeId) {
        if self.saved.iter().any(|s| s.node == node) {
            return;
        }
        if let Some(saved) = SavedElement::capture(document, node) {
            self.saved.push(saved);
        }
    }

    /// Put every saved element back, latest change first
    pub fn restore(self, page: &mut Page) -> HydrateResult<()> {
        let count = self.saved.len();
        for saved in self.saved.into_iter().rev() {
            saved.restore(&mut page.document)?;
        }
        if count > 0 {
            tracing::debug!("restored {} suspended elements", count);
        }
        Ok(())
    }
}

impl Page {
    /// Apply the suspense hints of `origin` and its descendants
    pub fn suspend(&mut self, origin: NodeId) -> Suspense {
        let attr = self.names.suspense.clone();
        let mut suspense = Suspense::default();
        let tree = self.document.tree();
        let marked: Vec<NodeId> = std::iter::once(origin)
            .chain(tree.descendants(origin))
            .filter(|&n| tree.has_attr(n, &attr))
            .collect();
        for node in marked {
            let Some(raw) = self.document.tree().attr(node, &attr).map(str::to_string) else {
                continue;
            };
            if let Err(err) = self.apply_suspense(&mut suspense, node, &raw) {
                tracing::warn!("suspense hint not applied: {}", err);
            }
        }
        suspense
    }

    fn apply_suspense(&mut self, suspense: &mut Suspense, node: NodeId, raw: &str) -> HydrateResult<()> {
        let Some(mut config) = json_object(raw) else {
            if raw.trim().is_empty() {
                return Ok(());
            }
            suspense.save(&self.document, node);
            if self.document.tree().is_tag(node, "input") {
                self.document.set_value(node, raw)?;
            } else {
                self.document.tree_mut().set_text_content(node, raw)?;
            }
            return Ok(());
        };

        if config.get("empty").and_then(Json::as_str) == Some("disabled")
            && self.document.value(node).is_empty()
        {
            return Ok(());
        }
        config.remove("empty");

        if self.document.tree().is_tag(node, "form") {
            let disable = config.remove("disabled").is_some_and(|v| v.as_bool() == Some(true));
            if disable {
                let controls: Vec<NodeId> = self
                    .document
                    .tree()
                    .descendants(node)
                    .into_iter()
                    .filter(|&c| FORM_CONTROLS.iter().any(|t| self.document.tree().is_tag(c, t)))
                    .collect();
                for control in controls {
                    suspense.save(&self.document, control);
                    self.document.set_boolean(control, "disabled", true)?;
                }
            }
        }

        if let Some(Json::Array(targets)) = config.remove("targets") {
            for target in &targets {
                let Some(fields) = target.as_object() else {
                    continue;
                };
                let Some(selector) = fields.get("id").and_then(Json::as_str) else {
                    continue;
                };
                let found = Selector::parse(selector)
                    .and_then(|s| s.query(self.document.tree(), self.document.root()));
                let Some(found) = found else {
                    tracing::debug!("no element matches suspense target {}", selector);
                    continue;
                };
                suspense.save(&self.document, found);
                for (op, value) in fields.iter().filter(|(k, _)| k.as_str() != "id") {
                    apply_patch(&mut self.document, found, op, value)?;
                }
            }
        }

        if !config.is_empty() {
            suspense.save(&self.document, node);
            for (op, value) in &config {
                apply_patch(&mut self.document, node, op, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;

    fn find(page: &Page, selector: &str) -> NodeId {
        Selector::parse(selector)
            .and_then(|s| s.query(page.document.tree(), page.document.root()))
            .unwrap()
    }

    #[test]
    fn test_text_hint_and_restore() {
        let mut page = Page::from_html(
            r#"<body><button id="b" pp-suspense="Saving..."><b>Save</b></button></body>"#,
            RuntimeConfig::default(),
        );
        let button = find(&page, "#b");
        let label = find(&page, "b");
        let suspense = page.suspend(button);
        assert_eq!(suspense.len(), 1);
        assert_eq!(page.document.tree().text_content(button), "Saving...");
        assert!(!page.document.tree().is_connected(label));

        suspense.restore(&mut page).unwrap();
        assert_eq!(page.document.tree().text_content(button), "Save");
        assert_eq!(find(&page, "b"), label);
    }

    #[test]
    fn test_form_disables_controls() {
        let mut page = Page::from_html(
            r#"<body><form id="f" pp-suspense='{"disabled": true, "class": "busy"}'>
            <input name="q" value="x"><button id="go" disabled>go</button><select name="s"><option>a</option></select></form></body>"#,
            RuntimeConfig::default(),
        );
        let form = find(&page, "#f");
        let input = find(&page, "input");
        let go = find(&page, "#go");
        let suspense = page.suspend(form);
        assert!(page.document.tree().has_attr(input, "disabled"));
        assert!(page.document.tree().has_attr(find(&page, "select"), "disabled"));
        assert_eq!(page.document.tree().attr(form, "class"), Some("busy"));

        suspense.restore(&mut page).unwrap();
        assert!(!page.document.tree().has_attr(input, "disabled"));
        assert!(page.document.tree().has_attr(go, "disabled"));
        assert!(!page.document.tree().has_attr(form, "class"));
        assert_eq!(page.document.value(input), "x");
    }

    #[test]
    fn test_targets_and_empty_guard() {
        let mut page = Page::from_html(
            r##"<body><p id="status">idle</p>
            <button id="b" pp-suspense='{"targets": [{"id": "#status", "textContent": "working"}]}'>go</button>
            <input id="q" pp-suspense='{"empty": "disabled", "disabled": true}'></body>"##,
            RuntimeConfig::default(),
        );
        let suspense = page.suspend(find(&page, "#b"));
        assert_eq!(page.document.tree().text_content(find(&page, "#status")), "working");
        suspense.restore(&mut page).unwrap();
        assert_eq!(page.document.tree().text_content(find(&page, "#status")), "idle");

        let input = find(&page, "#q");
        assert!(page.suspend(input).is_empty());
        assert!(!page.document.tree().has_attr(input, "disabled"));
    }
}
