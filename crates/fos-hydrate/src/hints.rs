//! Presentation hints
//!
//! `visibility` and `display` hide or reveal an element on a timer, either
//! after a plain duration or through a `{"start": …, "end": …}` window.
//! `autofocus` moves focus to the marked element, preferring one inside an
//! open dialog, and places the caret from `{"start"|"end"|"length"}`.
//! `append-params` mirrors an input into the location query, and with
//! `append-params-sync` fills it back from the query on hydration.

use std::time::{Duration, Instant};

use fos_dom::{NodeId, Selection};
use url::Url;

use crate::Page;
use crate::directive::{json_object, parse_duration};

/// Inline style property driven by a hint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleHint {
    Visibility,
    Display,
}

impl StyleHint {
    pub fn property(self) -> &'static str {
        match self {
            StyleHint::Visibility => "visibility",
            StyleHint::Display => "display",
        }
    }

    pub fn hidden(self) -> &'static str {
        match self {
            StyleHint::Visibility => "hidden",
            StyleHint::Display => "none",
        }
    }

    pub fn shown(self) -> &'static str {
        match self {
            StyleHint::Visibility => "visible",
            StyleHint::Display => "block",
        }
    }
}

/// A style write waiting for its time
#[derive(Debug, Clone, PartialEq)]
pub struct StyleChange {
    pub node: NodeId,
    pub hint: StyleHint,
    pub value: &'static str,
    pub due: Instant,
}

/// Duration field of a hint object: a duration string or milliseconds
pub(crate) fn duration_field(
    config: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<Duration> {
    match config.get(key)? {
        serde_json::Value::String(s) => parse_duration(s),
        serde_json::Value::Number(n) => n.as_u64().map(Duration::from_millis),
        _ => None,
    }
}

/// Parse one hint value. Returns the style to apply now and the changes
/// to schedule, relative to `now`.
pub fn plan_style_hint(
    node: NodeId,
    hint: StyleHint,
    raw: &str,
    now: Instant,
) -> (Option<&'static str>, Vec<StyleChange>) {
    let change = |value, after: Duration| StyleChange {
        node,
        hint,
        value,
        due: now + after,
    };
    let Some(config) = json_object(raw) else {
        return match parse_duration(raw).filter(|d| !d.is_zero()) {
            Some(after) => (None, vec![change(hint.hidden(), after)]),
            None => (None, Vec::new()),
        };
    };
    let start = duration_field(&config, "start").unwrap_or_default();
    let end = duration_field(&config, "end").unwrap_or_default();
    match (start.is_zero(), end.is_zero()) {
        (false, false) => (
            Some(hint.hidden()),
            vec![change(hint.shown(), start), change(hint.hidden(), start + end)],
        ),
        (false, true) => (Some(hint.hidden()), vec![change(hint.shown(), start)]),
        (true, false) => (None, vec![change(hint.hidden(), end)]),
        (true, true) => (None, Vec::new()),
    }
}

/// Caret placement requested by an autofocus hint
fn autofocus_caret(config: &serde_json::Map<String, serde_json::Value>, value: &str) -> Option<usize> {
    let flag = |key: &str| config.get(key).is_some_and(|v| v.as_bool().unwrap_or(!v.is_null()));
    if flag("start") {
        return Some(0);
    }
    if flag("end") {
        return Some(value.chars().count());
    }
    match config.get("length")? {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        serde_json::Value::String(s) => Some(s.trim().parse().unwrap_or(0)),
        _ => None,
    }
}

impl Page {
    /// Apply the immediate part of every style hint under `nodes` and queue
    /// the rest
    pub(crate) fn schedule_style_hints(&mut self, nodes: &[NodeId]) -> usize {
        let now = Instant::now();
        let mut scheduled = 0;
        for &node in nodes {
            for hint in [StyleHint::Visibility, StyleHint::Display] {
                let attr = match hint {
                    StyleHint::Visibility => &self.names.visibility,
                    StyleHint::Display => &self.names.display,
                };
                let Some(raw) = self.document.tree().attr(node, attr).map(str::to_string) else {
                    continue;
                };
                let (initial, changes) = plan_style_hint(node, hint, &raw, now);
                if initial.is_none() && changes.is_empty() {
                    tracing::warn!("ignoring {} hint {:?}", hint.property(), raw);
                    continue;
                }
                if let Some(value) = initial {
                    if let Err(err) = self.document.set_style_property(node, hint.property(), value) {
                        tracing::warn!("{} hint not applied: {}", hint.property(), err);
                    }
                }
                scheduled += changes.len();
                self.style_timers.extend(changes);
            }
        }
        scheduled
    }

    /// Earliest pending style change
    pub fn next_style_due(&self) -> Option<Instant> {
        self.style_timers.iter().map(|c| c.due).min()
    }

    pub fn pending_style_changes(&self) -> usize {
        self.style_timers.len()
    }

    /// Apply every queued style change due at `now`, in due order. Changes
    /// for nodes that left the document are dropped.
    pub fn apply_due_styles(&mut self, now: Instant) -> usize {
        let (mut due, rest): (Vec<StyleChange>, Vec<StyleChange>) =
            self.style_timers.drain(..).partition(|c| c.due <= now);
        self.style_timers = rest;
        due.sort_by_key(|c| c.due);
        let mut applied = 0;
        for change in due {
            if !self.document.tree().is_connected(change.node) {
                continue;
            }
            match self
                .document
                .set_style_property(change.node, change.hint.property(), change.value)
            {
                Ok(_) => applied += 1,
                Err(err) => tracing::debug!("style change dropped: {}", err),
            }
        }
        applied
    }

    /// Focus the element marked for autofocus. One inside an open dialog
    /// wins over the first in the document. Returns the focused node.
    pub fn apply_autofocus(&mut self) -> Option<NodeId> {
        let attr = self.names.autofocus.clone();
        let tree = self.document.tree();
        let root = self.document.root();
        let marked = |scope: NodeId| {
            tree.descendants(scope)
                .into_iter()
                .find(|&n| tree.has_attr(n, &attr))
        };
        let in_dialog = tree
            .descendants(root)
            .into_iter()
            .filter(|&n| tree.is_tag(n, "dialog") && self.document.open(n))
            .find_map(&marked);
        let node = in_dialog.or_else(|| marked(root))?;
        let config = json_object(tree.attr(node, &attr).unwrap_or_default())?;

        self.document.focus(node);
        let is_text_control =
            self.document.tree().is_tag(node, "input") || self.document.tree().is_tag(node, "textarea");
        if is_text_control {
            if let Some(caret) = autofocus_caret(&config, &self.document.value(node)) {
                if let Err(err) = self.document.set_selection(node, Selection::caret(caret)) {
                    tracing::debug!("autofocus caret not placed: {}", err);
                }
            }
        }
        tracing::debug!("autofocus on node {}", node.index());
        Some(node)
    }
}

impl Page {
    /// Query key of an `append-params` input with a handler
    fn param_key(&self, node: NodeId, synced: bool) -> Option<String> {
        let tree = self.document.tree();
        let on = |attr: &str| tree.attr(node, attr) == Some("true");
        if !tree.is_tag(node, "input") || !on(self.names.append_params.as_str()) {
            return None;
        }
        if synced && !on(self.names.append_params_sync.as_str()) {
            return None;
        }
        if !self.handlers.contains_key(&node) {
            return None;
        }
        let named = |attr| tree.attr(node, attr).filter(|v| !v.is_empty());
        named("name").or_else(|| named("id")).map(str::to_string)
    }

    /// Fill synced `append-params` inputs under `nodes` from the document
    /// URL query
    pub(crate) fn fill_params_from_url(&mut self, nodes: &[NodeId]) -> usize {
        let Ok(url) = Url::parse(self.document.url()) else {
            return 0;
        };
        let mut filled = 0;
        for &node in nodes {
            let Some(key) = self.param_key(node, true) else {
                continue;
            };
            let Some((_, value)) = url.query_pairs().find(|(k, _)| *k == key) else {
                continue;
            };
            match self.document.set_value(node, &value) {
                Ok(_) => filled += 1,
                Err(err) => tracing::debug!("query value not applied to {}: {}", key, err),
            }
        }
        filled
    }

    /// Location after the `append-params` input `node` changed. An empty
    /// value removes its key. `None` when `node` does not mirror the query.
    pub fn params_location(&self, node: NodeId) -> Option<Url> {
        let key = self.param_key(node, false)?;
        let value = self.document.value(node);
        let mut url = Url::parse(self.document.url()).ok()?;

        let mut pairs = Vec::new();
        let mut placed = false;
        for (k, v) in url.query_pairs().into_owned() {
            if k != key {
                pairs.push((k, v));
                continue;
            }
            if !placed && !value.is_empty() {
                pairs.push((k, value.clone()));
            }
            placed = true;
        }
        if !placed && !value.is_empty() {
            pairs.push((key, value));
        }

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(&pairs);
        }
        url.set_fragment(None);
        Some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;
    use fos_dom::Selector;

    fn find(page: &Page, selector: &str) -> NodeId {
        Selector::parse(selector)
            .and_then(|s| s.query(page.document.tree(), page.document.root()))
            .unwrap()
    }

    #[test]
    fn test_plain_duration_hides_later() {
        let now = Instant::now();
        let (initial, changes) = plan_style_hint(NodeId::ROOT, StyleHint::Display, "2s", now);
        assert_eq!(initial, None);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].value, "none");
        assert_eq!(changes[0].due, now + Duration::from_secs(2));
    }

    #[test]
    fn test_window_hides_shows_hides() {
        let now = Instant::now();
        let (initial, changes) = plan_style_hint(
            NodeId::ROOT,
            StyleHint::Visibility,
            r#"{"start": "100ms", "end": "1s"}"#,
            now,
        );
        assert_eq!(initial, Some("hidden"));
        let values: Vec<_> = changes.iter().map(|c| (c.value, c.due - now)).collect();
        assert_eq!(
            values,
            vec![
                ("visible", Duration::from_millis(100)),
                ("hidden", Duration::from_millis(1100))
            ]
        );

        let (initial, changes) = plan_style_hint(NodeId::ROOT, StyleHint::Visibility, "soon", now);
        assert!(initial.is_none() && changes.is_empty());
    }

    #[test]
    fn test_due_styles_apply_in_order() {
        let mut page = Page::from_html(
            r#"<body><p id="toast" pp-display='{"start": "1s", "end": "2s"}'>saved</p></body>"#,
            RuntimeConfig::default(),
        );
        let toast = find(&page, "#toast");
        let root = page.document.root();
        let nodes = page.names.live_nodes(page.document.tree(), root);
        assert_eq!(page.schedule_style_hints(&nodes), 2);
        assert_eq!(page.document.style_property(toast, "display").as_deref(), Some("none"));

        let later = Instant::now() + Duration::from_millis(1500);
        assert_eq!(page.apply_due_styles(later), 1);
        assert_eq!(page.document.style_property(toast, "display").as_deref(), Some("block"));
        assert_eq!(page.pending_style_changes(), 1);

        let end = Instant::now() + Duration::from_secs(10);
        assert_eq!(page.apply_due_styles(end), 1);
        assert_eq!(page.document.style_property(toast, "display").as_deref(), Some("none"));
        assert_eq!(page.next_style_due(), None);
    }

    #[test]
    fn test_autofocus_prefers_open_dialog() {
        let mut page = Page::from_html(
            r#"<body><input id="page" pp-autofocus="{}"><dialog open><input id="dlg" value="hello" pp-autofocus='{"end": true}'></dialog></body>"#,
            RuntimeConfig::default(),
        );
        let dialog_input = find(&page, "#dlg");
        assert_eq!(page.apply_autofocus(), Some(dialog_input));
        assert!(page.document.is_focused(dialog_input));
        assert_eq!(page.document.selection(dialog_input), Some(Selection::caret(5)));
    }

    #[test]
    fn test_autofocus_needs_json_config() {
        let mut page = Page::from_html(
            r#"<body><textarea id="t" pp-autofocus='{"length": 2}'>abcdef</textarea></body>"#,
            RuntimeConfig::default(),
        );
        let area = find(&page, "#t");
        assert_eq!(page.apply_autofocus(), Some(area));
        assert_eq!(page.document.selection(area), Some(Selection::caret(2)));

        let mut plain = Page::from_html(
            r#"<body><input pp-autofocus></body>"#,
            RuntimeConfig::default(),
        );
        assert_eq!(plain.apply_autofocus(), None);
        assert_eq!(plain.document.active_element(), None);
    }

    #[test]
    fn test_params_location_tracks_input() {
        let mut page = Page::from_html(
            r#"<body pp-init-state='{"q": ""}'><input id="q" name="search" pp-append-params="true" oninput="setQ(event.target.value)"><input id="plain" oninput="setQ(1)"></body>"#,
            RuntimeConfig::default(),
        );
        page.document.set_url("http://site.test/list?page=2&search=old#top");
        let root = page.document.root();
        let nodes = page.names.live_nodes(page.document.tree(), root);
        page.wire_handlers(&nodes, None);
        let input = find(&page, "#q");

        page.document.set_value(input, "rust lang").unwrap();
        let url = page.params_location(input).unwrap();
        assert_eq!(url.as_str(), "http://site.test/list?page=2&search=rust+lang");

        page.document.set_value(input, "").unwrap();
        let url = page.params_location(input).unwrap();
        assert_eq!(url.query(), Some("page=2"));

        assert!(page.params_location(find(&page, "#plain")).is_none());
    }

    #[test]
    fn test_synced_input_reads_query() {
        let mut page = Page::from_html(
            r#"<body><input id="q" pp-append-params="true" pp-append-params-sync="true" oninput="go"><input id="other" name="q" pp-append-params="true" oninput="go"></body>"#,
            RuntimeConfig::default(),
        );
        page.document.set_url("http://site.test/list?q=shoes");
        let root = page.document.root();
        let nodes = page.names.live_nodes(page.document.tree(), root);
        page.wire_handlers(&nodes, None);
        assert_eq!(page.fill_params_from_url(&nodes), 1);
        assert_eq!(page.document.value(find(&page, "#q")), "shoes");
        assert_eq!(page.document.value(find(&page, "#other")), "");
    }
}
