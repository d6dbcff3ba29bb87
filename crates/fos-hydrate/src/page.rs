//! Page - the runtime context of one document
//!
//! Owns the document, the reactive context and everything compiled from
//! the directives: bindings, loop render states, handlers and refs.
//! Nothing here is global; a page can be reset or dropped as a whole.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use fos_dom::{Document, NodeId, is_boolean_attribute};
use fos_reactive::expr::{Expression, Program, RemoteCall};
use fos_reactive::{
    BindingId, BindingKind, BindingTable, FlushPass, FlushStats, Hierarchy, Local, Path, Reactive,
    ReactiveError, Scope, Value, WILDCARD,
};

use crate::directive::{DirectiveNames, Handler, ItemKey, LoopSpec, Template};
use crate::hints::StyleChange;
use crate::{HydrateResult, HydrationPhase, RuntimeConfig};

/// Loop render state identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(pub(crate) u32);

/// One rendered item of a loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub loop_id: LoopId,
    pub key: ItemKey,
}

/// Where an expression is evaluated: the owning component and, inside a
/// loop, the item whose locals shadow it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeRef {
    pub hierarchy: Hierarchy,
    pub item: Option<ItemRef>,
}

impl ScopeRef {
    pub fn new(hierarchy: Hierarchy, item: Option<ItemRef>) -> Self {
        Self { hierarchy, item }
    }
}

/// When a conditional branch shows
#[derive(Debug, Clone)]
pub enum Condition {
    When(Expression),
    /// `else`
    Otherwise,
    /// Test that failed to compile; never shows
    Invalid,
}

#[derive(Debug, Clone)]
pub struct Branch {
    pub node: NodeId,
    pub condition: Condition,
}

/// DOM write performed by a binding
#[derive(Debug, Clone)]
pub enum Updater {
    Text {
        node: NodeId,
        template: Rc<Template>,
        scope: ScopeRef,
    },
    Attribute {
        node: NodeId,
        name: String,
        template: Rc<Template>,
        scope: ScopeRef,
    },
    /// `pp-bind`: text content
    Content {
        node: NodeId,
        expr: Expression,
        scope: ScopeRef,
    },
    /// `pp-bind-<attr>` and auto-bound boolean attributes
    Property {
        node: NodeId,
        name: String,
        expr: Expression,
        scope: ScopeRef,
    },
    Spread {
        node: NodeId,
        expr: Expression,
        scope: ScopeRef,
    },
    Conditional {
        branches: Rc<[Branch]>,
        scope: ScopeRef,
    },
    Loop {
        id: LoopId,
        marker: NodeId,
    },
}

impl Updater {
    /// Node whose removal ends the binding
    pub fn owner(&self) -> NodeId {
        match self {
            Updater::Text { node, .. }
            | Updater::Attribute { node, .. }
            | Updater::Content { node, .. }
            | Updater::Property { node, .. }
            | Updater::Spread { node, .. } => *node,
            Updater::Conditional { branches, .. } => {
                branches.first().map(|b| b.node).unwrap_or(NodeId::NONE)
            }
            Updater::Loop { marker, .. } => *marker,
        }
    }

    pub fn kind(&self) -> BindingKind {
        match self {
            Updater::Text { .. } | Updater::Content { .. } => BindingKind::Text,
            Updater::Attribute { .. } | Updater::Property { .. } | Updater::Spread { .. } => {
                BindingKind::Attribute
            }
            Updater::Conditional { .. } => BindingKind::Conditional,
            Updater::Loop { .. } => BindingKind::Loop,
        }
    }
}

#[derive(Debug)]
pub(crate) struct LoopItem {
    pub key: ItemKey,
    pub index: usize,
    pub item: Value,
    pub nodes: Vec<NodeId>,
}

#[derive(Debug)]
pub(crate) struct LoopState {
    pub marker: NodeId,
    /// Detached `<template>` whose children are cloned per item
    pub template: NodeId,
    pub spec: LoopSpec,
    pub scope: ScopeRef,
    /// Store path of the iterated array, when it is one
    pub array_path: Option<Path>,
    /// `item.<field>` names read by the template
    pub fields: BTreeSet<String>,
    pub items: Vec<LoopItem>,
}

/// Event delivered to handlers
#[derive(Debug, Clone, PartialEq)]
pub struct DomEvent {
    pub kind: String,
    pub target: NodeId,
}

impl DomEvent {
    pub fn new(kind: &str, target: NodeId) -> Self {
        Self {
            kind: kind.to_string(),
            target,
        }
    }
}

/// A hydrated document
#[derive(Debug)]
pub struct Page {
    pub document: Document,
    pub reactive: Reactive,
    pub(crate) bindings: BindingTable<Updater>,
    pub(crate) loops: BTreeMap<LoopId, LoopState>,
    pub(crate) next_loop: u32,
    pub(crate) handlers: HashMap<NodeId, Vec<Handler>>,
    pub(crate) refs: HashMap<(Hierarchy, String), NodeId>,
    pub(crate) spread: HashMap<NodeId, Vec<String>>,
    /// Bindings registered by the running hydration, applied at its end
    pub(crate) pending: Vec<BindingId>,
    /// Bindings a loop render applied while updating its items
    pub(crate) rendered: Vec<BindingId>,
    /// Queued `visibility` / `display` hint changes
    pub(crate) style_timers: Vec<StyleChange>,
    pub(crate) phase: HydrationPhase,
    pub(crate) names: DirectiveNames,
    config: RuntimeConfig,
}

impl Page {
    pub fn new(document: Document, config: RuntimeConfig) -> Self {
        Self {
            document,
            reactive: Reactive::new().with_guard(config.guard()),
            bindings: BindingTable::new(),
            loops: BTreeMap::new(),
            next_loop: 0,
            handlers: HashMap::new(),
            refs: HashMap::new(),
            spread: HashMap::new(),
            pending: Vec::new(),
            rendered: Vec::new(),
            style_timers: Vec::new(),
            phase: HydrationPhase::Pending,
            names: DirectiveNames::new(&config),
            config,
        }
    }

    /// Parse markup into a fresh page
    pub fn from_html(markup: &str, config: RuntimeConfig) -> Self {
        Self::new(fos_html::parse(markup), config)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn names(&self) -> &DirectiveNames {
        &self.names
    }

    pub fn phase(&self) -> HydrationPhase {
        self.phase
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn loop_count(&self) -> usize {
        self.loops.len()
    }

    /// Rendered nodes of every item of every loop, in item order
    pub fn loop_items(&self) -> Vec<(ItemKey, Vec<NodeId>)> {
        self.loops
            .values()
            .flat_map(|l| l.items.iter().map(|i| (i.key.clone(), i.nodes.clone())))
            .collect()
    }

    /// Node registered with `pp-ref="name"`, looked up from `hierarchy`
    /// outward
    pub fn ref_node(&self, hierarchy: &Hierarchy, name: &str) -> Option<NodeId> {
        hierarchy
            .levels()
            .find_map(|level| self.refs.get(&(level, name.to_string())).copied())
            .filter(|&node| self.document.tree().is_connected(node))
    }

    /// Drop compiled bindings, loops, handlers, refs and effects but keep
    /// state
    pub fn rebind(&mut self) {
        self.bindings.clear();
        self.loops.clear();
        self.handlers.clear();
        self.refs.clear();
        self.spread.clear();
        self.pending.clear();
        self.rendered.clear();
        self.style_timers.clear();
        self.reactive.dispose_effects();
        self.phase = HydrationPhase::Pending;
    }

    /// Clear all reactive state
    pub fn reset(&mut self) {
        self.rebind();
        self.reactive.reset();
        tracing::debug!("page reset");
    }

    /// Remove the initial `hidden` flag from the body
    pub fn reveal(&mut self) {
        if let Some(body) = self.document.body() {
            if let Err(err) = self.document.set_hidden(body, false) {
                tracing::error!("failed to reveal document: {}", err);
            }
        }
    }

    // === Scopes ===

    /// Evaluation scope with loop locals bound outermost first
    pub fn scope_for(&self, scope: &ScopeRef) -> Scope {
        let mut out = Scope::new(scope.hierarchy.clone());
        if let Some(item) = &scope.item {
            self.bind_item(&mut out, item);
        }
        out
    }

    fn bind_item(&self, scope: &mut Scope, item: &ItemRef) {
        let Some(state) = self.loops.get(&item.loop_id) else {
            return;
        };
        if let Some(parent) = &state.scope.item {
            self.bind_item(scope, parent);
        }
        let Some(entry) = state.items.iter().find(|i| i.key == item.key) else {
            return;
        };
        let local = match &state.array_path {
            Some(array) => Local::Alias(array.child(entry.index.to_string())),
            None => Local::Value(entry.item.clone()),
        };
        scope.bind(state.spec.item.clone(), local);
        if let Some(index) = &state.spec.index {
            scope.bind(index.clone(), Local::Value(Value::from(entry.index as f64)));
        }
    }

    pub(crate) fn eval(&mut self, expr: &Expression, scope: &ScopeRef) -> Value {
        let scope = self.scope_for(scope);
        match self.reactive.eval(expr, &scope) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("evaluating `{}` failed: {}", expr.source(), err);
                Value::Undefined
            }
        }
    }

    // === Bindings ===

    pub(crate) fn register(&mut self, updater: Updater) -> BindingId {
        let deps = self.updater_deps(&updater);
        self.bindings.register(updater.kind(), deps, updater)
    }

    /// Scoped paths an updater reads
    pub(crate) fn updater_deps(&self, updater: &Updater) -> BTreeSet<Path> {
        match updater {
            Updater::Text {
                template, scope, ..
            }
            | Updater::Attribute {
                template, scope, ..
            } => template.dependencies(&self.reactive, &self.scope_for(scope)),
            Updater::Content { expr, scope, .. }
            | Updater::Property { expr, scope, .. }
            | Updater::Spread { expr, scope, .. } => {
                self.reactive.dependencies(expr, &self.scope_for(scope))
            }
            Updater::Conditional { branches, scope } => {
                let resolved = self.scope_for(scope);
                let mut deps: BTreeSet<Path> = branches
                    .iter()
                    .filter_map(|b| match &b.condition {
                        Condition::When(test) => Some(test),
                        _ => None,
                    })
                    .flat_map(|test| self.reactive.dependencies(test, &resolved))
                    .collect();
                if let Some(array) = scope
                    .item
                    .as_ref()
                    .and_then(|item| self.loops.get(&item.loop_id))
                    .and_then(|l| l.array_path.clone())
                {
                    deps.insert(array);
                }
                deps
            }
            Updater::Loop { id, .. } => {
                let Some(state) = self.loops.get(id) else {
                    return BTreeSet::new();
                };
                let mut deps = self
                    .reactive
                    .dependencies(&state.spec.source, &self.scope_for(&state.scope));
                if let Some(array) = &state.array_path {
                    let each = array.child(WILDCARD);
                    deps.insert(array.clone());
                    for field in &state.fields {
                        deps.insert(each.child(field.as_str()));
                    }
                    deps.insert(each);
                }
                deps
            }
        }
    }

    /// Recompute the dependencies of a binding after its scope moved
    pub(crate) fn refresh_deps(&mut self, id: BindingId) {
        let Some(updater) = self.bindings.get(id).map(|r| r.update.clone()) else {
            return;
        };
        let deps = self.updater_deps(&updater);
        if let Some(record) = self.bindings.get_mut(id) {
            record.deps = deps;
        }
    }

    /// Bindings owned by nodes inside `roots`
    pub(crate) fn bindings_within(&self, roots: &[NodeId]) -> Vec<BindingId> {
        let tree = self.document.tree();
        self.bindings
            .iter()
            .filter(|(_, record)| {
                let owner = record.update.owner();
                roots.iter().any(|&root| tree.contains(root, owner))
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// Run one binding against the current state
    pub fn apply_binding(&mut self, id: BindingId) -> HydrateResult<()> {
        let Some(update) = self.bindings.get(id).map(|r| r.update.clone()) else {
            return Ok(());
        };
        match update {
            Updater::Text {
                node,
                template,
                scope,
            } => {
                let scope = self.scope_for(&scope);
                let text = template.render(&mut self.reactive, &scope);
                self.document.tree_mut().set_text(node, &text)?;
            }
            Updater::Attribute {
                node,
                name,
                template,
                scope,
            } => {
                let scope = self.scope_for(&scope);
                let rendered = template.render(&mut self.reactive, &scope);
                self.write_attribute(node, &name, &rendered)?;
            }
            Updater::Content { node, expr, scope } => {
                let text = self.eval(&expr, &scope).to_text();
                if self.document.tree().text_content(node) != text {
                    self.document.tree_mut().set_text_content(node, &text)?;
                }
            }
            Updater::Property {
                node,
                name,
                expr,
                scope,
            } => {
                let value = self.eval(&expr, &scope);
                self.write_property(node, &name, &value)?;
            }
            Updater::Spread { node, expr, scope } => {
                let value = self.eval(&expr, &scope);
                self.write_spread(node, &value)?;
            }
            Updater::Conditional { branches, scope } => {
                let mut shown = None;
                for (i, branch) in branches.iter().enumerate() {
                    let pass = match &branch.condition {
                        Condition::When(test) => self.eval(test, &scope).is_truthy(),
                        Condition::Otherwise => true,
                        Condition::Invalid => false,
                    };
                    if pass {
                        shown = Some(i);
                        break;
                    }
                }
                for (i, branch) in branches.iter().enumerate() {
                    self.document.set_hidden(branch.node, shown != Some(i))?;
                }
            }
            Updater::Loop { id, .. } => self.render_loop(id)?,
        }
        Ok(())
    }

    /// Write a rendered attribute template; boolean attributes are present
    /// unless the text is empty or `false`
    fn write_attribute(&mut self, node: NodeId, name: &str, rendered: &str) -> HydrateResult<()> {
        if is_boolean_attribute(name) {
            let on = !(rendered.is_empty() || rendered == "false");
            self.document.set_boolean(node, name, on)?;
            return Ok(());
        }
        if name == "value" && self.document.value(node) != rendered {
            self.document.set_value(node, rendered)?;
        }
        self.document.tree_mut().set_attr(node, name, rendered)?;
        Ok(())
    }

    /// Write a bound value as property and attribute
    fn write_property(&mut self, node: NodeId, name: &str, value: &Value) -> HydrateResult<()> {
        if is_boolean_attribute(name) {
            self.document.set_boolean(node, name, value.is_truthy())?;
        } else if value.is_nullish() || *value == Value::Bool(false) {
            if name == "value" {
                self.document.set_value(node, "")?;
            }
            self.document.tree_mut().remove_attr(node, name)?;
        } else {
            self.write_attribute(node, name, &value.to_text())?;
        }
        Ok(())
    }

    fn write_spread(&mut self, node: NodeId, value: &Value) -> HydrateResult<()> {
        let fields: Vec<(String, Value)> = match value.as_object() {
            Some(map) => map
                .iter()
                .filter(|(k, _)| !k.starts_with("on"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => Vec::new(),
        };
        let previous = self.spread.remove(&node).unwrap_or_default();
        for stale in previous.iter().filter(|p| !fields.iter().any(|(k, _)| k == *p)) {
            self.document.tree_mut().remove_attr(node, stale)?;
        }
        for (name, v) in &fields {
            self.write_property(node, name, v)?;
        }
        self.spread
            .insert(node, fields.into_iter().map(|(k, _)| k).collect());
        Ok(())
    }

    /// Apply up to `limit` bindings registered by the running hydration;
    /// returns how many are left
    pub(crate) fn apply_pending(&mut self, limit: usize) -> HydrateResult<usize> {
        let take = limit.min(self.pending.len());
        let batch: Vec<BindingId> = self.pending.drain(..take).collect();
        for id in batch {
            if let Err(err) = self.apply_binding(id) {
                if err.is_fatal() {
                    return Err(err);
                }
                tracing::warn!("binding {} failed: {}", id.index(), err);
            }
        }
        Ok(self.pending.len())
    }

    /// One scheduler pass: due bindings once each, then effects
    pub fn flush(&mut self) -> HydrateResult<FlushStats> {
        let mut pass = FlushPass::begin(&mut self.reactive, &self.bindings);
        if pass.is_idle() {
            return Ok(FlushStats::default());
        }
        self.rendered.clear();
        while let Some(id) = pass.next_binding(&self.bindings) {
            let outcome = self.apply_binding(id);
            pass.mark_applied(self.rendered.drain(..));
            if let Err(err) = outcome {
                if err.is_fatal() {
                    return Err(err);
                }
                pass.report_error(id, &err);
            }
        }
        Ok(pass.finish(&mut self.reactive)?)
    }

    /// Flush until no writes are pending. A cycle that outlasts the effect
    /// budget is fatal, whether or not the run guard caught it.
    pub fn flush_all(&mut self) -> HydrateResult<FlushStats> {
        let mut total = FlushStats::default();
        let passes = self.config.effect_max_runs.saturating_add(1);
        for _ in 0..passes {
            if !self.reactive.store.is_flush_requested() {
                return Ok(total);
            }
            let stats = self.flush()?;
            total.bindings_updated += stats.bindings_updated;
            total.binding_errors += stats.binding_errors;
            total.effects_run += stats.effects_run;
        }
        if !self.reactive.store.is_flush_requested() {
            return Ok(total);
        }
        tracing::error!("writes still pending after {} flush passes", passes);
        Err(ReactiveError::Unsettled { passes }.into())
    }

    /// Forget bindings, loops, handlers and refs of nodes no longer in the
    /// document
    pub fn prune_detached(&mut self) {
        let tree = self.document.tree();
        let removed = self
            .bindings
            .remove_where(|u| !tree.is_connected(u.owner()));
        self.loops.retain(|_, l| tree.is_connected(l.marker));
        self.handlers.retain(|node, _| tree.is_connected(*node));
        self.refs.retain(|_, node| tree.is_connected(*node));
        self.spread.retain(|node, _| tree.is_connected(*node));
        self.style_timers.retain(|c| tree.is_connected(c.node));
        if !removed.is_empty() {
            tracing::debug!("pruned {} detached bindings", removed.len());
        }
    }

    // === Events ===

    /// Handlers for `kind` on `target` and its ancestors, innermost first
    pub fn handlers_for(&self, target: NodeId, kind: &str) -> Vec<Handler> {
        let tree = self.document.tree();
        std::iter::once(target)
            .chain(tree.ancestors(target))
            .filter_map(|node| self.handlers.get(&node))
            .flat_map(|list| list.iter().filter(|h| h.event == kind).cloned())
            .collect()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    fn event_value(&self, event: &DomEvent) -> Value {
        let tree = self.document.tree();
        let node = event.target;
        let attr = |name: &str| Value::from(tree.attr(node, name).unwrap_or_default());
        let target = Value::object([
            ("id", attr("id")),
            ("name", attr("name")),
            ("value", Value::from(self.document.value(node))),
            ("checked", Value::from(self.document.checked(node))),
            (
                "tagName",
                Value::from(tree.tag_name(node).unwrap_or_default().to_ascii_uppercase()),
            ),
        ]);
        Value::object([("type", Value::from(event.kind.as_str())), ("target", target)])
    }

    /// Run one handler; calls it could not resolve are returned for the
    /// server
    pub fn run_handler(&mut self, handler: &Handler, event: &DomEvent) -> Vec<RemoteCall> {
        self.run_hook(&handler.body, &handler.scope, event, None)
    }

    /// Run `program` in a handler scope with `event` bound, plus `response`
    /// for after-request hooks. Returns the calls left for the server.
    pub fn run_hook(
        &mut self,
        program: &Rc<Program>,
        scope: &ScopeRef,
        event: &DomEvent,
        response: Option<Value>,
    ) -> Vec<RemoteCall> {
        let mut scope = self.scope_for(scope);
        scope.bind("event", Local::Value(self.event_value(event)));
        if let Some(response) = response {
            scope.bind("response", Local::Value(response));
        }
        let mut interp = self.reactive.interpreter(scope).with_remote_calls();
        if let Err(err) = interp.run(program) {
            tracing::warn!("{} handler failed: {}", event.kind, err);
        }
        interp.take_remote_calls()
    }

    /// Deliver an event immediately, ignoring debounce, then flush
    pub fn dispatch(&mut self, event: &DomEvent) -> HydrateResult<Vec<RemoteCall>> {
        let mut calls = Vec::new();
        for handler in self.handlers_for(event.target, &event.kind) {
            calls.extend(self.run_handler(&handler, event));
        }
        self.flush_all()?;
        Ok(calls)
    }

    /// Named controls of the form enclosing `node`
    pub fn form_fields(&self, node: NodeId) -> serde_json::Map<String, serde_json::Value> {
        let tree = self.document.tree();
        let mut fields = serde_json::Map::new();
        let Some(form) = tree.closest(node, |t, n| t.is_tag(n, "form")) else {
            return fields;
        };
        for control in tree.descendants(form) {
            let is_control = ["input", "select", "textarea"]
                .iter()
                .any(|tag| tree.is_tag(control, tag));
            let Some(name) = tree.attr(control, "name").filter(|n| !n.is_empty()) else {
                continue;
            };
            if !is_control {
                continue;
            }
            let kind = tree.attr(control, "type").unwrap_or_default();
            if matches!(kind, "checkbox" | "radio") {
                if !self.document.checked(control) {
                    continue;
                }
                let value = tree.attr(control, "value").unwrap_or("on");
                fields.insert(name.to_string(), serde_json::Value::from(value));
                continue;
            }
            fields.insert(
                name.to_string(),
                serde_json::Value::from(self.document.value(control)),
            );
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(markup: &str) -> Page {
        Page::from_html(markup, RuntimeConfig::default())
    }

    #[test]
    fn test_updater_kinds() {
        let expr = Expression::parse("x").unwrap();
        let scope = ScopeRef::new(Hierarchy::root(), None);
        let content = Updater::Content {
            node: NodeId::ROOT,
            expr: expr.clone(),
            scope: scope.clone(),
        };
        assert_eq!(content.kind(), BindingKind::Text);
        let prop = Updater::Property {
            node: NodeId::ROOT,
            name: "disabled".into(),
            expr,
            scope,
        };
        assert_eq!(prop.kind(), BindingKind::Attribute);
        assert_eq!(prop.owner(), NodeId::ROOT);
    }

    #[test]
    fn test_boolean_property_sync() {
        let mut p = page(r#"<body><button id="b">go</button></body>"#);
        let button = fos_dom::Selector::parse("#b")
            .and_then(|s| s.query(p.document.tree(), p.document.root()))
            .unwrap();
        p.write_property(button, "disabled", &Value::Bool(true)).unwrap();
        assert!(p.document.tree().has_attr(button, "disabled"));
        p.write_property(button, "disabled", &Value::Null).unwrap();
        assert!(!p.document.tree().has_attr(button, "disabled"));
        p.write_property(button, "title", &Value::from("hi")).unwrap();
        assert_eq!(p.document.tree().attr(button, "title"), Some("hi"));
        p.write_property(button, "title", &Value::Bool(false)).unwrap();
        assert!(!p.document.tree().has_attr(button, "title"));
    }

    #[test]
    fn test_spread_removes_stale_attributes() {
        let mut p = page(r#"<body><a id="l">x</a></body>"#);
        let link = fos_dom::Selector::parse("#l")
            .and_then(|s| s.query(p.document.tree(), p.document.root()))
            .unwrap();
        let first = Value::object([("href", Value::from("/a")), ("title", Value::from("A"))]);
        p.write_spread(link, &first).unwrap();
        assert_eq!(p.document.tree().attr(link, "title"), Some("A"));

        let second = Value::object([("href", Value::from("/b"))]);
        p.write_spread(link, &second).unwrap();
        assert_eq!(p.document.tree().attr(link, "href"), Some("/b"));
        assert!(!p.document.tree().has_attr(link, "title"));
    }

    #[test]
    fn test_form_fields() {
        let p = page(
            r#"<body><form><input name="email" value="a@b.c"><input type="checkbox" name="terms" checked>
            <input type="checkbox" name="news"><textarea name="note">hi</textarea><button id="s">ok</button></form></body>"#,
        );
        let button = fos_dom::Selector::parse("#s")
            .and_then(|s| s.query(p.document.tree(), p.document.root()))
            .unwrap();
        let fields = p.form_fields(button);
        assert_eq!(fields["email"], "a@b.c");
        assert_eq!(fields["terms"], "on");
        assert_eq!(fields["note"], "hi");
        assert!(!fields.contains_key("news"));
    }

    #[test]
    fn test_form_fields_read_select_option() {
        let mut p = page(
            r#"<body><form><select name="s"><option value="a">A</option><option value="b" selected>B</option></select>
            <select name="size"><option>Small</option><option>Large</option></select><button id="s">ok</button></form></body>"#,
        );
        let button = fos_dom::Selector::parse("#s")
            .and_then(|s| s.query(p.document.tree(), p.document.root()))
            .unwrap();
        let fields = p.form_fields(button);
        assert_eq!(fields["s"], "b");
        assert_eq!(fields["size"], "Small");

        let size = fos_dom::Selector::parse(r#"[name="size"]"#)
            .and_then(|s| s.query(p.document.tree(), p.document.root()))
            .unwrap();
        p.document.set_selected_index(size, 1).unwrap();
        assert_eq!(p.form_fields(button)["size"], "Large");
    }
}
