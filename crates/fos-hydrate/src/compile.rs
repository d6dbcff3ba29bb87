//! Directive compilation against a live page
//!
//! Each hydration phase maps to one method here; loop items reuse the same
//! methods on their freshly cloned nodes.

use std::collections::BTreeSet;
use std::rc::Rc;

use fos_dom::{Attribute, NodeId, is_boolean_attribute};
use fos_reactive::expr::{Expression, extract_dependencies, is_array_intrinsic, parse_program};
use fos_reactive::{BindingId, Local, Path, Scope, Value};

use crate::directive::{
    Handler, LoopSpec, RequestHooks, Template, is_identifier, normalize_handler, parse_duration,
    strip_braces,
};
use crate::page::{Branch, Condition, ItemRef, LoopId, LoopState, ScopeRef, Updater};
use crate::Page;

impl Page {
    fn scope_ref(&self, node: NodeId, item: Option<&ItemRef>) -> ScopeRef {
        ScopeRef::new(
            self.names.hierarchy_of(self.document.tree(), node),
            item.cloned(),
        )
    }

    fn attributes(&self, node: NodeId) -> Vec<Attribute> {
        self.document
            .tree()
            .element(node)
            .map(|e| e.attrs.clone())
            .unwrap_or_default()
    }

    /// Auto-bound boolean attribute: `disabled="isBusy"`
    fn auto_bound(name: &str, value: &str) -> Option<Expression> {
        let value = value.trim();
        if !is_boolean_attribute(name)
            || !is_identifier(value)
            || value == name
            || matches!(value, "true" | "false")
        {
            return None;
        }
        Expression::parse(value).ok()
    }

    /// Every expression written on `node` itself
    pub(crate) fn expressions_in(&self, node: NodeId) -> Vec<Expression> {
        let tree = self.document.tree();
        let names = &self.names;
        if let Some(text) = tree.get(node).and_then(|n| n.as_text()) {
            return Template::parse(text)
                .map(|t| t.expressions().cloned().collect())
                .unwrap_or_default();
        }
        let mut out = Vec::new();
        for attr in self.attributes(node) {
            let (name, value) = (attr.name.as_str(), attr.value.as_str());
            if name.starts_with("on") {
                continue;
            }
            if name == names.for_ {
                if let Ok(spec) = LoopSpec::parse(name, value) {
                    out.push(spec.source);
                }
            } else if name == names.if_ || name == names.elseif {
                out.extend(Expression::parse(strip_braces(value)).ok());
            } else if name == names.bind || name == names.spread || names.bound_attr(name).is_some()
            {
                out.extend(Expression::parse(value.trim()).ok());
            } else if names.is_directive(name) {
                continue;
            } else if let Some(expr) = Self::auto_bound(name, value) {
                out.push(expr);
            } else if let Some(template) = Template::parse(value) {
                out.extend(template.expressions().cloned());
            }
        }
        out
    }

    // === Phases ===

    pub(crate) fn collect_refs(&mut self, nodes: &[NodeId]) -> usize {
        let mut count = 0;
        for &node in nodes {
            let Some(name) = self.document.tree().attr(node, &self.names.ref_) else {
                continue;
            };
            let name = name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            let hierarchy = self.names.hierarchy_of(self.document.tree(), node);
            self.refs.insert((hierarchy, name), node);
            count += 1;
        }
        count
    }

    /// Declare state from `init-state` JSON objects
    pub(crate) fn bootstrap_state(&mut self, nodes: &[NodeId]) -> usize {
        let mut count = 0;
        for &node in nodes {
            let Some(raw) = self.document.tree().attr(node, &self.names.init_state) else {
                continue;
            };
            let fields = match Value::from_json_str(raw) {
                Ok(Value::Object(fields)) => fields,
                Ok(other) => {
                    tracing::warn!(
                        "{} must hold a JSON object, got {}",
                        self.names.init_state,
                        other.type_of()
                    );
                    continue;
                }
                Err(err) => {
                    tracing::warn!("invalid {} JSON: {}", self.names.init_state, err);
                    continue;
                }
            };
            let hierarchy = self.names.hierarchy_of(self.document.tree(), node);
            for (name, value) in fields {
                match self.reactive.state(&hierarchy, &name, value) {
                    Ok(_) => count += 1,
                    Err(err) => tracing::warn!("state {} in {}: {}", name, hierarchy, err),
                }
            }
        }
        count
    }

    fn referenced_paths(&self, nodes: &[NodeId], locals: &[String], out: &mut BTreeSet<Path>) {
        let tree = self.document.tree();
        for &node in nodes {
            let exprs = self.expressions_in(node);
            if !exprs.is_empty() {
                let mut scope = Scope::new(self.names.hierarchy_of(tree, node));
                for local in locals {
                    scope.bind(local.clone(), Local::Value(Value::Undefined));
                }
                for expr in &exprs {
                    out.extend(self.reactive.dependencies(expr, &scope));
                }
            }
            if !self.names.is_loop_template(tree, node) {
                continue;
            }
            let value = tree.attr(node, &self.names.for_).unwrap_or_default();
            let Ok(spec) = LoopSpec::parse(&self.names.for_, value) else {
                continue;
            };
            let mut inner = locals.to_vec();
            inner.push(spec.item);
            inner.extend(spec.index);
            let children: Vec<NodeId> = tree
                .children(node)
                .flat_map(|child| self.names.live_nodes(tree, child))
                .collect();
            self.referenced_paths(&children, &inner, out);
        }
    }

    /// Create every referenced path that does not exist yet, longest first
    pub(crate) fn materialize_paths(&mut self, nodes: &[NodeId]) -> usize {
        let mut referenced = BTreeSet::new();
        self.referenced_paths(nodes, &[], &mut referenced);

        let mut paths: Vec<Path> = referenced
            .into_iter()
            .map(|mut path| {
                while path.len() > 2 && path.last().is_some_and(is_array_intrinsic) {
                    path = path.parent().unwrap_or(path);
                }
                path
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        paths.sort_by_key(|p| std::cmp::Reverse(p.len()));

        paths
            .iter()
            .filter(|path| self.reactive.store.materialize(path))
            .count()
    }

    /// Text templates, attribute templates and explicit bindings
    pub(crate) fn register_bindings(
        &mut self,
        nodes: &[NodeId],
        item: Option<&ItemRef>,
    ) -> Vec<BindingId> {
        let mut ids = Vec::new();
        for &node in nodes {
            let text = self
                .document
                .tree()
                .get(node)
                .and_then(|n| n.as_text())
                .map(str::to_string);
            if let Some(text) = text {
                if let Some(template) = Template::parse(&text) {
                    let scope = self.scope_ref(node, item);
                    ids.push(self.register(Updater::Text {
                        node,
                        template: Rc::new(template),
                        scope,
                    }));
                }
                continue;
            }
            ids.extend(self.register_element(node, item));
        }
        ids
    }

    fn register_element(&mut self, node: NodeId, item: Option<&ItemRef>) -> Vec<BindingId> {
        let attrs = self.attributes(node);
        if attrs.is_empty() {
            return Vec::new();
        }
        let explicit: BTreeSet<String> = attrs
            .iter()
            .filter_map(|a| self.names.bound_attr(&a.name))
            .map(str::to_string)
            .collect();
        let scope = self.scope_ref(node, item);
        let mut updaters = Vec::new();

        for attr in &attrs {
            let (name, value) = (attr.name.as_str(), attr.value.as_str());
            let parsed = |value: &str| match Expression::parse(value.trim()) {
                Ok(expr) => Some(expr),
                Err(err) => {
                    tracing::warn!("invalid {} expression {:?}: {}", name, value, err);
                    None
                }
            };

            if name == self.names.bind {
                if let Some(expr) = parsed(value) {
                    updaters.push(Updater::Content {
                        node,
                        expr,
                        scope: scope.clone(),
                    });
                }
            } else if name == self.names.spread {
                if let Some(expr) = parsed(value) {
                    updaters.push(Updater::Spread {
                        node,
                        expr,
                        scope: scope.clone(),
                    });
                }
            } else if let Some(target) = self.names.bound_attr(name) {
                if let Some(expr) = parsed(value) {
                    updaters.push(Updater::Property {
                        node,
                        name: target.to_string(),
                        expr,
                        scope: scope.clone(),
                    });
                }
            } else if self.names.is_directive(name)
                || name.starts_with("on")
                || explicit.contains(name)
            {
                continue;
            } else if let Some(expr) = Self::auto_bound(name, value) {
                updaters.push(Updater::Property {
                    node,
                    name: name.to_string(),
                    expr,
                    scope: scope.clone(),
                });
            } else if let Some(template) = Template::parse(value) {
                updaters.push(Updater::Attribute {
                    node,
                    name: name.to_string(),
                    template: Rc::new(template),
                    scope: scope.clone(),
                });
            }
        }
        updaters.into_iter().map(|u| self.register(u)).collect()
    }

    /// One binding per `if` / `elseif` / `else` sibling chain
    pub(crate) fn compile_conditionals(
        &mut self,
        nodes: &[NodeId],
        item: Option<&ItemRef>,
    ) -> Vec<BindingId> {
        let mut ids = Vec::new();
        for &node in nodes {
            let tree = self.document.tree();
            let Some(test) = tree.attr(node, &self.names.if_) else {
                continue;
            };
            let mut branches = vec![Branch {
                node,
                condition: self.branch_test(&self.names.if_, test),
            }];

            let mut cursor = tree.next_sibling(node);
            while let Some(sibling) = cursor {
                cursor = tree.next_sibling(sibling);
                if !tree.get(sibling).is_some_and(|n| n.is_element()) {
                    continue;
                }
                if let Some(test) = tree.attr(sibling, &self.names.elseif) {
                    branches.push(Branch {
                        node: sibling,
                        condition: self.branch_test(&self.names.elseif, test),
                    });
                } else if tree.has_attr(sibling, &self.names.else_) {
                    branches.push(Branch {
                        node: sibling,
                        condition: Condition::Otherwise,
                    });
                    break;
                } else {
                    break;
                }
            }

            let scope = self.scope_ref(node, item);
            ids.push(self.register(Updater::Conditional {
                branches: branches.into(),
                scope,
            }));
        }
        ids
    }

    fn branch_test(&self, attr: &str, value: &str) -> Condition {
        match Expression::parse(strip_braces(value)) {
            Ok(expr) => Condition::When(expr),
            Err(err) => {
                tracing::warn!("invalid {} condition {:?}: {}", attr, value, err);
                Condition::Invalid
            }
        }
    }

    /// Replace loop templates with markers and register their bindings
    pub(crate) fn compile_loops(
        &mut self,
        nodes: &[NodeId],
        item: Option<&ItemRef>,
    ) -> Vec<BindingId> {
        let mut ids = Vec::new();
        for &node in nodes {
            if !self.names.is_loop_template(self.document.tree(), node) {
                continue;
            }
            let value = self
                .document
                .tree()
                .attr(node, &self.names.for_)
                .unwrap_or_default()
                .to_string();
            let spec = match LoopSpec::parse(&self.names.for_, &value) {
                Ok(spec) => spec,
                Err(err) => {
                    tracing::warn!("{}", err);
                    continue;
                }
            };

            let scope = self.scope_ref(node, item);
            let fields = self.item_fields(node, &spec.item);
            let marker = self.document.tree_mut().create_comment(format!(" {} ", self.names.for_));
            if let Err(err) = self.document.tree_mut().replace(node, marker) {
                tracing::warn!("cannot place loop marker: {}", err);
                continue;
            }

            let id = LoopId(self.next_loop);
            self.next_loop += 1;
            let mut state = LoopState {
                marker,
                template: node,
                spec,
                scope,
                array_path: None,
                fields,
                items: Vec::new(),
            };
            state.array_path = self.loop_array_path(&state.scope, &state.spec.source);
            self.loops.insert(id, state);
            ids.push(self.register(Updater::Loop { id, marker }));
        }
        ids
    }

    /// `item.<field>` names read anywhere inside a loop template
    fn item_fields(&self, template: NodeId, item: &str) -> BTreeSet<String> {
        let tree = self.document.tree();
        tree.descendants(template)
            .into_iter()
            .flat_map(|node| self.expressions_in(node))
            .flat_map(|expr| extract_dependencies(&expr))
            .filter(|chain| chain.first().map(String::as_str) == Some(item))
            .filter_map(|chain| chain.get(1).cloned())
            .filter(|field| !is_array_intrinsic(field))
            .collect()
    }

    /// Store path of a loop source, when it names one
    pub(crate) fn loop_array_path(&mut self, scope: &ScopeRef, source: &Expression) -> Option<Path> {
        let scope = self.scope_for(scope);
        let mut interp = self.reactive.interpreter(scope);
        interp.eval_path(source).ok().flatten()
    }

    /// Compile `on<event>` attributes into handlers
    pub(crate) fn wire_handlers(&mut self, nodes: &[NodeId], item: Option<&ItemRef>) -> usize {
        let mut count = 0;
        for &node in nodes {
            let attrs = self.attributes(node);
            let debounce = attrs
                .iter()
                .find(|a| a.name == self.names.debounce)
                .and_then(|a| {
                    let parsed = parse_duration(&a.value);
                    if parsed.is_none() {
                        tracing::warn!("invalid {} value {:?}", self.names.debounce, a.value);
                    }
                    parsed
                });
            let hook = |name: &str| {
                attrs
                    .iter()
                    .find(|a| a.name == name)
                    .map(|a| a.value.as_str())
            };
            let hooks = RequestHooks::compile(
                hook(self.names.before_request.as_str()),
                hook(self.names.after_request.as_str()),
            );
            for attr in &attrs {
                let Some(event) = attr.name.strip_prefix("on").filter(|e| !e.is_empty()) else {
                    continue;
                };
                if attr.value.trim().is_empty() {
                    continue;
                }
                let source = normalize_handler(&attr.value);
                let body = match parse_program(&source) {
                    Ok(body) => body,
                    Err(err) => {
                        tracing::warn!("invalid on{} handler {:?}: {}", event, attr.value, err);
                        continue;
                    }
                };
                let handler = Handler {
                    event: event.to_string(),
                    node,
                    body,
                    scope: self.scope_ref(node, item),
                    debounce,
                    hooks: hooks.clone(),
                };
                self.handlers.entry(node).or_default().push(handler);
                count += 1;
            }
        }
        count
    }

    /// Compile the nodes of a freshly rendered loop item
    pub(crate) fn compile_item(&mut self, roots: &[NodeId], item: &ItemRef) -> Vec<BindingId> {
        let nodes: Vec<NodeId> = roots
            .iter()
            .flat_map(|&root| self.names.live_nodes(self.document.tree(), root))
            .collect();
        self.collect_refs(&nodes);
        let mut ids = self.register_bindings(&nodes, Some(item));
        ids.extend(self.compile_conditionals(&nodes, Some(item)));
        ids.extend(self.compile_loops(&nodes, Some(item)));
        self.wire_handlers(&nodes, Some(item));
        ids
    }
}

#[cfg(test)]
mod tests {
    use crate::{RuntimeConfig, page::Page};
    use fos_dom::Selector;
    use fos_reactive::{Hierarchy, Path, Value};

    fn page(markup: &str) -> Page {
        Page::from_html(markup, RuntimeConfig::default())
    }

    fn live(page: &Page) -> Vec<fos_dom::NodeId> {
        let body = page.document.body().unwrap();
        page.names.live_nodes(page.document.tree(), body)
    }

    fn find(page: &Page, selector: &str) -> fos_dom::NodeId {
        Selector::parse(selector)
            .and_then(|s| s.query(page.document.tree(), page.document.root()))
            .unwrap()
    }

    #[test]
    fn test_bootstrap_state_in_component_scope() {
        let mut p = page(
            r#"<body><div pp-component="Cart" pp-init-state='{"total": 3, "items": []}'></div>
            <div pp-init-state="not json"></div></body>"#,
        );
        let nodes = live(&p);
        assert_eq!(p.bootstrap_state(&nodes), 2);
        assert_eq!(
            p.reactive.store.get(&Path::parse("app.Cart.total")),
            Value::from(3.0)
        );
    }

    #[test]
    fn test_materialize_keeps_declared_state() {
        let mut p = page(
            r#"<body><p>{{ user.profile.name }} {{ todos.length }}</p><b>{{ count }}</b></body>"#,
        );
        p.reactive
            .state(&Hierarchy::root(), "count", Value::from(4.0))
            .unwrap();
        let nodes = live(&p);
        p.materialize_paths(&nodes);
        let store = &p.reactive.store;
        assert!(store.exists(&Path::parse("app.user.profile.name")));
        assert!(store.exists(&Path::parse("app.todos")));
        assert!(!store.exists(&Path::parse("app.todos.length")));
        assert_eq!(store.get(&Path::parse("app.count")), Value::from(4.0));
    }

    #[test]
    fn test_explicit_binding_skips_template() {
        let mut p = page(r#"<body><a href="{{ a }}" pp-bind-href="b" title="{{ t }}">x</a></body>"#);
        let nodes = live(&p);
        let ids = p.register_bindings(&nodes, None);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_boolean_auto_bind() {
        let mut p = page(
            r#"<body><button disabled="isBusy">a</button><input checked="checked"><input disabled="true"></body>"#,
        );
        let nodes = live(&p);
        assert_eq!(p.register_bindings(&nodes, None).len(), 1);
    }

    #[test]
    fn test_conditional_chain_groups_siblings() {
        let mut p = page(
            r#"<body><p pp-if="x > 1">a</p> <p pp-elseif="{x === 1}">b</p><p pp-else>c</p><p pp-if="y">d</p></body>"#,
        );
        let nodes = live(&p);
        let ids = p.compile_conditionals(&nodes, None);
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_loop_template_replaced_by_marker() {
        let mut p = page(
            r#"<body><ul><template pp-for="todo in todos"><li>{{ todo.title }}</li></template></ul></body>"#,
        );
        let nodes = live(&p);
        assert_eq!(p.compile_loops(&nodes, None).len(), 1);
        let ul = find(&p, "ul");
        let tree = p.document.tree();
        assert!(!tree.children(ul).any(|c| tree.is_tag(c, "template")));
        let state = p.loops.values().next().unwrap();
        assert!(state.fields.contains("title"));
        assert_eq!(p.loop_count(), 1);
    }

    #[test]
    fn test_handlers_and_refs() {
        let mut p = page(
            r#"<body><div pp-component="Form"><input pp-ref="field" oninput="setQ(this.value)" pp-debounce="300ms"></div></body>"#,
        );
        let nodes = live(&p);
        assert_eq!(p.collect_refs(&nodes), 1);
        assert_eq!(p.wire_handlers(&nodes, None), 1);
        let input = find(&p, "input");
        let handlers = p.handlers_for(input, "input");
        assert_eq!(handlers.len(), 1);
        assert_eq!(
            handlers[0].debounce,
            Some(std::time::Duration::from_millis(300))
        );
        let h = Hierarchy::from_components(["app", "Form"]);
        assert_eq!(p.ref_node(&h, "field"), Some(input));
        assert_eq!(p.ref_node(&h.child("Inner"), "field"), Some(input));
    }
}
