//! Runtime
//!
//! Ties a hydrated [`Page`] to the network: event dispatch with debounce
//! and request hooks, server callbacks under suspense, partial sync, link
//! following and full navigation behind a loading placeholder.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use fos_dom::{Document, DomTree, NodeId, Selector};
use fos_net::{
    CallbackPayload, CallbackSealer, DEFAULT_SYNC_NAME, NetClient, ServerReply, TargetPatch,
    Transport,
};
use fos_reactive::Value;
use fos_reactive::expr::RemoteCall;
use serde_json::Value as Json;
use url::Url;

use crate::directive::{AfterRequest, DirectiveNames, Handler, json_object};
use crate::hints::duration_field;
use crate::reconcile::{ScrollSnapshot, morph_body, reconcile_head, scrub_template_values};
use crate::{DomEvent, HydrateResult, HydrationPhase, Page, hydrate, hydrate_document};

/// Element that receives the markup of a callback reply at the start of
/// `<body>`
pub const CALLBACK_SLOT_ID: &str = "afterbegin-8D95D";

/// Container of the per-route loading placeholders
pub const LOADING_CONTAINER_ID: &str = "loading-file-1B87E";

/// Redirect markers followed in a row before giving up
const MAX_REDIRECTS: usize = 8;

/// Fade used when a placeholder sets no transition
const DEFAULT_FADE: Duration = Duration::from_millis(250);

pub struct Runtime<T> {
    page: Rc<RefCell<Page>>,
    client: NetClient<T>,
    /// Latest debounce generation per compiled handler
    generations: RefCell<HashMap<usize, u64>>,
}

impl<T: Transport> Runtime<T> {
    pub fn new(page: Page, transport: T, location: Url) -> HydrateResult<Self> {
        let sealer = CallbackSealer::from_key(page.config().callback_key.as_deref())?;
        let client = NetClient::new(transport, location.clone())
            .with_endpoint(&page.config().endpoint)
            .with_sealer(sealer);
        let page = Rc::new(RefCell::new(page));
        page.borrow_mut().document.set_url(location.as_str());
        Ok(Self {
            page,
            client,
            generations: RefCell::new(HashMap::new()),
        })
    }

    pub fn page(&self) -> &Rc<RefCell<Page>> {
        &self.page
    }

    pub fn client(&self) -> &NetClient<T> {
        &self.client
    }

    /// Hydrate the current document
    pub async fn start(&self) -> HydrateResult<HydrationPhase> {
        hydrate_document(&self.page).await
    }

    // === Navigation ===

    /// Fetch `href` and reconcile the live document against it. State is
    /// reset and the page hydrated again.
    pub async fn navigate(&self, href: &str) -> HydrateResult<HydrationPhase> {
        if let Ok(url) = self.client.resolve(href) {
            self.show_loading(&url).await?;
        }
        let mut target = href.to_string();
        for _ in 0..MAX_REDIRECTS {
            let (url, reply) = self.client.fetch_page(&target).await?;
            let markup = match reply {
                ServerReply::Redirect(next) => {
                    tracing::debug!("{} redirects to {}", url, next);
                    target = next;
                    continue;
                }
                ServerReply::Markup(markup) => markup,
                ServerReply::Envelope { remainder, .. } => remainder,
            };
            return self.replace_document(url, &markup).await;
        }
        tracing::error!("too many redirects navigating to {}", href);
        Ok(self.page.borrow().phase())
    }

    async fn replace_document(&self, url: Url, markup: &str) -> HydrateResult<HydrationPhase> {
        let snapshot = {
            let mut incoming = fos_html::parse(markup);
            let root = incoming.root();
            scrub_template_values(incoming.tree_mut(), root);

            let mut page = self.page.borrow_mut();
            let snapshot = ScrollSnapshot::capture(&page.document);
            page.reset();
            reconcile_head(&mut page.document, &incoming)?;
            morph_body(&mut page.document, &incoming)?;
            page.document.set_url(url.as_str());
            snapshot
        };
        self.client.set_location(url);

        let phase = hydrate_document(&self.page).await;
        snapshot.restore(&mut self.page.borrow_mut().document);
        phase
    }

    /// Swap the page content for the loading placeholder of `url`'s route,
    /// fading out first
    async fn show_loading(&self, url: &Url) -> HydrateResult<()> {
        let plan = {
            let page = self.page.borrow();
            loading_plan(&page.document, page.names(), url.path())
        };
        let Some(plan) = plan else {
            return Ok(());
        };
        tracing::debug!("loading placeholder for {}", url.path());
        {
            let mut page = self.page.borrow_mut();
            let fade = format!("opacity {}ms ease-out", plan.fade_out.as_millis());
            page.document.set_style_property(plan.content, "transition", &fade)?;
            page.document.set_style_property(plan.content, "opacity", "0")?;
        }
        smol::Timer::after(plan.fade_out).await;

        let mut page = self.page.borrow_mut();
        let tree = page.document.tree_mut();
        let sources: Vec<NodeId> = tree.children(plan.placeholder).collect();
        let mut copies = Vec::with_capacity(sources.len());
        for node in sources {
            copies.push(tree.deep_clone(node)?);
        }
        tree.clear_children(plan.content)?;
        for copy in copies {
            tree.append_child(plan.content, copy)?;
        }
        page.prune_detached();
        let fade = format!("opacity {}ms ease-in", plan.fade_in.as_millis());
        page.document.set_style_property(plan.content, "transition", &fade)?;
        page.document.set_style_property(plan.content, "opacity", "1")?;
        Ok(())
    }

    /// Follow a click on `anchor` without a full reload. Returns false when
    /// the link is left to the browser: no href, `target="_blank"` or
    /// another origin.
    pub async fn follow_link(&self, anchor: NodeId) -> HydrateResult<bool> {
        let (href, append) = {
            let page = self.page.borrow();
            let tree = page.document.tree();
            let Some(href) = tree.attr(anchor, "href").map(str::trim).filter(|h| !h.is_empty())
            else {
                return Ok(false);
            };
            if tree.attr(anchor, "target") == Some("_blank") {
                return Ok(false);
            }
            let append = tree.attr(anchor, &page.names().append_params) == Some("true");
            (href.to_string(), append)
        };
        let current = self.client.location();
        let url = if append && href.starts_with('?') {
            merge_query(&current, &href)
        } else {
            self.client.resolve(&href)?
        };
        if url.origin() != current.origin() {
            tracing::debug!("external link {} left to the browser", url);
            return Ok(false);
        }

        let mut bare = url.clone();
        bare.set_fragment(None);
        let mut here = current.clone();
        here.set_fragment(None);
        if bare == here {
            if let Some(fragment) = url.fragment() {
                let page = self.page.borrow();
                let found = fragment.is_empty()
                    || Selector::attr_equals("id", fragment)
                        .query(page.document.tree(), page.document.root())
                        .is_some();
                drop(page);
                if found {
                    self.page.borrow_mut().document.set_url(url.as_str());
                    self.client.set_location(url);
                    return Ok(true);
                }
            }
        }
        self.navigate(url.as_str()).await?;
        Ok(true)
    }

    // === Timers ===

    /// Apply queued hint style changes as they come due, until none are
    /// left. Returns the number applied.
    pub async fn run_timers(&self) -> usize {
        let mut applied = 0;
        loop {
            let Some(due) = self.page.borrow().next_style_due() else {
                return applied;
            };
            smol::Timer::at(due).await;
            applied += self.page.borrow_mut().apply_due_styles(Instant::now());
        }
    }

    // === Partial sync ===

    /// Refresh the named `[pp-sync]` regions from the server and hydrate
    /// them. Returns the number of regions replaced.
    pub async fn sync(&self, names: &[String]) -> HydrateResult<usize> {
        let names = if names.is_empty() {
            vec![DEFAULT_SYNC_NAME.to_string()]
        } else {
            names.to_vec()
        };
        let fragments = self.client.sync(&names).await?;

        let mut regions = Vec::new();
        {
            let mut page = self.page.borrow_mut();
            let attr = page.names().sync.clone();
            for (name, markup) in fragments.iter() {
                let Some(selector) = Selector::parse(&format!(r#"[{attr}="{name}"]"#)) else {
                    tracing::warn!("sync name {:?} is not a valid selector", name);
                    continue;
                };
                let fragment = fos_html::parse_fragment(markup)?;
                let source = fragment.document.tree();
                // A fragment may carry its own region wrapper
                let nodes: Vec<NodeId> = match selector.query(source, fragment.body) {
                    Some(wrapper) => source.children(wrapper).collect(),
                    None => fragment.nodes.clone(),
                };
                tracing::debug!("sync {}: {} nodes", name, nodes.len());

                let live = selector.query_all(page.document.tree(), page.document.root());
                if live.is_empty() {
                    tracing::warn!("no live region for sync {}", name);
                }
                for region in live {
                    splice_children(page.document.tree_mut(), region, source, &nodes)?;
                    regions.push(region);
                }
            }
            page.prune_detached();
        }

        for &region in &regions {
            hydrate(&self.page, region).await?;
        }
        Ok(regions.len())
    }

    // === Events ===

    /// Deliver `event` to its handlers. Debounced handlers wait out their
    /// delay and only the latest pending call runs. Calls the page could
    /// not resolve go to the server. A before-request hook runs ahead of
    /// the handler, an after-request hook once its calls are answered.
    /// Clicks inside a link then follow it.
    pub async fn dispatch_event(&self, event: &DomEvent) -> HydrateResult<()> {
        let handlers = self.page.borrow().handlers_for(event.target, &event.kind);
        for handler in handlers {
            self.mirror_params(handler.node);
            if let Some(delay) = handler.debounce {
                let key = Rc::as_ptr(&handler.body) as usize;
                let generation = self.bump_generation(key);
                smol::Timer::after(delay).await;
                if self.generations.borrow().get(&key) != Some(&generation) {
                    tracing::debug!("{} handler superseded", event.kind);
                    continue;
                }
            }
            let calls = {
                let mut page = self.page.borrow_mut();
                if let Some(before) = &handler.hooks.before {
                    let dropped = page.run_hook(before, &handler.scope, event, None);
                    if !dropped.is_empty() {
                        tracing::warn!("server calls in before-request hook ignored");
                    }
                }
                let calls = page.run_handler(&handler, event);
                page.flush_all()?;
                calls
            };
            let mut response = None;
            for call in calls {
                if let Some(data) = self.call_server(call, event, &handler).await? {
                    response = Some(data);
                }
            }
            if let AfterRequest::Run(after) = &handler.hooks.after {
                let response = response.map_or(Value::Undefined, |data| Value::from(Json::Object(data)));
                let mut page = self.page.borrow_mut();
                let dropped = page.run_hook(after, &handler.scope, event, Some(response));
                page.flush_all()?;
                if !dropped.is_empty() {
                    tracing::warn!("server calls in after-request hook ignored");
                }
            }
        }

        if event.kind == "click" {
            let anchor = {
                let page = self.page.borrow();
                let tree = page.document.tree();
                tree.closest(event.target, |t, n| t.is_tag(n, "a") && t.has_attr(n, "href"))
            };
            if let Some(anchor) = anchor {
                self.follow_link(anchor).await?;
            }
        }
        Ok(())
    }

    /// Mirror an `append-params` input into the location query
    fn mirror_params(&self, node: NodeId) {
        let Some(url) = self.page.borrow().params_location(node) else {
            return;
        };
        tracing::debug!("location query now {:?}", url.query());
        self.page.borrow_mut().document.set_url(url.as_str());
        self.client.set_location(url);
    }

    fn bump_generation(&self, key: usize) -> u64 {
        let mut generations = self.generations.borrow_mut();
        let generation = generations.entry(key).or_insert(0);
        *generation += 1;
        *generation
    }

    // === Server callbacks ===

    /// Send one call with the handler's suspense hints shown meanwhile.
    /// For a handler with request hooks, returns the data of a successful
    /// envelope.
    async fn call_server(
        &self,
        call: RemoteCall,
        event: &DomEvent,
        handler: &Handler,
    ) -> HydrateResult<Option<serde_json::Map<String, Json>>> {
        let (payload, suspense) = {
            let mut page = self.page.borrow_mut();
            let tree = page.document.tree();
            let mut payload =
                CallbackPayload::default().with_args(call.args.iter().map(Value::to_json).collect());
            if event.kind == "submit" || tree.is_tag(event.target, "form") {
                payload.fields = page.form_fields(event.target);
            }
            let suspense = page.suspend(handler.node);
            (payload, suspense)
        };
        let reply = self.client.callback(&call.name, &payload, true).await;
        suspense.restore(&mut self.page.borrow_mut())?;
        let reply = reply?;

        if handler.hooks.is_set() {
            return self.apply_hooked_reply(reply).await;
        }
        self.apply_reply(reply).await.map(|_| None)
    }

    /// Reply handling for hooked callbacks: targets and the slot are
    /// applied in place and the page is not refreshed
    async fn apply_hooked_reply(
        &self,
        reply: ServerReply,
    ) -> HydrateResult<Option<serde_json::Map<String, Json>>> {
        let (data, slot) = match reply {
            ServerReply::Redirect(href) => return self.navigate(&href).await.map(|_| None),
            ServerReply::Envelope {
                success,
                data,
                targets,
                remainder,
            } => {
                self.apply_targets(&targets)?;
                (success.then_some(data), remainder)
            }
            ServerReply::Markup(markup) => (None, markup),
        };
        if !slot.trim().is_empty() {
            let node = {
                let mut page = self.page.borrow_mut();
                let node = insert_slot(&mut page.document, &slot)?;
                page.prune_detached();
                node
            };
            if let Some(node) = node {
                hydrate(&self.page, node).await?;
            }
        }
        Ok(data)
    }

    async fn apply_reply(&self, reply: ServerReply) -> HydrateResult<()> {
        let slot = match reply {
            ServerReply::Redirect(href) => return self.navigate(&href).await.map(|_| ()),
            ServerReply::Envelope {
                success,
                targets,
                remainder,
                ..
            } => {
                if !success {
                    tracing::warn!("server callback reported failure");
                }
                self.apply_targets(&targets)?;
                remainder
            }
            ServerReply::Markup(markup) => markup,
        };

        match self.client.refresh().await? {
            ServerReply::Redirect(href) => self.navigate(&href).await.map(|_| ()),
            ServerReply::Markup(markup) => self.update_body(&markup, &slot).await,
            ServerReply::Envelope { .. } => {
                tracing::warn!("refresh answered with JSON, body left as is");
                Ok(())
            }
        }
    }

    fn apply_targets(&self, targets: &[TargetPatch]) -> HydrateResult<()> {
        let mut page = self.page.borrow_mut();
        for target in targets {
            let node = Selector::parse(&target.selector)
                .and_then(|s| s.query(page.document.tree(), page.document.root()));
            let Some(node) = node else {
                tracing::debug!("no element matches target {}", target.selector);
                continue;
            };
            for (op, value) in &target.ops {
                apply_patch(&mut page.document, node, op, value)?;
            }
        }
        Ok(())
    }

    /// Morph the body against a re-rendered page, with `slot` markup placed
    /// first, then hydrate again keeping state
    async fn update_body(&self, markup: &str, slot: &str) -> HydrateResult<()> {
        let snapshot = {
            let mut incoming = fos_html::parse(markup);
            if !slot.trim().is_empty() {
                insert_slot(&mut incoming, slot)?;
            }
            let root = incoming.root();
            scrub_template_values(incoming.tree_mut(), root);

            let mut page = self.page.borrow_mut();
            let snapshot = ScrollSnapshot::capture(&page.document);
            page.rebind();
            morph_body(&mut page.document, &incoming)?;
            snapshot
        };
        let result = hydrate_document(&self.page).await;
        snapshot.restore(&mut self.page.borrow_mut().document);
        result.map(|_| ())
    }
}

/// Replace the children of `parent` with copies of `nodes` from `src`
fn splice_children(
    tree: &mut DomTree,
    parent: NodeId,
    src: &DomTree,
    nodes: &[NodeId],
) -> HydrateResult<()> {
    tree.clear_children(parent)?;
    for &node in nodes {
        let copy = tree.import_node(src, node)?;
        tree.append_child(parent, copy)?;
    }
    Ok(())
}

/// Fill the callback slot with `content` and make it the first child of
/// `<body>`, reusing a slot already there
fn insert_slot(document: &mut Document, content: &str) -> HydrateResult<Option<NodeId>> {
    let Some(body) = document.body() else {
        return Ok(None);
    };
    let fragment = fos_html::parse_fragment(content)?;
    let existing = Selector::attr_equals("id", CALLBACK_SLOT_ID).query(document.tree(), body);
    let tree = document.tree_mut();
    let slot = match existing {
        Some(slot) => {
            tree.clear_children(slot)?;
            tree.detach(slot)?;
            slot
        }
        None => tree.create_element_with_attrs("div", &[("id", CALLBACK_SLOT_ID)]),
    };
    for &node in &fragment.nodes {
        let copy = tree.import_node(fragment.document.tree(), node)?;
        tree.append_child(slot, copy)?;
    }
    let anchor = tree.first_child(body);
    tree.insert_before(body, slot, anchor)?;
    Ok(Some(slot))
}

/// Merge the query of a `?a=b#frag` href into `current`
fn merge_query(current: &Url, href: &str) -> Url {
    let (query, fragment) = match href.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (href, None),
    };
    let mut pairs: Vec<(String, String)> = current.query_pairs().into_owned().collect();
    for (key, value) in url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes()).into_owned() {
        match pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => pairs.push((key, value)),
        }
    }
    let mut url = current.clone();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(&pairs);
    }
    url.set_fragment(fragment);
    url
}

#[derive(Debug)]
struct LoadingPlan {
    placeholder: NodeId,
    content: NodeId,
    fade_in: Duration,
    fade_out: Duration,
}

/// Placeholder for `route`: the `div[loading-url]` of the route or its
/// closest parent path inside the loading container
fn loading_plan(document: &Document, names: &DirectiveNames, route: &str) -> Option<LoadingPlan> {
    let tree = document.tree();
    let container = Selector::attr_equals("id", LOADING_CONTAINER_ID).query(tree, document.root())?;
    let mut route = route.to_string();
    let placeholder = loop {
        let found = Selector::attr_equals(&names.loading_url, &route)
            .query_all(tree, container)
            .into_iter()
            .find(|&n| tree.is_tag(n, "div"));
        if let Some(found) = found {
            break found;
        }
        if route == "/" {
            return None;
        }
        route = match route.rfind('/') {
            Some(at) if at > 0 => route[..at].to_string(),
            _ => "/".to_string(),
        };
    };
    let content = Selector::attr_equals(&names.loading_content, "true")
        .query(tree, document.root())
        .or_else(|| document.body())?;

    let transition = tree
        .descendants(placeholder)
        .into_iter()
        .find_map(|n| tree.attr(n, &names.loading_transition))
        .and_then(json_object);
    let fade = |key| {
        transition
            .as_ref()
            .and_then(|config| duration_field(config, key))
            .unwrap_or(DEFAULT_FADE)
    };
    Some(LoadingPlan {
        placeholder,
        content,
        fade_in: fade("fadeIn"),
        fade_out: fade("fadeOut"),
    })
}

fn patch_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

/// One out-of-band operation from a callback envelope
pub(crate) fn apply_patch(document: &mut Document, node: NodeId, op: &str, value: &Json) -> HydrateResult<()> {
    let text = patch_text(value);
    let on = match value {
        Json::Bool(b) => *b,
        Json::Null => false,
        _ => true,
    };
    match op {
        "innerHTML" => {
            let fragment = fos_html::parse_fragment(&text)?;
            splice_children(
                document.tree_mut(),
                node,
                fragment.document.tree(),
                &fragment.nodes,
            )?;
        }
        "textContent" | "innerText" => document.tree_mut().set_text_content(node, &text)?,
        "value" => {
            document.set_value(node, &text)?;
        }
        "checked" | "open" | "disabled" | "selected" | "hidden" => {
            document.set_boolean(node, op, on)?;
        }
        "className" => {
            document.tree_mut().set_attr(node, "class", &text)?;
        }
        "removeAttribute" => {
            document.tree_mut().remove_attr(node, &text)?;
        }
        name if !on => {
            document.tree_mut().remove_attr(node, name)?;
        }
        name => {
            document.tree_mut().set_attr(node, name, &text)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;
    use fos_net::MemoryTransport;

    fn runtime(markup: &str) -> Runtime<MemoryTransport> {
        let page = Page::from_html(markup, RuntimeConfig::default());
        let location = Url::parse("http://site.test/app").unwrap();
        let runtime = Runtime::new(page, MemoryTransport::new(), location).unwrap();
        smol::block_on(runtime.start()).unwrap();
        runtime
    }

    fn find(runtime: &Runtime<MemoryTransport>, selector: &str) -> Option<NodeId> {
        let page = runtime.page().borrow();
        Selector::parse(selector).and_then(|s| s.query(page.document.tree(), page.document.root()))
    }

    fn text(runtime: &Runtime<MemoryTransport>, selector: &str) -> String {
        let node = find(runtime, selector).unwrap();
        runtime.page().borrow().document.tree().text_content(node)
    }

    #[test]
    fn test_apply_patch_operations() {
        let mut doc = fos_html::parse(r#"<body><div id="t" title="x"><i>old</i></div></body>"#);
        let node = Selector::parse("#t").and_then(|s| s.query(doc.tree(), doc.root())).unwrap();

        apply_patch(&mut doc, node, "innerHTML", &Json::from("<b>new</b>")).unwrap();
        assert_eq!(fos_html::inner_html(doc.tree(), node), "<b>new</b>");
        apply_patch(&mut doc, node, "className", &Json::from("done")).unwrap();
        assert_eq!(doc.tree().attr(node, "class"), Some("done"));
        apply_patch(&mut doc, node, "title", &Json::Null).unwrap();
        assert!(!doc.tree().has_attr(node, "title"));
        apply_patch(&mut doc, node, "hidden", &Json::Bool(true)).unwrap();
        assert!(doc.is_hidden(node));
    }

    #[test]
    fn test_insert_slot_goes_first() {
        let mut doc = fos_html::parse("<body><main>page</main></body>");
        let slot = insert_slot(&mut doc, "<p>saved</p>").unwrap();
        let body = doc.body().unwrap();
        let first = doc.tree().first_child(body).unwrap();
        assert_eq!(slot, Some(first));
        assert_eq!(doc.tree().attr(first, "id"), Some(CALLBACK_SLOT_ID));
        assert_eq!(doc.tree().text_content(first), "saved");

        let slot = insert_slot(&mut doc, "<p>again</p>").unwrap();
        assert_eq!(slot, Some(first));
        assert_eq!(doc.tree().text_content(first), "again");
        assert_eq!(doc.tree().element_children(body).len(), 2);
    }

    #[test]
    fn test_sync_splices_and_hydrates_region() {
        let rt = runtime(
            r#"<body pp-init-state='{"n": 2}'><section pp-sync="stats"><span>stale</span></section></body>"#,
        );
        rt.client()
            .transport()
            .reply_html(r#"<section pp-sync="stats"><em id="n">{{ n * 10 }}</em></section>"#);
        let replaced = smol::block_on(rt.sync(&["stats".to_string()])).unwrap();
        assert_eq!(replaced, 1);
        assert_eq!(text(&rt, "#n"), "20");
        assert!(find(&rt, "span").is_none());
    }

    #[test]
    fn test_debounced_handler_runs_once() {
        let rt = runtime(
            r#"<body><script type="text/php">
                const [hits, setHits] = state(0);
                function bump() { setHits(hits + 1); }
            </script><input id="q" oninput="bump" pp-debounce="20ms"><p id="hits">{{ hits }}</p></body>"#,
        );
        let input = find(&rt, "#q").unwrap();
        let event = DomEvent::new("input", input);
        let (a, b) = smol::block_on(smol::future::zip(
            rt.dispatch_event(&event),
            rt.dispatch_event(&event),
        ));
        a.unwrap();
        b.unwrap();
        assert_eq!(text(&rt, "#hits"), "1");
    }
}
