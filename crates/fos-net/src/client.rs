//! Runtime network client
//!
//! Builds the three request shapes the runtime sends (server callbacks,
//! partial syncs, page fetches) and hands them to a [`Transport`].

use std::cell::RefCell;

use serde_json::{Map, Value as Json};
use url::Url;

use crate::sync::sync_body;
use crate::{
    CallbackSealer, NetError, NetResult, Request, RequestTracker, Response, ServerReply,
    SyncFragments, Transport, redirect_target,
};

/// Arguments of one server callback
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallbackPayload {
    /// Form or input values gathered around the triggering element
    pub fields: Map<String, Json>,
    pub args: Vec<Json>,
}

impl CallbackPayload {
    pub fn with_field(mut self, key: &str, value: Json) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn with_args(mut self, args: Vec<Json>) -> Self {
        self.args = args;
        self
    }

    /// Wire body. A lone object argument is merged into the body, other
    /// arguments travel as `args`.
    pub fn to_body(&self, sealed_name: &str) -> Json {
        let mut body = Map::new();
        body.insert("callback".into(), Json::from(sealed_name));
        for (k, v) in &self.fields {
            body.insert(k.clone(), v.clone());
        }
        match self.args.as_slice() {
            [] => {}
            [Json::Object(fields)] => {
                for (k, v) in fields {
                    body.insert(k.clone(), v.clone());
                }
            }
            args => {
                body.insert("args".into(), Json::Array(args.to_vec()));
            }
        }
        Json::Object(body)
    }
}

/// Network client bound to the current page location
#[derive(Debug)]
pub struct NetClient<T> {
    transport: T,
    location: RefCell<Url>,
    endpoint: String,
    sealer: CallbackSealer,
    tracker: RefCell<RequestTracker>,
}

impl<T: Transport> NetClient<T> {
    pub fn new(transport: T, location: Url) -> Self {
        Self {
            transport,
            location: RefCell::new(location),
            endpoint: String::new(),
            sealer: CallbackSealer::Plain,
            tracker: RefCell::new(RequestTracker::new()),
        }
    }

    /// Callback and sync target, relative to the location; empty means the
    /// location itself
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_sealer(mut self, sealer: CallbackSealer) -> Self {
        self.sealer = sealer;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn location(&self) -> Url {
        self.location.borrow().clone()
    }

    pub fn set_location(&self, url: Url) {
        *self.location.borrow_mut() = url;
    }

    /// Resolve `href` against the current location
    pub fn resolve(&self, href: &str) -> NetResult<Url> {
        self.location
            .borrow()
            .join(href)
            .map_err(|e| NetError::InvalidUrl(format!("{href}: {e}")))
    }

    fn endpoint_url(&self) -> NetResult<Url> {
        if self.endpoint.is_empty() {
            return Ok(self.location());
        }
        self.resolve(&self.endpoint)
    }

    fn signal(&self, abort_previous: bool) -> crate::AbortSignal {
        self.tracker.borrow_mut().signal(abort_previous)
    }

    /// Abort the tracked request, if any
    pub fn abort_active(&self) {
        self.tracker.borrow_mut().abort_active();
    }

    async fn send(&self, request: Request) -> NetResult<Response> {
        let url = request.url.clone();
        let response = self.transport.send(request).await?;
        if !response.ok() {
            tracing::warn!("{} answered {}", url, response.status);
        }
        Ok(response)
    }

    /// Invoke a server callback
    pub async fn callback(
        &self,
        name: &str,
        payload: &CallbackPayload,
        abort_previous: bool,
    ) -> NetResult<ServerReply> {
        let sealed = self.sealer.seal(name)?;
        let url = self.endpoint_url()?;
        tracing::debug!("server callback {} -> {}", name, url);
        let request = Request::post(url.as_str())
            .with_json(&payload.to_body(&sealed))
            .with_signal(self.signal(abort_previous));
        let response = self.send(request).await?;
        Ok(ServerReply::classify(&response.text()))
    }

    /// Re-render request sent after a callback to pick up the new body
    pub async fn refresh(&self) -> NetResult<ServerReply> {
        let url = self.location();
        let body = serde_json::json!({ "secondRequestC69CD": true });
        let request = Request::post(url.as_str())
            .with_json(&body)
            .with_signal(self.signal(true));
        let response = self.send(request).await?;
        Ok(page_reply(response.text()))
    }

    /// Fetch named `[pp-sync]` regions of the current page
    pub async fn sync(&self, names: &[String]) -> NetResult<SyncFragments> {
        let url = self.endpoint_url()?;
        tracing::debug!("sync {:?}", names);
        let request = Request::post(url.as_str())
            .with_json(&sync_body(names))
            .with_signal(self.signal(false));
        let response = self.send(request).await?;
        SyncFragments::decode(&response, names)
    }

    /// Fetch a full page for navigation, aborting any previous one
    pub async fn fetch_page(&self, href: &str) -> NetResult<(Url, ServerReply)> {
        let url = self.resolve(href)?;
        tracing::debug!("navigate {}", url);
        let request = Request::get(url.as_str())
            .navigation()
            .with_signal(self.signal(true));
        let response = self.send(request).await?;
        Ok((url, page_reply(response.text())))
    }
}

/// Whole pages only distinguish redirects from markup
fn page_reply(text: String) -> ServerReply {
    match redirect_target(&text) {
        Some(target) => ServerReply::Redirect(target.to_string()),
        None => ServerReply::Markup(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryTransport;

    fn client() -> NetClient<MemoryTransport> {
        let location = Url::parse("http://site.test/app/page").unwrap();
        NetClient::new(MemoryTransport::new(), location)
    }

    #[test]
    fn test_payload_body_shapes() {
        let payload = CallbackPayload::default()
            .with_field("email", Json::from("a@b.c"))
            .with_args(vec![Json::from(1), Json::from("x")]);
        assert_eq!(
            payload.to_body("Foo->save"),
            serde_json::json!({"callback": "Foo->save", "email": "a@b.c", "args": [1, "x"]})
        );
        let merged = CallbackPayload::default().with_args(vec![serde_json::json!({"id": 4})]);
        assert_eq!(
            merged.to_body("del"),
            serde_json::json!({"callback": "del", "id": 4})
        );
    }

    #[test]
    fn test_callback_posts_to_location() {
        let client = client();
        client.transport().reply_html(r#"{"success":true}"#);
        let reply = smol::block_on(client.callback("Todo->add", &CallbackPayload::default(), false)).unwrap();
        assert!(matches!(reply, ServerReply::Envelope { success: true, .. }));

        let sent = client.transport().last_request().unwrap();
        assert_eq!(sent.url, "http://site.test/app/page");
        assert_eq!(sent.header("X-Requested-With"), Some("XMLHttpRequest"));
        assert_eq!(sent.json_body().unwrap()["callback"], "Todo->add");
    }

    #[test]
    fn test_navigation_marks_partial_and_aborts_previous() {
        let client = client();
        client.transport().reply_html("<html><body>a</body></html>");
        client.transport().reply_html("redirect_7F834=/login");
        let first = smol::block_on(client.fetch_page("/one")).unwrap();
        assert_eq!(first.0.as_str(), "http://site.test/one");
        assert!(matches!(first.1, ServerReply::Markup(_)));

        let second = smol::block_on(client.fetch_page("two")).unwrap();
        assert_eq!(second.0.as_str(), "http://site.test/app/two");
        assert_eq!(second.1, ServerReply::Redirect("/login".into()));

        let sent = client.transport().requests();
        assert_eq!(sent[0].header("X-PPHP-Navigation"), Some("partial"));
        assert!(sent[0].is_aborted());
        assert!(!sent[1].is_aborted());
    }

    #[test]
    fn test_sync_uses_endpoint() {
        let client = client().with_endpoint("/sync");
        client
            .transport()
            .reply_json(&serde_json::json!({"fragments": {"users": "<b>2</b>"}}));
        let names = vec!["users".to_string()];
        let frags = smol::block_on(client.sync(&names)).unwrap();
        assert_eq!(frags.get("users"), Some("<b>2</b>"));
        let sent = client.transport().last_request().unwrap();
        assert_eq!(sent.url, "http://site.test/sync");
        assert_eq!(sent.json_body().unwrap()["selectors"], serde_json::json!(["users"]));
    }
}
