//! Transports
//!
//! [`Transport`] is the seam between the runtime and the network. The
//! runtime only ever awaits `send`; [`HttpTransport`] does real HTTP and
//! [`MemoryTransport`] serves canned replies.

use std::cell::RefCell;
use std::collections::VecDeque;

use url::Url;

use crate::{NetError, NetResult, Request, Response};

/// Sends one request and resolves to its response
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&self, request: Request) -> NetResult<Response>;
}

/// Blocking `reqwest` client run off the executor thread
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> NetResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("fOS-Hydrate/0.1")
            .build()
            .map_err(|e| NetError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> NetResult<Response> {
        if request.is_aborted() {
            return Err(NetError::Aborted);
        }
        let url = Url::parse(&request.url).map_err(|e| NetError::InvalidUrl(format!("{}: {e}", request.url)))?;
        tracing::debug!("HTTP {} {}", request.method.as_str(), url);

        let client = self.client.clone();
        let signal = request.signal.clone();
        let response = smol::unblock(move || execute(&client, url, request)).await?;

        // a request aborted while in flight resolves as aborted
        if signal.is_some_and(|s| s.is_aborted()) {
            return Err(NetError::Aborted);
        }
        Ok(response)
    }
}

fn execute(client: &reqwest::blocking::Client, url: Url, request: Request) -> NetResult<Response> {
    let method = match request.method {
        crate::Method::Get => reqwest::Method::GET,
        crate::Method::Post => reqwest::Method::POST,
    };
    let mut builder = client.request(method, url);
    for (key, value) in &request.headers {
        builder = builder.header(key.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }
    let resp = builder.send().map_err(|e| NetError::Network(e.to_string()))?;
    let status = resp.status().as_u16();
    let headers = resp
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    let body = resp
        .bytes()
        .map_err(|e| NetError::Network(e.to_string()))?
        .to_vec();
    Ok(Response {
        status,
        headers,
        body,
    })
}

/// In-memory transport: records requests and replays queued responses
#[derive(Debug, Default)]
pub struct MemoryTransport {
    replies: RefCell<VecDeque<NetResult<Response>>>,
    sent: RefCell<Vec<Request>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next request
    pub fn reply(&self, response: Response) -> &Self {
        self.replies.borrow_mut().push_back(Ok(response));
        self
    }

    pub fn reply_html(&self, markup: &str) -> &Self {
        self.reply(Response::new(200, markup).with_header("Content-Type", "text/html"))
    }

    pub fn reply_json(&self, json: &serde_json::Value) -> &Self {
        self.reply(Response::new(200, json.to_string()).with_header("Content-Type", "application/json"))
    }

    pub fn fail(&self, err: NetError) -> &Self {
        self.replies.borrow_mut().push_back(Err(err));
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.sent.borrow().clone()
    }

    pub fn last_request(&self) -> Option<Request> {
        self.sent.borrow().last().cloned()
    }
}

impl Transport for MemoryTransport {
    async fn send(&self, request: Request) -> NetResult<Response> {
        let aborted = request.is_aborted();
        self.sent.borrow_mut().push(request);
        if aborted {
            return Err(NetError::Aborted);
        }
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(NetError::Network("no reply queued".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_replays_in_order() {
        let transport = MemoryTransport::new();
        transport.reply_html("<p>one</p>").reply_html("<p>two</p>");
        smol::block_on(async {
            let a = transport.send(Request::get("http://x/a")).await.unwrap();
            let b = transport.send(Request::get("http://x/b")).await.unwrap();
            assert_eq!(a.text(), "<p>one</p>");
            assert_eq!(b.text(), "<p>two</p>");
            assert!(transport.send(Request::get("http://x/c")).await.is_err());
        });
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn test_aborted_before_send() {
        let transport = MemoryTransport::new();
        transport.reply_html("unused");
        let signal = crate::AbortSignal::new();
        signal.abort();
        let result = smol::block_on(transport.send(Request::get("http://x").with_signal(signal)));
        assert_eq!(result.unwrap_err(), NetError::Aborted);
    }

    #[test]
    fn test_http_rejects_bad_url() {
        let transport = HttpTransport::new().unwrap();
        let result = smol::block_on(transport.send(Request::get("not a url")));
        assert!(matches!(result, Err(NetError::InvalidUrl(_))));
    }
}
