//! fOS Networking
//!
//! The hydration runtime's view of the server: requests it sends for
//! callbacks, partial syncs and navigation, and how it reads the replies.

mod abort;
mod client;
mod reply;
mod request;
mod seal;
mod sync;
mod transport;

pub use abort::{AbortSignal, RequestTracker};
pub use client::{CallbackPayload, NetClient};
pub use reply::{REDIRECT_MARKER, ServerReply, TargetPatch, extract_json, redirect_target};
pub use request::{Method, Request};
pub use seal::CallbackSealer;
pub use sync::{DEFAULT_SYNC_NAME, SyncFragments, sync_body};
pub use transport::{HttpTransport, MemoryTransport, Transport};
pub use url::Url;

/// Header set on every request the runtime makes
pub const REQUESTED_WITH: (&str, &str) = ("X-Requested-With", "XMLHttpRequest");

/// Header marking a partial navigation request
pub const NAVIGATION_HEADER: (&str, &str) = ("X-PPHP-Navigation", "partial");

/// HTTP Response
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    /// Check if response is OK (2xx)
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.contains("application/json"))
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::Decode(e.to_string()))
    }
}

/// Network error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetError {
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request aborted")]
    Aborted,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Callback sealing failed: {0}")]
    Seal(String),
}

pub type NetResult<T> = Result<T, NetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_headers() {
        let resp = Response::new(200, "{}").with_header("Content-Type", "application/json; charset=utf-8");
        assert!(resp.ok());
        assert!(resp.is_json());
        assert_eq!(resp.header("content-type"), Some("application/json; charset=utf-8"));
        assert_eq!(resp.header("x-missing"), None);
    }

    #[test]
    fn test_response_text_lossy() {
        let resp = Response::new(500, vec![b'o', b'k', 0xff]);
        assert!(!resp.ok());
        assert_eq!(resp.text(), "ok\u{fffd}");
    }
}
