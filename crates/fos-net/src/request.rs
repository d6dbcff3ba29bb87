//! Outgoing requests

use crate::{AbortSignal, NAVIGATION_HEADER, REQUESTED_WITH};

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Request configuration
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub signal: Option<AbortSignal>,
}

impl Request {
    pub fn get(url: &str) -> Self {
        Self {
            method: Method::Get,
            url: url.to_string(),
            ..Default::default()
        }
        .with_header(REQUESTED_WITH.0, REQUESTED_WITH.1)
    }

    pub fn post(url: &str) -> Self {
        Self {
            method: Method::Post,
            url: url.to_string(),
            ..Default::default()
        }
        .with_header(REQUESTED_WITH.0, REQUESTED_WITH.1)
    }

    /// Set a header, replacing any previous value
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        self.headers.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_json(self, json: &serde_json::Value) -> Self {
        self.with_header("Content-Type", "application/json")
            .with_body(json.to_string().into_bytes())
    }

    pub fn with_signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Mark as a partial navigation fetch
    pub fn navigation(self) -> Self {
        self.with_header(NAVIGATION_HEADER.0, NAVIGATION_HEADER.1)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.as_ref().is_some_and(AbortSignal::is_aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = Request::get("https://example.com").with_header("Accept", "text/html");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.header("accept"), Some("text/html"));
        assert_eq!(req.header("X-Requested-With"), Some("XMLHttpRequest"));
        assert_eq!(req.header("X-PPHP-Navigation"), None);
    }

    #[test]
    fn test_post_json() {
        let req = Request::post("https://api.example.com")
            .with_json(&serde_json::json!({"key": "value"}))
            .navigation();
        assert_eq!(req.method.as_str(), "POST");
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("x-pphp-navigation"), Some("partial"));
        assert_eq!(req.json_body(), Some(serde_json::json!({"key": "value"})));
    }

    #[test]
    fn test_header_replaced() {
        let req = Request::get("/").with_header("Accept", "a").with_header("accept", "b");
        assert_eq!(req.headers.iter().filter(|(k, _)| k.eq_ignore_ascii_case("accept")).count(), 1);
        assert_eq!(req.header("Accept"), Some("b"));
    }
}
