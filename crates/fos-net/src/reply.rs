//! Server reply classification
//!
//! A callback or navigation reply is one of three things: a redirect
//! marker, a JSON envelope (possibly followed by markup), or plain markup.

use serde_json::{Map, Value as Json};

/// Token a server writes to request a client-side redirect
pub const REDIRECT_MARKER: &str = "redirect_7F834";

/// Target of `redirect_7F834=/path` inside a reply body
pub fn redirect_target(text: &str) -> Option<&str> {
    let start = text.find(REDIRECT_MARKER)? + REDIRECT_MARKER.len();
    let rest = text[start..].trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    if !rest.starts_with('/') {
        return None;
    }
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Outermost `{ ... }` span of a reply body
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Out-of-band patch on the element matching `selector`
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPatch {
    pub selector: String,
    /// Operation name to argument, in server order
    pub ops: Vec<(String, Json)>,
}

impl TargetPatch {
    fn from_json(value: &Json) -> Option<Self> {
        let object = value.as_object()?;
        let selector = object.get("id")?.as_str()?.to_string();
        let ops = object
            .iter()
            .filter(|(k, _)| k.as_str() != "id")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Some(Self { selector, ops })
    }

    pub fn op(&self, name: &str) -> Option<&Json> {
        self.ops.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// Classified reply
#[derive(Debug, Clone, PartialEq)]
pub enum ServerReply {
    Redirect(String),
    Envelope {
        success: bool,
        data: Map<String, Json>,
        targets: Vec<TargetPatch>,
        /// Markup surrounding the JSON
        remainder: String,
    },
    Markup(String),
}

impl ServerReply {
    pub fn classify(text: &str) -> Self {
        if let Some(target) = redirect_target(text) {
            return ServerReply::Redirect(target.to_string());
        }
        if let Some(json) = extract_json(text) {
            if let Ok(Json::Object(data)) = serde_json::from_str::<Json>(json) {
                let success = data.get("success").and_then(Json::as_bool).unwrap_or(false);
                let targets = data
                    .get("targets")
                    .and_then(Json::as_array)
                    .map(|list| list.iter().filter_map(TargetPatch::from_json).collect())
                    .unwrap_or_default();
                let remainder = text.replacen(json, "", 1).trim().to_string();
                return ServerReply::Envelope {
                    success,
                    data,
                    targets,
                    remainder,
                };
            }
            tracing::debug!("reply braces are not a JSON object, treating as markup");
        }
        ServerReply::Markup(text.to_string())
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, ServerReply::Redirect(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_marker() {
        assert_eq!(redirect_target("redirect_7F834 = /login?next=1 rest"), Some("/login?next=1"));
        assert_eq!(redirect_target("redirect_7F834=/"), Some("/"));
        assert_eq!(redirect_target("redirect_7F834=https://x"), None);
        assert_eq!(redirect_target("<p>hello</p>"), None);
        assert!(ServerReply::classify("<div>redirect_7F834=/home</div>").is_redirect());
    }

    #[test]
    fn test_envelope_with_targets() {
        let text = r##"{"success":true,"response":"ok","targets":[{"id":"#msg","textContent":"Saved"}]}<p>tail</p>"##;
        let ServerReply::Envelope { success, data, targets, remainder } = ServerReply::classify(text) else {
            panic!("expected envelope");
        };
        assert!(success);
        assert_eq!(data.get("response"), Some(&Json::from("ok")));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].selector, "#msg");
        assert_eq!(targets[0].op("textContent"), Some(&Json::from("Saved")));
        assert_eq!(remainder, "<p>tail</p>");
    }

    #[test]
    fn test_markup_fallback() {
        assert_eq!(
            ServerReply::classify("<p>{not json}</p>"),
            ServerReply::Markup("<p>{not json}</p>".into())
        );
        assert_eq!(ServerReply::classify("plain"), ServerReply::Markup("plain".into()));
    }
}
