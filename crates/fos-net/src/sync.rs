//! Partial sync codec
//!
//! A sync request names `[pp-sync="name"]` regions; the reply is either
//! raw markup for a single region or `{"fragments": {name: markup}}`.

use serde::{Deserialize, Serialize};

use crate::{NetError, NetResult, Response};

/// Region refreshed when no names are given
pub const DEFAULT_SYNC_NAME: &str = "true";

#[derive(Serialize)]
struct SyncBody<'a> {
    #[serde(rename = "pphpSync71163")]
    sync: bool,
    selectors: &'a [String],
    #[serde(rename = "secondRequestC69CD")]
    second_request: bool,
}

/// JSON body of a sync request
pub fn sync_body(names: &[String]) -> serde_json::Value {
    let body = SyncBody {
        sync: true,
        selectors: names,
        second_request: true,
    };
    serde_json::to_value(body).unwrap_or_default()
}

#[derive(Deserialize)]
struct FragmentsReply {
    fragments: serde_json::Map<String, serde_json::Value>,
}

/// Fragments returned by a sync, in request order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncFragments(Vec<(String, String)>);

impl SyncFragments {
    /// Decode a reply for the requested `names`
    pub fn decode(response: &Response, names: &[String]) -> NetResult<Self> {
        if !response.is_json() {
            let name = names
                .first()
                .cloned()
                .unwrap_or_else(|| DEFAULT_SYNC_NAME.to_string());
            return Ok(Self(vec![(name, response.text())]));
        }
        let reply: FragmentsReply = response.json()?;
        let mut out = Vec::with_capacity(reply.fragments.len());
        for name in names {
            if let Some(markup) = reply.fragments.get(name) {
                let markup = markup
                    .as_str()
                    .ok_or_else(|| NetError::Decode(format!("fragment '{name}' is not a string")))?;
                out.push((name.clone(), markup.to_string()));
            }
        }
        Ok(Self(out))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, m)| m.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, m)| (n.as_str(), m.as_str()))
    }

    /// All fragments concatenated into one `<body>`
    pub fn stub_document(&self) -> String {
        let mut out = String::from("<body>");
        for (_, markup) in &self.0 {
            out.push_str(markup);
        }
        out.push_str("</body>");
        out
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_body_markers() {
        let body = sync_body(&names(&["users", "stats"]));
        assert_eq!(body["pphpSync71163"], true);
        assert_eq!(body["secondRequestC69CD"], true);
        assert_eq!(body["selectors"], serde_json::json!(["users", "stats"]));
    }

    #[test]
    fn test_single_raw_fragment() {
        let resp = Response::new(200, "<div pp-sync=\"users\">3</div>").with_header("Content-Type", "text/html");
        let frags = SyncFragments::decode(&resp, &names(&["users"])).unwrap();
        assert_eq!(frags.get("users"), Some("<div pp-sync=\"users\">3</div>"));
    }

    #[test]
    fn test_fragment_map_in_request_order() {
        let resp = Response::new(200, r#"{"fragments":{"b":"<i>b</i>","a":"<i>a</i>"}}"#)
            .with_header("Content-Type", "application/json");
        let frags = SyncFragments::decode(&resp, &names(&["b", "a", "missing"])).unwrap();
        assert_eq!(frags.len(), 2);
        assert_eq!(frags.stub_document(), "<body><i>b</i><i>a</i></body>");
    }

    #[test]
    fn test_bad_fragment_map() {
        let resp = Response::new(200, r#"{"nope":1}"#).with_header("Content-Type", "application/json");
        assert!(matches!(
            SyncFragments::decode(&resp, &names(&["a"])),
            Err(NetError::Decode(_))
        ));
    }
}
