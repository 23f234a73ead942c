// Recorded traffic model - flows, requests, responses and their headers
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a recorded exchange. Only `Http` flows can be inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Http,
    #[serde(untagged)]
    Other(String),
}

impl FlowKind {
    pub fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("http") {
            FlowKind::Http
        } else {
            FlowKind::Other(s.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FlowKind::Http => "http",
            FlowKind::Other(name) => name,
        }
    }
}

/// Header list in the order it was recorded.
///
/// Names are stored exactly as captured; lookups that need HTTP semantics use
/// the `*_ignore_case` helpers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn get_all_ignore_case<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn contains_ignore_case(&self, name: &str) -> bool {
        self.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// `Content-Type` value, or an empty string when absent.
    pub fn content_type(&self) -> &str {
        self.get_ignore_case("Content-Type").unwrap_or("")
    }

    /// Collapse into a JSON object. Repeated names (compared case-insensitively)
    /// are joined with `", "` under the first spelling seen.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for (k, v) in self.iter() {
            let existing = map.keys().find(|name| name.eq_ignore_ascii_case(k)).cloned();
            match existing {
                Some(name) => {
                    if let Some(Value::String(joined)) = map.get_mut(&name) {
                        joined.push_str(", ");
                        joined.push_str(v);
                    }
                }
                None => {
                    map.insert(k.to_string(), Value::String(v.to_string()));
                }
            }
        }
        map
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    #[serde(default)]
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status_code: u16,
    pub headers: Headers,
    #[serde(default)]
    pub body: Vec<u8>,
}

/// One recorded request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    /// Zero-based position within the capture.
    pub index: usize,
    pub kind: FlowKind,
    pub request: Request,
    pub response: Option<Response>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Flow {
    pub fn is_http(&self) -> bool {
        self.kind == FlowKind::Http
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_case() {
        let headers: Headers = vec![("content-type", "text/html"), ("X-Trace", "1")]
            .into_iter()
            .collect();

        assert_eq!(headers.get("Content-Type"), None);
        assert_eq!(headers.get_ignore_case("Content-Type"), Some("text/html"));
        assert_eq!(headers.content_type(), "text/html");
        assert!(headers.contains_ignore_case("x-trace"));
    }

    #[test]
    fn test_header_map_joins_repeats() {
        let headers: Headers = vec![
            ("Set-Cookie", "datadome=1"),
            ("Content-Type", "text/html"),
            ("set-cookie", "datadome=2"),
        ]
        .into_iter()
        .collect();

        assert_eq!(headers.get_all_ignore_case("set-cookie").count(), 2);
        let map = headers.to_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["Set-Cookie"], "datadome=1, datadome=2");
        assert_eq!(map["Content-Type"], "text/html");
    }

    #[test]
    fn test_flow_kind() {
        assert_eq!(FlowKind::from_str("HTTP"), FlowKind::Http);
        assert_eq!(FlowKind::from_str("tcp").name(), "tcp");
    }
}
