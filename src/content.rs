// Body decoding - JSON when the content type says so, lossy text otherwise
use crate::models::Headers;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// A decoded message body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedContent {
    Json(Value),
    Text(String),
}

impl DecodedContent {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            DecodedContent::Json(value) => Some(value),
            DecodedContent::Text(_) => None,
        }
    }

    /// True for decoded JSON objects and arrays.
    pub fn is_json_container(&self) -> bool {
        matches!(
            self,
            DecodedContent::Json(Value::Object(_)) | DecodedContent::Json(Value::Array(_))
        )
    }

    pub fn into_value(self) -> Value {
        match self {
            DecodedContent::Json(value) => value,
            DecodedContent::Text(text) => Value::String(text),
        }
    }
}

pub fn is_json_content_type(headers: &Headers) -> bool {
    headers.content_type().to_lowercase().contains("json")
}

/// Decode a body using its headers. Never fails: unparsable JSON falls back to text.
pub fn decode(raw: &[u8], headers: &Headers) -> DecodedContent {
    let text = decode_text(raw);
    if !is_json_content_type(headers) {
        return DecodedContent::Text(text);
    }

    match serde_json::from_str(&text) {
        Ok(value) => DecodedContent::Json(value),
        Err(e) => {
            debug!("JSON content type but body did not parse: {}", e);
            DecodedContent::Text(text)
        }
    }
}

/// Best-effort UTF-8 decode that replaces invalid sequences.
pub fn decode_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}
