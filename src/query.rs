// Query operations over captured sessions - the four tool-facing entry points
use crate::content::{decode, decode_text};
use crate::error::QueryError;
use crate::json_utils::{self, summarize};
use crate::models::{Flow, Headers};
use crate::protection::{analyze_flow, ProtectionAnalysis};
use crate::store::FlowStore;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

const TRUNCATION_MARKER: &str = " ...[truncated]";
const PREVIEW_NOTE: &str =
    "Content too large to display. Use extract_json_fields tool to get specific values.";

/// Tunables shared by every query.
#[derive(Debug, Clone)]
pub struct QuerySettings {
    /// Bodies above this many bytes are previewed or truncated.
    pub max_content_size: usize,
    pub preview_depth: usize,
    /// Session used when a call omits `session_id`.
    pub default_session: String,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            max_content_size: 9_999_999,
            preview_depth: json_utils::DEFAULT_PREVIEW_DEPTH,
            default_session: "capture.har".to_string(),
        }
    }
}

/// One extracted value, reported in the order its path was requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedField {
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSummary {
    pub index: usize,
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowDetails {
    pub index: usize,
    pub method: String,
    pub url: String,
    pub request_headers: Map<String, Value>,
    pub status: Option<u16>,
    pub response_headers: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_content_preview: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_content_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_content_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content_preview: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_content_note: Option<String>,
}

/// One element of a details call: the flow, or why it could not be shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlowDetailsEntry {
    Details(Box<FlowDetails>),
    Error { error: String },
}

/// Which side of the exchange a JSON extraction reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Request,
    Response,
}

impl ContentSource {
    pub fn from_str(s: &str) -> Result<Self, QueryError> {
        match s {
            "request" => Ok(ContentSource::Request),
            "response" => Ok(ContentSource::Response),
            _ => Err(QueryError::invalid(
                "Invalid content_type. Must be 'request' or 'response'",
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContentSource::Request => "request",
            ContentSource::Response => "response",
        }
    }
}

#[derive(Default)]
struct BodyView {
    content: Option<Value>,
    preview: Option<Value>,
    size: Option<usize>,
    note: Option<String>,
}

pub struct QueryService {
    store: Arc<FlowStore>,
    settings: QuerySettings,
}

impl QueryService {
    pub fn new(store: Arc<FlowStore>, settings: QuerySettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &FlowStore {
        &self.store
    }

    pub fn settings(&self) -> &QuerySettings {
        &self.settings
    }

    /// Index, method, URL and status of every HTTP flow in the session.
    pub fn list_flows(&self, session_id: &str) -> Result<Vec<FlowSummary>, QueryError> {
        let flows = self.store.load(session_id)?;
        Ok(flows
            .iter()
            .filter(|flow| flow.is_http())
            .map(|flow| FlowSummary {
                index: flow.index,
                method: flow.request.method.clone(),
                url: flow.request.url.clone(),
                status: flow.status_code(),
            })
            .collect())
    }

    /// Headers and bodies for the requested flows. Bad indexes become inline errors.
    pub fn get_flow_details(
        &self,
        session_id: &str,
        flow_indexes: &[usize],
        include_content: bool,
    ) -> Result<Vec<FlowDetailsEntry>, QueryError> {
        if flow_indexes.is_empty() {
            return Err(QueryError::invalid("Missing flow_indexes"));
        }

        let flows = self.store.load(session_id)?;
        Ok(flow_indexes
            .iter()
            .map(|&index| match flows.get(index) {
                None => FlowDetailsEntry::Error {
                    error: QueryError::FlowNotFound(index).to_string(),
                },
                Some(flow) if !flow.is_http() => FlowDetailsEntry::Error {
                    error: format!("Flow {} is not an HTTP flow", index),
                },
                Some(flow) => {
                    FlowDetailsEntry::Details(Box::new(self.flow_details(flow, include_content)))
                }
            })
            .collect())
    }

    fn flow_details(&self, flow: &Flow, include_content: bool) -> FlowDetails {
        let response = flow.response.as_ref();
        let (request_body, response_body) = if include_content {
            (
                self.render_body("Request", &flow.request.body, &flow.request.headers),
                response
                    .map(|r| self.render_body("Response", &r.body, &r.headers))
                    .unwrap_or_default(),
            )
        } else {
            (BodyView::default(), BodyView::default())
        };

        FlowDetails {
            index: flow.index,
            method: flow.request.method.clone(),
            url: flow.request.url.clone(),
            request_headers: flow.request.headers.to_map(),
            status: flow.status_code(),
            response_headers: response.map(|r| r.headers.to_map()),
            request_content: request_body.content,
            request_content_preview: request_body.preview,
            request_content_size: request_body.size,
            request_content_note: request_body.note,
            response_content: response_body.content,
            response_content_preview: response_body.preview,
            response_content_size: response_body.size,
            response_content_note: response_body.note,
        }
    }

    fn render_body(&self, label: &str, raw: &[u8], headers: &Headers) -> BodyView {
        let limit = self.settings.max_content_size;
        if raw.len() <= limit {
            return BodyView {
                content: Some(decode(raw, headers).into_value()),
                ..BodyView::default()
            };
        }

        let decoded = decode(raw, headers);
        if decoded.is_json_container() {
            debug!("{} body of {} bytes replaced by structure preview", label, raw.len());
            let preview = decoded
                .as_json()
                .map(|value| summarize(value, self.settings.preview_depth));
            return BodyView {
                preview,
                size: Some(raw.len()),
                note: Some(PREVIEW_NOTE.to_string()),
                ..BodyView::default()
            };
        }

        let mut text = decode_text(&raw[..limit]);
        text.push_str(TRUNCATION_MARKER);
        BodyView {
            content: Some(Value::String(text)),
            note: Some(format!("{} content truncated to {} bytes.", label, limit)),
            ..BodyView::default()
        }
    }

    /// Evaluate path expressions against one side of a flow's JSON body.
    pub fn extract_json_fields(
        &self,
        session_id: &str,
        flow_index: usize,
        source: ContentSource,
        json_paths: &[String],
    ) -> Result<Vec<ExtractedField>, QueryError> {
        if json_paths.is_empty() {
            return Err(QueryError::invalid("Missing json_paths"));
        }

        let flows = self.store.load(session_id)?;
        let flow = http_flow(&flows, flow_index)?;

        let (raw, headers) = match source {
            ContentSource::Request => (&flow.request.body, &flow.request.headers),
            ContentSource::Response => {
                let response = flow.response.as_ref().ok_or_else(|| {
                    QueryError::invalid(format!("Flow {} has no response", flow_index))
                })?;
                (&response.body, &response.headers)
            }
        };

        let decoded = decode(raw, headers);
        let json = match decoded.as_json() {
            Some(value) if decoded.is_json_container() => value,
            _ => {
                return Err(QueryError::invalid(format!(
                    "The {} content is not valid JSON",
                    source.name()
                )))
            }
        };

        Ok(json_paths
            .iter()
            .map(|path| {
                let value = json_utils::extract(json, path).unwrap_or(Value::Null);
                ExtractedField {
                    path: path.clone(),
                    value,
                }
            })
            .collect())
    }

    /// Full protection analysis for one flow.
    pub fn analyze_protection(
        &self,
        session_id: &str,
        flow_index: usize,
        extract_scripts: bool,
    ) -> Result<ProtectionAnalysis, QueryError> {
        let flows = self.store.load(session_id)?;
        let flow = http_flow(&flows, flow_index)?;
        Ok(analyze_flow(flow, extract_scripts))
    }

    /// Dispatch a tool call by name. Failures come back as an error payload, never as `Err`.
    pub fn call(&self, tool: &str, arguments: &Value) -> Value {
        match self.try_call(tool, arguments) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("{} failed: {}", tool, e);
                error_payload(&e)
            }
        }
    }

    pub fn try_call(&self, tool: &str, args: &Value) -> Result<Value, QueryError> {
        let session = self.session_arg(args)?;

        match tool {
            "list_flows" => to_value(&self.list_flows(&session)?),
            "get_flow_details" => {
                let indexes = index_list_arg(args, "flow_indexes")?;
                let include_content = bool_arg(args, "include_content", true)?;
                to_value(&self.get_flow_details(&session, &indexes, include_content)?)
            }
            "extract_json_fields" => {
                let index = index_arg(args, "flow_index")?;
                let source = ContentSource::from_str(required_str(args, "content_type")?)?;
                let paths = string_list_arg(args, "json_paths")?;
                to_value(&self.extract_json_fields(&session, index, source, &paths)?)
            }
            "analyze_protection" => {
                let index = index_arg(args, "flow_index")?;
                let extract_scripts = bool_arg(args, "extract_scripts", true)?;
                to_value(&self.analyze_protection(&session, index, extract_scripts)?)
            }
            other => Err(QueryError::invalid(format!("Unknown tool: {}", other))),
        }
    }

    fn session_arg(&self, args: &Value) -> Result<String, QueryError> {
        match args.get("session_id") {
            None | Some(Value::Null) => Ok(self.settings.default_session.clone()),
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
            Some(_) => Err(QueryError::invalid("Missing session_id")),
        }
    }
}

pub fn error_payload(error: &QueryError) -> Value {
    json!({
        "error": error.to_string(),
        "kind": error.kind(),
    })
}

fn http_flow(flows: &[Flow], index: usize) -> Result<&Flow, QueryError> {
    let flow = flows.get(index).ok_or(QueryError::FlowNotFound(index))?;
    if !flow.is_http() {
        return Err(QueryError::invalid(format!(
            "Flow {} is not an HTTP flow",
            index
        )));
    }
    Ok(flow)
}

fn to_value<T: Serialize>(payload: &T) -> Result<Value, QueryError> {
    Ok(serde_json::to_value(payload)?)
}

fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, QueryError> {
    args.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| QueryError::invalid(format!("Missing {}", name)))
}

fn index_arg(args: &Value, name: &str) -> Result<usize, QueryError> {
    let value = args
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| QueryError::invalid(format!("Missing {}", name)))?;
    as_index(value, name)
}

fn as_index(value: &Value, name: &str) -> Result<usize, QueryError> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            QueryError::invalid(format!("{} must be a non-negative integer", name))
        })
}

fn index_list_arg(args: &Value, name: &str) -> Result<Vec<usize>, QueryError> {
    match args.get(name) {
        Some(Value::Array(items)) if !items.is_empty() => {
            items.iter().map(|v| as_index(v, name)).collect()
        }
        _ => Err(QueryError::invalid(format!("Missing {}", name))),
    }
}

fn string_list_arg(args: &Value, name: &str) -> Result<Vec<String>, QueryError> {
    match args.get(name) {
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| QueryError::invalid(format!("{} must contain strings", name)))
            })
            .collect(),
        _ => Err(QueryError::invalid(format!("Missing {}", name))),
    }
}

fn bool_arg(args: &Value, name: &str, default: bool) -> Result<bool, QueryError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(QueryError::invalid(format!("{} must be a boolean", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn service_with(lines: &[Value], settings: QuerySettings) -> (TempDir, QueryService) {
        let dir = TempDir::new().unwrap();
        let body: String = lines.iter().map(|l| format!("{}\n", l)).collect();
        fs::write(dir.path().join("session.jsonl"), body).unwrap();
        let service = QueryService::new(Arc::new(FlowStore::new(dir.path())), settings);
        (dir, service)
    }

    fn sample_lines() -> Vec<Value> {
        vec![
            json!({
                "request": {
                    "method": "POST",
                    "url": "https://api.test/users",
                    "headers": [["Content-Type", "application/json"]],
                    "body": "{\"name\":\"ann\",\"tags\":[\"a\",\"b\"]}"
                },
                "response": {
                    "status": 201,
                    "headers": [["Content-Type", "application/json"]],
                    "body": "{\"data\":{\"id\":7,\"roles\":[{\"name\":\"admin\"}]},\"meta\":{\"page\":{\"n\":1}}}"
                }
            }),
            json!({"type": "websocket", "request": {"url": "wss://api.test/live"}}),
            json!({
                "request": {"method": "GET", "url": "https://shop.test/"},
                "response": {
                    "status": 403,
                    "headers": {"Content-Type": "text/html", "cf-ray": "1"},
                    "body": "<html>Please verify you are human</html>"
                }
            }),
            json!({"request": {"method": "GET", "url": "https://slow.test/"}}),
        ]
    }

    fn sample_service() -> (TempDir, QueryService) {
        service_with(&sample_lines(), QuerySettings::default())
    }

    #[test]
    fn test_list_flows_skips_non_http() {
        let (_dir, service) = sample_service();
        let flows = service.list_flows("session").unwrap();

        let indexes: Vec<usize> = flows.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![0, 2, 3]);
        assert_eq!(flows[0].status, Some(201));
        assert_eq!(flows[2].status, None);
    }

    #[test]
    fn test_details_inline_errors() {
        let (_dir, service) = sample_service();
        let details = service.get_flow_details("session", &[0, 1, 9], true).unwrap();

        match &details[0] {
            FlowDetailsEntry::Details(d) => {
                assert_eq!(d.request_content, Some(json!({"name": "ann", "tags": ["a", "b"]})));
                assert_eq!(d.response_content.as_ref().unwrap()["data"]["id"], 7);
                assert!(d.request_content_preview.is_none());
            }
            other => panic!("expected details, got {:?}", other),
        }
        assert_eq!(
            details[1],
            FlowDetailsEntry::Error { error: "Flow 1 is not an HTTP flow".into() }
        );
        assert_eq!(
            details[2],
            FlowDetailsEntry::Error { error: "Flow index 9 out of range".into() }
        );
    }

    #[test]
    fn test_details_without_content_or_response() {
        let (_dir, service) = sample_service();
        let details = service.get_flow_details("session", &[0, 3], false).unwrap();

        let value = serde_json::to_value(&details).unwrap();
        assert!(value[0].get("request_content").is_none());
        assert!(value[0].get("response_content").is_none());
        assert_eq!(value[1]["status"], Value::Null);
        assert_eq!(value[1]["response_headers"], Value::Null);
    }

    #[test]
    fn test_oversized_bodies() {
        let settings = QuerySettings {
            max_content_size: 20,
            ..QuerySettings::default()
        };
        let (_dir, service) = service_with(&sample_lines(), settings);
        let details = service.get_flow_details("session", &[0, 2], true).unwrap();
        let value = serde_json::to_value(&details).unwrap();

        let first = &value[0];
        assert!(first.get("response_content").is_none());
        assert_eq!(
            first["response_content_preview"],
            json!({"data": {"id": "(integer)", "roles": "[1 items]"}, "meta": {"page": {"...": "1 keys"}}})
        );
        assert_eq!(first["response_content_note"], PREVIEW_NOTE);
        assert!(first["response_content_size"].as_u64().unwrap() > 20);

        let html = &value[1];
        assert_eq!(html["response_content"], "<html>Please verify  ...[truncated]");
        assert_eq!(
            html["response_content_note"],
            "Response content truncated to 20 bytes."
        );
        assert!(html.get("response_content_preview").is_none());
    }

    #[test]
    fn test_extract_json_fields() {
        let (_dir, service) = sample_service();
        let paths = vec![
            "$.data.roles[0].name".to_string(),
            "$.data.missing".to_string(),
            "$".to_string(),
        ];

        let fields = service
            .extract_json_fields("session", 0, ContentSource::Response, &paths)
            .unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].path, "$.data.roles[0].name");
        assert_eq!(fields[0].value, json!("admin"));
        assert_eq!(fields[1].value, Value::Null);
        assert_eq!(fields[2].value["meta"]["page"]["n"], 1);
    }

    #[test]
    fn test_extract_json_fields_keeps_request_order() {
        let (_dir, service) = sample_service();
        let paths = vec![
            "$.meta".to_string(),
            "$.data.roles[0].name".to_string(),
            "$".to_string(),
            "$.data.missing".to_string(),
        ];

        let fields = service
            .extract_json_fields("session", 0, ContentSource::Response, &paths)
            .unwrap();
        let order: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(order, vec!["$.meta", "$.data.roles[0].name", "$", "$.data.missing"]);

        let result = service.call(
            "extract_json_fields",
            &json!({
                "session_id": "session",
                "flow_index": 0,
                "content_type": "response",
                "json_paths": paths,
            }),
        );
        let listed = result.as_array().unwrap();
        assert_eq!(listed.len(), 4);
        assert_eq!(listed[0]["path"], "$.meta");
        assert_eq!(listed[1]["value"], "admin");
        assert_eq!(listed[2]["path"], "$");
        assert_eq!(listed[3]["value"], Value::Null);
    }

    #[test]
    fn test_extract_json_fields_errors() {
        let (_dir, service) = sample_service();
        let paths = vec!["$.a".to_string()];

        let err = service
            .extract_json_fields("session", 2, ContentSource::Response, &paths)
            .unwrap_err();
        assert_eq!(err.to_string(), "The response content is not valid JSON");

        let err = service
            .extract_json_fields("session", 3, ContentSource::Response, &paths)
            .unwrap_err();
        assert_eq!(err.to_string(), "Flow 3 has no response");

        let err = service
            .extract_json_fields("session", 1, ContentSource::Request, &paths)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");

        let err = service
            .extract_json_fields("session", 40, ContentSource::Request, &paths)
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_call_returns_payloads_for_failures() {
        let (_dir, service) = sample_service();

        let missing = service.call("analyze_protection", &json!({"session_id": "session"}));
        assert_eq!(missing, json!({"error": "Missing flow_index", "kind": "invalid_argument"}));

        let bad_source = service.call(
            "extract_json_fields",
            &json!({"session_id": "session", "flow_index": 0, "content_type": "body", "json_paths": ["$"]}),
        );
        assert_eq!(bad_source["kind"], "invalid_argument");

        let no_session = service.call("list_flows", &json!({"session_id": "other"}));
        assert_eq!(no_session["kind"], "not_found");

        let unknown = service.call("delete_flows", &json!({"session_id": "session"}));
        assert_eq!(unknown["error"], "Unknown tool: delete_flows");
    }

    #[test]
    fn test_call_analyze_protection() {
        let (_dir, service) = sample_service();
        let result = service.call(
            "analyze_protection",
            &json!({"session_id": "session", "flow_index": 2}),
        );

        assert_eq!(result["flow_index"], 2);
        assert_eq!(result["challenge_analysis"]["is_challenge"], true);
        assert_eq!(result["challenge_analysis"]["challenge_type"], "other");
        assert_eq!(result["protection_systems"][0]["vendor"], "Generic Bot Detection");
        assert_eq!(result["protection_systems"][1]["vendor"], "Cloudflare");
        assert_eq!(result["scripts"], json!([]));
    }

    #[test]
    fn test_call_uses_default_session() {
        let settings = QuerySettings {
            default_session: "session".to_string(),
            ..QuerySettings::default()
        };
        let (_dir, service) = service_with(&sample_lines(), settings);

        let listed = service.call("list_flows", &json!({}));
        assert_eq!(listed.as_array().unwrap().len(), 3);
        assert_eq!(service.store().load_count(), 1);
    }
}
