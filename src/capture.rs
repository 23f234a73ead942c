// Capture file readers - HAR archives and JSON Lines flow dumps
use crate::error::CaptureError;
use crate::models::{Flow, FlowKind, Headers, Request, Response};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Har,
    JsonLines,
}

impl CaptureFormat {
    /// Pick a format from the file extension, falling back to sniffing the content.
    pub fn detect(path: &Path, bytes: &[u8]) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("har") => return CaptureFormat::Har,
            Some("jsonl") | Some("ndjson") => return CaptureFormat::JsonLines,
            _ => {}
        }
        Self::sniff(bytes)
    }

    fn sniff(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') {
            // A HAR document is a single object with a top-level "log" key;
            // a JSON Lines dump starts with a flow record instead.
            if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(trimmed) {
                if map.contains_key("log") {
                    return CaptureFormat::Har;
                }
            }
        }
        CaptureFormat::JsonLines
    }
}

/// Read and parse a capture file into an ordered flow list.
pub fn read_capture(path: &Path) -> Result<Vec<Flow>, CaptureError> {
    let bytes = fs::read(path)?;
    let format = CaptureFormat::detect(path, &bytes);
    debug!("Parsing {} as {:?} ({} bytes)", path.display(), format, bytes.len());
    parse_capture(&bytes, format)
}

pub fn parse_capture(bytes: &[u8], format: CaptureFormat) -> Result<Vec<Flow>, CaptureError> {
    match format {
        CaptureFormat::Har => parse_har(bytes),
        CaptureFormat::JsonLines => parse_json_lines(bytes),
    }
}

// ---------------------------------------------------------------------------
// HAR
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct HarFile {
    log: HarLog,
}

#[derive(Deserialize)]
struct HarLog {
    #[serde(default)]
    entries: Vec<HarEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarEntry {
    started_date_time: Option<String>,
    request: HarRequest,
    response: Option<HarResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarRequest {
    method: String,
    url: String,
    #[serde(default)]
    headers: Vec<HarHeader>,
    post_data: Option<HarBody>,
}

#[derive(Deserialize)]
struct HarResponse {
    status: i64,
    #[serde(default)]
    headers: Vec<HarHeader>,
    content: Option<HarBody>,
}

#[derive(Deserialize)]
struct HarHeader {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct HarBody {
    text: Option<String>,
    encoding: Option<String>,
}

impl HarBody {
    fn into_bytes(self, record: usize) -> Result<Vec<u8>, CaptureError> {
        let text = self.text.unwrap_or_default();
        match self.encoding.as_deref() {
            Some(enc) if enc.eq_ignore_ascii_case("base64") => decode_base64(&text, record),
            _ => Ok(text.into_bytes()),
        }
    }
}

fn parse_har(bytes: &[u8]) -> Result<Vec<Flow>, CaptureError> {
    let har: HarFile = serde_json::from_slice(bytes).map_err(|e| CaptureError::Malformed {
        record: 0,
        message: e.to_string(),
    })?;

    har.log
        .entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| har_entry_to_flow(index, entry))
        .collect()
}

fn har_entry_to_flow(index: usize, entry: HarEntry) -> Result<Flow, CaptureError> {
    let request = Request {
        method: entry.request.method,
        url: entry.request.url,
        headers: entry
            .request
            .headers
            .into_iter()
            .map(|h| (h.name, h.value))
            .collect(),
        body: match entry.request.post_data {
            Some(body) => body.into_bytes(index)?,
            None => Vec::new(),
        },
    };

    // HAR records a missing response as status 0
    let response = match entry.response {
        Some(resp) if resp.status != 0 => Some(Response {
            status_code: status_code(resp.status, index)?,
            headers: resp.headers.into_iter().map(|h| (h.name, h.value)).collect(),
            body: match resp.content {
                Some(body) => body.into_bytes(index)?,
                None => Vec::new(),
            },
        }),
        _ => None,
    };

    Ok(Flow {
        index,
        kind: FlowKind::Http,
        request,
        response,
        started_at: entry.started_date_time.as_deref().and_then(parse_timestamp),
    })
}

// ---------------------------------------------------------------------------
// JSON Lines
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct LineRecord {
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    request: LineMessage,
    #[serde(default)]
    response: Option<LineMessage>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Request or response half of a JSON Lines record.
#[derive(Deserialize)]
struct LineMessage {
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    headers: HeaderList,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    body_base64: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderList {
    Pairs(Vec<(String, String)>),
    Map(BTreeMap<String, String>),
}

impl Default for HeaderList {
    fn default() -> Self {
        HeaderList::Pairs(Vec::new())
    }
}

impl From<HeaderList> for Headers {
    fn from(list: HeaderList) -> Self {
        match list {
            HeaderList::Pairs(pairs) => pairs.into_iter().collect(),
            HeaderList::Map(map) => map.into_iter().collect(),
        }
    }
}

fn default_kind() -> String {
    "http".to_string()
}

impl LineMessage {
    fn body_bytes(&mut self, record: usize) -> Result<Vec<u8>, CaptureError> {
        if let Some(encoded) = self.body_base64.take() {
            return decode_base64(&encoded, record);
        }
        Ok(self.body.take().unwrap_or_default().into_bytes())
    }
}

fn parse_json_lines(bytes: &[u8]) -> Result<Vec<Flow>, CaptureError> {
    let text = String::from_utf8_lossy(bytes);
    let mut flows = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let record: LineRecord =
            serde_json::from_str(line).map_err(|e| CaptureError::Malformed {
                record: line_no + 1,
                message: e.to_string(),
            })?;

        let index = flows.len();
        flows.push(line_record_to_flow(index, line_no + 1, record)?);
    }

    Ok(flows)
}

fn line_record_to_flow(index: usize, line_no: usize, record: LineRecord) -> Result<Flow, CaptureError> {
    let mut req = record.request;
    let body = req.body_bytes(line_no)?;
    let request = Request {
        method: req.method.take().unwrap_or_else(|| "GET".to_string()),
        url: req.url.take().ok_or_else(|| CaptureError::Malformed {
            record: line_no,
            message: "request is missing `url`".to_string(),
        })?,
        headers: std::mem::take(&mut req.headers).into(),
        body,
    };

    let response = match record.response {
        Some(mut resp) => {
            let status = resp.status.ok_or_else(|| CaptureError::Malformed {
                record: line_no,
                message: "response is missing `status`".to_string(),
            })?;
            let body = resp.body_bytes(line_no)?;
            Some(Response {
                status_code: status_code(status, line_no)?,
                headers: std::mem::take(&mut resp.headers).into(),
                body,
            })
        }
        None => None,
    };

    Ok(Flow {
        index,
        kind: FlowKind::from_str(&record.kind),
        request,
        response,
        started_at: record.timestamp.as_deref().and_then(parse_timestamp),
    })
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn decode_base64(text: &str, record: usize) -> Result<Vec<u8>, CaptureError> {
    STANDARD
        .decode(text.trim())
        .map_err(|source| CaptureError::Body { record, source })
}

fn status_code(status: i64, record: usize) -> Result<u16, CaptureError> {
    u16::try_from(status).map_err(|_| CaptureError::Malformed {
        record,
        message: format!("invalid status code {}", status),
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
