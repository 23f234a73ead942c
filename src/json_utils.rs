// JSON helpers - depth-bounded structure previews and simple path extraction
use serde_json::{Map, Value};
use std::fmt;

/// Depth used for structure previews when none is configured.
pub const DEFAULT_PREVIEW_DEPTH: usize = 2;

/// Summarize the shape of a JSON value without its data.
///
/// Containers at `max_depth` collapse to a size placeholder, arrays above the
/// cutoff keep only their first element plus a count marker, and scalars are
/// replaced by their type name at every level.
pub fn summarize(value: &Value, max_depth: usize) -> Value {
    summarize_at(value, max_depth, 0)
}

fn summarize_at(value: &Value, max_depth: usize, depth: usize) -> Value {
    if depth >= max_depth {
        return match value {
            Value::Object(map) => {
                let mut placeholder = Map::new();
                placeholder.insert(
                    "...".to_string(),
                    Value::String(format!("{} keys", map.len())),
                );
                Value::Object(placeholder)
            }
            Value::Array(items) => Value::String(format!("[{} items]", items.len())),
            scalar => type_marker(scalar),
        };
    }

    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), summarize_at(v, max_depth, depth + 1)))
                .collect(),
        ),
        Value::Array(items) => match items.split_first() {
            None => Value::Array(Vec::new()),
            Some((first, rest)) => {
                let sample = summarize_at(first, max_depth, depth + 1);
                if rest.is_empty() {
                    Value::Array(vec![sample])
                } else {
                    Value::Array(vec![
                        sample,
                        Value::String(format!("... ({} more items)", rest.len())),
                    ])
                }
            }
        },
        scalar => type_marker(scalar),
    }
}

fn type_marker(value: &Value) -> Value {
    Value::String(format!("({})", type_name(value)))
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One step of a path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(i64),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "[{}]", i),
            PathSegment::Key(k) if k.contains('\'') => write!(f, "[\"{}\"]", k),
            PathSegment::Key(k) => write!(f, "['{}']", k),
        }
    }
}

/// Render segments back into a path expression rooted at `$`.
///
/// Returns `None` when a key contains `[` or `]`: the tokenizer has no
/// escape for brackets, so such a path could not be read back.
pub fn format_path(segments: &[PathSegment]) -> Option<String> {
    let mut path = String::from("$");
    for segment in segments {
        match segment {
            PathSegment::Key(k) if k.contains(['[', ']']) => return None,
            PathSegment::Key(k) if is_plain_key(k) => {
                path.push('.');
                path.push_str(k);
            }
            other => path.push_str(&other.to_string()),
        }
    }
    Some(path)
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key.trim().len() == key.len()
        && key.parse::<i64>().is_err()
        && !key.contains(['.', '[', ']'])
}

/// Tokenize a `$.a.b[0]['c']` style expression.
///
/// A leading `$` and then a leading `.` are dropped. Bracket contents become
/// an index when they parse as an integer, otherwise a key with one pair of
/// matching quotes removed. A `]` outside brackets is ignored and an unclosed
/// bracket keeps its content as a key.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let path = path.strip_prefix('$').unwrap_or(path);
    let path = path.strip_prefix('.').unwrap_or(path);

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;

    for ch in path.chars() {
        match ch {
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                }
                in_brackets = true;
            }
            ']' => {
                if in_brackets {
                    segments.push(bracket_segment(&current));
                    current.clear();
                    in_brackets = false;
                }
            }
            '.' if !in_brackets => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        segments.push(PathSegment::Key(current));
    }

    segments
}

fn bracket_segment(raw: &str) -> PathSegment {
    let trimmed = raw.trim();
    if let Ok(index) = trimmed.parse::<i64>() {
        return PathSegment::Index(index);
    }

    for quote in ['\'', '"'] {
        if trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            let inner = if trimmed.len() >= 2 {
                &trimmed[1..trimmed.len() - 1]
            } else {
                ""
            };
            return PathSegment::Key(inner.to_string());
        }
    }

    PathSegment::Key(trimmed.to_string())
}

/// Extract the value at `path`. `None` means "not found".
pub fn extract(value: &Value, path: &str) -> Option<Value> {
    if path == "$" {
        return Some(value.clone());
    }
    extract_segments(value, &parse_path(path)).cloned()
}

/// Walk `segments` from `value`. Traversal stops early at a JSON `null`.
pub fn extract_segments<'a>(value: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = value;

    for segment in segments {
        current = match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get(key)?,
            (Value::Array(items), PathSegment::Index(index)) => {
                usize::try_from(*index).ok().and_then(|i| items.get(i))?
            }
            _ => return None,
        };

        if current.is_null() {
            break;
        }
    }

    Some(current)
}
