use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading a capture file.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed capture at record {record}: {message}")]
    Malformed { record: usize, message: String },
    #[error("Invalid base64 body at record {record}: {source}")]
    Body {
        record: usize,
        #[source]
        source: base64::DecodeError,
    },
}

/// Error kinds surfaced by the query operations.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Session not found: {0}")]
    SessionNotFound(PathBuf),
    #[error("Flow index {0} out of range")]
    FlowNotFound(usize),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Content is not valid JSON: {0}")]
    DecodeFailure(#[from] serde_json::Error),
    #[error("Failed to read capture: {0}")]
    Capture(#[from] CaptureError),
}

impl QueryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        QueryError::InvalidArgument(message.into())
    }

    /// Stable machine-readable kind used in error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::SessionNotFound(_) | QueryError::FlowNotFound(_) => "not_found",
            QueryError::InvalidArgument(_) => "invalid_argument",
            QueryError::DecodeFailure(_) => "decode_failure",
            QueryError::Capture(_) => "capture_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(QueryError::FlowNotFound(3).kind(), "not_found");
        assert_eq!(QueryError::SessionNotFound(PathBuf::from("x")).kind(), "not_found");
        assert_eq!(QueryError::invalid("Missing flow_index").kind(), "invalid_argument");
        assert_eq!(QueryError::FlowNotFound(3).to_string(), "Flow index 3 out of range");
    }
}
