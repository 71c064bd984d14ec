//! Ruler transport errors.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while talking to a remote ruler.
#[derive(Error, Debug)]
pub enum RulerError {
    #[error("Invalid ruler address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Ruler network error: {0}")]
    Network(String),

    #[error("Ruler call timed out after {0}s")]
    Timeout(u64),

    #[error("Ruler authentication failed: {0}")]
    AuthFailed(String),

    #[error("Ruler rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("mimirtool failed: {0}")]
    Tool(String),

    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse ruler response: {0}")]
    Parse(String),

    #[error("Failed to stage rule file '{path}': {source}")]
    StageFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RulerError {
    /// Returns true if the error is likely transient and the call can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            RulerError::Network(_) | RulerError::Timeout(_) => true,
            RulerError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Maximum length of a response or stderr body kept in an error.
pub(crate) const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Truncates a remote error body so it cannot flood logs and status files.
pub(crate) fn truncate_body(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}

/// Classifies mimirtool stderr into a more specific error variant.
pub fn classify_tool_error(stderr: &str) -> RulerError {
    let lower = stderr.to_lowercase();
    let message = truncate_body(stderr);

    if lower.contains("context deadline exceeded")
        || lower.contains("i/o timeout")
        || lower.contains("client.timeout exceeded")
    {
        return RulerError::Network(message);
    }

    if lower.contains("no such host")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("network is unreachable")
        || lower.contains("unexpected eof")
    {
        return RulerError::Network(message);
    }

    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("authentication")
    {
        return RulerError::AuthFailed(message);
    }

    if lower.contains("400 bad request") || lower.contains("invalid") {
        return RulerError::Rejected {
            status: 400,
            body: message,
        };
    }

    RulerError::Tool(message)
}
