//! API error types

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur while talking to the label backend
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a non-success status
    #[error("Request failed with status {status}: {payload}")]
    Request { status: u16, payload: Value },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A downloaded export could not be saved
    #[error("Failed to save download: {0}")]
    Save(#[from] std::io::Error),
}

impl ApiError {
    /// Check if the backend itself rejected the request
    pub fn is_request(&self) -> bool {
        matches!(self, ApiError::Request { .. })
    }

    /// Check if the request never produced a usable response
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_) | ApiError::InvalidResponse(_) | ApiError::Json(_))
    }

    /// Payload carried by the `ERROR` event for this failure
    ///
    /// Backend rejections surface their `error` field (or the whole body when
    /// it has none); every other failure surfaces its message.
    pub fn payload(&self) -> Value {
        match self {
            ApiError::Request { payload, .. } => match payload.get("error") {
                Some(error) => error.clone(),
                None => payload.clone(),
            },
            other => Value::String(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_uses_error_field() {
        let err = ApiError::Request {
            status: 400,
            payload: json!({"error": "bad frame"}),
        };
        assert_eq!(err.payload(), json!("bad frame"));
        assert!(err.is_request());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_payload_without_error_field_is_whole_body() {
        let err = ApiError::Request {
            status: 500,
            payload: json!({"message": "boom"}),
        };
        assert_eq!(err.payload(), json!({"message": "boom"}));
    }

    #[test]
    fn test_payload_for_invalid_response() {
        let err = ApiError::InvalidResponse("truncated body".to_string());
        assert!(err.is_transport());
        assert_eq!(err.payload(), json!("Invalid response: truncated body"));
    }
}
