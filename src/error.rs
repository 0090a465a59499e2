/// SDK error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Stream truncated: {pending_bytes} bytes of an unterminated frame were discarded")]
    Truncated { pending_bytes: usize },
    #[error("Stream frame exceeds the {limit} byte buffer limit")]
    FrameTooLarge { limit: usize },
    #[error("Application error: {0}")]
    Application(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category, mostly used to decide whether a caller may retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    ServerError,
    Unknown,
}

/// Map an upstream HTTP status code to an error category.
#[must_use]
pub fn category_from_upstream_status(status: u16) -> ErrorCategory {
    match status {
        400 | 404 | 422 => ErrorCategory::InvalidRequest,
        401 => ErrorCategory::Authentication,
        402 | 403 => ErrorCategory::Permission,
        429 => ErrorCategory::RateLimit,
        500..=599 => ErrorCategory::ServerError,
        _ => ErrorCategory::Unknown,
    }
}

impl SdkError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            SdkError::InvalidRequest(_) | SdkError::Config(_) => ErrorCategory::InvalidRequest,
            SdkError::Transport(_)
            | SdkError::Truncated { .. }
            | SdkError::FrameTooLarge { .. }
            | SdkError::Application(_)
            | SdkError::Internal(_) => ErrorCategory::ServerError,
            SdkError::Upstream { status, .. } => category_from_upstream_status(*status),
        }
    }

    /// Whether the error happened before any stream byte reached the decoder.
    #[must_use]
    pub fn is_pre_stream(&self) -> bool {
        matches!(
            self,
            SdkError::Config(_) | SdkError::InvalidRequest(_) | SdkError::Upstream { .. }
        )
    }
}

/// Extract a human readable message from a platform error body.
///
/// Understands `{"error":{"message":".."}}`, `{"error":".."}` and
/// `{"message":".."}`; anything else is returned trimmed as-is.
#[must_use]
pub fn upstream_error_message(body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let candidate = value
            .get("error")
            .and_then(|err| err.get("message").or(Some(err)))
            .or_else(|| value.get("message"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = candidate {
            return message.to_string();
        }
    }
    if trimmed.is_empty() {
        "Unknown error".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_status() {
        assert_eq!(category_from_upstream_status(401), ErrorCategory::Authentication);
        assert_eq!(category_from_upstream_status(402), ErrorCategory::Permission);
        assert_eq!(category_from_upstream_status(429), ErrorCategory::RateLimit);
        assert_eq!(category_from_upstream_status(503), ErrorCategory::ServerError);
        assert_eq!(category_from_upstream_status(302), ErrorCategory::Unknown);
    }

    #[test]
    fn test_upstream_category_and_pre_stream() {
        let err = SdkError::Upstream {
            status: 429,
            message: "slow down".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::RateLimit);
        assert!(err.is_pre_stream());
        assert!(!SdkError::Truncated { pending_bytes: 3 }.is_pre_stream());
    }

    #[test]
    fn test_upstream_error_message_shapes() {
        assert_eq!(
            upstream_error_message(r#"{"error":{"message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(upstream_error_message(r#"{"error":"no credits"}"#), "no credits");
        assert_eq!(upstream_error_message(r#"{"message":"gone"}"#), "gone");
        assert_eq!(upstream_error_message("  plain text \n"), "plain text");
        assert_eq!(upstream_error_message(""), "Unknown error");
    }
}
