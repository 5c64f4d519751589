//! Error types shared across the crate.

/// Failure talking to the text-generation service.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("request to text-generation service failed: {0}")]
    Transport(String),
    #[error("text-generation service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode text-generation response: {0}")]
    Decode(String),
}

impl GenerationError {
    /// True for HTTP 429, a transport error naming 429, or any error
    /// mentioning a quota.
    pub fn is_rate_limited(&self) -> bool {
        let text = match self {
            GenerationError::Status { status: 429, .. } => return true,
            GenerationError::Transport(message) => {
                if message.contains("429") {
                    return true;
                }
                message.to_lowercase()
            }
            GenerationError::Status { body, .. } => body.to_lowercase(),
            GenerationError::Decode(message) => message.to_lowercase(),
        };
        text.contains("quota") || text.contains("resource_exhausted")
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL can carry digits that look like a status code.
        let err = err.without_url();
        if err.is_decode() {
            GenerationError::Decode(err.to_string())
        } else {
            GenerationError::Transport(err.to_string())
        }
    }
}

/// Why the conversation refused a new question.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("dataset is still loading")]
    Loading,
    #[error("a question is already being answered")]
    Busy,
    #[error("message cannot be empty")]
    EmptyMessage,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no API key configured; set GEMINI_API_KEY or pass --api-key")]
    MissingApiKey,
    #[error("temperature must be between 0.0 and 2.0, got {0}")]
    InvalidTemperature(f32),
    #[error("sample size must be at most {max}, got {got}")]
    SampleTooLarge { max: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_429_is_rate_limited() {
        let err = GenerationError::Status {
            status: 429,
            body: String::new(),
        };
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_quota_marker_is_rate_limited() {
        let err = GenerationError::Status {
            status: 400,
            body: r#"{"error":{"message":"Quota exceeded for metric"}}"#.to_string(),
        };
        assert!(err.is_rate_limited());

        let err = GenerationError::Transport("got 429 Too Many Requests".to_string());
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_digits_in_body_are_not_rate_limited() {
        let err = GenerationError::Status {
            status: 500,
            body: r#"{"error":{"code":500,"message":"Internal error. Request id 7f4291c"}}"#
                .to_string(),
        };
        assert!(!err.is_rate_limited());

        let err = GenerationError::Decode("expected value at line 1 column 429".to_string());
        assert!(!err.is_rate_limited());

        let err = GenerationError::Status {
            status: 503,
            body: r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#.to_string(),
        };
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_other_errors_are_not_rate_limited() {
        let err = GenerationError::Status {
            status: 500,
            body: "internal".to_string(),
        };
        assert!(!err.is_rate_limited());
        assert!(!GenerationError::Transport("connection refused".to_string()).is_rate_limited());
        assert!(!GenerationError::Decode("expected value".to_string()).is_rate_limited());
    }

    #[test]
    fn test_submit_error_display() {
        assert_eq!(SubmitError::Loading.to_string(), "dataset is still loading");
        assert_eq!(
            SubmitError::Busy.to_string(),
            "a question is already being answered"
        );
        assert_eq!(SubmitError::EmptyMessage.to_string(), "message cannot be empty");
    }
}
