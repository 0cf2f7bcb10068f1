use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set every assistant rejection is translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    SafetyPolicy,
    RateLimited,
    InvalidInput,
    FormatError,
    Timeout,
    AuthError,
    Unknown,
}

impl ProviderErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 413 | 422 => ProviderErrorKind::InvalidInput,
            401 | 403 => ProviderErrorKind::AuthError,
            408 | 504 => ProviderErrorKind::Timeout,
            429 => ProviderErrorKind::RateLimited,
            451 => ProviderErrorKind::SafetyPolicy,
            _ => ProviderErrorKind::Unknown,
        }
    }

    /// Maps a provider error code string, when the provider sent a known one.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.to_ascii_lowercase();
        let kind = match code.as_str() {
            "safety" | "safety_policy" | "content_policy" | "content_filter" => {
                ProviderErrorKind::SafetyPolicy
            }
            "rate_limited" | "rate_limit_exceeded" | "quota_exceeded" | "resource_exhausted" => {
                ProviderErrorKind::RateLimited
            }
            "invalid_input" | "invalid_request" | "invalid_argument" => {
                ProviderErrorKind::InvalidInput
            }
            "format_error" | "invalid_response" | "parse_error" => ProviderErrorKind::FormatError,
            "timeout" | "deadline_exceeded" => ProviderErrorKind::Timeout,
            "unauthorized" | "unauthenticated" | "forbidden" | "permission_denied" => {
                ProviderErrorKind::AuthError
            }
            _ => return None,
        };
        Some(kind)
    }

    /// Fallback classification from free-form failure text.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("safety") || lower.contains("blocked") || lower.contains("policy") {
            ProviderErrorKind::SafetyPolicy
        } else if lower.contains("rate limit") || lower.contains("429") || lower.contains("quota") {
            ProviderErrorKind::RateLimited
        } else if lower.contains("timed out") || lower.contains("timeout") || lower.contains("deadline")
        {
            ProviderErrorKind::Timeout
        } else if lower.contains("401")
            || lower.contains("403")
            || lower.contains("unauthorized")
            || lower.contains("api key")
            || lower.contains("forbidden")
        {
            ProviderErrorKind::AuthError
        } else if lower.contains("json")
            || lower.contains("parse")
            || lower.contains("malformed")
            || lower.contains("unexpected format")
        {
            ProviderErrorKind::FormatError
        } else if lower.contains("invalid") || lower.contains("too long") || lower.contains("empty")
        {
            ProviderErrorKind::InvalidInput
        } else {
            ProviderErrorKind::Unknown
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            ProviderErrorKind::SafetyPolicy => {
                "The request was blocked by the assistant's content policy. Try rephrasing it."
            }
            ProviderErrorKind::RateLimited => {
                "The assistant is busy right now. Please wait a moment and try again."
            }
            ProviderErrorKind::InvalidInput => {
                "The assistant could not use this input. Check the slide content and try again."
            }
            ProviderErrorKind::FormatError => {
                "The assistant returned an unexpected response. Please try again."
            }
            ProviderErrorKind::Timeout => "The assistant took too long to respond. Please try again.",
            ProviderErrorKind::AuthError => {
                "The assistant rejected our credentials. Check the API key configuration."
            }
            ProviderErrorKind::Unknown => "Something went wrong while contacting the assistant.",
        }
    }
}

/// Error body returned by the assistant service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationProblem {
    EmptyTitle,
    NoSlides,
}

/// Publish preconditions that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}", self.user_message())]
pub struct ValidationError {
    pub problems: Vec<ValidationProblem>,
}

impl ValidationError {
    pub fn user_message(&self) -> &'static str {
        let empty_title = self.problems.contains(&ValidationProblem::EmptyTitle);
        let no_slides = self.problems.contains(&ValidationProblem::NoSlides);
        match (empty_title, no_slides) {
            (true, true) => "Add a deck title and at least one slide before publishing.",
            (true, false) => "Add a deck title before publishing.",
            (false, true) => "Add at least one slide before publishing.",
            (false, false) => "The deck is not ready to publish.",
        }
    }
}

/// A durable write that did not go through.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("failed to save {target}: {message}")]
pub struct PersistenceError {
    pub target: String,
    pub message: String,
}

impl PersistenceError {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn user_message(&self) -> &'static str {
        "Your changes could not be saved. Check your connection and try again."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_closed_set() {
        assert_eq!(ProviderErrorKind::from_status(429), ProviderErrorKind::RateLimited);
        assert_eq!(ProviderErrorKind::from_status(401), ProviderErrorKind::AuthError);
        assert_eq!(ProviderErrorKind::from_status(422), ProviderErrorKind::InvalidInput);
        assert_eq!(ProviderErrorKind::from_status(504), ProviderErrorKind::Timeout);
        assert_eq!(ProviderErrorKind::from_status(500), ProviderErrorKind::Unknown);
    }

    #[test]
    fn message_fallback_recognises_common_failures() {
        assert_eq!(
            ProviderErrorKind::from_message("Response blocked due to SAFETY"),
            ProviderErrorKind::SafetyPolicy
        );
        assert_eq!(
            ProviderErrorKind::from_message("request timed out after 30s"),
            ProviderErrorKind::Timeout
        );
        assert_eq!(
            ProviderErrorKind::from_message("expected value at line 1 column 1 (json)"),
            ProviderErrorKind::FormatError
        );
        assert_eq!(
            ProviderErrorKind::from_message("connection reset by peer"),
            ProviderErrorKind::Unknown
        );
    }

    #[test]
    fn validation_message_covers_both_problems() {
        let err = ValidationError {
            problems: vec![ValidationProblem::EmptyTitle, ValidationProblem::NoSlides],
        };
        assert_eq!(
            err.to_string(),
            "Add a deck title and at least one slide before publishing."
        );
    }
}
