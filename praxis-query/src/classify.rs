//! Rate-limit detection.
//!
//! Errors are classified in two stages. Explicit signals come first: an HTTP
//! 429 status or a response that should have been structured data but did
//! not parse. Only if neither is present does the classifier fall back to
//! matching throttling phrases in the error message and its source chain.
//! The phrase list is configurable per provider.

use serde_json::Value;
use thiserror::Error;

/// Default phrases that mark an error message as provider throttling.
pub const DEFAULT_THROTTLE_PHRASES: &[&str] = &[
    "too many requests",
    "too many",
    "rate limit",
    "unexpected token",
    "is not valid json",
    "429",
];

/// Error produced by a wrapped backend operation.
///
/// The default methods report no explicit signal, which leaves
/// classification to message matching.
pub trait ProviderError: std::error::Error + Send + Sync + 'static {
    /// HTTP status reported by the provider, if any.
    fn status_code(&self) -> Option<u16> {
        None
    }

    /// True when the provider answered with something that is not the
    /// structured payload the client expected (plain text, HTML, truncated JSON).
    fn is_malformed_response(&self) -> bool {
        false
    }
}

impl ProviderError for serde_json::Error {
    fn is_malformed_response(&self) -> bool {
        self.is_syntax() || self.is_eof()
    }
}

/// Why an error counts as retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryReason {
    /// Explicit HTTP 429.
    TooManyRequests,
    /// Non-JSON or unparseable response body.
    MalformedResponse,
    /// A throttling phrase in the error message.
    ThrottlingMessage,
}

/// Classification result for one error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimited(RetryReason),
    Terminal,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Decides whether a provider error is a rate-limit condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitClassifier {
    /// Lowercased phrases.
    phrases: Vec<String>,
}

impl Default for RateLimitClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_PHRASES.iter().copied())
    }
}

impl RateLimitClassifier {
    /// Classifier matching the given phrases (case-insensitive).
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Classifier that trusts only explicit status and kind signals.
    pub fn explicit_only() -> Self {
        Self {
            phrases: Vec::new(),
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn classify<E: ProviderError>(&self, error: &E) -> ErrorClass {
        if error.status_code() == Some(429) {
            return ErrorClass::RateLimited(RetryReason::TooManyRequests);
        }
        if error.is_malformed_response() {
            return ErrorClass::RateLimited(RetryReason::MalformedResponse);
        }

        if self.phrases.is_empty() {
            return ErrorClass::Terminal;
        }

        let mut current: Option<&dyn std::error::Error> = Some(error);
        while let Some(err) = current {
            if self.matches_message(&err.to_string()) {
                return ErrorClass::RateLimited(RetryReason::ThrottlingMessage);
            }
            current = err.source();
        }
        ErrorClass::Terminal
    }

    /// True if `message` contains one of the configured phrases.
    pub fn matches_message(&self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }
}

// ============================================================================
// BACKEND ERROR
// ============================================================================

const SNIPPET_LEN: usize = 120;

/// Error type for HTTP-backed BaaS queries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Backend query failed ({code}): {message}")]
    Query { code: String, message: String },

    #[error("Backend response is not valid JSON: {snippet}")]
    MalformedResponse { snippet: String },

    #[error("Backend request failed: {message}")]
    Transport { message: String },
}

impl BackendError {
    /// Interpret a failed HTTP exchange.
    ///
    /// - 429 becomes [`BackendError::Status`] with status 429
    /// - a body that is not JSON becomes [`BackendError::MalformedResponse`]
    /// - a JSON body with a `code` becomes [`BackendError::Query`]
    /// - anything else becomes [`BackendError::Status`] with the body's
    ///   `message`/`error` field
    pub fn from_http(status: u16, body: &str) -> Self {
        if status == 429 {
            let message = json_message(body).unwrap_or_else(|| "Too Many Requests".to_string());
            return Self::Status { status, message };
        }

        let parsed: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            Err(_) => {
                return Self::MalformedResponse {
                    snippet: snippet(body),
                }
            }
        };

        let message = message_field(&parsed).unwrap_or_else(|| snippet(body));
        match parsed.get("code").and_then(Value::as_str) {
            Some(code) => Self::Query {
                code: code.to_string(),
                message,
            },
            None => Self::Status { status, message },
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

impl ProviderError for BackendError {
    fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn is_malformed_response(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }
}

fn json_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| message_field(&v))
}

fn message_field(value: &Value) -> Option<String> {
    ["message", "error", "msg"]
        .iter()
        .find_map(|field| value.get(*field).and_then(Value::as_str))
        .map(str::to_string)
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(SNIPPET_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
