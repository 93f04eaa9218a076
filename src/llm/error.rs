//! Completion failure type

use thiserror::Error;

/// A failed completion call. Nothing in the gateway retries; the kind is a
/// log label separating misconfiguration from upstream trouble.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Request never got an HTTP response
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Transport, message)
    }

    /// Response arrived but carried no usable completion
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Malformed, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    Transport,
    /// 401 or 403: bad or revoked key
    Auth,
    RateLimit,
    /// Any other non-success status
    Rejected,
    Malformed,
}

impl LlmErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Rejected => "rejected",
            Self::Malformed => "malformed",
        }
    }
}
