//! Error taxonomy for the orchestration core.
//!
//! Three layers, matching the component boundaries:
//! - [`UpstreamError`] - adapter-level failures from external providers
//! - [`ToolError`] - dispatcher-level failures returned inside a `ToolResult`
//! - [`CacheError`] - cache-store failures, absorbed at the orchestrator
//!   boundary and never surfaced to callers

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of an external provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// The provider did not respond within the per-call timeout
    Timeout,
    /// The requested city/resource does not exist
    NotFound,
    /// The provider rejected the call due to rate limiting
    RateLimited,
    /// The request was malformed or missing required configuration
    InvalidInput,
    /// The provider is unreachable or returned a server error
    Unavailable,
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpstreamErrorKind::Timeout => "timeout",
            UpstreamErrorKind::NotFound => "not_found",
            UpstreamErrorKind::RateLimited => "rate_limited",
            UpstreamErrorKind::InvalidInput => "invalid_input",
            UpstreamErrorKind::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Failure of an external source adapter call.
///
/// Retryability is derived from the kind alone so that the shared HTTP
/// plumbing and the per-adapter code agree on the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Timeout, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::NotFound, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::RateLimited, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::InvalidInput, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(UpstreamErrorKind::Unavailable, message)
    }

    /// Whether another attempt against the provider may succeed.
    pub fn retryable(&self) -> bool {
        matches!(
            self.kind,
            UpstreamErrorKind::Timeout
                | UpstreamErrorKind::RateLimited
                | UpstreamErrorKind::Unavailable
        )
    }
}

/// Failure of a single tool invocation, carried inside the `ToolResult`.
///
/// These never propagate as panics or unhandled errors past the dispatcher;
/// the caller decides whether a failed tool is conversationally recoverable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ToolError {
    /// The requested tool name is not a member of the tool enum
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// The tool arguments failed validation
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// The underlying provider call failed after exhausting retries
    #[error("tool execution failed: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Cache store failure. Degrades silently: a failed read is a miss, a
/// failed write is a no-op.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),

    #[error("cache serialization error: {0}")]
    Serialization(String),
}
