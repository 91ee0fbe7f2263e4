//! Error type for the Anthropic Messages API client.
//!
//! [`AnthropicError`] separates rate limiting (HTTP 429), any other non-2xx
//! status, and failures below HTTP (DNS, refused connection, timeout, body
//! decoding). None of them is retried by this crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnthropicError {
    /// The server returned HTTP 429.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Non-success status, e.g. 401 for a bad key or 529 when overloaded.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Transport-level failure from `reqwest`, including timeouts.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}
