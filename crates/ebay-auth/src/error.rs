//! Error types for eBay OAuth and token storage operations

/// Errors from the token endpoint and the token store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure, timeout, or an unexpected server-side status.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The authorization server rejected the grant.
    ///
    /// `refresh_token_dead` is true when the rejection proves the presented
    /// refresh token can never be used again (`invalid_grant`).
    #[error("grant rejected ({code}): {description}")]
    InvalidGrant {
        code: String,
        description: String,
        refresh_token_dead: bool,
    },

    /// The token endpoint answered 2xx but the body is missing required fields.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),

    /// A token record exists but fails structural validation.
    #[error("corrupt token record: {0}")]
    CorruptData(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
