//! Error taxonomy for the token lifecycle

/// How a token operation failed, resolved from vendor-level errors.
///
/// `Clone` because a refresh outcome is broadcast to every caller waiting on
/// the in-flight refresh.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// No usable credential. The operator must visit /oauth.auth and consent
    /// again; nothing is retried automatically.
    #[error("reauthorization required: no valid credential, visit /oauth.auth")]
    ReauthorizationRequired,

    /// Network-level or retryable token endpoint failure. The credential is
    /// untouched; the next call may try again.
    #[error("token refresh failed (transient): {0}")]
    Transient(String),

    /// The `state` returned on the redirect did not match the pending
    /// authorization attempt. Possible CSRF; the code is never exchanged.
    #[error("oauth state mismatch on redirect (possible CSRF)")]
    StateMismatch,

    /// The vendor rejected the authorization code exchange. Codes are
    /// single-use, so this is surfaced verbatim and never retried.
    #[error("authorization code exchange rejected: {0}")]
    Exchange(String),

    /// The credential could not be persisted after a successful exchange.
    #[error("failed to persist credential: {0}")]
    Storage(String),
}
