use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("no Microsoft account signed in")]
    NotAuthenticated,

    #[error("Microsoft sign-in is not configured: {0}")]
    NotConfigured(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("batch request rejected with HTTP {status}: {body}")]
    BatchRejected { status: u16, body: String },

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("keyring error: {0}")]
    KeyringError(String),
}
