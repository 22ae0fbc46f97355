/// Errors that can occur within the notification subsystem.
///
/// # Examples
///
/// ```rust
/// use glucmon_notify::error::NotifyError;
///
/// let err = NotifyError::UnknownChannel("alerts".to_string());
/// assert!(err.to_string().contains("alerts"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Surface configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid configuration: {0}")]
    InvalidConfig(String),

    /// No channel with this name is known to the surface.
    #[error("Notify: unknown channel '{0}'")]
    UnknownChannel(String),

    /// An HTTP request to the chat platform failed.
    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The platform asked us to back off.
    #[error("Notify: rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The external API returned a non-success response.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
