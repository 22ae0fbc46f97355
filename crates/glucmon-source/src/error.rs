/// Errors returned by the remote reading source.
///
/// # Examples
///
/// ```rust
/// use glucmon_source::error::SourceError;
///
/// let err = SourceError::WindowTooLarge { minutes: 2000, max_count: 10 };
/// assert!(err.to_string().contains("2000"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The session id was rejected; a fresh login is required.
    #[error("Source: session expired")]
    SessionExpired,

    /// The account credentials were rejected.
    #[error("Source: authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested window exceeds the source's ceilings.
    #[error("Source: window of {minutes} minutes / {max_count} readings exceeds the source limits")]
    WindowTooLarge { minutes: u32, max_count: u32 },

    /// Non-2xx response that is not a session problem.
    #[error("Source: HTTP error: status={status}, body={body}")]
    HttpError { status: u16, body: String },

    /// A reading in the response could not be interpreted.
    #[error("Source: malformed reading: {0}")]
    MalformedReading(String),

    #[error("Source: network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Source: JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SourceError>;
