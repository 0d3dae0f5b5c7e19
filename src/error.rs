//! Error types for the self-update engine.

/// Top-level error type for an update cycle.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// The current operating system or runtime cannot be managed.
    #[error("operating system not supported")]
    NotSupported,

    /// The fetch source failed or returned a non-success response.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The payload archive is malformed or could not be extracted.
    #[error("archive error: {0}")]
    Archive(String),

    /// Installing the new executable or bundle failed.
    #[error("apply error: {0}")]
    Apply(String),

    /// Launching the successor process failed.
    #[error("restart error: {0}")]
    Restart(String),

    /// Settings could not be loaded or are invalid.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, UpdateError>;
