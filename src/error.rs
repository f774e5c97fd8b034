use thiserror::Error;

/// Result type for LinkPlay operations
pub type Result<T> = std::result::Result<T, LinkplayError>;

/// Errors that can occur when talking to LinkPlay speakers
#[derive(Error, Debug)]
pub enum LinkplayError {
    /// Every transport candidate failed and the last failure was not a timeout
    #[error("Connection error: {0}")]
    Connection(String),

    /// Every transport candidate failed and the last failure was a timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The device answered with a body that looks like JSON but does not parse
    #[error("Invalid response: {0}")]
    Response(String),

    /// The caller asked for something the current group role does not allow
    #[error("{0}")]
    Domain(String),

    /// Argument out of the range the device accepts
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A poll cycle failed; carries the underlying error description
    #[error("Update failed: {0}")]
    UpdateFailed(String),

    /// HTTP client could not be constructed
    #[error("TLS setup error: {0}")]
    Tls(String),
}

impl LinkplayError {
    /// Whether the error came from the network rather than from caller misuse
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LinkplayError::Connection(_) | LinkplayError::Timeout(_) | LinkplayError::Response(_)
        )
    }
}
