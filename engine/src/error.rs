//! Error types for the sync engine.

use thiserror::Error;

/// All possible errors from the sync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Configuration errors
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Transport errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unknown resource method: {0}")]
    UnknownMethod(String),

    // Lifecycle errors
    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("store is shut down")]
    Closed,
}

impl Error {
    /// Whether this error came from talking to the remote.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::Status { .. } | Error::InvalidResponse(_)
        )
    }

    /// Whether this error is a construction-time configuration problem.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::MissingConfig(_) | Error::InvalidConfig(_))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Error::Status {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_decode() => Error::InvalidResponse(err.to_string()),
            None => Error::Transport(err.to_string()),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::MissingConfig("storeId");
        assert_eq!(err.to_string(), "missing required configuration: storeId");

        let err = Error::Status {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "remote returned status 503: unavailable");
    }

    #[test]
    fn error_classes() {
        assert!(Error::Transport("reset".into()).is_transport());
        assert!(Error::InvalidResponse("not an object".into()).is_transport());
        assert!(!Error::Closed.is_transport());

        assert!(Error::MissingConfig("url").is_config());
        assert!(Error::InvalidConfig("hidden id".into()).is_config());
        assert!(!Error::NoRuntime.is_config());
    }
}
