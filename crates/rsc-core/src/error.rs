//! Error types for the rsc runtime

use thiserror::Error;

/// Main error type shared by every rsc crate
#[derive(Error, Debug)]
pub enum Error {
    /// Missing resource, file or run
    #[error("Not found: {0}")]
    NotFound(String),

    /// Schema or semantic validation failure, or a write conflict
    #[error("Invalid input: {0}")]
    UserInput(String),

    /// Non-2xx status or network failure on a remote call
    #[error("Transport error (status {status}): {message} [correlation id {correlation_id}]")]
    Transport {
        status: u16,
        message: String,
        correlation_id: String,
    },

    /// Malformed response envelope
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Binder set could not be turned into an executable tool set
    #[error("Construction error: {0}")]
    Construction(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a user input error
    pub fn user_input(msg: impl Into<String>) -> Self {
        Error::UserInput(msg.into())
    }

    /// Create a write conflict error
    pub fn conflict(path: impl AsRef<str>) -> Self {
        Error::UserInput(format!(
            "Write conflict on {}: the file changed since it was read",
            path.as_ref()
        ))
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a construction error
    pub fn construction(msg: impl Into<String>) -> Self {
        Error::Construction(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// HTTP status this error is reported with by a tool executor
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) | Error::UnknownTool(_) => 404,
            Error::UserInput(_) | Error::Serialization(_) => 400,
            Error::Cancelled(_) => 409,
            Error::Transport { status, .. } if *status >= 400 => *status,
            Error::Transport { .. } => 502,
            Error::Protocol(_)
            | Error::Construction(_)
            | Error::Storage(_)
            | Error::Io(_)
            | Error::Internal(_) => 500,
        }
    }

    /// True for local NotFound and for remote calls answered with 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::UnknownTool(_))
            || matches!(self, Error::Transport { status: 404, .. })
    }

    /// True for local UserInput and for remote calls answered with 400
    pub fn is_user_input(&self) -> bool {
        matches!(self, Error::UserInput(_) | Error::Serialization(_))
            || matches!(self, Error::Transport { status: 400, .. })
    }

    /// Short machine-readable kind, used in error envelopes
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::UserInput(_) | Error::Serialization(_) => "user_input",
            Error::Transport { .. } => "transport",
            Error::Protocol(_) => "protocol",
            Error::Construction(_) => "construction",
            Error::UnknownTool(_) => "unknown_tool",
            Error::Storage(_) => "storage",
            Error::Cancelled(_) => "cancelled",
            Error::Io(_) | Error::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::not_found("x").http_status(), 404);
        assert_eq!(Error::conflict("/a.json").http_status(), 400);
        assert_eq!(Error::construction("x").http_status(), 500);
        let transport = Error::Transport {
            status: 503,
            message: "down".into(),
            correlation_id: "c1".into(),
        };
        assert_eq!(transport.http_status(), 503);
    }

    #[test]
    fn test_remote_not_found_is_not_found() {
        let err = Error::Transport {
            status: 404,
            message: "gone".into(),
            correlation_id: "c1".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_user_input());
        assert!(err.to_string().contains("c1"));
    }

    #[test]
    fn test_conflict_is_user_input() {
        let err = Error::conflict("/resources/template/a.json");
        assert!(err.is_user_input());
        assert!(!err.is_not_found());
        assert_eq!(err.kind(), "user_input");
    }
}
