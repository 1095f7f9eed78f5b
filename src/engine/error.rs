//! Error types for engine communication

use std::fmt;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised while talking to a container engine
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Engine could not be reached (connect failure, timeout, failed ping)
    Unreachable(String),

    /// Engine answered with an error status
    Request(String),

    /// A continuous stats stream broke mid-flight
    Stream(String),

    /// Response body could not be decoded
    Decode(String),

    /// Host address cannot be turned into an endpoint
    InvalidHost(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Unreachable(msg) => write!(f, "engine unreachable: {}", msg),
            EngineError::Request(msg) => write!(f, "engine request failed: {}", msg),
            EngineError::Stream(msg) => write!(f, "stats stream failed: {}", msg),
            EngineError::Decode(msg) => write!(f, "failed to decode engine response: {}", msg),
            EngineError::InvalidHost(msg) => write!(f, "invalid engine address: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            EngineError::Unreachable(err.to_string())
        } else if err.is_decode() {
            EngineError::Decode(err.to_string())
        } else if err.is_body() {
            EngineError::Stream(err.to_string())
        } else {
            EngineError::Request(err.to_string())
        }
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error as Bollard;
        match err {
            Bollard::JsonDataError { .. } | Bollard::JsonSerdeError { .. } => {
                EngineError::Decode(err.to_string())
            }
            Bollard::DockerResponseServerError { .. } => EngineError::Request(err.to_string()),
            Bollard::SocketNotFoundError(_) | Bollard::IOError { .. } => {
                EngineError::Unreachable(err.to_string())
            }
            other => EngineError::Request(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}
