//! Error types for HA replication

use std::fmt;

pub type HaResult<T> = Result<T, HaError>;

#[derive(Debug)]
pub enum HaError {
    /// The advisory lock stayed taken through every retry
    LockTimeout { attempts: u32 },

    /// File system failure
    Io(std::io::Error),

    /// HA record could not be (de)serialized
    Serialization(String),

    /// Peer request failed
    Peer(String),

    /// Sync payload names a path outside the data directory
    InvalidPath(String),

    /// HA settings cannot be used
    Config(String),
}

impl fmt::Display for HaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaError::LockTimeout { attempts } => write!(
                f,
                "failed to acquire HA lock: gave up after {} attempts",
                attempts
            ),
            HaError::Io(err) => write!(f, "HA file error: {}", err),
            HaError::Serialization(msg) => write!(f, "HA record error: {}", msg),
            HaError::Peer(msg) => write!(f, "peer request failed: {}", msg),
            HaError::InvalidPath(path) => write!(f, "invalid sync path: {}", path),
            HaError::Config(msg) => write!(f, "invalid HA settings: {}", msg),
        }
    }
}

impl std::error::Error for HaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HaError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HaError {
    fn from(err: std::io::Error) -> Self {
        HaError::Io(err)
    }
}

impl From<serde_json::Error> for HaError {
    fn from(err: serde_json::Error) -> Self {
        HaError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for HaError {
    fn from(err: reqwest::Error) -> Self {
        HaError::Peer(err.to_string())
    }
}
