//! Resolution of host addresses into engine endpoints

use std::fmt;
use std::path::PathBuf;

use url::Url;

use super::error::{EngineError, EngineResult};
use crate::storage::Host;

/// Plain TCP engine port
pub const DEFAULT_PORT: u16 = 2375;

/// TLS engine port
pub const DEFAULT_SECURE_PORT: u16 = 2376;

/// Engine API version every HTTP path is prefixed with
pub const API_VERSION: &str = "v1.41";

/// Where an engine listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEndpoint {
    /// `http(s)://host:port`, without trailing slash
    Http { base_url: String },

    /// Local unix socket
    Unix { path: PathBuf },
}

impl EngineEndpoint {
    /// Resolve a registered host.
    ///
    /// Accepted forms: `unix:///path`, `host`, `host:port` and
    /// `http(s)://host[:port]`. The port defaults to 2375, or 2376 when the
    /// host is secure. The scheme is `https` when the host is secure.
    pub fn from_host(host: &Host) -> EngineResult<Self> {
        let raw = host.url.trim();

        if let Some(path) = raw.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(EngineError::InvalidHost(format!(
                    "empty socket path in {raw}"
                )));
            }
            return Ok(EngineEndpoint::Unix {
                path: PathBuf::from(path),
            });
        }

        let default_scheme = if host.secure { "https" } else { "http" };
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("{default_scheme}://{raw}")
        };

        let url = Url::parse(&candidate)
            .map_err(|e| EngineError::InvalidHost(format!("{raw}: {e}")))?;

        let scheme = match url.scheme() {
            "https" => "https",
            "http" if host.secure => "https",
            "http" => "http",
            other => {
                return Err(EngineError::InvalidHost(format!(
                    "unsupported scheme {other} in {raw}"
                )));
            }
        };

        let hostname = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| EngineError::InvalidHost(format!("missing hostname in {raw}")))?;

        let port = url.port().unwrap_or(if scheme == "https" {
            DEFAULT_SECURE_PORT
        } else {
            DEFAULT_PORT
        });

        Ok(EngineEndpoint::Http {
            base_url: format!("{scheme}://{hostname}:{port}"),
        })
    }

    /// Full URL of an engine API path (HTTP endpoints only)
    pub fn api_url(&self, path: &str) -> Option<String> {
        match self {
            EngineEndpoint::Http { base_url } => Some(format!(
                "{}/{}/{}",
                base_url,
                API_VERSION,
                path.trim_start_matches('/')
            )),
            EngineEndpoint::Unix { .. } => None,
        }
    }
}

impl fmt::Display for EngineEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEndpoint::Http { base_url } => f.write_str(base_url),
            EngineEndpoint::Unix { path } => write!(f, "unix://{}", path.display()),
        }
    }
}
