//! Listener settings for the HTTP surface.

use std::path::PathBuf;
use std::time::Duration;

/// Where and how the HTTP listener runs.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub host: String,
    /// 0 lets the OS pick a free port.
    pub port: u16,
    /// Serves HTTPS when set.
    pub tls: Option<TlsConfig>,
    /// Browser origins allowed to call the API; `"*"` allows any.
    pub cors_origins: Vec<String>,
    /// Requests still running after this get a 408.
    pub request_timeout: Duration,
    /// Grace period for in-flight queries once shutdown starts.
    pub drain_timeout: Duration,
}

impl NetworkConfig {
    /// `host:port` string handed to the TCP listener.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the CORS policy accepts every origin.
    #[must_use]
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|origin| origin == "*")
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// PEM files for HTTPS. Both are required.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Certificate chain.
    pub cert_path: PathBuf,
    /// Private key.
    pub key_path: PathBuf,
}
