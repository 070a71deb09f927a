//! Command-line and environment configuration for the server binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use quakefeed_core::CursorSecret;

use crate::network::{NetworkConfig, TlsConfig};
use crate::storage::StoreConfig;

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, multi-line.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Quakefeed HTTP server.
#[derive(Parser, Debug)]
#[command(name = "quakefeed-server")]
#[command(about = "Paginated earthquake queries over day-partitioned storage")]
pub struct Cli {
    /// Bind address.
    #[arg(long, env = "QUAKEFEED_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// Listen port. 0 picks a free port.
    #[arg(long, env = "QUAKEFEED_PORT", default_value_t = 8080)]
    pub port: u16,
    /// Secret used to sign pagination cursors.
    #[arg(long, env = "QUAKEFEED_CURSOR_SECRET", hide_env_values = true)]
    pub cursor_secret: String,
    /// Per-request timeout in seconds.
    #[arg(long, env = "QUAKEFEED_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
    /// Seconds to wait for in-flight queries on shutdown.
    #[arg(long, env = "QUAKEFEED_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,
    /// Allowed CORS origins, comma separated. `*` allows any.
    #[arg(long, env = "QUAKEFEED_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,
    /// PEM certificate chain. Enables TLS together with `--tls-key`.
    #[arg(long, env = "QUAKEFEED_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,
    /// PEM private key.
    #[arg(long, env = "QUAKEFEED_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
    /// JSON array of events loaded into the store at startup.
    #[arg(long, env = "QUAKEFEED_SEED_FILE")]
    pub seed_file: Option<PathBuf>,
    /// Records read per store call, as a multiple of the requested limit.
    #[arg(long, env = "QUAKEFEED_OVER_FETCH", default_value_t = 3)]
    pub over_fetch_multiplier: usize,
    /// Upper bound on records read per store call.
    #[arg(long, env = "QUAKEFEED_MAX_SCAN", default_value_t = 1000)]
    pub max_scan_per_call: usize,
    /// Log output format.
    #[arg(long, env = "QUAKEFEED_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

/// Fully resolved server configuration.
#[derive(Debug)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub store: StoreConfig,
    pub cursor_secret: CursorSecret,
    pub seed_file: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> anyhow::Result<Self> {
        let cursor_secret = CursorSecret::new(cli.cursor_secret);
        if cursor_secret.is_empty() {
            anyhow::bail!("cursor secret must not be empty");
        }
        if cli.over_fetch_multiplier == 0 || cli.max_scan_per_call == 0 {
            anyhow::bail!("over-fetch multiplier and max scan must be positive");
        }

        let tls = match (cli.tls_cert, cli.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path,
                key_path,
            }),
            _ => None,
        };

        Ok(Self {
            network: NetworkConfig {
                host: cli.host,
                port: cli.port,
                tls,
                cors_origins: cli.cors_origins,
                request_timeout: Duration::from_secs(cli.request_timeout_secs),
                drain_timeout: Duration::from_secs(cli.drain_timeout_secs),
            },
            store: StoreConfig {
                over_fetch_multiplier: cli.over_fetch_multiplier,
                max_scan_per_call: cli.max_scan_per_call,
            },
            cursor_secret,
            seed_file: cli.seed_file,
            log_format: cli.log_format,
        })
    }
}
