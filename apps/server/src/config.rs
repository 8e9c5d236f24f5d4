//! Server configuration.
//!
//! Read once at startup from the command line and the environment. A `.env`
//! file in the working directory is loaded first when present.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use chatlink_connection::{RECONNECT_DELAY, ReconnectPolicy};
use chatlink_diagnostics::ProbeConfig;
use chatlink_diagnostics::types::DEFAULT_HOST;

#[derive(Parser, Debug, Clone)]
#[command(name = "chatlink-server")]
#[command(about = "Keeps a messaging link alive and streams its state to dashboards")]
pub struct ServerConfig {
    /// HTTP listen port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory holding the linked-device credentials
    #[arg(long, env = "SESSION_DIR", default_value = "./session")]
    pub session_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// WebSocket URL of the messaging sidecar
    #[arg(long, env = "BRIDGE_URL", default_value = "ws://127.0.0.1:8765")]
    pub bridge_url: String,

    /// Host checked by the network test
    #[arg(long, env = "NETTEST_HOST", default_value = DEFAULT_HOST)]
    pub nettest_host: String,

    /// Retry closures that carry no status code
    #[arg(
        long,
        env = "RETRY_UNCLASSIFIED_CLOSE",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub retry_unclassified_close: bool,
}

impl ServerConfig {
    /// Loads `.env` (if any) and parses arguments and environment.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: RECONNECT_DELAY,
            retry_unclassified: self.retry_unclassified_close,
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig::for_host(&self.nettest_host)
    }

    /// `RUST_LOG` if set, else `LOG_LEVEL`, else `info`.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
