//! Configuration from CLI arguments and environment variables

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "vinoteca-sessiond")]
#[command(about = "Vinoteca session consistency daemon")]
pub struct Args {
    /// Backend base URL
    #[arg(long, env = "BACKEND_URL", default_value = "http://localhost:54321")]
    pub backend_url: String,

    /// Backend API key
    #[arg(long, env = "BACKEND_API_KEY")]
    pub backend_api_key: Option<String>,

    /// Table holding per-user session state
    #[arg(long, env = "PROFILE_TABLE", default_value = "profiles")]
    pub profile_table: String,

    /// Path of the local session store document
    #[arg(long, env = "SESSION_STORE_PATH", default_value = ".vinoteca/session.json")]
    pub session_store_path: PathBuf,

    /// Seconds between session reconciliation polls
    #[arg(long, env = "MONITOR_INTERVAL_SECS", default_value = "30")]
    pub monitor_interval_secs: u64,

    /// Days a saved session stays valid
    #[arg(long, env = "SESSION_TTL_DAYS", default_value = "30")]
    pub session_ttl_days: u64,

    /// HTTP request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Development mode (relaxes the API key requirement)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn api_key(&self) -> &str {
        self.backend_api_key.as_deref().unwrap_or("")
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_days * 24 * 60 * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.backend_api_key.as_deref().unwrap_or("").is_empty() {
            return Err(
                "BACKEND_API_KEY is required outside development mode (set DEV_MODE=true to bypass)"
                    .to_string(),
            );
        }
        if self.monitor_interval_secs == 0 {
            return Err("MONITOR_INTERVAL_SECS must be greater than zero".to_string());
        }
        if self.session_ttl_days == 0 {
            return Err("SESSION_TTL_DAYS must be greater than zero".to_string());
        }
        Ok(())
    }
}
