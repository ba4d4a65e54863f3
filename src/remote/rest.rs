//! REST session-state source
//!
//! Queries the backend's row-filter API for the caller's profile row,
//! selecting just the columns the monitor compares against.

use std::time::Duration;

use tracing::debug;

use crate::error::AppError;
use crate::remote::{RemoteSessionState, SessionStateSource};

/// Connection settings for the REST source.
#[derive(Debug, Clone)]
pub struct RestSourceConfig {
    pub base_url: String,
    pub api_key: String,
    /// Table holding the per-user session columns.
    pub table: String,
    pub request_timeout: Duration,
}

impl RestSourceConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            table: "profiles".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// `SessionStateSource` backed by the backend REST API.
pub struct RestSessionSource {
    config: RestSourceConfig,
    http_client: reqwest::Client,
}

impl RestSessionSource {
    pub fn new(config: RestSourceConfig) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("vinoteca-session/0.1")
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn profile_url(&self, user_id: &str) -> String {
        format!(
            "{}/rest/v1/{}?id=eq.{}&select=id,deleted,current_session_id",
            self.config.base_url.trim_end_matches('/'),
            self.config.table,
            urlencoding::encode(user_id)
        )
    }
}

#[async_trait::async_trait]
impl SessionStateSource for RestSessionSource {
    async fn fetch(&self, user_id: &str) -> Result<Option<RemoteSessionState>, AppError> {
        let url = self.profile_url(user_id);
        debug!("Fetching remote session state for {user_id}");

        let rows = self
            .http_client
            .get(&url)
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<RemoteSessionState>>()
            .await?;

        Ok(rows.into_iter().next())
    }
}
