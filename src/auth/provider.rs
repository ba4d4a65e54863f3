//! Auth provider abstraction
//!
//! The backend auth service is wrapped behind a trait so repositories and
//! tests never talk to it directly. Provider failures carry only a message;
//! the sentinel classifier turns them into typed errors.

use thiserror::Error;

/// Identity as the provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderUser {
    pub id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// A freshly established provider session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub user: ProviderUser,
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Option<String>,
}

/// Opaque provider failure. The message may embed a sentinel.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Backend auth operations.
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<ProviderSession, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Re-establish a session from a stored refresh token.
    async fn restore_session(&self, refresh_token: &str) -> Result<ProviderUser, ProviderError>;

    /// The user the provider already holds in memory, if any.
    async fn current_user(&self) -> Option<ProviderUser>;
}
