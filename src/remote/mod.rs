//! Backend view of session state
//!
//! Provides:
//! - `RemoteSessionState`, the projection of a user row the monitor compares
//!   against the local session
//! - `SessionStateSource`, the fetch abstraction the monitor polls through
//! - A REST implementation against the backend's row-filter API

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub mod rest;

pub use rest::{RestSessionSource, RestSourceConfig};

/// What the backend currently believes about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSessionState {
    pub id: String,
    /// Account flagged for deletion.
    #[serde(default)]
    pub deleted: bool,
    /// Backend-tracked current session id, if the backend tracks one.
    #[serde(default)]
    pub current_session_id: Option<String>,
}

/// Fetches the remote session state for a user.
///
/// `Ok(None)` means the backend answered and the user row is gone, which is
/// distinguishable from a transport failure.
#[async_trait::async_trait]
pub trait SessionStateSource: Send + Sync {
    async fn fetch(&self, user_id: &str) -> Result<Option<RemoteSessionState>, AppError>;
}
