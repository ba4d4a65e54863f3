//! Persisted session record and its validity rules

use serde::{Deserialize, Serialize};

/// Snapshot of the locally persisted session.
///
/// A record is valid only while both tokens and the user id are present and
/// the expiry instant has not passed. The backend session id is optional;
/// older sessions were saved before it was tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub session_id: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub logged_in_at: i64,
    /// Milliseconds since the Unix epoch.
    pub expires_at: i64,
}

impl SessionRecord {
    /// Whether the record is usable at the given instant (epoch millis).
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        !self.access_token.is_empty()
            && !self.refresh_token.is_empty()
            && !self.user_id.is_empty()
            && now_ms < self.expires_at
    }

    /// Whether the record is usable right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(chrono::Utc::now().timestamp_millis())
    }
}
