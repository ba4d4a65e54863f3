//! Local session lifecycle owner
//!
//! Provides:
//! - Persist, refresh, and clear the device session
//! - Lazy invalidation: invalid records are purged on the access path
//! - A non-purging `peek_session` for reconciliation reads
//! - An observable logged-in flag for interested components

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::store::kv::KeyValueStore;
use crate::store::record::SessionRecord;

/// Sessions outlive the app for thirty days unless cleared or invalidated.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const KEY_ACCESS_TOKEN: &str = "access_token";
const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_USER_ID: &str = "user_id";
const KEY_SESSION_ID: &str = "session_id";
const KEY_LOGGED_IN_AT: &str = "logged_in_at";
const KEY_EXPIRES_AT: &str = "expires_at";

/// Single owner of the persisted session.
///
/// All session mutations flow through here. Getters validate before
/// returning and purge an invalid record in place, so callers never see a
/// stale token. `peek_session` is the one read that skips the purge; the
/// session monitor uses it to reason about records the getters would erase.
pub struct TokenStorage {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    write_lock: Mutex<()>,
    logged_in: watch::Sender<bool>,
}

impl TokenStorage {
    /// Build over `store` with the default thirty-day TTL.
    pub async fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, DEFAULT_SESSION_TTL).await
    }

    /// Build with an explicit TTL, seeding the logged-in flag from whatever
    /// record the store already holds.
    pub async fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        let storage = Self {
            store,
            ttl,
            write_lock: Mutex::new(()),
            logged_in: watch::Sender::new(false),
        };
        let initially_valid = storage
            .peek_session()
            .await
            .map(|r| r.is_valid())
            .unwrap_or(false);
        storage.logged_in.send_replace(initially_valid);
        storage
    }

    /// Receiver that observes logged-in transitions.
    pub fn logged_in_changes(&self) -> watch::Receiver<bool> {
        self.logged_in.subscribe()
    }

    pub fn is_logged_in(&self) -> bool {
        *self.logged_in.borrow()
    }

    /// Persist a fresh session after a successful sign-in.
    pub async fn save_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        let now = chrono::Utc::now().timestamp_millis();
        let expires_at = now + self.ttl.as_millis() as i64;

        self.store.put(KEY_ACCESS_TOKEN, access_token).await?;
        self.store.put(KEY_REFRESH_TOKEN, refresh_token).await?;
        self.store.put(KEY_USER_ID, user_id).await?;
        match session_id {
            Some(id) => self.store.put(KEY_SESSION_ID, id).await?,
            None => self.store.remove(KEY_SESSION_ID).await?,
        }
        self.store.put(KEY_LOGGED_IN_AT, &now.to_string()).await?;
        self.store
            .put(KEY_EXPIRES_AT, &expires_at.to_string())
            .await?;

        self.logged_in.send_replace(true);
        info!("Session saved for user {user_id}");
        Ok(())
    }

    /// Replace the token pair after a refresh, extending the expiry window.
    /// The user identity and original login timestamp are untouched.
    pub async fn refresh_session(
        &self,
        new_access_token: &str,
        new_refresh_token: &str,
    ) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        if self.peek_session().await.is_none() {
            return Err(AppError::not_authenticated("No session to refresh"));
        }
        let expires_at = chrono::Utc::now().timestamp_millis() + self.ttl.as_millis() as i64;

        self.store.put(KEY_ACCESS_TOKEN, new_access_token).await?;
        self.store.put(KEY_REFRESH_TOKEN, new_refresh_token).await?;
        self.store
            .put(KEY_EXPIRES_AT, &expires_at.to_string())
            .await?;

        debug!("Session tokens refreshed");
        Ok(())
    }

    /// Erase the session. This is the only operation that removes records;
    /// everything else funnels through it.
    pub async fn clear_session(&self) -> Result<(), AppError> {
        let _guard = self.write_lock.lock().await;
        self.clear_locked().await
    }

    // Caller must hold write_lock.
    async fn clear_locked(&self) -> Result<(), AppError> {
        self.store.remove(KEY_ACCESS_TOKEN).await?;
        self.store.remove(KEY_REFRESH_TOKEN).await?;
        self.store.remove(KEY_USER_ID).await?;
        self.store.remove(KEY_SESSION_ID).await?;
        self.store.remove(KEY_LOGGED_IN_AT).await?;
        self.store.remove(KEY_EXPIRES_AT).await?;
        self.logged_in.send_replace(false);
        info!("Session cleared");
        Ok(())
    }

    /// Whether a valid session exists right now. Never mutates the store.
    pub async fn is_valid(&self) -> bool {
        self.peek_session()
            .await
            .map(|r| r.is_valid())
            .unwrap_or(false)
    }

    /// Read the raw record without validity checks or purging.
    ///
    /// Returns `None` only when no access token is stored at all. Other
    /// fields fall back to defaults so a partially written record is still
    /// observable by reconciliation code.
    pub async fn peek_session(&self) -> Option<SessionRecord> {
        let access_token = self.read_key(KEY_ACCESS_TOKEN).await?;
        let refresh_token = self.read_key(KEY_REFRESH_TOKEN).await.unwrap_or_default();
        let user_id = self.read_key(KEY_USER_ID).await.unwrap_or_default();
        let session_id = self.read_key(KEY_SESSION_ID).await;
        let logged_in_at = self
            .read_key(KEY_LOGGED_IN_AT)
            .await
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        let expires_at = self
            .read_key(KEY_EXPIRES_AT)
            .await
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);

        Some(SessionRecord {
            access_token,
            refresh_token,
            user_id,
            session_id,
            logged_in_at,
            expires_at,
        })
    }

    /// The full record if a valid session exists.
    pub async fn session_info(&self) -> Option<SessionRecord> {
        self.validated_record().await
    }

    pub async fn access_token(&self) -> Option<String> {
        self.validated_record().await.map(|r| r.access_token)
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.validated_record().await.map(|r| r.refresh_token)
    }

    pub async fn user_id(&self) -> Option<String> {
        self.validated_record().await.map(|r| r.user_id)
    }

    /// Validate-on-access: an invalid record that is still present gets
    /// purged here so stale tokens never leak to callers.
    async fn validated_record(&self) -> Option<SessionRecord> {
        let record = self.peek_session().await?;
        if record.is_valid() {
            return Some(record);
        }
        // An in-flight save writes its fields one at a time, so a lockless
        // read can observe a half-written record. Re-check under the write
        // lock before purging; a record that became valid stays.
        let _guard = self.write_lock.lock().await;
        let record = self.peek_session().await?;
        if record.is_valid() {
            return Some(record);
        }
        warn!("Stored session is no longer valid, purging");
        if let Err(e) = self.clear_locked().await {
            warn!("Failed to purge invalid session: {}", e.message());
        }
        None
    }

    async fn read_key(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to read {key} from session store: {}", e.message());
                None
            }
        }
    }
}
