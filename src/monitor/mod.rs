//! Background session reconciliation
//!
//! Provides:
//! - A polling loop comparing the local session against the backend's view
//! - Forced invalidation when the account is flagged or the session is
//!   superseded by a newer login elsewhere
//! - An observable invalidation flag the UI can react to
//!
//! The monitor prefers availability over strictness: transport failures and
//! ambiguous states never log the user out. Only a definitive backend answer
//! does.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::remote::SessionStateSource;
use crate::store::TokenStorage;

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// What a single poll concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No valid local session to check.
    Skipped,
    /// Local and remote agree.
    Valid,
    /// The backend could not be reached; try again next tick.
    Inconclusive,
    /// The remote tracks a session but the local record predates tracking.
    Ambiguous,
    /// The session was force-invalidated and cleared.
    Invalidated,
}

enum SessionVerdict {
    Valid,
    Superseded,
    Ambiguous,
}

fn session_verdict(local: Option<&str>, remote: Option<&str>) -> SessionVerdict {
    match (local, remote) {
        (Some(l), Some(r)) if l == r => SessionVerdict::Valid,
        (Some(_), Some(_)) => SessionVerdict::Superseded,
        // Backend is not tracking a session; nothing to contradict.
        (Some(_), None) => SessionVerdict::Valid,
        (None, None) => SessionVerdict::Valid,
        // Local record predates session tracking. Invalidating here would
        // log out every user on the first release that tracks sessions.
        (None, Some(_)) => SessionVerdict::Ambiguous,
    }
}

/// Periodically reconciles the local session with the backend.
pub struct SessionMonitor {
    storage: Arc<TokenStorage>,
    source: Arc<dyn SessionStateSource>,
    interval: Duration,
    invalidated: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionMonitor {
    pub fn new(storage: Arc<TokenStorage>, source: Arc<dyn SessionStateSource>) -> Self {
        Self::with_interval(storage, source, DEFAULT_MONITOR_INTERVAL)
    }

    pub fn with_interval(
        storage: Arc<TokenStorage>,
        source: Arc<dyn SessionStateSource>,
        interval: Duration,
    ) -> Self {
        Self {
            storage,
            source,
            interval,
            invalidated: watch::Sender::new(false),
            task: Mutex::new(None),
        }
    }

    /// Receiver that observes forced-invalidation transitions.
    pub fn invalidation_changes(&self) -> watch::Receiver<bool> {
        self.invalidated.subscribe()
    }

    pub fn is_invalidated(&self) -> bool {
        *self.invalidated.borrow()
    }

    /// Reset the invalidation flag once the UI has reacted to it.
    pub fn acknowledge_invalidation(&self) {
        self.invalidated.send_replace(false);
    }

    /// Start the polling loop. A second call while the loop is running is a
    /// no-op; after invalidation or a stop the loop can be started again.
    pub async fn start_monitoring(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.as_ref() {
            if !handle.is_finished() {
                debug!("Session monitor already running");
                return;
            }
        }

        info!("Starting session monitor (every {:?})", self.interval);
        let monitor = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; consume it so polling starts
            // one interval after launch.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let outcome = monitor.poll_once().await;
                debug!("Session monitor tick: {outcome:?}");
                if outcome == TickOutcome::Invalidated {
                    break;
                }
            }
        }));
    }

    /// Stop the polling loop if it is running.
    pub async fn stop_monitoring(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
            info!("Session monitor stopped");
        }
    }

    pub async fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Run one reconciliation pass.
    pub async fn poll_once(&self) -> TickOutcome {
        let Some(record) = self.storage.peek_session().await else {
            return TickOutcome::Skipped;
        };
        if !record.is_valid() {
            // Lazy invalidation handles this on the next getter access.
            return TickOutcome::Skipped;
        }

        let remote = match self.source.fetch(&record.user_id).await {
            Ok(remote) => remote,
            Err(e) => {
                debug!("Session check unreachable: {} ({})", e.message(), e.code());
                return TickOutcome::Inconclusive;
            }
        };

        let Some(remote) = remote else {
            self.invalidate("remote user record no longer exists").await;
            return TickOutcome::Invalidated;
        };

        if remote.deleted {
            self.invalidate("account flagged for deletion").await;
            return TickOutcome::Invalidated;
        }

        match session_verdict(
            record.session_id.as_deref(),
            remote.current_session_id.as_deref(),
        ) {
            SessionVerdict::Valid => TickOutcome::Valid,
            SessionVerdict::Superseded => {
                self.invalidate("session superseded by a newer login").await;
                TickOutcome::Invalidated
            }
            SessionVerdict::Ambiguous => {
                warn!(
                    "Remote tracks session {:?} but local record has none; not invalidating",
                    remote.current_session_id
                );
                TickOutcome::Ambiguous
            }
        }
    }

    async fn invalidate(&self, reason: &str) {
        warn!("Session invalidated: {reason}");
        self.invalidated.send_replace(true);
        if let Err(e) = self.storage.clear_session().await {
            warn!("Failed to clear invalidated session: {}", e.message());
        }
    }
}
