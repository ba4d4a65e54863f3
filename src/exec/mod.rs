//! Async operation executor
//!
//! Provides:
//! - Named background operations with an observable global loading flag
//! - Failure funneling into a single observable UI error state
//! - One-shot retry of the most recent retryable failure
//! - Panic containment at the task boundary
//!
//! The executor is the seam between repositories returning [`AppResult`] and
//! view code that only understands loading flags and display states.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{AppError, AuthError, DataError, NetworkError};
use crate::result::AppResult;

/// Display-ready projection of a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiErrorState {
    /// The user must sign in (again) before the operation can succeed.
    RequiresAuth { message: String },
    /// Transient failure; offer a retry after the suggested delay.
    Retryable { message: String, delay: Duration },
    /// The input was rejected; the user can correct it.
    Validation { message: String },
    /// The user lacks permission.
    Denied { message: String },
    Network { message: String },
    Data { message: String },
    System { message: String },
    Unknown { message: String },
}

/// Map a typed error to its display state.
pub fn ui_error_state(error: &AppError) -> UiErrorState {
    let message = error.user_message().to_string();
    match error {
        AppError::Auth(AuthError::PermissionDenied(_)) => UiErrorState::Denied { message },
        AppError::Auth(AuthError::InvalidCredentials(_)) => UiErrorState::Validation { message },
        AppError::Auth(_) => UiErrorState::RequiresAuth { message },
        AppError::Network(e) => {
            if error.can_retry() {
                UiErrorState::Retryable {
                    message,
                    delay: retry_delay(e),
                }
            } else {
                UiErrorState::Network { message }
            }
        }
        AppError::Data(DataError::Validation(_)) => UiErrorState::Validation { message },
        AppError::Data(_) => UiErrorState::Data { message },
        AppError::System(_) => UiErrorState::System { message },
        AppError::Unknown(_) => UiErrorState::Unknown { message },
    }
}

/// Suggested wait before retrying a transient network failure.
fn retry_delay(error: &NetworkError) -> Duration {
    match error {
        NetworkError::NoInternet(_) => Duration::from_secs(5),
        NetworkError::Timeout(_) => Duration::from_secs(3),
        NetworkError::ServerUnavailable(_) => Duration::from_secs(10),
        NetworkError::Http { .. } => Duration::from_secs(5),
        NetworkError::Parse(_) => Duration::from_secs(5),
    }
}

type RetryFn = Box<dyn Fn() + Send + Sync>;

struct Inner {
    active: DashMap<String, ()>,
    loading: watch::Sender<bool>,
    error: watch::Sender<Option<UiErrorState>>,
    last_failed: StdMutex<Option<RetryFn>>,
}

/// Spawns named operations and projects their outcomes into observable
/// loading and error state. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct OperationExecutor {
    inner: Arc<Inner>,
}

impl Default for OperationExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationExecutor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                active: DashMap::new(),
                loading: watch::Sender::new(false),
                error: watch::Sender::new(None),
                last_failed: StdMutex::new(None),
            }),
        }
    }

    pub fn loading_changes(&self) -> watch::Receiver<bool> {
        self.inner.loading.subscribe()
    }

    /// Whether any operation is currently in flight.
    pub fn is_loading(&self) -> bool {
        *self.inner.loading.borrow()
    }

    pub fn is_operation_active(&self, op_id: &str) -> bool {
        self.inner.active.contains_key(op_id)
    }

    pub fn error_changes(&self) -> watch::Receiver<Option<UiErrorState>> {
        self.inner.error.subscribe()
    }

    pub fn error_state(&self) -> Option<UiErrorState> {
        self.inner.error.borrow().clone()
    }

    pub fn clear_error(&self) {
        self.inner.error.send_replace(None);
    }

    /// Spawn `op` under `op_id`. The error state is cleared on launch; on
    /// success `on_success` runs with the value; on failure the error state
    /// is published and, when retryable, the operation is stored for
    /// [`retry_last`](Self::retry_last).
    pub fn execute<T, F, Fut, S>(
        &self,
        op_id: impl Into<String>,
        op: F,
        on_success: S,
    ) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        self.spawn_operation(op_id.into(), Arc::new(op), Arc::new(on_success))
    }

    fn spawn_operation<T, F, Fut, S>(
        &self,
        op_id: String,
        op: Arc<F>,
        on_success: Arc<S>,
    ) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        self.clear_error();
        // Registered before the spawn so is_loading is accurate immediately,
        // and released by the guard's Drop even if the task is aborted.
        let guard = ActiveGuard::enter(self.clone(), op_id.clone());
        let executor = self.clone();

        tokio::spawn(async move {
            let _guard = guard;
            let outcome = std::panic::AssertUnwindSafe((op)()).catch_unwind().await;
            match outcome {
                Ok(AppResult::Success(value)) => {
                    debug!("Operation {op_id} completed");
                    on_success(value);
                }
                Ok(AppResult::Failure(e)) => {
                    executor.handle_failure(op_id, e, op, on_success);
                }
                Err(payload) => {
                    let e = AppError::from_panic(payload);
                    executor.handle_failure(op_id, e, op, on_success);
                }
            }
        })
    }

    /// Re-run the most recently failed retryable operation. Returns whether
    /// there was one to run; the stored closure is consumed either way.
    pub fn retry_last(&self) -> bool {
        let retry = self.inner.last_failed.lock().map(|mut g| g.take());
        match retry {
            Ok(Some(retry)) => {
                retry();
                true
            }
            _ => false,
        }
    }

    fn handle_failure<T, F, Fut, S>(&self, op_id: String, error: AppError, op: Arc<F>, on_success: Arc<S>)
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<T>> + Send + 'static,
        S: Fn(T) + Send + Sync + 'static,
    {
        warn!(
            "Operation {op_id} failed: {} ({}, {})",
            error.message(),
            error.code(),
            error.category()
        );

        if error.can_retry() {
            // Weak, so a pending retry never keeps the executor alive.
            // Replaced each time; retry always targets the latest failure.
            let inner = Arc::downgrade(&self.inner);
            if let Ok(mut last) = self.inner.last_failed.lock() {
                *last = Some(Box::new(move || {
                    if let Some(inner) = inner.upgrade() {
                        OperationExecutor { inner }.spawn_operation(
                            op_id.clone(),
                            Arc::clone(&op),
                            Arc::clone(&on_success),
                        );
                    }
                }));
            }
        }

        self.inner.error.send_replace(Some(ui_error_state(&error)));
    }

    fn recompute_loading(&self) {
        let loading = !self.inner.active.is_empty();
        self.inner.loading.send_if_modified(|current| {
            if *current != loading {
                *current = loading;
                true
            } else {
                false
            }
        });
    }
}

/// Marks an operation active for its lifetime; Drop keeps the active set
/// accurate even when the task panics or is aborted.
struct ActiveGuard {
    executor: OperationExecutor,
    op_id: String,
}

impl ActiveGuard {
    fn enter(executor: OperationExecutor, op_id: String) -> Self {
        executor.inner.active.insert(op_id.clone(), ());
        executor.recompute_loading();
        Self { executor, op_id }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.executor.inner.active.remove(&self.op_id);
        self.executor.recompute_loading();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    async fn settle(executor: &OperationExecutor) {
        while executor.is_loading() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_success_invokes_callback_and_clears_loading() {
        let executor = OperationExecutor::new();
        let received = Arc::new(StdMutex::new(None));
        let sink = Arc::clone(&received);

        let handle = executor.execute(
            "load-profile",
            || async { AppResult::Success(42) },
            move |v| {
                *sink.lock().unwrap() = Some(v);
            },
        );
        handle.await.unwrap();

        assert_eq!(*received.lock().unwrap(), Some(42));
        assert!(!executor.is_loading());
        assert_eq!(executor.error_state(), None);
    }

    #[tokio::test]
    async fn test_loading_tracks_active_operations() {
        let executor = OperationExecutor::new();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let gate = Arc::new(StdMutex::new(Some(gate)));

        let handle = executor.execute(
            "slow-op",
            move || {
                let gate = Arc::clone(&gate);
                async move {
                    let pending = gate.lock().unwrap().take();
                    if let Some(gate) = pending {
                        let _ = gate.await;
                    }
                    AppResult::Success(())
                }
            },
            |_| {},
        );

        tokio::task::yield_now().await;
        assert!(executor.is_loading());
        assert!(executor.is_operation_active("slow-op"));

        release.send(()).unwrap();
        handle.await.unwrap();
        assert!(!executor.is_loading());
        assert!(!executor.is_operation_active("slow-op"));
    }

    #[tokio::test]
    async fn test_global_loading_spans_concurrent_operations() {
        let executor = OperationExecutor::new();
        let (release_a, gate_a) = tokio::sync::oneshot::channel::<()>();
        let (release_b, gate_b) = tokio::sync::oneshot::channel::<()>();
        let gate_a = Arc::new(StdMutex::new(Some(gate_a)));
        let gate_b = Arc::new(StdMutex::new(Some(gate_b)));

        let a = executor.execute(
            "op-a",
            move || {
                let gate = Arc::clone(&gate_a);
                async move {
                    let pending = gate.lock().unwrap().take();
                    if let Some(gate) = pending {
                        let _ = gate.await;
                    }
                    AppResult::Success(())
                }
            },
            |_| {},
        );
        let b = executor.execute(
            "op-b",
            move || {
                let gate = Arc::clone(&gate_b);
                async move {
                    let pending = gate.lock().unwrap().take();
                    if let Some(gate) = pending {
                        let _ = gate.await;
                    }
                    AppResult::Success(())
                }
            },
            |_| {},
        );

        tokio::task::yield_now().await;
        assert!(executor.is_loading());

        release_a.send(()).unwrap();
        a.await.unwrap();
        // op-b still holds the flag
        assert!(executor.is_loading());

        release_b.send(()).unwrap();
        b.await.unwrap();
        assert!(!executor.is_loading());
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retryable() {
        let executor = OperationExecutor::new();
        let handle = executor.execute(
            "needs-auth",
            || async {
                AppResult::<()>::Failure(
                    AppError::not_authenticated("no session")
                        .with_user_message("Please sign in to continue."),
                )
            },
            |_| {},
        );
        handle.await.unwrap();

        assert_eq!(
            executor.error_state(),
            Some(UiErrorState::RequiresAuth {
                message: "Please sign in to continue.".to_string()
            })
        );
        assert!(!executor.retry_last());
    }

    #[tokio::test]
    async fn test_retry_reinvokes_exactly_once() {
        let executor = OperationExecutor::new();
        let attempts = Arc::new(AtomicU32::new(0));
        let successes = Arc::new(AtomicU32::new(0));

        let op_attempts = Arc::clone(&attempts);
        let op_successes = Arc::clone(&successes);
        let handle = executor.execute(
            "flaky-op",
            move || {
                let attempts = Arc::clone(&op_attempts);
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        AppResult::Failure(AppError::timeout("backend slow"))
                    } else {
                        AppResult::Success(())
                    }
                }
            },
            move |_| {
                op_successes.fetch_add(1, Ordering::SeqCst);
            },
        );
        handle.await.unwrap();

        assert_eq!(
            executor.error_state(),
            Some(UiErrorState::Retryable {
                message: "backend slow".to_string(),
                delay: Duration::from_secs(3),
            })
        );

        assert!(executor.retry_last());
        while executor.is_loading() || successes.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(executor.error_state(), None);
        // The stored retry was consumed.
        assert!(!executor.retry_last());
    }

    #[tokio::test]
    async fn test_pending_retry_does_not_leak_executor() {
        let executor = OperationExecutor::new();
        let handle = executor.execute(
            "flaky-op",
            || async { AppResult::<()>::Failure(AppError::timeout("backend slow")) },
            |_| {},
        );
        handle.await.unwrap();
        assert!(executor.error_state().is_some());

        // The stored retry must not hold a strong reference back to Inner.
        let inner = Arc::downgrade(&executor.inner);
        drop(executor);
        assert!(inner.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_cancellation_releases_active_set_without_error() {
        let executor = OperationExecutor::new();
        let handle = executor.execute(
            "doomed-op",
            || async {
                std::future::pending::<()>().await;
                AppResult::Success(())
            },
            |_| {},
        );

        tokio::task::yield_now().await;
        assert!(executor.is_operation_active("doomed-op"));

        handle.abort();
        let _ = handle.await;
        tokio::task::yield_now().await;

        assert!(!executor.is_operation_active("doomed-op"));
        assert!(!executor.is_loading());
        assert_eq!(executor.error_state(), None);
    }

    #[tokio::test]
    async fn test_panic_is_funneled_into_error_state() {
        let executor = OperationExecutor::new();
        let handle = executor.execute(
            "panicky-op",
            || async {
                if chrono::Utc::now().timestamp() != 0 {
                    panic!("corrupted state");
                }
                AppResult::Success(())
            },
            |_: ()| {},
        );
        handle.await.unwrap();

        // The UI state carries the user-facing fallback, not the panic text.
        assert_eq!(
            executor.error_state(),
            Some(UiErrorState::Unknown {
                message: "Something went wrong. Please try again.".to_string()
            })
        );
        assert!(!executor.is_loading());
    }

    #[tokio::test]
    async fn test_new_operation_clears_prior_error() {
        let executor = OperationExecutor::new();
        let handle = executor.execute(
            "failing-op",
            || async { AppResult::<()>::Failure(AppError::timeout("slow")) },
            |_| {},
        );
        handle.await.unwrap();
        assert!(executor.error_state().is_some());

        let handle = executor.execute(
            "clean-op",
            || async { AppResult::Success(()) },
            |_| {},
        );
        handle.await.unwrap();
        settle(&executor).await;
        assert_eq!(executor.error_state(), None);
    }

    #[test]
    fn test_ui_mapping_table() {
        let cases: Vec<(AppError, UiErrorState)> = vec![
            (
                AppError::permission_denied("no"),
                UiErrorState::Denied {
                    message: "no".to_string(),
                },
            ),
            (
                AppError::invalid_credentials("bad"),
                UiErrorState::Validation {
                    message: "bad".to_string(),
                },
            ),
            (
                AppError::session_expired("old"),
                UiErrorState::RequiresAuth {
                    message: "old".to_string(),
                },
            ),
            (
                AppError::no_internet("offline"),
                UiErrorState::Retryable {
                    message: "offline".to_string(),
                    delay: Duration::from_secs(5),
                },
            ),
            (
                AppError::server_unavailable("503"),
                UiErrorState::Retryable {
                    message: "503".to_string(),
                    delay: Duration::from_secs(10),
                },
            ),
            (
                AppError::parse("bad json"),
                UiErrorState::Network {
                    message: "bad json".to_string(),
                },
            ),
            (
                AppError::validation("empty name"),
                UiErrorState::Validation {
                    message: "empty name".to_string(),
                },
            ),
            (
                AppError::not_found("no wine"),
                UiErrorState::Data {
                    message: "no wine".to_string(),
                },
            ),
            (
                AppError::configuration("missing key"),
                UiErrorState::System {
                    message: "missing key".to_string(),
                },
            ),
            (
                AppError::unknown("???"),
                UiErrorState::Unknown {
                    message: "???".to_string(),
                },
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(ui_error_state(&error), expected, "for {}", error.code());
        }
    }
}
