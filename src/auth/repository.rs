//! Authenticated operation guard
//!
//! Every operation that needs a signed-in user runs through
//! [`AuthenticatedRepository::execute_authenticated`]: local session first,
//! then user resolution (in-memory, restore, or degraded fallback), and only
//! then the operation itself. Without a valid local session no remote call
//! is made at all.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::auth::provider::{AuthProvider, ProviderUser};
use crate::auth::sentinel::{classify_provider_error, classify_restore_error, RestoreDisposition};
use crate::error::AppError;
use crate::result::AppResult;
use crate::store::TokenStorage;

/// The resolved identity an authenticated operation runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// False when the identity came from the degraded restore path and the
    /// profile still needs to be loaded.
    pub profile_complete: bool,
}

impl AuthenticatedUser {
    fn from_provider(user: ProviderUser) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
            display_name: user.display_name,
            profile_complete: true,
        }
    }
}

/// Auth facade binding the provider to local token storage.
pub struct AuthenticatedRepository {
    provider: Arc<dyn AuthProvider>,
    storage: Arc<TokenStorage>,
}

impl AuthenticatedRepository {
    pub fn new(provider: Arc<dyn AuthProvider>, storage: Arc<TokenStorage>) -> Self {
        Self { provider, storage }
    }

    /// Sign in and persist the resulting session.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthenticatedUser> {
        let session = match self.provider.sign_in(email, password).await {
            Ok(session) => session,
            Err(e) => return AppResult::Failure(classify_provider_error(&e)),
        };
        if let Err(e) = self
            .storage
            .save_session(
                &session.access_token,
                &session.refresh_token,
                &session.user.id,
                session.session_id.as_deref(),
            )
            .await
        {
            return AppResult::Failure(e);
        }
        AppResult::Success(AuthenticatedUser::from_provider(session.user))
    }

    /// Register a new account and persist the resulting session.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> AppResult<AuthenticatedUser> {
        let session = match self.provider.sign_up(email, password, display_name).await {
            Ok(session) => session,
            Err(e) => return AppResult::Failure(classify_provider_error(&e)),
        };
        if let Err(e) = self
            .storage
            .save_session(
                &session.access_token,
                &session.refresh_token,
                &session.user.id,
                session.session_id.as_deref(),
            )
            .await
        {
            return AppResult::Failure(e);
        }
        AppResult::Success(AuthenticatedUser::from_provider(session.user))
    }

    /// Sign out at the provider and clear the local session. The local
    /// session is cleared even when the provider call fails; local cleanup
    /// errors take precedence in the reported result.
    pub async fn sign_out(&self) -> AppResult<()> {
        let provider_result = self.provider.sign_out().await;
        if let Err(e) = self.storage.clear_session().await {
            return AppResult::Failure(e);
        }
        match provider_result {
            Ok(()) => AppResult::Success(()),
            Err(e) => AppResult::Failure(classify_provider_error(&e)),
        }
    }

    /// Run `op` as the resolved authenticated user.
    pub async fn execute_authenticated<T, F, Fut>(&self, op: F) -> AppResult<T>
    where
        F: FnOnce(AuthenticatedUser) -> Fut + Send,
        Fut: Future<Output = AppResult<T>> + Send,
        T: Send,
    {
        if !self.storage.is_valid().await {
            return AppResult::Failure(
                AppError::not_authenticated("No valid local session")
                    .with_user_message("Please sign in to continue."),
            );
        }

        let user = match self.resolve_user().await {
            Ok(user) => user,
            Err(e) => return AppResult::Failure(e),
        };

        op(user).await
    }

    /// Resolution order: provider memory, then a restore from the stored
    /// refresh token, then the degraded identity the restore sentinel
    /// carries.
    async fn resolve_user(&self) -> Result<AuthenticatedUser, AppError> {
        if let Some(user) = self.provider.current_user().await {
            return Ok(AuthenticatedUser::from_provider(user));
        }

        let Some(refresh_token) = self.storage.refresh_token().await else {
            return Err(AppError::not_authenticated(
                "Session vanished during resolution",
            ));
        };

        match self.provider.restore_session(&refresh_token).await {
            Ok(user) => Ok(AuthenticatedUser::from_provider(user)),
            Err(e) => match classify_restore_error(&e) {
                RestoreDisposition::Degraded { user_id, email } => {
                    debug!("Proceeding with degraded identity for {user_id}");
                    Ok(AuthenticatedUser {
                        user_id,
                        email,
                        display_name: None,
                        profile_complete: false,
                    })
                }
                RestoreDisposition::Fatal(e) => Err(e),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    use crate::auth::provider::{ProviderError, ProviderSession};
    use crate::store::kv::MemoryStore;

    fn alice() -> ProviderUser {
        ProviderUser {
            id: "user-1".to_string(),
            email: Some("alice@vinoteca.app".to_string()),
            display_name: Some("Alice".to_string()),
        }
    }

    fn alice_session() -> ProviderSession {
        ProviderSession {
            user: alice(),
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            session_id: Some("sess-1".to_string()),
        }
    }

    struct MockProvider {
        current: Option<ProviderUser>,
        restore_result: StdMutex<Option<Result<ProviderUser, ProviderError>>>,
        sign_in_result: StdMutex<Option<Result<ProviderSession, ProviderError>>>,
        current_calls: AtomicU32,
        restore_calls: AtomicU32,
        sign_out_calls: AtomicU32,
    }

    impl MockProvider {
        fn new() -> Self {
            Self {
                current: None,
                restore_result: StdMutex::new(None),
                sign_in_result: StdMutex::new(None),
                current_calls: AtomicU32::new(0),
                restore_calls: AtomicU32::new(0),
                sign_out_calls: AtomicU32::new(0),
            }
        }

        fn with_current(mut self, user: ProviderUser) -> Self {
            self.current = Some(user);
            self
        }

        fn with_restore(self, result: Result<ProviderUser, ProviderError>) -> Self {
            *self.restore_result.lock().unwrap() = Some(result);
            self
        }

        fn with_sign_in(self, result: Result<ProviderSession, ProviderError>) -> Self {
            *self.sign_in_result.lock().unwrap() = Some(result);
            self
        }
    }

    #[async_trait::async_trait]
    impl AuthProvider for MockProvider {
        async fn sign_in(
            &self,
            _email: &str,
            _password: &str,
        ) -> Result<ProviderSession, ProviderError> {
            self.sign_in_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(alice_session()))
        }

        async fn sign_up(
            &self,
            _email: &str,
            _password: &str,
            _display_name: Option<&str>,
        ) -> Result<ProviderSession, ProviderError> {
            Ok(alice_session())
        }

        async fn sign_out(&self) -> Result<(), ProviderError> {
            self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn restore_session(
            &self,
            _refresh_token: &str,
        ) -> Result<ProviderUser, ProviderError> {
            self.restore_calls.fetch_add(1, Ordering::SeqCst);
            self.restore_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(alice()))
        }

        async fn current_user(&self) -> Option<ProviderUser> {
            self.current_calls.fetch_add(1, Ordering::SeqCst);
            self.current.clone()
        }
    }

    async fn repository(
        provider: MockProvider,
    ) -> (AuthenticatedRepository, Arc<TokenStorage>, Arc<MockProvider>) {
        let provider = Arc::new(provider);
        let storage = Arc::new(TokenStorage::new(Arc::new(MemoryStore::default())).await);
        let repo = AuthenticatedRepository::new(
            Arc::clone(&provider) as Arc<dyn AuthProvider>,
            Arc::clone(&storage),
        );
        (repo, storage, provider)
    }

    async fn with_saved_session(
        provider: MockProvider,
    ) -> (AuthenticatedRepository, Arc<TokenStorage>, Arc<MockProvider>) {
        let (repo, storage, provider) = repository(provider).await;
        storage
            .save_session("at", "rt", "user-1", Some("sess-1"))
            .await
            .unwrap();
        (repo, storage, provider)
    }

    #[tokio::test]
    async fn test_no_session_fails_without_remote_call() {
        let (repo, _storage, provider) = repository(MockProvider::new()).await;

        let result = repo
            .execute_authenticated(|_user| async { AppResult::Success(1) })
            .await;
        match result {
            AppResult::Failure(e) => assert_eq!(e.code(), "AUTH_001"),
            AppResult::Success(_) => panic!("expected failure"),
        }
        // The provider was never consulted.
        assert_eq!(provider.current_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.restore_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_active_user_gets_full_profile() {
        let (repo, _storage, provider) =
            with_saved_session(MockProvider::new().with_current(alice())).await;

        let result = repo
            .execute_authenticated(|user| async move {
                AppResult::Success((user.profile_complete, user.user_id))
            })
            .await;
        assert_eq!(result, AppResult::Success((true, "user-1".to_string())));
        assert_eq!(provider.restore_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restoration_fallback_runs_once() {
        let (repo, _storage, provider) =
            with_saved_session(MockProvider::new().with_restore(Ok(alice()))).await;

        let result = repo
            .execute_authenticated(|user| async move { AppResult::Success(user.user_id) })
            .await;
        assert_eq!(result, AppResult::Success("user-1".to_string()));
        assert_eq!(provider.restore_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_degraded_restore_recovers_identity() {
        let provider = MockProvider::new().with_restore(Err(ProviderError::new(
            "VALID_SESSION_NO_USER:user-1:alice@vinoteca.app",
        )));
        let (repo, _storage, _provider) = with_saved_session(provider).await;

        let result = repo
            .execute_authenticated(|user| async move {
                AppResult::Success((user.user_id, user.email, user.profile_complete))
            })
            .await;
        assert_eq!(
            result,
            AppResult::Success((
                "user-1".to_string(),
                Some("alice@vinoteca.app".to_string()),
                false
            ))
        );
    }

    #[tokio::test]
    async fn test_fatal_restore_sentinels_abort() {
        let cases = [
            ("FLAGGED_ACCOUNT:abuse", "AUTH_004"),
            ("SESSION_INVALIDATED:superseded", "AUTH_003"),
            ("SESSION_EXPIRED:ttl", "AUTH_002"),
            ("INVALID_SESSION:garbled", "AUTH_007"),
        ];
        for (message, code) in cases {
            let provider = MockProvider::new().with_restore(Err(ProviderError::new(message)));
            let (repo, _storage, _provider) = with_saved_session(provider).await;

            let result = repo
                .execute_authenticated(|_user| async { AppResult::Success(()) })
                .await;
            match result {
                AppResult::Failure(e) => assert_eq!(e.code(), code, "for {message}"),
                AppResult::Success(_) => panic!("expected failure for {message}"),
            }
        }
    }

    #[tokio::test]
    async fn test_sign_in_persists_session() {
        let (repo, storage, _provider) = repository(MockProvider::new()).await;

        let result = repo.sign_in("alice@vinoteca.app", "secret").await;
        assert!(result.is_success());

        let record = storage.session_info().await.unwrap();
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.session_id, Some("sess-1".to_string()));
    }

    #[tokio::test]
    async fn test_sign_in_failure_leaves_no_session() {
        let provider = MockProvider::new()
            .with_sign_in(Err(ProviderError::new("Invalid login credentials")));
        let (repo, storage, _provider) = repository(provider).await;

        let result = repo.sign_in("alice@vinoteca.app", "wrong").await;
        match result {
            AppResult::Failure(e) => assert_eq!(e.code(), "AUTH_006"),
            AppResult::Success(_) => panic!("expected failure"),
        }
        assert!(storage.peek_session().await.is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_local_session() {
        let (repo, storage, provider) = with_saved_session(MockProvider::new()).await;

        let result = repo.sign_out().await;
        assert!(result.is_success());
        assert!(storage.peek_session().await.is_none());
        assert!(!storage.is_logged_in());
        assert_eq!(provider.sign_out_calls.load(Ordering::SeqCst), 1);
    }
}
