//! Application error taxonomy
//!
//! Every repository-facing operation fails with a typed [`AppError`] rather
//! than a raw transport or storage error. Each variant carries a technical
//! message, an optional user-facing message, a stable error code and a
//! metadata bag; retryability and category are pure per-variant lookups.
//!
//! [`AppError::from_failure`] is the single conversion point from low-level
//! failures (HTTP, JSON, IO, provider sentinel strings) into the taxonomy.
//! Task cancellation is never converted - callers must check
//! `JoinError::is_cancelled` before routing a join failure through here.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Shared payload carried by every error variant.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetail {
    /// Technical message, for logs.
    pub message: String,
    /// User-facing message; falls back to `message` when unset.
    pub user_message: Option<String>,
    /// Originating low-level error, if any.
    pub source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
    /// String-keyed metadata bag.
    pub metadata: HashMap<String, String>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Arc::new(source));
        self
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// Equality ignores the source chain; two errors with the same message,
// user message and metadata compare equal regardless of provenance.
impl PartialEq for ErrorDetail {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
            && self.user_message == other.user_message
            && self.metadata == other.metadata
    }
}

impl Eq for ErrorDetail {}

/// Authentication and authorization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{0}")]
    NotAuthenticated(ErrorDetail),
    #[error("{0}")]
    SessionExpired(ErrorDetail),
    #[error("{0}")]
    SessionInvalidated(ErrorDetail),
    #[error("{0}")]
    AccountFlagged(ErrorDetail),
    #[error("{0}")]
    PermissionDenied(ErrorDetail),
    #[error("{0}")]
    InvalidCredentials(ErrorDetail),
    #[error("{0}")]
    TokenError(ErrorDetail),
}

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("{0}")]
    NoInternet(ErrorDetail),
    #[error("{0}")]
    Timeout(ErrorDetail),
    #[error("{0}")]
    ServerUnavailable(ErrorDetail),
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: ErrorDetail },
    #[error("{0}")]
    Parse(ErrorDetail),
}

/// Data-layer failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("{0}")]
    NotFound(ErrorDetail),
    #[error("{0}")]
    Validation(ErrorDetail),
    #[error("{0}")]
    Conflict(ErrorDetail),
    #[error("{0}")]
    Sync(ErrorDetail),
    #[error("{0}")]
    Storage(ErrorDetail),
    #[error("{0}")]
    Corrupted(ErrorDetail),
}

/// Environment and platform failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SystemError {
    #[error("{0}")]
    Configuration(ErrorDetail),
    #[error("{0}")]
    FeatureUnavailable(ErrorDetail),
    #[error("{0}")]
    ResourceExhausted(ErrorDetail),
}

/// Closed taxonomy of application failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(AuthError),
    #[error(transparent)]
    Network(NetworkError),
    #[error(transparent)]
    Data(DataError),
    #[error(transparent)]
    System(SystemError),
    #[error("{0}")]
    Unknown(ErrorDetail),
}

/// Coarse error category, used for UI routing and log labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Permission,
    Validation,
    Network,
    Data,
    System,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Network => "network",
            ErrorCategory::Data => "data",
            ErrorCategory::System => "system",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    // Shorthand constructors for the variants built all over the crate.

    pub fn not_authenticated(message: impl Into<String>) -> Self {
        AppError::Auth(AuthError::NotAuthenticated(ErrorDetail::new(message)))
    }

    pub fn session_expired(message: impl Into<String>) -> Self {
        AppError::Auth(AuthError::SessionExpired(ErrorDetail::new(message)))
    }

    pub fn session_invalidated(message: impl Into<String>) -> Self {
        AppError::Auth(AuthError::SessionInvalidated(ErrorDetail::new(message)))
    }

    pub fn account_flagged(message: impl Into<String>) -> Self {
        AppError::Auth(AuthError::AccountFlagged(ErrorDetail::new(message)))
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        AppError::Auth(AuthError::PermissionDenied(ErrorDetail::new(message)))
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        AppError::Auth(AuthError::InvalidCredentials(ErrorDetail::new(message)))
    }

    pub fn token_error(message: impl Into<String>) -> Self {
        AppError::Auth(AuthError::TokenError(ErrorDetail::new(message)))
    }

    pub fn no_internet(message: impl Into<String>) -> Self {
        AppError::Network(NetworkError::NoInternet(ErrorDetail::new(message)))
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        AppError::Network(NetworkError::Timeout(ErrorDetail::new(message)))
    }

    pub fn server_unavailable(message: impl Into<String>) -> Self {
        AppError::Network(NetworkError::ServerUnavailable(ErrorDetail::new(message)))
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        AppError::Network(NetworkError::Http {
            status,
            detail: ErrorDetail::new(message),
        })
    }

    pub fn parse(message: impl Into<String>) -> Self {
        AppError::Network(NetworkError::Parse(ErrorDetail::new(message)))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::Data(DataError::NotFound(ErrorDetail::new(message)))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Data(DataError::Validation(ErrorDetail::new(message)))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Data(DataError::Conflict(ErrorDetail::new(message)))
    }

    pub fn sync(message: impl Into<String>) -> Self {
        AppError::Data(DataError::Sync(ErrorDetail::new(message)))
    }

    pub fn storage(message: impl Into<String>) -> Self {
        AppError::Data(DataError::Storage(ErrorDetail::new(message)))
    }

    pub fn corrupted(message: impl Into<String>) -> Self {
        AppError::Data(DataError::Corrupted(ErrorDetail::new(message)))
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        AppError::System(SystemError::Configuration(ErrorDetail::new(message)))
    }

    pub fn feature_unavailable(message: impl Into<String>) -> Self {
        AppError::System(SystemError::FeatureUnavailable(ErrorDetail::new(message)))
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        AppError::System(SystemError::ResourceExhausted(ErrorDetail::new(message)))
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        AppError::Unknown(ErrorDetail::new(message))
    }

    fn detail(&self) -> &ErrorDetail {
        match self {
            AppError::Auth(e) => match e {
                AuthError::NotAuthenticated(d)
                | AuthError::SessionExpired(d)
                | AuthError::SessionInvalidated(d)
                | AuthError::AccountFlagged(d)
                | AuthError::PermissionDenied(d)
                | AuthError::InvalidCredentials(d)
                | AuthError::TokenError(d) => d,
            },
            AppError::Network(e) => match e {
                NetworkError::NoInternet(d)
                | NetworkError::Timeout(d)
                | NetworkError::ServerUnavailable(d)
                | NetworkError::Parse(d) => d,
                NetworkError::Http { detail, .. } => detail,
            },
            AppError::Data(e) => match e {
                DataError::NotFound(d)
                | DataError::Validation(d)
                | DataError::Conflict(d)
                | DataError::Sync(d)
                | DataError::Storage(d)
                | DataError::Corrupted(d) => d,
            },
            AppError::System(e) => match e {
                SystemError::Configuration(d)
                | SystemError::FeatureUnavailable(d)
                | SystemError::ResourceExhausted(d) => d,
            },
            AppError::Unknown(d) => d,
        }
    }

    fn detail_mut(&mut self) -> &mut ErrorDetail {
        match self {
            AppError::Auth(e) => match e {
                AuthError::NotAuthenticated(d)
                | AuthError::SessionExpired(d)
                | AuthError::SessionInvalidated(d)
                | AuthError::AccountFlagged(d)
                | AuthError::PermissionDenied(d)
                | AuthError::InvalidCredentials(d)
                | AuthError::TokenError(d) => d,
            },
            AppError::Network(e) => match e {
                NetworkError::NoInternet(d)
                | NetworkError::Timeout(d)
                | NetworkError::ServerUnavailable(d)
                | NetworkError::Parse(d) => d,
                NetworkError::Http { detail, .. } => detail,
            },
            AppError::Data(e) => match e {
                DataError::NotFound(d)
                | DataError::Validation(d)
                | DataError::Conflict(d)
                | DataError::Sync(d)
                | DataError::Storage(d)
                | DataError::Corrupted(d) => d,
            },
            AppError::System(e) => match e {
                SystemError::Configuration(d)
                | SystemError::FeatureUnavailable(d)
                | SystemError::ResourceExhausted(d) => d,
            },
            AppError::Unknown(d) => d,
        }
    }

    /// Technical message, for logs.
    pub fn message(&self) -> &str {
        &self.detail().message
    }

    /// User-facing message; falls back to the technical message.
    pub fn user_message(&self) -> &str {
        let d = self.detail();
        d.user_message.as_deref().unwrap_or(&d.message)
    }

    /// Metadata bag attached to this error.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.detail().metadata
    }

    /// Attach a user-facing message.
    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.detail_mut().user_message = Some(message.into());
        self
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.detail_mut().metadata.insert(key.into(), value.into());
        self
    }

    /// Stable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Auth(AuthError::NotAuthenticated(_)) => "AUTH_001",
            AppError::Auth(AuthError::SessionExpired(_)) => "AUTH_002",
            AppError::Auth(AuthError::SessionInvalidated(_)) => "AUTH_003",
            AppError::Auth(AuthError::AccountFlagged(_)) => "AUTH_004",
            AppError::Auth(AuthError::PermissionDenied(_)) => "AUTH_005",
            AppError::Auth(AuthError::InvalidCredentials(_)) => "AUTH_006",
            AppError::Auth(AuthError::TokenError(_)) => "AUTH_007",
            AppError::Network(NetworkError::NoInternet(_)) => "NET_001",
            AppError::Network(NetworkError::Timeout(_)) => "NET_002",
            AppError::Network(NetworkError::ServerUnavailable(_)) => "NET_003",
            AppError::Network(NetworkError::Http { .. }) => "NET_004",
            AppError::Network(NetworkError::Parse(_)) => "NET_005",
            AppError::Data(DataError::NotFound(_)) => "DATA_001",
            AppError::Data(DataError::Validation(_)) => "DATA_002",
            AppError::Data(DataError::Conflict(_)) => "DATA_003",
            AppError::Data(DataError::Sync(_)) => "DATA_004",
            AppError::Data(DataError::Storage(_)) => "DATA_005",
            AppError::Data(DataError::Corrupted(_)) => "DATA_006",
            AppError::System(SystemError::Configuration(_)) => "SYS_001",
            AppError::System(SystemError::FeatureUnavailable(_)) => "SYS_002",
            AppError::System(SystemError::ResourceExhausted(_)) => "SYS_003",
            AppError::Unknown(_) => "UNK_001",
        }
    }

    /// Coarse category for this variant.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::Auth(AuthError::PermissionDenied(_)) => ErrorCategory::Permission,
            AppError::Auth(AuthError::InvalidCredentials(_)) => ErrorCategory::Validation,
            AppError::Auth(_) => ErrorCategory::Authentication,
            AppError::Network(_) => ErrorCategory::Network,
            AppError::Data(DataError::Validation(_)) => ErrorCategory::Validation,
            AppError::Data(_) => ErrorCategory::Data,
            AppError::System(_) => ErrorCategory::System,
            AppError::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether retrying the failed operation can plausibly succeed.
    pub fn can_retry(&self) -> bool {
        match self {
            AppError::Auth(_) => false,
            AppError::Network(NetworkError::NoInternet(_))
            | AppError::Network(NetworkError::Timeout(_))
            | AppError::Network(NetworkError::ServerUnavailable(_)) => true,
            AppError::Network(NetworkError::Http { status, .. }) => {
                *status >= 500 || *status == 408 || *status == 429
            }
            AppError::Network(NetworkError::Parse(_)) => false,
            AppError::Data(DataError::Sync(_)) | AppError::Data(DataError::Storage(_)) => true,
            AppError::Data(_) => false,
            AppError::System(SystemError::ResourceExhausted(_)) => true,
            AppError::System(_) => false,
            AppError::Unknown(_) => false,
        }
    }

    /// Map the structured sentinel strings used by the auth-provider wrapper
    /// to their auth-error counterparts.
    ///
    /// The prefixes are a wire contract with the provider wrapper and must
    /// not be altered. Returns `None` for messages that carry no sentinel.
    pub fn classify_message(message: &str) -> Option<AppError> {
        if let Some(reason) = message.strip_prefix("FLAGGED_ACCOUNT:") {
            return Some(
                AppError::account_flagged(format!("Account flagged: {reason}"))
                    .with_user_message("Your account is under review. Please contact support.")
                    .with_meta("reason", reason),
            );
        }
        if let Some(detail) = message.strip_prefix("SESSION_INVALIDATED:") {
            return Some(
                AppError::session_invalidated(format!("Session invalidated: {detail}"))
                    .with_user_message("You have been signed in on another device."),
            );
        }
        if let Some(detail) = message.strip_prefix("SESSION_EXPIRED:") {
            return Some(
                AppError::session_expired(format!("Session expired: {detail}"))
                    .with_user_message("Your session has expired. Please sign in again."),
            );
        }
        if let Some(detail) = message.strip_prefix("SESSION_TERMINATED:") {
            return Some(
                AppError::session_invalidated(format!("Session terminated: {detail}"))
                    .with_user_message("Your session was ended. Please sign in again."),
            );
        }
        if let Some(detail) = message.strip_prefix("INVALID_SESSION:") {
            return Some(
                AppError::token_error(format!("Invalid session: {detail}"))
                    .with_user_message("Your session is no longer valid. Please sign in again."),
            );
        }
        let lower = message.to_lowercase();
        if lower.contains("not authenticated") {
            return Some(
                AppError::not_authenticated(message.to_string())
                    .with_user_message("Please sign in to continue."),
            );
        }
        if lower.contains("permission denied") {
            return Some(
                AppError::permission_denied(message.to_string())
                    .with_user_message("You don't have access to this."),
            );
        }
        None
    }

    /// Convert an arbitrary boxed failure into the taxonomy.
    ///
    /// Downcasts known low-level error types first, then falls back to
    /// sentinel classification of the message, then to `Unknown`.
    pub fn from_failure(err: Box<dyn std::error::Error + Send + Sync + 'static>) -> AppError {
        let err = match err.downcast::<reqwest::Error>() {
            Ok(e) => return AppError::from(*e),
            Err(e) => e,
        };
        let err = match err.downcast::<serde_json::Error>() {
            Ok(e) => return AppError::from(*e),
            Err(e) => e,
        };
        let err = match err.downcast::<std::io::Error>() {
            Ok(e) => return AppError::from(*e),
            Err(e) => e,
        };
        let message = err.to_string();
        if let Some(mapped) = AppError::classify_message(&message) {
            return mapped;
        }
        AppError::Unknown(ErrorDetail::new(message).with_source(ArcError(Arc::from(err))))
    }

    /// Convert a caught panic payload into an error, used by the
    /// presentation-layer executor's top-level handler.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> AppError {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "operation panicked".to_string());
        AppError::unknown(format!("panic: {message}"))
            .with_user_message("Something went wrong. Please try again.")
    }

    fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.detail_mut().source = Some(Arc::new(source));
        self
    }
}

// Wrapper so an already-boxed error can sit in ErrorDetail::source.
#[derive(Debug, Clone)]
struct ArcError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl fmt::Display for ArcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ArcError {}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return AppError::timeout(format!("Request timed out: {err}"))
                .with_user_message("The request timed out. Check your connection and try again.")
                .with_source(err);
        }
        if let Some(status) = err.status() {
            let code = status.as_u16();
            if code == 502 || code == 503 || code == 504 {
                return AppError::server_unavailable(format!("Server unavailable: {err}"))
                    .with_user_message("The service is temporarily unavailable.")
                    .with_source(err);
            }
            return AppError::http(code, format!("HTTP error: {err}"))
                .with_user_message("The request failed. Please try again.")
                .with_source(err);
        }
        if err.is_connect() {
            // Connection refused means the host resolved but nothing answered;
            // everything else in the connect phase reads as no connectivity.
            if io_kind_in_chain(&err, std::io::ErrorKind::ConnectionRefused) {
                return AppError::server_unavailable(format!("Connection refused: {err}"))
                    .with_user_message("The service is temporarily unavailable.")
                    .with_source(err);
            }
            return AppError::no_internet(format!("Connection failed: {err}"))
                .with_user_message("No internet connection. Check your network and try again.")
                .with_source(err);
        }
        if err.is_decode() {
            return AppError::parse(format!("Response decoding failed: {err}"))
                .with_user_message("Received an unexpected response from the server.")
                .with_source(err);
        }
        AppError::unknown(format!("Request failed: {err}")).with_source(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::parse(format!("JSON error: {err}"))
            .with_user_message("Received an unexpected response from the server.")
            .with_source(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::storage(format!("IO error: {err}"))
            .with_user_message("Could not read or write local data.")
            .with_source(err)
    }
}

/// Walk an error's source chain looking for an IO error of the given kind.
fn io_kind_in_chain(err: &(dyn std::error::Error + 'static), kind: std::io::ErrorKind) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == kind {
                return true;
            }
        }
        current = e.source();
    }
    false
}
