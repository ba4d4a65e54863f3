//! Authentication layer
//!
//! Provides:
//! - The auth provider abstraction wrapping the backend auth service
//! - Sentinel-message classification for provider failures, including the
//!   degraded valid-session-without-profile path
//! - `AuthenticatedRepository`, the guard every authenticated operation
//!   passes through

pub mod provider;
pub mod repository;
pub mod sentinel;

pub use provider::{AuthProvider, ProviderError, ProviderSession, ProviderUser};
pub use repository::{AuthenticatedRepository, AuthenticatedUser};
pub use sentinel::{classify_provider_error, classify_restore_error, RestoreDisposition};
