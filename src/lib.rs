//! Vinoteca session consistency core
//!
//! Keeps the client's view of "who is signed in" consistent with the
//! backend's:
//! - `store` persists the device session and purges it lazily on access
//! - `monitor` polls the backend and force-invalidates superseded sessions
//! - `auth` guards every authenticated operation behind session resolution
//! - `exec` runs operations in the background and projects their outcomes
//!   into observable loading and error state
//! - `error` / `result` carry typed, classified failures between the layers

pub mod auth;
pub mod config;
pub mod error;
pub mod exec;
pub mod monitor;
pub mod remote;
pub mod result;
pub mod store;

pub use auth::{AuthProvider, AuthenticatedRepository, AuthenticatedUser};
pub use config::Args;
pub use error::{AppError, AuthError, DataError, ErrorCategory, NetworkError, SystemError};
pub use exec::{OperationExecutor, UiErrorState};
pub use monitor::{SessionMonitor, TickOutcome};
pub use remote::{RemoteSessionState, RestSessionSource, RestSourceConfig, SessionStateSource};
pub use result::{combine, combine3, AppResult};
pub use store::{FileStore, KeyValueStore, MemoryStore, SessionRecord, TokenStorage};
