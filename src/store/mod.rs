//! Device-local session persistence
//!
//! Provides:
//! - A key/value storage abstraction with in-memory and file-backed stores
//! - The persisted session record and its validity rules
//! - `TokenStorage`, the single owner of the local session lifecycle

pub mod kv;
pub mod record;
pub mod token_storage;

pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use record::SessionRecord;
pub use token_storage::{TokenStorage, DEFAULT_SESSION_TTL};
