//! Durable single-slot session storage.
//!
//! This module provides the `SessionStore` capability and its
//! `PreferenceStore` implementation, which keeps the session record under
//! one named key of a `PreferenceBackend` (JSON file, OS keychain, or
//! memory).
//!
//! Every subscriber sees the current value first and then each later
//! write. A stored value that cannot be decoded reads as "no session".

pub mod backend;
pub mod preferences;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::auth::SessionRecord;

pub use backend::{FileBackend, KeyringBackend, MemoryBackend, PreferenceBackend};
pub use preferences::{PreferenceStore, SESSION_KEY};

/// Live feed of the session slot
pub type SessionFeed = BoxStream<'static, Option<SessionRecord>>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored preferences could not be encoded or decoded: {0}")]
    Encoding(String),

    #[error("Keychain error: {0}")]
    Keyring(String),

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Storage task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Replace the stored session; subscribers are notified once the write is durable
    async fn put(&self, record: SessionRecord) -> Result<SessionRecord, StorageError>;

    /// Most recently observed value, without waiting
    fn get_latest(&self) -> Option<SessionRecord>;

    /// Current value immediately, then every subsequent write
    fn subscribe(&self) -> SessionFeed;
}
