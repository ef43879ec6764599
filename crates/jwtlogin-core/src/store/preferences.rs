use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::auth::SessionRecord;

use super::{PreferenceBackend, SessionFeed, SessionStore, StorageError};

/// Preference key holding the encoded session record
pub const SESSION_KEY: &str = "authenticationData";

/// Session slot persisted in a preference backend.
///
/// Writes are serialized through an async mutex; the watch channel holds the
/// latest durable value and fans it out to subscribers.
pub struct PreferenceStore<B> {
    backend: Arc<B>,
    write_lock: Mutex<()>,
    latest: watch::Sender<Option<SessionRecord>>,
}

impl<B: PreferenceBackend + 'static> PreferenceStore<B> {
    /// Open the store, reading whatever the backend currently holds.
    ///
    /// A missing, unreadable, or undecodable value opens as an empty slot.
    pub async fn open(backend: B) -> Self {
        let backend = Arc::new(backend);
        let initial = Self::read_initial(Arc::clone(&backend)).await;
        let (latest, _) = watch::channel(initial);

        Self {
            backend,
            write_lock: Mutex::new(()),
            latest,
        }
    }

    async fn read_initial(backend: Arc<B>) -> Option<SessionRecord> {
        let raw = match tokio::task::spawn_blocking(move || backend.read(SESSION_KEY)).await {
            Ok(Ok(raw)) => raw?,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to read stored session, treating as absent");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Session read task failed, treating as absent");
                return None;
            }
        };

        match SessionRecord::decode(&raw) {
            Ok(record) => {
                debug!(session = %record, "Loaded stored session");
                Some(record)
            }
            Err(e) => {
                warn!(error = %e, "Stored session is corrupt, treating as absent");
                None
            }
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// Turn a watch receiver into a feed that replays the current value first
fn session_feed(rx: watch::Receiver<Option<SessionRecord>>) -> SessionFeed {
    futures::stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let value = rx.borrow_and_update().clone();
        Some((value, (rx, false)))
    })
    .boxed()
}

#[async_trait]
impl<B: PreferenceBackend + 'static> SessionStore for PreferenceStore<B> {
    async fn put(&self, record: SessionRecord) -> Result<SessionRecord, StorageError> {
        let _guard = self.write_lock.lock().await;

        let backend = Arc::clone(&self.backend);
        let raw = record.encode().map_err(|e| StorageError::Encoding(e.to_string()))?;
        tokio::task::spawn_blocking(move || backend.write(SESSION_KEY, &raw))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))??;

        debug!(session = %record, "Session stored");
        self.latest.send_replace(Some(record.clone()));
        Ok(record)
    }

    fn get_latest(&self) -> Option<SessionRecord> {
        self.latest.borrow().clone()
    }

    fn subscribe(&self) -> SessionFeed {
        session_feed(self.latest.subscribe())
    }
}
