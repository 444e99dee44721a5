//! Persistence service — ordered background writes and startup hydration.
//!
//! DESIGN
//! ======
//! Mutations never wait on storage. After each mutation the store hands a
//! snapshot of the tree to a writer task over an unbounded channel. The
//! writer drains whatever is queued, keeps only the newest snapshot, and
//! writes it as one document. Snapshots are produced in call order, so an
//! older tree is never written after a newer one (last write wins).
//!
//! ERROR HANDLING
//! ==============
//! The in-memory tree stays authoritative. A failed write is retried with
//! linear back-off; if it still fails the error is logged and recorded in
//! [`PersistHealth`] so callers can surface the data-loss risk.
//!
//! Hydration moves an undecodable document to `<key>.corrupt` and starts
//! empty. If the slot cannot be read at all, or the bad document cannot be
//! moved aside, hydration fails and the caller must not attach a writer:
//! the stored document is left untouched for the next start.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{Lookup, parse_or};
use crate::document::{self, DocumentError};
use crate::state::AppState;
use crate::storage::{KeyValueStorage, StorageError};

const DEFAULT_PERSIST_RETRIES: usize = 3;
const DEFAULT_PERSIST_RETRY_BASE_MS: u64 = 25;

/// Suffix of the slot that receives a document we could not decode.
pub const CORRUPT_SUFFIX: &str = ".corrupt";

// =============================================================================
// CONFIG
// =============================================================================

/// Retry knobs for the writer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistConfig {
    /// Write attempts per document. Zero is treated as one.
    pub retries: usize,
    /// Base delay in milliseconds; attempt `n` waits `n * retry_base_ms`.
    pub retry_base_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self { retries: DEFAULT_PERSIST_RETRIES, retry_base_ms: DEFAULT_PERSIST_RETRY_BASE_MS }
    }
}

impl PersistConfig {
    pub(crate) fn from_lookup(lookup: &Lookup<'_>) -> Self {
        Self {
            retries: parse_or(lookup, "FETCHIT_PERSIST_RETRIES", DEFAULT_PERSIST_RETRIES),
            retry_base_ms: parse_or(lookup, "FETCHIT_PERSIST_RETRY_BASE_MS", DEFAULT_PERSIST_RETRY_BASE_MS),
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("persistence writer is not running")]
    WriterClosed,
}

/// Running tally of writer outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistHealth {
    /// Documents written successfully.
    pub written: u64,
    /// Documents abandoned after exhausting retries.
    pub failed: u64,
    /// Most recent failure message, cleared by the next successful write.
    pub last_error: Option<String>,
}

impl PersistHealth {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }
}

enum Command {
    Save(Box<AppState>),
    Flush(oneshot::Sender<()>),
}

/// Handle to a running writer task.
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<Command>,
    health: watch::Receiver<PersistHealth>,
    task: JoinHandle<()>,
}

impl PersistHandle {
    /// Queue a snapshot for writing. Never blocks.
    pub fn enqueue(&self, state: AppState) {
        if self.tx.send(Command::Save(Box::new(state))).is_err() {
            warn!("persistence writer closed; dropping snapshot");
        }
    }

    /// Wait until every snapshot queued before this call has been handled.
    ///
    /// # Errors
    ///
    /// Returns `WriterClosed` if the writer task has stopped.
    pub async fn flush(&self) -> Result<(), PersistError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx.send(Command::Flush(ack_tx)).map_err(|_| PersistError::WriterClosed)?;
        ack_rx.await.map_err(|_| PersistError::WriterClosed)
    }

    #[must_use]
    pub fn health(&self) -> PersistHealth {
        self.health.borrow().clone()
    }

    /// Watch channel that changes after every write attempt outcome.
    #[must_use]
    pub fn subscribe_health(&self) -> watch::Receiver<PersistHealth> {
        self.health.clone()
    }

    /// Close the queue, let the writer drain it, and return the final tally.
    pub async fn shutdown(self) -> PersistHealth {
        let Self { tx, health, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            error!(error = %e, "persistence writer task failed");
        }
        health.borrow().clone()
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Spawn the writer task for one storage slot. Must be called inside a Tokio runtime.
#[must_use]
pub fn spawn_persistence_worker(
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    config: PersistConfig,
) -> PersistHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
    let (health_tx, health_rx) = watch::channel(PersistHealth::default());

    info!(key = %key, retries = config.retries, retry_base_ms = config.retry_base_ms, "persistence writer configured");

    let task = tokio::spawn(async move {
        while let Some(first) = rx.recv().await {
            let mut latest: Option<Box<AppState>> = None;
            let mut waiters: Vec<oneshot::Sender<()>> = Vec::new();

            let mut absorb = |command: Command| match command {
                Command::Save(state) => latest = Some(state),
                Command::Flush(ack) => waiters.push(ack),
            };
            absorb(first);
            while let Ok(command) = rx.try_recv() {
                absorb(command);
            }

            if let Some(state) = latest {
                write_with_retry(storage.as_ref(), &key, &state, config, &health_tx).await;
            }
            for ack in waiters {
                let _ = ack.send(());
            }
        }
        info!(key = %key, "persistence writer stopped");
    });

    PersistHandle { tx, health: health_rx, task }
}

async fn write_with_retry(
    storage: &dyn KeyValueStorage,
    key: &str,
    state: &AppState,
    config: PersistConfig,
    health: &watch::Sender<PersistHealth>,
) {
    let encoded = match document::encode(state) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(error = %e, key, "state document encode failed");
            record_failure(health, &e.to_string());
            return;
        }
    };

    let attempts = config.retries.max(1);
    for attempt in 1..=attempts {
        match storage.set(key, &encoded).await {
            Ok(()) => {
                health.send_modify(|h| {
                    h.written += 1;
                    h.last_error = None;
                });
                return;
            }
            Err(e) if attempt < attempts => {
                warn!(error = %e, attempt, total = attempts, key, "state write failed; retrying");
                tokio::time::sleep(Duration::from_millis((attempt as u64) * config.retry_base_ms)).await;
            }
            Err(e) => {
                error!(error = %e, key, "state write failed after retries; in-memory state is ahead of storage");
                record_failure(health, &e.to_string());
            }
        }
    }
}

fn record_failure(health: &watch::Sender<PersistHealth>, message: &str) {
    health.send_modify(|h| {
        h.failed += 1;
        h.last_error = Some(message.to_string());
    });
}

// =============================================================================
// LOAD
// =============================================================================

/// Read and decode the document under `key`. `None` if the slot is empty.
///
/// # Errors
///
/// Returns `Storage` if the backend read fails and `Document` if the blob
/// does not decode.
pub async fn load_state(storage: &dyn KeyValueStorage, key: &str) -> Result<Option<AppState>, PersistError> {
    let Some(raw) = storage.get(key).await? else {
        return Ok(None);
    };
    Ok(Some(document::decode(&raw)?))
}

/// Startup hydration.
///
/// An empty slot yields an empty tree. An undecodable document is moved to
/// `<key>.corrupt` and an empty tree is returned. Reads are retried with the
/// writer's back-off.
///
/// # Errors
///
/// Returns `Storage` when the slot stays unreadable, or when an undecodable
/// document cannot be copied aside. The slot must not be written in either case.
pub async fn hydrate(
    storage: &dyn KeyValueStorage,
    key: &str,
    config: PersistConfig,
) -> Result<AppState, PersistError> {
    let Some(raw) = read_with_retry(storage, key, config).await? else {
        info!(key, "no stored state; starting empty");
        return Ok(AppState::new());
    };

    match document::decode(&raw) {
        Ok(state) => {
            info!(key, groups = state.groups.len(), lists = state.lists.len(), "state hydrated");
            Ok(state)
        }
        Err(e) => {
            warn!(error = %e, key, "stored state unreadable; setting it aside and starting empty");
            set_aside(storage, key, &raw).await?;
            Ok(AppState::new())
        }
    }
}

async fn read_with_retry(
    storage: &dyn KeyValueStorage,
    key: &str,
    config: PersistConfig,
) -> Result<Option<String>, StorageError> {
    let attempts = config.retries.max(1);
    let mut attempt = 1;
    loop {
        match storage.get(key).await {
            Ok(raw) => return Ok(raw),
            Err(e) if attempt < attempts => {
                warn!(error = %e, attempt, total = attempts, key, "state read failed; retrying");
                tokio::time::sleep(Duration::from_millis((attempt as u64) * config.retry_base_ms)).await;
                attempt += 1;
            }
            Err(e) => {
                error!(error = %e, key, "state read failed after retries");
                return Err(e);
            }
        }
    }
}

/// Copy `raw` to `<key>.corrupt`, then clear `key`.
async fn set_aside(storage: &dyn KeyValueStorage, key: &str, raw: &str) -> Result<(), StorageError> {
    let corrupt_key = format!("{key}{CORRUPT_SUFFIX}");
    if let Err(e) = storage.set(&corrupt_key, raw).await {
        error!(error = %e, key = %corrupt_key, "failed to preserve unreadable state");
        return Err(e);
    }
    if let Err(e) = storage.remove(key).await {
        warn!(error = %e, key, "unreadable state copied aside but not cleared");
    }
    Ok(())
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
