//! Storage collaborator contract and the in-memory backend.
//!
//! The core only assumes a document store with optimistic concurrency and a
//! live change feed: `get`/`put`/`remove`/`all` plus a broadcast stream of
//! the revisions each write produced. [`MemoryStore`] satisfies the
//! contract without any I/O; it backs the local (logged-out) mode and the
//! test suites. [`GuardedStore`] bundles a store with a
//! [`ReplicationGuard`] so every local write is noted before its
//! change-stream echo can be classified.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::replica::{GuardSignal, ReplicationGuard};

/// Opaque revision identifier assigned by the store on every successful
/// write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionId(pub String);

impl RevisionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored document: identifier, the revision it was read at (`None` for a
/// document that has never been stored), and a plain-data body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub rev: Option<RevisionId>,
    pub body: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, body: Value) -> Self {
        Self {
            id: id.into(),
            rev: None,
            body,
        }
    }
}

/// One live change-stream event: the revisions a single write produced for
/// one document.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub id: String,
    pub revisions: Vec<RevisionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("revision conflict on document {0}")]
    Conflict(String),
    #[error("write failed: {0}")]
    Write(String),
}

/// The contract a storage backend must satisfy. Transport, authentication,
/// and durability are entirely the implementation's concern.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Document, StoreError>;

    /// Stores the document. `doc.rev` must match the currently stored
    /// revision (or be `None` for a new document) or the write fails with
    /// [`StoreError::Conflict`]. Returns the newly assigned revision.
    async fn put(&self, doc: &Document) -> Result<RevisionId, StoreError>;

    /// Deletes the document at the given revision; conflicts like `put`.
    /// Returns the deletion revision.
    async fn remove(&self, id: &str, rev: &RevisionId) -> Result<RevisionId, StoreError>;

    async fn all(&self) -> Result<Vec<Document>, StoreError>;

    /// Live feed of the revisions every write produces, including this
    /// process's own writes.
    fn changes(&self) -> broadcast::Receiver<ChangeBatch>;
}

struct StoredDoc {
    rev: RevisionId,
    generation: u64,
    body: Value,
}

struct MemoryState {
    docs: HashMap<String, StoredDoc>,
    sequence: u64,
}

/// In-memory [`DocumentStore`] with optimistic concurrency and a broadcast
/// change feed. Writes made directly on the store (not routed through a
/// guard) look exactly like another session's replicated writes.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    changes_tx: broadcast::Sender<ChangeBatch>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes_tx, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(MemoryState {
                docs: HashMap::new(),
                sequence: 0,
            }),
            changes_tx,
        }
    }

    fn publish(&self, id: &str, revision: &RevisionId) {
        let _ = self.changes_tx.send(ChangeBatch {
            id: id.to_string(),
            revisions: vec![revision.clone()],
        });
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        let state = self.state.lock();
        let stored = state
            .docs
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(Document {
            id: id.to_string(),
            rev: Some(stored.rev.clone()),
            body: stored.body.clone(),
        })
    }

    async fn put(&self, doc: &Document) -> Result<RevisionId, StoreError> {
        let rev = {
            let mut state = self.state.lock();
            let generation = match state.docs.get(&doc.id) {
                Some(existing) => {
                    if doc.rev.as_ref() != Some(&existing.rev) {
                        return Err(StoreError::Conflict(doc.id.clone()));
                    }
                    existing.generation + 1
                }
                None => {
                    if doc.rev.is_some() {
                        return Err(StoreError::Conflict(doc.id.clone()));
                    }
                    1
                }
            };
            state.sequence += 1;
            let rev = RevisionId(format!("{generation}-{:08x}", state.sequence));
            state.docs.insert(
                doc.id.clone(),
                StoredDoc {
                    rev: rev.clone(),
                    generation,
                    body: doc.body.clone(),
                },
            );
            rev
        };
        self.publish(&doc.id, &rev);
        Ok(rev)
    }

    async fn remove(&self, id: &str, rev: &RevisionId) -> Result<RevisionId, StoreError> {
        let deletion_rev = {
            let mut state = self.state.lock();
            let stored = state
                .docs
                .get(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            if &stored.rev != rev {
                return Err(StoreError::Conflict(id.to_string()));
            }
            let generation = stored.generation + 1;
            state.docs.remove(id);
            state.sequence += 1;
            RevisionId(format!("{generation}-{:08x}", state.sequence))
        };
        self.publish(id, &deletion_rev);
        Ok(deletion_rev)
    }

    async fn all(&self) -> Result<Vec<Document>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .docs
            .iter()
            .map(|(id, stored)| Document {
                id: id.clone(),
                rev: Some(stored.rev.clone()),
                body: stored.body.clone(),
            })
            .collect())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeBatch> {
        self.changes_tx.subscribe()
    }
}

/// A [`DocumentStore`] paired with the [`ReplicationGuard`] that watches
/// its change feed. All writes belonging to this session go through
/// [`GuardedStore::note_put`] / [`GuardedStore::note_remove`] so the guard
/// can tell their echoes apart from external writes.
pub struct GuardedStore {
    store: Arc<dyn DocumentStore>,
    guard: Arc<ReplicationGuard>,
}

impl GuardedStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            guard: Arc::new(ReplicationGuard::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn guard(&self) -> &Arc<ReplicationGuard> {
        &self.guard
    }

    /// Guard signal feed; see [`GuardSignal`].
    pub fn signals(&self) -> broadcast::Receiver<GuardSignal> {
        self.guard.subscribe()
    }

    /// Starts pumping the store's live change feed into the guard. Must be
    /// called from within a runtime; the task ends when the store's change
    /// sender is dropped.
    pub fn watch(&self) -> JoinHandle<()> {
        let mut changes = self.store.changes();
        let guard = Arc::clone(&self.guard);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(batch) => guard.observe(batch.revisions),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // A dropped batch can lose a rebuild trigger; the
                        // backend is expected to surface stream health.
                        warn!(missed, "change feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub async fn note_put(&self, doc: &Document) -> Result<RevisionId, StoreError> {
        self.guard.note(self.store.put(doc)).await
    }

    pub async fn note_remove(&self, id: &str, rev: &RevisionId) -> Result<RevisionId, StoreError> {
        self.guard.note(self.store.remove(id, rev)).await
    }
}
