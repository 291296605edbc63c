//! Replication guard: own writes vs. writes replicated in from elsewhere.
//!
//! A live-replicated store streams a notification for every write to the
//! user's dataset, including writes this process just made itself. The
//! write acknowledgment and the change-stream notification travel over
//! independent channels, so a self-caused notification can arrive before or
//! after the local write's own future resolves. The guard buffers observed
//! revisions while any local write is in flight and only classifies them
//! once the in-flight counter returns to zero, so a full rebuild is
//! triggered only for revisions some other session produced.

use std::collections::HashSet;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::store::{RevisionId, StoreError};

/// Signals fanned out to the guard's subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardSignal {
    /// A change batch was observed on the live stream, whatever its origin.
    Any,
    /// A resolution pass found at least one revision this process never
    /// generated. The owner reacts by rebuilding derived state.
    External,
}

#[derive(Debug, Default)]
struct GuardState {
    /// Revisions produced by local writes, awaiting their change-stream echo.
    generated: HashSet<RevisionId>,
    /// Revisions observed on the stream, awaiting classification.
    pending: Vec<RevisionId>,
    /// Open local write transactions.
    in_flight: usize,
}

pub struct ReplicationGuard {
    state: Mutex<GuardState>,
    signals: broadcast::Sender<GuardSignal>,
}

impl Default for ReplicationGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationGuard {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(GuardState::default()),
            signals,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuardSignal> {
        self.signals.subscribe()
    }

    /// Wraps a local write so its resulting revision is recorded as
    /// self-caused before any classification runs.
    ///
    /// The in-flight counter is decremented whether the write succeeds or
    /// fails; classification of buffered revisions runs only when the last
    /// open write completes.
    pub async fn note<F>(&self, write: F) -> Result<RevisionId, StoreError>
    where
        F: Future<Output = Result<RevisionId, StoreError>>,
    {
        self.state.lock().in_flight += 1;
        let result = write.await;
        let resolve = {
            let mut state = self.state.lock();
            if let Ok(revision) = &result {
                state.generated.insert(revision.clone());
            }
            state.in_flight -= 1;
            state.in_flight == 0
        };
        if resolve {
            self.resolve_pending();
        }
        result
    }

    /// Change-stream handler: buffers every observed revision and
    /// classifies immediately when no local write is in flight.
    pub fn observe<R>(&self, revisions: R)
    where
        R: IntoIterator<Item = RevisionId>,
    {
        let _ = self.signals.send(GuardSignal::Any);
        let resolve = {
            let mut state = self.state.lock();
            state.pending.extend(revisions);
            state.in_flight == 0
        };
        if resolve {
            self.resolve_pending();
        }
    }

    fn resolve_pending(&self) {
        let external = {
            let mut state = self.state.lock();
            let pending = std::mem::take(&mut state.pending);
            let mut external = false;
            for revision in pending {
                if !state.generated.remove(&revision) {
                    external = true;
                }
            }
            external
        };
        if external {
            let _ = self.signals.send(GuardSignal::External);
        }
    }
}
