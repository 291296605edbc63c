//! Serialized change pipeline.
//!
//! One `notify_change` call moves a pending edit all the way to storage:
//! pre-persistence listeners run first (caches that must settle before the
//! new delta is computed), then the storage collaborator persists, then
//! post-persistence listeners run. Calls are totally ordered by arrival:
//! a second change notification never starts its pre-persistence work
//! before the previous one's persistence chain has settled.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;

use crate::emitter::{EmitError, TopoEmitter};
use crate::store::StoreError;

/// The persistence collaborator driven by the pipeline. Implemented by
/// whatever owns the documents being edited; called once per queued change.
#[async_trait]
pub trait ChangeSink: Send + Sync {
    async fn persist(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Emit(#[from] EmitError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

type TailFuture = Shared<BoxFuture<'static, Result<(), PipelineError>>>;

/// Serializes change notifications and fans them out to three listener
/// groups around the persistence step.
pub struct ChangePipeline<I> {
    /// Runs to completion before the new delta is computed and persisted.
    pub before_persist: TopoEmitter<I>,
    /// Runs after this call's persistence succeeded.
    pub after_persist: TopoEmitter<I>,
    /// Runs as soon as persistence has been started, without waiting for
    /// it, so UI consumers get immediate feedback while the write is in
    /// flight.
    pub changed: TopoEmitter<I>,
    sink: Arc<dyn ChangeSink>,
    tail: Mutex<Option<TailFuture>>,
    tail_running: Arc<AtomicBool>,
}

impl<I> ChangePipeline<I>
where
    I: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new(sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            before_persist: TopoEmitter::new(),
            after_persist: TopoEmitter::new(),
            changed: TopoEmitter::new(),
            sink,
            tail: Mutex::new(None),
            tail_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Commits a pending edit. `origin` identifies the component that made
    /// the change and is handed to every listener.
    ///
    /// Queued calls run strictly FIFO. The returned result settles when
    /// this call's whole chain (persistence plus post-persistence
    /// listeners) has settled; a persistence failure propagates here and
    /// never blocks the next queued call.
    pub async fn notify_change(&self, origin: I) -> Result<(), PipelineError> {
        let tail = {
            // The slot lock is acquisition-order fair, which is what makes
            // arrival order the queue order.
            let mut slot = self.tail.lock().await;

            if self.tail_running.load(Ordering::Relaxed) {
                warn!("changes are queuing faster than they persist; waiting for the previous chain");
            }
            if let Some(previous) = slot.take() {
                // Outcome irrelevant: a failed chain must not block this one.
                let _ = previous.await;
            }

            self.before_persist.emit(origin.clone()).await?;

            let sink = Arc::clone(&self.sink);
            let after_persist = self.after_persist.clone();
            let after_origin = origin.clone();
            let running = Arc::clone(&self.tail_running);
            running.store(true, Ordering::Relaxed);

            let tail: TailFuture = async move {
                let result: Result<(), PipelineError> = async {
                    sink.persist().await?;
                    after_persist.emit(after_origin).await?;
                    Ok(())
                }
                .await;
                running.store(false, Ordering::Relaxed);
                result
            }
            .boxed()
            .shared();

            *slot = Some(tail.clone());
            // Drive the chain to completion whether or not our caller
            // keeps awaiting.
            tokio::spawn(tail.clone());
            tail
        };

        self.changed.emit(origin).await?;
        tail.await
    }
}
