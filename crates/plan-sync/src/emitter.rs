//! Dependency-ordered event emitter.
//!
//! Derived caches (computed views, validation results, layout state) must
//! recompute in a fixed partial order after a source change, before their
//! dependents read them. Each subscriber declares the identities that must
//! run before it; the emitter topologically sorts the listener set and
//! invokes every callback strictly in that order, awaiting each one before
//! starting the next.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;

/// When a listener runs relative to the other listeners of the emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySpec<I> {
    /// Every listed identity runs before this listener. Identities with no
    /// registered listener are ignored.
    Explicit(Vec<I>),
    /// Runs before every listener with explicit dependencies.
    BeforeAll,
    /// Runs after every listener with explicit dependencies.
    AfterAll,
}

/// Raised by [`TopoEmitter::emit`] when the declared dependencies cannot be
/// ordered. A cycle is a programming mistake at a subscription call site;
/// there is no recovery path and no listener is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("listener dependency cycle detected")]
    Cycle,
}

type ListenerCallback<I> = Arc<dyn Fn(I) -> BoxFuture<'static, ()> + Send + Sync>;

struct ListenerEntry<I> {
    id: u64,
    identity: I,
    dependencies: DependencySpec<I>,
    callback: ListenerCallback<I>,
}

struct EmitterInner<I> {
    listeners: Vec<ListenerEntry<I>>,
    /// Cached topological order (listener ids). `None` whenever a listener
    /// was added or removed since the last sort.
    order: Option<Vec<u64>>,
    next_id: u64,
}

/// An event emitter whose listeners run in dependency order.
///
/// Callbacks may suspend; `emit` awaits each one before invoking the next,
/// so no two callbacks of a single `emit` call ever run concurrently. The
/// emitter does not serialize across `emit` calls; that is the caller's
/// job if it matters.
pub struct TopoEmitter<I> {
    inner: Arc<Mutex<EmitterInner<I>>>,
}

impl<I> Clone for TopoEmitter<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I> Default for TopoEmitter<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> TopoEmitter<I> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EmitterInner {
                listeners: Vec::new(),
                order: None,
                next_id: 0,
            })),
        }
    }
}

impl<I> TopoEmitter<I>
where
    I: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Registers a listener.
    ///
    /// `identity` is how other listeners refer to this one in their own
    /// dependency specs. Registration invalidates the cached ordering, as
    /// does [`Subscription::unsubscribe`] on the returned handle.
    pub fn subscribe<F, Fut>(
        &self,
        identity: I,
        dependencies: DependencySpec<I>,
        callback: F,
    ) -> Subscription<I>
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ListenerCallback<I> =
            Arc::new(move |origin: I| -> BoxFuture<'static, ()> { Box::pin(callback(origin)) });

        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push(ListenerEntry {
            id,
            identity,
            dependencies,
            callback,
        });
        inner.order = None;

        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Invokes every listener with `origin`, strictly in dependency order,
    /// awaiting each callback before starting the next.
    ///
    /// The listener set is snapshotted up front; subscriptions made by a
    /// running callback take effect from the next emit.
    pub async fn emit(&self, origin: I) -> Result<(), EmitError> {
        let batch: Vec<ListenerCallback<I>> = {
            let mut inner = self.inner.lock();
            if inner.order.is_none() {
                inner.order = Some(sort_listeners(&inner.listeners)?);
            }
            let mut batch = Vec::with_capacity(inner.listeners.len());
            if let Some(order) = &inner.order {
                for id in order {
                    if let Some(entry) = inner.listeners.iter().find(|l| l.id == *id) {
                        batch.push(Arc::clone(&entry.callback));
                    }
                }
            }
            batch
        };

        for callback in batch {
            callback(origin.clone()).await;
        }
        Ok(())
    }

    /// Number of currently registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// Handle for a single registration; [`Subscription::unsubscribe`] removes
/// the listener and invalidates the cached ordering. Dropping the handle
/// without unsubscribing leaves the listener registered.
pub struct Subscription<I> {
    inner: Weak<Mutex<EmitterInner<I>>>,
    id: u64,
}

impl<I> Subscription<I> {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut inner = inner.lock();
            let id = self.id;
            inner.listeners.retain(|l| l.id != id);
            inner.order = None;
        }
    }
}

/// Kahn's algorithm over the declared dependency edges. Sentinel listeners
/// get a synthetic edge to/from every listener with explicit dependencies;
/// ties are broken by registration order.
fn sort_listeners<I>(listeners: &[ListenerEntry<I>]) -> Result<Vec<u64>, EmitError>
where
    I: Eq + Hash,
{
    let n = listeners.len();

    let mut by_identity: HashMap<&I, Vec<usize>> = HashMap::new();
    for (idx, entry) in listeners.iter().enumerate() {
        by_identity.entry(&entry.identity).or_default().push(idx);
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree: Vec<usize> = vec![0; n];
    fn add_edge(from: usize, to: usize, successors: &mut [Vec<usize>], indegree: &mut [usize]) {
        successors[from].push(to);
        indegree[to] += 1;
    }

    for (idx, entry) in listeners.iter().enumerate() {
        match &entry.dependencies {
            DependencySpec::Explicit(deps) => {
                for dep in deps {
                    let Some(sources) = by_identity.get(dep) else {
                        continue;
                    };
                    for &source in sources {
                        if source != idx {
                            add_edge(source, idx, &mut successors, &mut indegree);
                        }
                    }
                }
            }
            DependencySpec::BeforeAll => {
                for (other, o) in listeners.iter().enumerate() {
                    if other != idx && matches!(o.dependencies, DependencySpec::Explicit(_)) {
                        add_edge(idx, other, &mut successors, &mut indegree);
                    }
                }
            }
            DependencySpec::AfterAll => {
                for (other, o) in listeners.iter().enumerate() {
                    if other != idx && matches!(o.dependencies, DependencySpec::Explicit(_)) {
                        add_edge(other, idx, &mut successors, &mut indegree);
                    }
                }
            }
        }
    }

    let mut ready: std::collections::BTreeSet<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(idx) = ready.pop_first() {
        order.push(listeners[idx].id);
        for &next in &successors[idx] {
            indegree[next] -= 1;
            if indegree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() != n {
        return Err(EmitError::Cycle);
    }
    Ok(order)
}
