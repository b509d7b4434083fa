//! Disposal capability and the per-container set of owned instances.

use std::sync::{Arc, Weak};

/// Synchronous teardown of a service.
///
/// Instances owned by a container are disposed when the container is disposed, provided their
/// registration carries a disposer (see [crate::Registration::disposable]).
pub trait Dispose {
    fn dispose(&self);
}

/// Shared disposal function of a registration
pub(crate) type Disposer<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// An instance tracked for disposal, without keeping it alive
trait Tracked: Send {
    fn is_alive(&self) -> bool;
    fn dispose(self: Box<Self>);
}

struct TrackedInstance<S: ?Sized> {
    instance: Weak<S>,
    disposer: Disposer<S>,
}

impl<S: ?Sized + Send + Sync> Tracked for TrackedInstance<S> {
    fn is_alive(&self) -> bool {
        self.instance.strong_count() > 0
    }

    fn dispose(self: Box<Self>) {
        if let Some(instance) = self.instance.upgrade() {
            (self.disposer)(&instance);
        }
    }
}

const MIN_PRUNE: usize = 16;

/// Instances a container must dispose on teardown.
///
/// Once closed, the set refuses new instances: they are handed back to the caller, which must
/// dispose them right away.
pub(crate) struct DisposalSet {
    tracked: Vec<Box<dyn Tracked>>,
    closed: bool,
    prune_at: usize,
}

impl Default for DisposalSet {
    fn default() -> Self {
        Self {
            tracked: Vec::new(),
            closed: false,
            prune_at: MIN_PRUNE,
        }
    }
}

/// Instances released by a closed [DisposalSet], disposed most recent first
pub(crate) struct Released(Vec<Box<dyn Tracked>>);

impl Released {
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn dispose_all(self) {
        for tracked in self.0.into_iter().rev() {
            tracked.dispose();
        }
    }
}

impl DisposalSet {
    /// Track an instance, or return it for immediate disposal if the set is closed
    pub(crate) fn track<S: ?Sized + Send + Sync + 'static>(
        &mut self,
        instance: &Arc<S>,
        disposer: Disposer<S>,
    ) -> Option<Released> {
        let tracked: Box<dyn Tracked> = Box::new(TrackedInstance {
            instance: Arc::downgrade(instance),
            disposer,
        });
        if self.closed {
            return Some(Released(vec![tracked]));
        }

        // Dropped instances leave dead entries behind
        if self.tracked.len() >= self.prune_at {
            self.tracked.retain(|t| t.is_alive());
            self.prune_at = MIN_PRUNE.max(self.tracked.len() * 2);
        }
        self.tracked.push(tracked);
        None
    }

    /// Close the set and release its instances. Returns `None` if it was already closed.
    pub(crate) fn close(&mut self) -> Option<Released> {
        if self.closed {
            return None;
        }
        self.closed = true;
        Some(Released(std::mem::take(&mut self.tracked)))
    }

    pub(crate) fn len(&self) -> usize {
        self.tracked.len()
    }
}
