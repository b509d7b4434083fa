//! Per-container cache of reused instances.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use once_cell::sync::OnceCell;

use crate::key::ServiceKey;

/// Type-erased `Arc<S>` stored in a slot
trait Cached: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    /// Whether anything besides the slot still holds the instance
    fn is_shared(&self) -> bool;
}

impl<S: ?Sized + Send + Sync + 'static> Cached for Arc<S> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn is_shared(&self) -> bool {
        Arc::strong_count(self) > 1
    }
}

/// Once-initialized slot holding one reused instance.
///
/// A built instance is visible right away to the thread that built it, so that its initializer
/// can resolve services depending back on it. Other threads wait until the instance is
/// published, after its initializer has run.
#[derive(Default)]
pub(crate) struct CacheSlot {
    instance: OnceCell<Box<dyn Cached>>,
    builder: OnceCell<ThreadId>,
    published: OnceCell<()>,
}

pub(crate) type Slot = Arc<CacheSlot>;

impl CacheSlot {
    /// The cached instance, blocking while another thread is still initializing it
    pub(crate) fn get<S: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        let instance = self.instance.get()?;
        if self.published.get().is_none() && self.builder.get() != Some(&thread::current().id()) {
            self.published.wait();
        }
        instance.as_any().downcast_ref::<Arc<S>>().cloned()
    }

    /// Fill an empty slot.
    ///
    /// Returns the instance if this call built it, `None` if another thread filled the slot
    /// first. A failed build leaves the slot empty.
    pub(crate) fn build<S, E>(
        &self,
        build: impl FnOnce() -> Result<Arc<S>, E>,
    ) -> Result<Option<Arc<S>>, E>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let mut built = None;
        self.instance
            .get_or_try_init(|| -> Result<Box<dyn Cached>, E> {
                let instance = build()?;
                // set before the slot is filled, other threads never see the slot without it
                let _ = self.builder.set(thread::current().id());
                built = Some(instance.clone());
                Ok(Box::new(instance))
            })?;
        Ok(built)
    }

    /// Release threads waiting for the instance when the returned guard is dropped
    pub(crate) fn publish_on_drop(&self) -> Publish<'_> {
        Publish(self)
    }

    fn is_shared(&self) -> bool {
        self.instance.get().is_some_and(|i| i.is_shared())
    }
}

/// Publishes a slot when dropped, whether initialization succeeded, failed or panicked
pub(crate) struct Publish<'a>(&'a CacheSlot);

impl Drop for Publish<'_> {
    fn drop(&mut self) {
        let _ = self.0.published.set(());
    }
}

/// Cached instances of a container, one slot per key and per registration entry
#[derive(Default)]
pub(crate) struct ScopeCache {
    slots: HashMap<ServiceKey, (u64, Slot)>,
    // Slots of replaced entries, kept while their instance is in use so it can still be disposed
    retired: Vec<Slot>,
}

impl ScopeCache {
    /// The slot of an entry, retiring the slot of a previous entry for the same key
    pub(crate) fn slot(&mut self, key: &ServiceKey, entry_id: u64) -> Slot {
        if let Some((id, slot)) = self.slots.get(key) {
            if *id == entry_id {
                return slot.clone();
            }
        }
        let slot = Slot::default();
        if let Some((_, old)) = self.slots.insert(key.clone(), (entry_id, slot.clone())) {
            self.retired.retain(|s| s.is_shared());
            if old.is_shared() {
                self.retired.push(old);
            }
        }
        slot
    }

    pub(crate) fn retired(&self) -> usize {
        self.retired.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    use super::*;

    fn key(name: &str) -> ServiceKey {
        ServiceKey::of::<String, ()>(Some(name))
    }

    #[test]
    fn builds_once() {
        let slot = CacheSlot::default();
        let first = slot.build(|| Ok::<_, ()>(Arc::new(1u32))).unwrap();
        let second = slot.build(|| Ok::<_, ()>(Arc::new(2u32))).unwrap();

        assert_eq!(first.as_deref(), Some(&1));
        assert!(second.is_none());
        assert!(slot.get::<u8>().is_none());
        assert_eq!(slot.get::<u32>().as_deref(), Some(&1));
    }

    #[test]
    fn failed_build_leaves_slot_empty() {
        let slot = CacheSlot::default();
        assert_eq!(slot.build(|| Err::<Arc<u32>, _>("boom")), Err("boom"));
        assert!(slot.get::<u32>().is_none());
        assert!(slot.build(|| Ok::<_, ()>(Arc::new(3u32))).unwrap().is_some());
    }

    #[test]
    fn other_threads_wait_for_publication() {
        let slot = CacheSlot::default();
        let barrier = Barrier::new(2);
        let published = AtomicUsize::new(0);

        thread::scope(|scope| {
            scope.spawn(|| {
                let built = slot.build(|| Ok::<_, ()>(Arc::new(7u32))).unwrap();
                assert!(built.is_some());
                let _publish = slot.publish_on_drop();
                // the building thread sees its own instance before publication
                assert_eq!(slot.get::<u32>().as_deref(), Some(&7));
                barrier.wait();
                thread::sleep(Duration::from_millis(50));
                published.store(1, Ordering::SeqCst);
            });

            barrier.wait();
            assert_eq!(slot.get::<u32>().as_deref(), Some(&7));
            assert_eq!(published.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn unused_retired_slots_are_dropped() {
        let mut cache = ScopeCache::default();
        let slot = cache.slot(&key("a"), 1);
        let kept = slot.build(|| Ok::<_, ()>(Arc::new(1u32))).unwrap();
        assert!(Arc::ptr_eq(&slot, &cache.slot(&key("a"), 1)));

        // replaced while the instance is still in use
        cache.slot(&key("a"), 2);
        assert_eq!(cache.retired(), 1);

        drop(kept);
        let slot = cache.slot(&key("a"), 3);
        slot.build(|| Ok::<_, ()>(Arc::new(3u32))).unwrap();
        assert_eq!(cache.retired(), 0);

        for entry in 4..20 {
            cache.slot(&key("a"), entry);
        }
        assert_eq!(cache.retired(), 0);
    }
}
