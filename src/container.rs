//! The [Container]: registry, scope cache and disposal set of one node of a container tree.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::cache::{ScopeCache, Slot};
use crate::dispose::{DisposalSet, Dispose, Disposer};
use crate::key::{ServiceArgs, ServiceKey};
use crate::register::{Entry, Registration, RegistrationError};
use crate::scope::{ContainerOptions, Owner, ReuseScope};
use crate::ResolutionError;

/// Type-erased `Arc<Entry<S, A>>`
type AnyEntry = Arc<dyn Any + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) struct ContainerInner {
    id: u64,
    parent: Weak<ContainerInner>,
    options: RwLock<ContainerOptions>,
    registry: RwLock<HashMap<ServiceKey, AnyEntry>>,
    cache: Mutex<ScopeCache>,
    disposables: Mutex<DisposalSet>,
    children: Mutex<Vec<Arc<ContainerInner>>>,
    disposed: AtomicBool,
}

impl ContainerInner {
    fn new(parent: Weak<ContainerInner>, options: ContainerOptions) -> Self {
        Self {
            id: next_id(),
            parent,
            options: RwLock::new(options),
            registry: RwLock::default(),
            cache: Mutex::default(),
            disposables: Mutex::default(),
            children: Mutex::default(),
            disposed: AtomicBool::new(false),
        }
    }

    fn dispose(self: &Arc<Self>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let released = self.disposables.lock().close();
        let children = std::mem::take(&mut *self.children.lock());
        debug!(
            container = self.id,
            tracked = released.as_ref().map_or(0, |r| r.len()),
            children = children.len(),
            "disposing container"
        );
        if let Some(released) = released {
            released.dispose_all();
        }

        // Drop instances and factories outside of the locks: their destructors may use containers
        let cache = std::mem::take(&mut *self.cache.lock());
        let registry = std::mem::take(&mut *self.registry.write());
        drop(cache);
        drop(registry);

        for child in children {
            child.dispose();
        }

        if let Some(parent) = self.parent.upgrade() {
            parent.children.lock().retain(|c| !Arc::ptr_eq(c, self));
        }
    }
}

/// A node of a container tree.
///
/// A container holds its own registrations, the instances it caches and the instances it must
/// dispose. Lookups ascend to the parent when a registration is missing, but never descend to
/// children. `Container` is a cheap shared handle: clones refer to the same container.
///
/// A child only keeps a weak handle to its parent: dropping every handle to a parent detaches
/// its children from the chain.
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Create a root container with default options
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    /// Create a root container with the given defaults
    pub fn with_options(options: ContainerOptions) -> Self {
        let inner = Arc::new(ContainerInner::new(Weak::new(), options));
        debug!(container = inner.id, "container created");
        Self { inner }
    }

    /// Create a child container.
    ///
    /// The child sees every registration of this container and its ancestors, and is disposed
    /// along with this container. A child of a disposed container is disposed right away.
    pub fn create_child(&self) -> Container {
        let child = Arc::new(ContainerInner::new(
            Arc::downgrade(&self.inner),
            ContainerOptions::default(),
        ));
        debug!(container = child.id, parent = self.inner.id, "child container created");

        let mut children = self.inner.children.lock();
        if self.is_disposed() {
            drop(children);
            child.dispose();
        } else {
            children.push(child.clone());
        }
        Container { inner: child }
    }

    /// Unique identifier of this container, used in diagnostics
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The parent container, if any and still alive
    pub fn parent(&self) -> Option<Container> {
        self.inner.parent.upgrade().map(|inner| Container { inner })
    }

    /// Whether both handles refer to the same container
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Number of live child containers
    pub fn child_count(&self) -> usize {
        self.inner.children.lock().len()
    }

    pub fn options(&self) -> ContainerOptions {
        *self.inner.options.read()
    }

    pub fn default_reuse(&self) -> ReuseScope {
        self.inner.options.read().default_reuse
    }

    /// Change the reuse scope applied to subsequent registrations
    pub fn set_default_reuse(&self, scope: ReuseScope) {
        self.inner.options.write().default_reuse = scope;
    }

    pub fn default_owner(&self) -> Owner {
        self.inner.options.read().default_owner
    }

    /// Change the owner applied to subsequent registrations
    pub fn set_default_owner(&self, owner: Owner) {
        self.inner.options.write().default_owner = owner;
    }

    /// Dispose this container, its owned instances and all its descendants.
    ///
    /// Owned instances are disposed most recent first, then child containers, then this
    /// container is detached from its parent. Calling it again has no effect.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Register a factory without arguments
    pub fn register<S>(
        &self,
        factory: impl Fn(&Container) -> Result<Arc<S>, ResolutionError> + Send + Sync + 'static,
    ) -> Result<Registration<S>, RegistrationError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.register_entry::<S, (), _>(None, move |c: &Container, _: ()| factory(c))
    }

    /// Register a named factory without arguments
    pub fn register_named<S>(
        &self,
        name: &str,
        factory: impl Fn(&Container) -> Result<Arc<S>, ResolutionError> + Send + Sync + 'static,
    ) -> Result<Registration<S>, RegistrationError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.register_entry::<S, (), _>(Some(name), move |c: &Container, _: ()| factory(c))
    }

    /// Register a factory taking a tuple of up to 6 arguments.
    ///
    /// Factories of different arities or argument types coexist for the same service.
    pub fn register_with<S, A>(
        &self,
        factory: impl Fn(&Container, A) -> Result<Arc<S>, ResolutionError> + Send + Sync + 'static,
    ) -> Result<Registration<S>, RegistrationError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        self.register_entry(None, factory)
    }

    /// Register a named factory taking a tuple of up to 6 arguments
    pub fn register_named_with<S, A>(
        &self,
        name: &str,
        factory: impl Fn(&Container, A) -> Result<Arc<S>, ResolutionError> + Send + Sync + 'static,
    ) -> Result<Registration<S>, RegistrationError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        self.register_entry(Some(name), factory)
    }

    /// Register an existing instance.
    ///
    /// The instance is shared with every descendant and is never disposed by the container.
    pub fn register_instance<S>(&self, instance: Arc<S>) -> Result<(), RegistrationError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.register_instance_entry(None, instance)
    }

    /// Register an existing instance under a name
    pub fn register_named_instance<S>(
        &self,
        name: &str,
        instance: Arc<S>,
    ) -> Result<(), RegistrationError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.register_instance_entry(Some(name), instance)
    }

    fn register_instance_entry<S>(
        &self,
        name: Option<&str>,
        instance: Arc<S>,
    ) -> Result<(), RegistrationError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let registration = self.register_entry::<S, (), _>(name, move |_: &Container, _: ()| {
            Ok(instance.clone())
        })?;
        registration
            .reused_within(ReuseScope::Hierarchy)
            .owned_by(Owner::External);
        Ok(())
    }

    fn register_entry<S, A, F>(
        &self,
        name: Option<&str>,
        factory: F,
    ) -> Result<Registration<S>, RegistrationError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
        F: Fn(&Container, A) -> Result<Arc<S>, ResolutionError> + Send + Sync + 'static,
    {
        if is_container_type::<S>() {
            return Err(RegistrationError::ContainerService);
        }
        if self.is_disposed() {
            return Err(RegistrationError::Disposed);
        }

        let key = ServiceKey::of::<S, A>(name);
        let entry = Entry::new(next_id(), self.inner.id, self.options(), Box::new(factory));
        let registration = entry.registration();
        debug!(
            container = self.inner.id,
            key = %key,
            scope = %registration.reuse(),
            owner = %registration.owner(),
            "service registered"
        );
        let replaced = self.inner.registry.write().insert(key, Arc::new(entry));
        drop(replaced);
        Ok(registration)
    }

    /// Whether a registration for the key exists on this container or one of its ancestors
    pub(crate) fn contains(&self, key: &ServiceKey) -> bool {
        let mut current = Some(self.inner.clone());
        while let Some(container) = current {
            if container.registry.read().contains_key(key) {
                return true;
            }
            current = container.parent.upgrade();
        }
        false
    }

    /// Find the entry for a key on this container or its closest ancestor.
    ///
    /// Returns the entry along with the container it was registered on.
    pub(crate) fn lookup<S, A>(&self, key: &ServiceKey) -> Option<(Arc<Entry<S, A>>, Container)>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        let mut current = Some(self.inner.clone());
        while let Some(container) = current {
            let found = container.registry.read().get(key).cloned();
            if let Some(entry) = found {
                if container.id != self.inner.id {
                    trace!(container = self.inner.id, key = %key, registered_on = container.id, "found on ancestor");
                }
                let entry = entry.downcast::<Entry<S, A>>().ok()?;
                return Some((entry, Container { inner: container }));
            }
            current = container.parent.upgrade();
        }
        None
    }

    /// The cache slot of an entry, replacing the slot of a previous entry for the same key
    pub(crate) fn slot(&self, key: &ServiceKey, entry_id: u64) -> Slot {
        let mut cache = self.inner.cache.lock();
        let slot = cache.slot(key, entry_id);
        trace!(container = self.inner.id, key = %key, retired = cache.retired(), "cache slot");
        slot
    }

    /// Track a container-owned instance for disposal.
    ///
    /// Fails if disposal already started, after disposing the instance.
    pub(crate) fn track<S>(
        &self,
        instance: &Arc<S>,
        disposer: Disposer<S>,
    ) -> Result<(), ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        let mut disposables = self.inner.disposables.lock();
        let late = disposables.track(instance, disposer);
        trace!(container = self.inner.id, tracked = disposables.len(), "instance tracked");
        drop(disposables);
        match late {
            None => Ok(()),
            Some(late) => {
                debug!(container = self.inner.id, "container already disposed, disposing instance");
                late.dispose_all();
                Err(ResolutionError::Disposed)
            }
        }
    }

    /// This container as an `Arc<S>` if `S` is the container type
    pub(crate) fn as_service<S>(&self) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        if !is_container_type::<S>() {
            return None;
        }
        let this: Box<dyn Any> = Box::new(Arc::new(self.clone()));
        this.downcast::<Arc<S>>().ok().map(|this| *this)
    }
}

impl Dispose for Container {
    fn dispose(&self) {
        Container::dispose(self)
    }
}

fn is_container_type<S: ?Sized + 'static>() -> bool {
    TypeId::of::<S>() == TypeId::of::<Container>()
}
