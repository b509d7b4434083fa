//! Resolution of services through a container tree.
//!
//! Resolving a service looks up the registration for its key on the calling container and then on
//! each ancestor. The [ReuseScope] of the registration decides which container acts as context for
//! the factory and which container caches the instance:
//!
//! | scope       | context container    | caching container    | disposing container  |
//! |-------------|----------------------|----------------------|----------------------|
//! | `None`      | calling              | none                 | calling              |
//! | `Container` | calling              | calling              | calling              |
//! | `Hierarchy` | registration         | registration         | registration         |
//!
//! New instances are cached before their initializer runs, so that an initializer resolving a
//! service which depends back on the instance observes the cached instance. Other threads only
//! get the instance once its initializer has completed.
//!
//! A resolution that overlaps the disposal of the container owning the new instance fails with
//! [ResolutionError::Disposed], and the instance is disposed.

use std::any::type_name;
use std::cell::RefCell;
use std::error::Error;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::key::{ServiceArgs, ServiceKey};
use crate::register::{Entry, EntryConfig};
use crate::scope::{Owner, ReuseScope};
use crate::Container;

/// Errors triggered while resolving a service
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Required dependency of type {service} could not be resolved")]
    MissingType { service: String },
    #[error("Required dependency of type {service} named '{name}' could not be resolved")]
    MissingNamedType { service: String, name: String },
    #[error("Error trying to resolve service {service} or one of its dependencies")]
    Dependency {
        service: String,
        name: Option<String>,
        #[source]
        source: Box<ResolutionError>,
    },
    #[error("Failed to construct service {service}")]
    Construction {
        service: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("Cyclic dependencies: {service} is already being constructed")]
    Cyclic {
        service: String,
        name: Option<String>,
    },
    #[error("Container has been disposed")]
    Disposed,
}

impl ResolutionError {
    /// Report a failure of the factory of `S` itself
    pub fn construction<S: ?Sized>(source: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        ResolutionError::Construction {
            service: type_name::<S>().to_string(),
            source: source.into(),
        }
    }

    pub(crate) fn missing(key: &ServiceKey) -> Self {
        match key.name() {
            None => ResolutionError::MissingType {
                service: key.signature(),
            },
            Some(name) => ResolutionError::MissingNamedType {
                service: key.signature(),
                name: name.to_string(),
            },
        }
    }

    /// Symbolic identifier of the error, for external message catalogs
    pub fn code(&self) -> &'static str {
        match self {
            ResolutionError::MissingType { .. } => "missing_type",
            ResolutionError::MissingNamedType { .. } => "missing_named_type",
            ResolutionError::Dependency { .. } => "dependency_failed",
            ResolutionError::Construction { .. } => "construction_failed",
            ResolutionError::Cyclic { .. } => "cyclic_resolution",
            ResolutionError::Disposed => "container_disposed",
        }
    }

    /// The requested service, if the error concerns one
    pub fn service(&self) -> Option<&str> {
        match self {
            ResolutionError::MissingType { service }
            | ResolutionError::MissingNamedType { service, .. }
            | ResolutionError::Dependency { service, .. }
            | ResolutionError::Construction { service, .. }
            | ResolutionError::Cyclic { service, .. } => Some(service),
            ResolutionError::Disposed => None,
        }
    }

    /// The requested name, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            ResolutionError::MissingNamedType { name, .. } => Some(name),
            ResolutionError::Dependency { name, .. } | ResolutionError::Cyclic { name, .. } => {
                name.as_deref()
            }
            _ => None,
        }
    }

    /// Whether the requested service itself was not found, as opposed to one of its dependencies
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            ResolutionError::MissingType { .. } | ResolutionError::MissingNamedType { .. }
        )
    }

    /// The innermost failure, following dependency failures
    pub fn root_cause(&self) -> &ResolutionError {
        let mut current = self;
        while let ResolutionError::Dependency { source, .. } = current {
            current = source;
        }
        current
    }

    /// Wrap a failure raised while building or initializing the service of `key`
    fn in_dependency_of(self, key: &ServiceKey) -> Self {
        match &self {
            ResolutionError::Construction { service, .. } if service == key.service() => self,
            _ => ResolutionError::Dependency {
                service: key.signature(),
                name: key.name().map(str::to_string),
                source: Box::new(self),
            },
        }
    }
}

/// Best-effort lookup, exposed to collaborators that only need optional services
pub trait Resolver {
    /// Resolve a service registered without name nor arguments, or return `None`
    fn try_resolve<S: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<S>>;
}

impl Resolver for Container {
    fn try_resolve<S: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<S>> {
        Container::try_resolve(self)
    }
}

thread_local! {
    /// Cache slots being filled by the current thread
    static CONSTRUCTING: RefCell<Vec<(u64, ServiceKey)>> = const { RefCell::new(Vec::new()) };
}

/// Mark a cache slot as being filled by the current thread.
///
/// A thread filling a slot it is already filling would wait on itself forever.
struct ConstructionGuard;

impl ConstructionGuard {
    fn enter(container: u64, key: &ServiceKey) -> Result<Self, ResolutionError> {
        CONSTRUCTING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(id, k)| *id == container && k == key) {
                return Err(ResolutionError::Cyclic {
                    service: key.signature(),
                    name: key.name().map(str::to_string),
                });
            }
            stack.push((container, key.clone()));
            Ok(ConstructionGuard)
        })
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        CONSTRUCTING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl Container {
    /// Resolve a service registered without name nor arguments
    pub fn resolve<S>(&self) -> Result<Arc<S>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.resolve_required(None, ())
    }

    /// Resolve a service whose factory takes arguments
    pub fn resolve_with<S, A>(&self, args: A) -> Result<Arc<S>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        self.resolve_required(None, args)
    }

    /// Resolve a named service registered without arguments
    pub fn resolve_named<S>(&self, name: &str) -> Result<Arc<S>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.resolve_required(Some(name), ())
    }

    /// Resolve a named service whose factory takes arguments
    pub fn resolve_named_with<S, A>(&self, name: &str, args: A) -> Result<Arc<S>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        self.resolve_required(Some(name), args)
    }

    /// Resolve a service registered without name nor arguments, or return `None`.
    ///
    /// `try_*` variants never fail: failures of a registered factory are logged and reported
    /// as `None`.
    pub fn try_resolve<S>(&self) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.resolve_optional(None, ())
    }

    pub fn try_resolve_with<S, A>(&self, args: A) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        self.resolve_optional(None, args)
    }

    pub fn try_resolve_named<S>(&self, name: &str) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.resolve_optional(Some(name), ())
    }

    pub fn try_resolve_named_with<S, A>(&self, name: &str, args: A) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        self.resolve_optional(Some(name), args)
    }

    pub(crate) fn resolve_required<S, A>(
        &self,
        name: Option<&str>,
        args: A,
    ) -> Result<Arc<S>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        let key = ServiceKey::of::<S, A>(name);
        self.resolve_key(&key, args)?
            .ok_or_else(|| ResolutionError::missing(&key))
    }

    fn resolve_optional<S, A>(&self, name: Option<&str>, args: A) -> Option<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        let key = ServiceKey::of::<S, A>(name);
        match self.resolve_key(&key, args) {
            Ok(instance) => instance,
            Err(err) => {
                warn!(container = self.id(), key = %key, error = %err, "optional resolution failed");
                None
            }
        }
    }

    /// Core resolution: `Ok(None)` when no registration matches the key
    fn resolve_key<S, A>(&self, key: &ServiceKey, args: A) -> Result<Option<Arc<S>>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        if let Some(this) = self.as_service::<S>() {
            trace!(container = self.id(), "resolved container service");
            return Ok(Some(this));
        }
        if self.is_disposed() {
            return Err(ResolutionError::Disposed);
        }

        let Some((entry, registered_on)) = self.lookup::<S, A>(key) else {
            return Ok(None);
        };
        let config = entry.config();

        let instance = match config.reuse {
            ReuseScope::None => {
                let instance = self.build(&entry, key, self, args)?;
                self.complete(&config, key, self, &instance)?;
                instance
            }
            ReuseScope::Container => self.build_cached(&entry, &config, key, self, args)?,
            ReuseScope::Hierarchy => {
                registered_on.build_cached(&entry, &config, key, &registered_on, args)?
            }
        };
        Ok(Some(instance))
    }

    /// Resolve an instance cached on this container, building it on first use
    fn build_cached<S, A>(
        &self,
        entry: &Entry<S, A>,
        config: &EntryConfig<S>,
        key: &ServiceKey,
        context: &Container,
        args: A,
    ) -> Result<Arc<S>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        let slot = self.slot(key, entry.id);
        if let Some(cached) = slot.get::<S>() {
            trace!(container = self.id(), key = %key, "cache hit");
            return Ok(cached);
        }

        let guard = ConstructionGuard::enter(self.id(), key)?;
        let built = slot.build(|| self.build(entry, key, context, args))?;
        drop(guard);

        match built {
            Some(instance) => {
                let _publish = slot.publish_on_drop();
                self.complete(config, key, context, &instance)?;
                Ok(instance)
            }
            // Another thread built the instance while we were waiting on the slot
            None => slot.get::<S>().ok_or_else(|| ResolutionError::missing(key)),
        }
    }

    fn build<S, A>(
        &self,
        entry: &Entry<S, A>,
        key: &ServiceKey,
        context: &Container,
        args: A,
    ) -> Result<Arc<S>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        debug!(
            container = self.id(),
            context = context.id(),
            registered_on = entry.registered_on,
            key = %key,
            "building instance"
        );
        entry
            .build(context, args)
            .map_err(|err| err.in_dependency_of(key))
    }

    /// Track a new instance for disposal on this container, then run its initializer.
    ///
    /// Fails without initializing if this container is being disposed.
    fn complete<S>(
        &self,
        config: &EntryConfig<S>,
        key: &ServiceKey,
        context: &Container,
        instance: &Arc<S>,
    ) -> Result<(), ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        if config.owner == Owner::Container {
            if let Some(disposer) = &config.disposer {
                self.track(instance, disposer.clone())?;
            }
        }
        if self.is_disposed() {
            return Err(ResolutionError::Disposed);
        }
        if let Some(initializer) = &config.initializer {
            initializer(context, instance).map_err(|err| err.in_dependency_of(key))?;
        }
        Ok(())
    }
}
