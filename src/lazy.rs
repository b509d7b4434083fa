//! Deferred resolution thunks.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::key::{ServiceArgs, ServiceKey};
use crate::{Container, ResolutionError};

/// A deferred, repeatable resolution bound to a fixed key.
///
/// The existence of a matching registration is checked when the thunk is created. Each call then
/// performs a full resolution, so that the reuse scope of the registration is honored exactly as
/// with a direct resolution. The thunk keeps its container alive.
pub struct LazyResolve<S: ?Sized, A> {
    container: Container,
    name: Option<Arc<str>>,
    _shape: PhantomData<fn(A) -> Arc<S>>,
}

impl<S: ?Sized, A> Clone for LazyResolve<S, A> {
    fn clone(&self) -> Self {
        Self {
            container: self.container.clone(),
            name: self.name.clone(),
            _shape: PhantomData,
        }
    }
}

impl<S: ?Sized, A> fmt::Debug for LazyResolve<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyResolve")
            .field("container", &self.container.id())
            .field("name", &self.name)
            .finish()
    }
}

impl<S, A> LazyResolve<S, A>
where
    S: ?Sized + Send + Sync + 'static,
    A: ServiceArgs,
{
    pub fn resolve(&self, args: A) -> Result<Arc<S>, ResolutionError> {
        self.container.resolve_required(self.name.as_deref(), args)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl<S> LazyResolve<S, ()>
where
    S: ?Sized + Send + Sync + 'static,
{
    pub fn get(&self) -> Result<Arc<S>, ResolutionError> {
        self.resolve(())
    }
}

impl Container {
    /// Create a thunk resolving the service on demand.
    ///
    /// Fails right away if no registration matches on this container or its ancestors.
    pub fn lazy_resolve<S, A>(&self) -> Result<LazyResolve<S, A>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        self.lazy(None)
    }

    /// Create a thunk resolving the named service on demand
    pub fn lazy_resolve_named<S, A>(&self, name: &str) -> Result<LazyResolve<S, A>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        self.lazy(Some(name))
    }

    fn lazy<S, A>(&self, name: Option<&str>) -> Result<LazyResolve<S, A>, ResolutionError>
    where
        S: ?Sized + Send + Sync + 'static,
        A: ServiceArgs,
    {
        if self.is_disposed() {
            return Err(ResolutionError::Disposed);
        }
        let key = ServiceKey::of::<S, A>(name);
        if self.as_service::<S>().is_none() && !self.contains(&key) {
            return Err(ResolutionError::missing(&key));
        }
        Ok(LazyResolve {
            container: self.clone(),
            name: name.map(Arc::from),
            _shape: PhantomData,
        })
    }
}
