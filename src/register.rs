//! Registration entries and their fluent configuration handle.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::dispose::{Dispose, Disposer};
use crate::scope::{ContainerOptions, Owner, ReuseScope};
use crate::{Container, ResolutionError};

/// Factory building an instance out of the context container and an argument tuple
pub(crate) type Factory<S, A> =
    dyn Fn(&Container, A) -> Result<Arc<S>, ResolutionError> + Send + Sync;

/// Post-construction hook of a registration
pub(crate) type Initializer<S> =
    Arc<dyn Fn(&Container, &Arc<S>) -> Result<(), ResolutionError> + Send + Sync>;

/// Errors triggered when registering a service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Container service is built-in and read-only")]
    ContainerService,
    #[error("Cannot register a service on a disposed container")]
    Disposed,
}

impl RegistrationError {
    /// Symbolic identifier of the error, for external message catalogs
    pub fn code(&self) -> &'static str {
        match self {
            RegistrationError::ContainerService => "cannot_register_container",
            RegistrationError::Disposed => "container_disposed",
        }
    }
}

pub(crate) struct EntryConfig<S: ?Sized> {
    pub(crate) reuse: ReuseScope,
    pub(crate) owner: Owner,
    pub(crate) initializer: Option<Initializer<S>>,
    pub(crate) disposer: Option<Disposer<S>>,
}

// derive would require S: Clone
impl<S: ?Sized> Clone for EntryConfig<S> {
    fn clone(&self) -> Self {
        Self {
            reuse: self.reuse,
            owner: self.owner,
            initializer: self.initializer.clone(),
            disposer: self.disposer.clone(),
        }
    }
}

/// A registered factory and its configuration.
///
/// The configuration stays shared with the [Registration] handle, each resolution works on a
/// snapshot taken when it starts.
pub(crate) struct Entry<S: ?Sized, A> {
    pub(crate) id: u64,
    pub(crate) registered_on: u64,
    factory: Box<Factory<S, A>>,
    config: Arc<Mutex<EntryConfig<S>>>,
}

impl<S: ?Sized, A> Entry<S, A> {
    pub(crate) fn new(
        id: u64,
        registered_on: u64,
        options: ContainerOptions,
        factory: Box<Factory<S, A>>,
    ) -> Self {
        let config = EntryConfig {
            reuse: options.default_reuse,
            owner: options.default_owner,
            initializer: None,
            disposer: None,
        };
        Self {
            id,
            registered_on,
            factory,
            config: Arc::new(Mutex::new(config)),
        }
    }

    pub(crate) fn config(&self) -> EntryConfig<S> {
        self.config.lock().clone()
    }

    pub(crate) fn build(&self, context: &Container, args: A) -> Result<Arc<S>, ResolutionError> {
        (self.factory)(context, args)
    }

    pub(crate) fn registration(&self) -> Registration<S> {
        Registration {
            config: self.config.clone(),
        }
    }
}

/// Fluent configuration of a registered service.
///
/// Setters can be called in any order and any number of times, the last call wins.
/// Settings left untouched keep the defaults of the container at registration time.
pub struct Registration<S: ?Sized> {
    config: Arc<Mutex<EntryConfig<S>>>,
}

impl<S: ?Sized + Send + Sync + 'static> Registration<S> {
    /// Select how resolved instances are reused
    pub fn reused_within(&self, scope: ReuseScope) -> &Self {
        self.config.lock().reuse = scope;
        self
    }

    /// Select who disposes resolved instances
    pub fn owned_by(&self, owner: Owner) -> &Self {
        self.config.lock().owner = owner;
        self
    }

    /// Run a function once on each newly built instance.
    ///
    /// The initializer runs after the instance is cached, so it may resolve services that
    /// depend back on the instance being initialized.
    pub fn initialized_by(
        &self,
        initializer: impl Fn(&Container, &Arc<S>) -> Result<(), ResolutionError>
            + Send
            + Sync
            + 'static,
    ) -> &Self {
        self.config.lock().initializer = Some(Arc::new(initializer));
        self
    }

    /// Use a custom function to dispose container-owned instances
    pub fn disposed_by(&self, disposer: impl Fn(&S) + Send + Sync + 'static) -> &Self {
        self.config.lock().disposer = Some(Arc::new(disposer));
        self
    }

    /// The reuse scope currently configured
    pub fn reuse(&self) -> ReuseScope {
        self.config.lock().reuse
    }

    /// The owner currently configured
    pub fn owner(&self) -> Owner {
        self.config.lock().owner
    }
}

impl<S: ?Sized + Dispose + Send + Sync + 'static> Registration<S> {
    /// Dispose container-owned instances with their [Dispose] implementation
    pub fn disposable(&self) -> &Self {
        self.disposed_by(|service: &S| service.dispose())
    }
}
