//! Lightweight dependency injection container with nested scopes, lazy resolution and disposal.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use hanakago::*;
//! // Define traits and implementors
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! struct English {
//!     name: String,
//! }
//!
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         format!("Hello {}", self.name)
//!     }
//! }
//!
//! # fn main() -> Result<(), Error> {
//! let container = Container::new();
//!
//! // Register a factory taking one argument, building a new instance on each call
//! container
//!     .register_with::<dyn Greeter, (String,)>(|_, (name,)| Ok(Arc::new(English { name })))?
//!     .reused_within(ReuseScope::None);
//!
//! let greeter = container.resolve_with::<dyn Greeter, _>(("world".to_string(),))?;
//! assert_eq!(greeter.greet(), "Hello world");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! Each registration is stored under a [ServiceKey] made of the *shape* of its factory (the
//! produced service type and the ordered types of its arguments) and an optional name.
//! Factories receive a context [Container] and a tuple of up to 6 arguments, and return an
//! `Arc` of the service, which may be a trait object.
//!
//! Containers form a tree: [Container::create_child] creates a child which sees the
//! registrations of all its ancestors. The [ReuseScope] of a registration controls the sharing
//! of instances:
//!
//! * ```ReuseScope::None``` builds a new instance on every resolution.
//! * ```ReuseScope::Container``` builds one instance per resolving container.
//! * ```ReuseScope::Hierarchy``` builds one instance on the container holding the registration,
//!   shared with all its descendants.
//!
//! The [Owner] of a registration controls disposal: container-owned instances with a disposer
//! are disposed along with the container that tracks them, external instances never are.
//! Disposal tracking does not keep instances alive.
//!
//! Resolving the [Container] type itself always returns the resolving container, and
//! registering it is rejected.

mod cache;
mod container;
mod dispose;
mod key;
mod lazy;
mod register;
mod resolve;
mod scope;

pub use container::Container;
pub use dispose::Dispose;
pub use key::{ServiceArgs, ServiceKey};
pub use lazy::LazyResolve;
pub use register::{Registration, RegistrationError};
pub use resolve::{ResolutionError, Resolver};
pub use scope::{ConfigError, ContainerOptions, Owner, ReuseScope};

/// Any error raised by the container
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Symbolic identifier of the error, for external message catalogs
    pub fn code(&self) -> &'static str {
        match self {
            Error::Registration(err) => err.code(),
            Error::Resolution(err) => err.code(),
            Error::Config(err) => err.code(),
        }
    }
}

#[cfg(test)]
mod tests;
