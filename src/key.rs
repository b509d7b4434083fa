//! Identity of a registration.
//!
//! A [ServiceKey] combines the *shape* of a factory (the produced service type and the ordered
//! list of its argument types) with an optional name. Keys with the same service type and name
//! but a different argument list are distinct, which lets overloaded factories coexist.

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Argument list accepted by a factory.
///
/// This trait is implemented for tuples of up to 6 elements. The empty tuple is used for
/// factories without arguments.
pub trait ServiceArgs: Send + 'static {
    /// Number of arguments in the tuple
    const ARITY: usize;
}

/// Composite identity of a registration: factory shape and optional name.
#[derive(Clone, Debug)]
pub struct ServiceKey {
    shape: TypeId,
    service: &'static str,
    args: &'static str,
    arity: usize,
    name: Option<Arc<str>>,
}

impl ServiceKey {
    /// Key for a factory producing `Arc<S>` out of the arguments `A`.
    pub fn of<S: ?Sized + 'static, A: ServiceArgs>(name: Option<&str>) -> Self {
        Self {
            // the signature of the factory pointer encodes service and argument types in order
            shape: TypeId::of::<fn(A) -> Arc<S>>(),
            service: type_name::<S>(),
            args: type_name::<A>(),
            arity: A::ARITY,
            name: name.map(Arc::from),
        }
    }

    /// Name of the produced service type
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Optional registration name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of factory arguments
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Service type followed by the argument types, if any
    pub fn signature(&self) -> String {
        if self.arity > 0 {
            format!("{}{}", self.service, self.args)
        } else {
            self.service.to_string()
        }
    }
}

// The type names are only carried for diagnostics
impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.name == other.name
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shape.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())?;
        if let Some(name) = &self.name {
            write!(f, " named '{}'", name)?;
        }
        Ok(())
    }
}

macro_rules! service_args_tuple ({ $arity:expr; $($param:ident)* } => {
    impl<$($param: Send + 'static,)*> ServiceArgs for ($($param,)*) {
        const ARITY: usize = $arity;
    }
});

service_args_tuple! { 0; }
service_args_tuple! { 1; A }
service_args_tuple! { 2; A B }
service_args_tuple! { 3; A B C }
service_args_tuple! { 4; A B C D }
service_args_tuple! { 5; A B C D E }
service_args_tuple! { 6; A B C D E F }
