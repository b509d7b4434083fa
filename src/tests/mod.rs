use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::*;

mod resolution;

pub(crate) trait IFoo: Send + Sync {
    fn value(&self) -> Option<&str>;
}

#[derive(Default, Debug)]
pub(crate) struct Foo {
    pub value: Option<String>,
    pub count: i32,
}

impl Foo {
    pub fn new(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            count: 0,
        }
    }
}

impl IFoo for Foo {
    fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

pub(crate) struct Foo2;

impl IFoo for Foo2 {
    fn value(&self) -> Option<&str> {
        Some("foo2")
    }
}

/// Records the arguments it was built with
#[derive(Default, Debug, PartialEq)]
pub(crate) struct Bar {
    pub args: Vec<String>,
}

impl Bar {
    pub fn new(args: &[&String]) -> Self {
        Self {
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Default, Debug)]
pub(crate) struct Disposable {
    disposed: AtomicUsize,
}

impl Disposable {
    pub fn is_disposed(&self) -> bool {
        self.dispose_count() > 0
    }

    pub fn dispose_count(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Dispose for Disposable {
    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default, Debug)]
pub(crate) struct Initializable {
    calls: AtomicUsize,
}

impl Initializable {
    pub fn initialize(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    pub fn initialize_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) struct Presenter {
    pub view: Arc<View>,
}

#[derive(Default, Debug)]
pub(crate) struct View {
    pub presenter: Mutex<Option<Arc<Presenter>>>,
}

/// Counts the instances built by a factory
#[derive(Clone, Default)]
pub(crate) struct Built(Arc<AtomicUsize>);

impl Built {
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Set once, checked later
#[derive(Clone, Default)]
pub(crate) struct Flag(Arc<AtomicBool>);

impl Flag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[test]
fn container_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Container>();
    assert_send_sync::<Registration<dyn IFoo>>();
    assert_send_sync::<LazyResolve<dyn IFoo, (String,)>>();
}
