use std::fmt;

use super::*;

#[derive(Debug)]
struct Unavailable;

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("backend unavailable")
    }
}

impl std::error::Error for Unavailable {}

#[test]
fn fails_if_cannot_resolve() {
    let container = Container::new();
    let err = container.resolve::<Foo>().unwrap_err();

    assert!(err.is_missing());
    assert_eq!(err.code(), "missing_type");
    assert_eq!(err.service(), Some(std::any::type_name::<Foo>()));
    assert_eq!(err.name(), None);
}

#[test]
fn fails_if_cannot_resolve_named() {
    let container = Container::new();
    container
        .register::<Foo>(|_| Ok(Arc::new(Foo::default())))
        .unwrap();

    let err = container.resolve_named::<Foo>("foo").unwrap_err();
    assert!(err.is_missing());
    assert_eq!(err.code(), "missing_named_type");
    assert_eq!(err.name(), Some("foo"));
    assert!(err.to_string().contains("named 'foo'"));
}

#[test]
fn arguments_are_part_of_the_key() {
    let container = Container::new();
    container
        .register_with::<Foo, (String,)>(|_, (s,)| Ok(Arc::new(Foo::new(&s))))
        .unwrap();

    assert!(container.resolve::<Foo>().unwrap_err().is_missing());
    assert!(container.resolve_with::<Foo, _>((12,)).unwrap_err().is_missing());

    let err = container
        .resolve_with::<Foo, _>((String::new(), 1))
        .unwrap_err();
    let service = err.service().unwrap_or_default();
    assert!(service.contains("String"), "{service}");
    assert!(service.contains("i32"), "{service}");
}

#[test]
fn try_resolve_returns_none_if_not_registered() {
    let container = Container::new();
    assert!(container.try_resolve::<Foo>().is_none());
    assert!(container.try_resolve_with::<Foo, _>(("a".to_string(),)).is_none());
    assert!(container.try_resolve_named::<Foo>("foo").is_none());
    assert!(container
        .try_resolve_named_with::<Foo, _>("foo", ("a".to_string(), 2))
        .is_none());
}

#[test]
fn try_resolve_returns_registered_instance() -> Result<(), Error> {
    let container = Container::new();
    container.register::<dyn IFoo>(|_| Ok(Arc::new(Foo::new("foo"))))?;
    container.register_named::<dyn IFoo>("two", |_| Ok(Arc::new(Foo2)))?;
    container.register_with::<Bar, (String,)>(|_, (a,)| Ok(Arc::new(Bar::new(&[&a]))))?;

    let foo = container.try_resolve::<dyn IFoo>();
    assert_eq!(foo.and_then(|f| f.value().map(String::from)).as_deref(), Some("foo"));

    let foo2 = container.try_resolve_named::<dyn IFoo>("two");
    assert_eq!(foo2.map(|f| f.value().map(String::from)), Some(Some("foo2".into())));

    let bar = container.try_resolve_with::<Bar, _>(("a".to_string(),));
    assert_eq!(bar.map(|b| b.args.clone()), Some(vec!["a".to_string()]));
    Ok(())
}

#[test]
fn try_resolve_returns_registered_instance_on_parent() -> Result<(), Error> {
    let container = Container::new();
    container.register::<dyn IFoo>(|_| Ok(Arc::new(Foo::new("parent"))))?;
    let child = container.create_child();

    let foo = child.try_resolve::<dyn IFoo>();
    assert_eq!(foo.map(|f| f.value().map(String::from)), Some(Some("parent".into())));
    Ok(())
}

#[test]
fn try_resolve_reports_failures_as_none() -> Result<(), Error> {
    let container = Container::new();
    container.register::<Foo>(|_| Err(ResolutionError::construction::<Foo>(Unavailable)))?;
    container.register::<Bar>(|c| {
        c.resolve::<Disposable>()?;
        Ok(Arc::new(Bar::default()))
    })?;

    assert!(container.try_resolve::<Foo>().is_none());
    assert!(container.try_resolve::<Bar>().is_none());
    Ok(())
}

#[test]
fn resolver_trait_resolves_optional_services() -> Result<(), Error> {
    fn greeting(resolver: &impl Resolver) -> String {
        resolver
            .try_resolve::<dyn IFoo>()
            .and_then(|foo| foo.value().map(String::from))
            .unwrap_or_else(|| "nothing".to_string())
    }

    let container = Container::new();
    assert_eq!(greeting(&container), "nothing");

    container.register::<dyn IFoo>(|_| Ok(Arc::new(Foo::new("hello"))))?;
    assert_eq!(greeting(&container), "hello");
    Ok(())
}

#[test]
fn container_service_is_always_available() {
    let container = Container::new();
    let service = container.resolve::<Container>().unwrap();
    assert!(service.ptr_eq(&container));
    assert!(container.try_resolve::<Container>().is_some());
}

#[test]
fn container_service_is_the_resolving_container() {
    let container = Container::new();
    let child = container.create_child();
    let grand_child = child.create_child();

    assert!(container.resolve::<Container>().unwrap().ptr_eq(&container));
    assert!(child.resolve::<Container>().unwrap().ptr_eq(&child));
    assert!(grand_child.resolve::<Container>().unwrap().ptr_eq(&grand_child));
    assert!(!grand_child.resolve::<Container>().unwrap().ptr_eq(&child));
}

#[test]
fn factories_resolve_dependencies_from_context() -> Result<(), Error> {
    let container = Container::new();
    container.register_instance::<dyn IFoo>(Arc::new(Foo::new("dep")))?;
    container.register::<Bar>(|c| {
        let foo = c.resolve::<dyn IFoo>()?;
        let value = foo.value().unwrap_or_default().to_string();
        Ok(Arc::new(Bar::new(&[&value])))
    })?;

    assert_eq!(container.resolve::<Bar>()?.args, ["dep"]);
    Ok(())
}

#[test]
fn initializer_can_retrieve_resolved_dependency() -> Result<(), Error> {
    let container = Container::new();
    container.register::<Presenter>(|c| {
        Ok(Arc::new(Presenter {
            view: c.resolve::<View>()?,
        }))
    })?;
    container
        .register::<View>(|_| Ok(Arc::new(View::default())))?
        .initialized_by(|c, view| {
            *view.presenter.lock() = Some(c.resolve::<Presenter>()?);
            Ok(())
        });

    let view = container.resolve::<View>()?;
    let presenter = container.resolve::<Presenter>()?;

    let attached = view.presenter.lock().clone();
    assert!(attached.is_some_and(|p| Arc::ptr_eq(&p, &presenter)));
    assert!(Arc::ptr_eq(&presenter.view, &view));
    Ok(())
}

#[test]
fn presenter_first_resolution_is_cyclic() -> Result<(), Error> {
    let container = Container::new();
    container.register::<Presenter>(|c| {
        Ok(Arc::new(Presenter {
            view: c.resolve::<View>()?,
        }))
    })?;
    container
        .register::<View>(|_| Ok(Arc::new(View::default())))?
        .initialized_by(|c, view| {
            *view.presenter.lock() = Some(c.resolve::<Presenter>()?);
            Ok(())
        });

    // the view initializer runs while the presenter factory is still on the stack
    let err = container.resolve::<Presenter>().unwrap_err();
    assert_eq!(err.code(), "dependency_failed");
    assert_eq!(err.service(), Some(std::any::type_name::<Presenter>()));
    assert_eq!(err.root_cause().code(), "cyclic_resolution");
    assert_eq!(
        err.root_cause().service(),
        Some(std::any::type_name::<Presenter>())
    );

    // the view built during the failed attempt stays cached, without its presenter
    let view = container.resolve::<View>()?;
    assert!(view.presenter.lock().is_none());
    let presenter = container.resolve::<Presenter>()?;
    assert!(Arc::ptr_eq(&presenter.view, &view));
    Ok(())
}

#[test]
fn initializer_runs_on_registration_container() -> Result<(), Error> {
    let container = Container::new();
    container
        .register::<View>(|_| Ok(Arc::new(View::default())))?
        .initialized_by(|c, view| {
            *view.presenter.lock() = Some(c.resolve::<Presenter>()?);
            Ok(())
        })
        .reused_within(ReuseScope::Hierarchy);

    // the view is built on the parent, where the presenter is not registered
    let child = container.create_child();
    child.register::<Presenter>(|c| {
        Ok(Arc::new(Presenter {
            view: c.resolve::<View>()?,
        }))
    })?;

    let err = child.resolve::<View>().unwrap_err();
    assert_eq!(err.code(), "dependency_failed");
    assert_eq!(err.service(), Some(std::any::type_name::<View>()));
    assert!(err.root_cause().is_missing());
    assert_eq!(
        err.root_cause().service(),
        Some(std::any::type_name::<Presenter>())
    );
    Ok(())
}

#[test]
fn construction_errors_are_reported() -> Result<(), Error> {
    let container = Container::new();
    container.register::<Foo>(|_| Err(ResolutionError::construction::<Foo>(Unavailable)))?;
    container.register::<Bar>(|c| {
        c.resolve::<Foo>()?;
        Ok(Arc::new(Bar::default()))
    })?;

    let err = container.resolve::<Foo>().unwrap_err();
    assert_eq!(err.code(), "construction_failed");
    assert_eq!(
        std::error::Error::source(&err).map(|e| e.to_string()),
        Some("backend unavailable".to_string())
    );

    let err = container.resolve::<Bar>().unwrap_err();
    assert_eq!(err.code(), "dependency_failed");
    assert_eq!(err.service(), Some(std::any::type_name::<Bar>()));
    assert_eq!(err.root_cause().code(), "construction_failed");

    // nothing is cached after a failure
    container.register::<Foo>(|_| Ok(Arc::new(Foo::new("back"))))?;
    assert!(container.resolve::<Bar>().is_ok());
    Ok(())
}

#[test]
fn missing_dependency_names_the_dependency() -> Result<(), Error> {
    let container = Container::new();
    container.register_named::<Bar>("bar", |c| {
        c.resolve_named::<dyn IFoo>("missing")?;
        Ok(Arc::new(Bar::default()))
    })?;

    let err = container.resolve_named::<Bar>("bar").unwrap_err();
    assert!(!err.is_missing());
    assert_eq!(err.name(), Some("bar"));

    let cause = err.root_cause();
    assert_eq!(cause.code(), "missing_named_type");
    assert_eq!(cause.name(), Some("missing"));
    Ok(())
}

#[derive(Debug)]
struct Chicken(#[allow(dead_code)] Arc<Egg>);
#[derive(Debug)]
struct Egg(#[allow(dead_code)] Arc<Chicken>);

#[test]
fn cyclic_dependencies_are_detected() -> Result<(), Error> {
    let container = Container::new();
    container.register::<Chicken>(|c| Ok(Arc::new(Chicken(c.resolve::<Egg>()?))))?;
    container
        .register::<Egg>(|c| Ok(Arc::new(Egg(c.resolve::<Chicken>()?))))?
        .reused_within(ReuseScope::Hierarchy);

    let err = container.resolve::<Chicken>().unwrap_err();
    assert_eq!(err.code(), "dependency_failed");
    assert_eq!(err.root_cause().code(), "cyclic_resolution");
    assert_eq!(
        err.root_cause().service(),
        Some(std::any::type_name::<Chicken>())
    );

    // the failed resolution left no construction in progress
    container.register::<Egg>(|_| Err(ResolutionError::construction::<Egg>(Unavailable)))?;
    let err = container.resolve::<Chicken>().unwrap_err();
    assert_eq!(err.root_cause().code(), "construction_failed");
    Ok(())
}

#[test]
fn cyclic_error_names_the_service_and_registration() -> Result<(), Error> {
    let container = Container::new();
    container.register_named::<Chicken>("hen", |c| {
        Ok(Arc::new(Chicken(c.resolve_named::<Egg>("egg")?)))
    })?;
    container.register_named::<Egg>("egg", |c| {
        Ok(Arc::new(Egg(c.resolve_named::<Chicken>("hen")?)))
    })?;

    let err = container.resolve_named::<Chicken>("hen").unwrap_err();
    let cause = err.root_cause();
    assert_eq!(cause.code(), "cyclic_resolution");
    assert_eq!(cause.service(), Some(std::any::type_name::<Chicken>()));
    assert_eq!(cause.name(), Some("hen"));
    Ok(())
}

#[test]
fn cannot_resolve_on_disposed_container() -> Result<(), Error> {
    let container = Container::new();
    container.register::<Foo>(|_| Ok(Arc::new(Foo::default())))?;
    container.dispose();

    let err = container.resolve::<Foo>().unwrap_err();
    assert_eq!(err.code(), "container_disposed");
    assert!(container.try_resolve::<Foo>().is_none());
    assert!(container.resolve::<Container>().is_ok());
    Ok(())
}

#[test]
fn errors_convert_to_crate_error() {
    let container = Container::new();

    let err: Error = container.resolve::<Foo>().unwrap_err().into();
    assert_eq!(err.code(), "missing_type");

    let err = container
        .register::<Container>(|c| Ok(Arc::new(c.clone())))
        .err()
        .map(Error::from);
    assert_eq!(err.map(|e| e.code()), Some("cannot_register_container"));

    let err: Error = "forever".parse::<ReuseScope>().unwrap_err().into();
    assert_eq!(err.code(), "unknown_scope");
}
