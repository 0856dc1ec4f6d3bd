#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Module tree resolution and bottom-up instantiation.

use parking_lot::Mutex;
use std::sync::{Arc, LazyLock};

use bootkit::module::{InstantiateError, instantiate, resolve};
use bootkit::{
    Annotation, Args, Component, ComponentType, Dependency, InjectorError, ModuleDescriptor,
    ModuleImport, ModuleLevel, Provider, Token,
};

/// Declare a module type whose constructor takes no dependencies.
macro_rules! module {
    ($name:ident, $descriptor:expr) => {
        struct $name;

        impl Component for $name {
            fn construct(_: &mut Args) -> anyhow::Result<Self> {
                Ok(Self)
            }

            fn annotation() -> Annotation {
                Annotation::Module($descriptor)
            }
        }
    };
}

static ANSWER: LazyLock<Token> = LazyLock::new(|| Token::new("ANSWER"));

#[derive(Debug)]
struct Greeter;

impl Component for Greeter {
    fn construct(_: &mut Args) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

#[derive(Debug)]
struct NeedsAnswer(Arc<u32>);

impl Component for NeedsAnswer {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on(*ANSWER)]
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self> {
        Ok(Self(args.next()?))
    }
}

#[derive(Debug)]
struct NeedsGreeter(Arc<Greeter>);

impl Component for NeedsGreeter {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<Greeter>()]
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self> {
        Ok(Self(args.next()?))
    }
}

#[test]
fn level_depends_only_on_depth() {
    module!(Deepest, ModuleDescriptor::new("1.0.0"));
    module!(Deep, ModuleDescriptor::new("1.0.0").import(ComponentType::of::<Deepest>()));
    module!(Side, ModuleDescriptor::new("1.0.0"));
    module!(
        Branch,
        ModuleDescriptor::new("1.0.0").import(ComponentType::of::<Deep>())
    );
    module!(
        App,
        ModuleDescriptor::new("1.0.0")
            .import(ComponentType::of::<Branch>())
            .import(ComponentType::of::<Side>())
    );

    let root = resolve(ComponentType::of::<App>()).unwrap();
    let levels: Vec<(&str, ModuleLevel)> = root
        .flatten()
        .iter()
        .map(|m| (m.name(), m.level()))
        .collect();

    assert_eq!(
        levels,
        vec![
            ("App", ModuleLevel::Root),
            ("Branch", ModuleLevel::Primary),
            ("Deep", ModuleLevel::Secondary),
            ("Deepest", ModuleLevel::Secondary),
            ("Side", ModuleLevel::Primary),
        ]
    );
    for module in root.flatten() {
        assert_eq!(module.level() == ModuleLevel::Root, module.parent().is_none());
    }
}

#[test]
fn children_are_instantiated_before_parents() {
    static ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    macro_rules! recording_module {
        ($name:ident, $descriptor:expr) => {
            struct $name;

            impl Component for $name {
                fn construct(_: &mut Args) -> anyhow::Result<Self> {
                    ORDER.lock().push(stringify!($name));
                    Ok(Self)
                }

                fn annotation() -> Annotation {
                    Annotation::Module($descriptor)
                }
            }
        };
    }

    recording_module!(Leaf, ModuleDescriptor::new("1.0.0"));
    recording_module!(Left, ModuleDescriptor::new("1.0.0").import(ComponentType::of::<Leaf>()));
    recording_module!(Right, ModuleDescriptor::new("1.0.0"));
    recording_module!(
        Top,
        ModuleDescriptor::new("1.0.0")
            .import(ComponentType::of::<Left>())
            .import(ComponentType::of::<Right>())
    );

    let root = resolve(ComponentType::of::<Top>()).unwrap();
    instantiate(&root, &[]).unwrap();

    assert_eq!(ORDER.lock().as_slice(), ["Leaf", "Left", "Right", "Top"]);
    let nodes = root.flatten();
    assert!(nodes.iter().all(|m| m.is_instantiated() && m.di().is_some()));
}

#[test]
fn parent_injection_token_reaches_child_service() {
    module!(
        Child,
        ModuleDescriptor::new("1.0.0").provider(ComponentType::of::<NeedsAnswer>())
    );
    module!(
        Parent,
        ModuleDescriptor::new("1.0.0")
            .provider(Provider::use_value(*ANSWER, 42_u32))
            .import(ComponentType::of::<Child>())
    );

    let root = resolve(ComponentType::of::<Parent>()).unwrap();
    instantiate(&root, &[]).unwrap();

    let child = &root.modules()[0];
    let service = child.di().unwrap().resolve::<NeedsAnswer>().unwrap();
    assert_eq!(*service.0, 42);
}

#[test]
fn parent_class_provider_does_not_reach_child() {
    module!(
        Child,
        ModuleDescriptor::new("1.0.0").provider(ComponentType::of::<NeedsGreeter>())
    );
    module!(
        Parent,
        ModuleDescriptor::new("1.0.0")
            .provider(ComponentType::of::<Greeter>())
            .import(ComponentType::of::<Child>())
    );

    let root = resolve(ComponentType::of::<Parent>()).unwrap();
    assert!(root.modules()[0].providers().iter().all(|p| p.provide() != Token::of::<Greeter>()));

    instantiate(&root, &[]).unwrap();
    let err = root.modules()[0].di().unwrap().resolve::<NeedsGreeter>().unwrap_err();
    assert_eq!(err.to_string(), "No provider for Greeter! (required by NeedsGreeter)");
}

#[test]
fn class_export_becomes_importer_provider() {
    struct Shell {
        greeter: Arc<NeedsGreeter>,
    }

    impl Component for Shell {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::of::<NeedsGreeter>()]
        }

        fn construct(args: &mut Args) -> anyhow::Result<Self> {
            Ok(Self {
                greeter: args.next()?,
            })
        }

        fn annotation() -> Annotation {
            Annotation::Module(
                ModuleDescriptor::new("1.0.0")
                    .provider(ComponentType::of::<Greeter>())
                    .import(ComponentType::of::<Feature>()),
            )
        }
    }

    module!(
        Feature,
        ModuleDescriptor::new("1.0.0")
            .provider(ComponentType::of::<Greeter>())
            .provider(ComponentType::of::<NeedsGreeter>())
            .export(ComponentType::of::<NeedsGreeter>())
    );

    let root = resolve(ComponentType::of::<Shell>()).unwrap();
    instantiate(&root, &[]).unwrap();

    let shell = root.instance_as::<Shell>().unwrap();
    let in_feature = root.modules()[0].di().unwrap().resolve::<NeedsGreeter>().unwrap();
    // Re-declared in the importer: a separate instance wired to the importer's Greeter.
    assert!(!Arc::ptr_eq(&shell.greeter, &in_feature));
    let shell_greeter = root.di().unwrap().resolve::<Greeter>().unwrap();
    assert!(Arc::ptr_eq(&shell.greeter.0, &shell_greeter));
}

#[test]
fn import_specific_providers_apply_to_that_import_only() {
    module!(
        Configured,
        ModuleDescriptor::new("1.0.0").provider(ComponentType::of::<NeedsAnswer>())
    );
    module!(
        Host,
        ModuleDescriptor::new("1.0.0").import(ModuleImport::with_providers(
            ComponentType::of::<Configured>(),
            [Provider::use_value(*ANSWER, 7_u32)],
        ))
    );

    let root = resolve(ComponentType::of::<Host>()).unwrap();
    instantiate(&root, &[]).unwrap();

    let child = &root.modules()[0];
    assert_eq!(*child.di().unwrap().resolve::<NeedsAnswer>().unwrap().0, 7);
    let di = root.di().unwrap();
    assert!(di.get_optional::<u32>(&ANSWER).unwrap().is_none());
}

#[test]
fn extra_providers_are_visible_in_every_module() {
    struct Inner(Arc<u32>);

    impl Component for Inner {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::on(*ANSWER)]
        }

        fn construct(args: &mut Args) -> anyhow::Result<Self> {
            Ok(Self(args.next()?))
        }

        fn annotation() -> Annotation {
            Annotation::Module(ModuleDescriptor::new("1.0.0"))
        }
    }

    module!(Outer, ModuleDescriptor::new("1.0.0").import(ComponentType::of::<Inner>()));

    let root = resolve(ComponentType::of::<Outer>()).unwrap();
    instantiate(&root, &[Provider::use_value(*ANSWER, 5_u32)]).unwrap();

    let inner = root.modules()[0].instance_as::<Inner>().unwrap();
    assert_eq!(*inner.0, 5);
    assert_eq!(*root.di().unwrap().get::<u32>(&ANSWER).unwrap(), 5);
}

#[test]
fn failing_child_aborts_the_tree() {
    struct Faulty;

    impl Component for Faulty {
        fn construct(_: &mut Args) -> anyhow::Result<Self> {
            anyhow::bail!("disk unavailable")
        }

        fn annotation() -> Annotation {
            Annotation::Module(ModuleDescriptor::new("1.0.0"))
        }
    }

    module!(Healthy, ModuleDescriptor::new("1.0.0"));
    module!(
        Whole,
        ModuleDescriptor::new("1.0.0")
            .import(ComponentType::of::<Healthy>())
            .import(ComponentType::of::<Faulty>())
    );

    let root = resolve(ComponentType::of::<Whole>()).unwrap();
    let err = instantiate(&root, &[]).unwrap_err();

    let InstantiateError::Injection { module, source } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*module, "Faulty");
    assert!(matches!(source, InjectorError::Construction { requester: "Faulty", .. }));
    assert_eq!(
        err.to_string(),
        "module 'Faulty': Error during instantiation of Faulty: disk unavailable"
    );

    // Siblings finished before the failure stay instantiated; nothing above them does.
    assert!(root.modules()[0].is_instantiated());
    assert!(!root.is_instantiated());
}
