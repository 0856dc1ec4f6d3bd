use std::sync::{Arc, OnceLock, Weak};

use super::{CoreModule, ModuleDescriptor, ModuleImport, ModuleLevel};
use crate::di::{Annotation, ComponentType, Provider};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("'{module}' is not a module: no module descriptor attached")]
    NotAModule { module: &'static str },

    #[error("module '{module}' must declare a version")]
    MissingVersion { module: &'static str },

    #[error("cyclic module import: {path}")]
    CyclicImport { path: String },
}

/// Resolve a module (optionally paired with extra providers) into a [`CoreModule`] tree.
///
/// Nodes are built depth-first, parent before children. Each child inherits the parent's
/// providers whose token is an injection token; class providers are not inherited.
///
/// # Errors
/// Fails when a type in the tree carries no module descriptor, declares no version, or
/// imports one of its own ancestors.
pub fn resolve(root: impl Into<ModuleImport>) -> Result<Arc<CoreModule>, ResolveError> {
    let root = root.into();
    tracing::debug!(module = root.module.name(), "Resolving module tree");
    resolve_node(root, None)
}

fn resolve_node(
    import: ModuleImport,
    parent: Option<&Arc<CoreModule>>,
) -> Result<Arc<CoreModule>, ResolveError> {
    let ModuleImport {
        module,
        providers: extra,
    } = import;
    let descriptor = descriptor_of(&module)?;

    if let Some(parent) = parent {
        check_not_ancestor(&module, parent)?;
    }

    let mut providers: Vec<Provider> = descriptor.declared_providers().to_vec();
    providers.extend(extra);
    if let Some(parent) = parent {
        providers.extend(
            parent
                .providers()
                .iter()
                .filter(|p| p.provide().is_injection_token())
                .cloned(),
        );
    }

    let node = Arc::new(CoreModule {
        level: ModuleLevel::child_of(parent.map(Arc::as_ref)),
        parent: parent.map_or_else(Weak::new, Arc::downgrade),
        version: descriptor.version().to_owned(),
        providers,
        exports: descriptor.exports().to_vec(),
        declarations: descriptor.declarations().to_vec(),
        modules: OnceLock::new(),
        di: OnceLock::new(),
        instance: OnceLock::new(),
        token: module,
    });
    tracing::trace!(module = node.name(), level = %node.level(), "Module resolved");

    let children = descriptor
        .imports()
        .iter()
        .cloned()
        .map(|child| resolve_node(child, Some(&node)))
        .collect::<Result<Vec<_>, _>>()?;
    // Freshly created cell; the set cannot fail.
    let _ = node.modules.set(children);

    Ok(node)
}

fn descriptor_of(module: &ComponentType) -> Result<ModuleDescriptor, ResolveError> {
    let Annotation::Module(descriptor) = module.annotation() else {
        return Err(ResolveError::NotAModule {
            module: module.name(),
        });
    };
    if descriptor.version().trim().is_empty() {
        return Err(ResolveError::MissingVersion {
            module: module.name(),
        });
    }
    Ok(descriptor)
}

fn check_not_ancestor(
    module: &ComponentType,
    parent: &Arc<CoreModule>,
) -> Result<(), ResolveError> {
    let mut chain = vec![module.name()];
    let mut current = Some(Arc::clone(parent));
    while let Some(node) = current {
        chain.push(node.name());
        if node.token() == module {
            chain.reverse();
            return Err(ResolveError::CyclicImport {
                path: chain.join(" -> "),
            });
        }
        current = node.parent();
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::di::{Args, Component, Token};
    use std::sync::LazyLock;

    static CONFIG: LazyLock<Token> = LazyLock::new(|| Token::new("CONFIG"));

    struct Service;

    impl Component for Service {
        fn construct(_: &mut Args) -> anyhow::Result<Self> {
            Ok(Self)
        }
    }

    struct Leaf;

    impl Component for Leaf {
        fn construct(_: &mut Args) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn annotation() -> Annotation {
            Annotation::Module(ModuleDescriptor::new("1.0.0"))
        }
    }

    struct Middle;

    impl Component for Middle {
        fn construct(_: &mut Args) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn annotation() -> Annotation {
            Annotation::Module(ModuleDescriptor::new("1.0.0").import(ComponentType::of::<Leaf>()))
        }
    }

    struct Top;

    impl Component for Top {
        fn construct(_: &mut Args) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn annotation() -> Annotation {
            Annotation::Module(
                ModuleDescriptor::new("1.0.0")
                    .provider(Provider::use_value(*CONFIG, 42_u32))
                    .provider(ComponentType::of::<Service>())
                    .import(ComponentType::of::<Middle>()),
            )
        }
    }

    struct Loop;

    impl Component for Loop {
        fn construct(_: &mut Args) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn annotation() -> Annotation {
            Annotation::Module(
                ModuleDescriptor::new("1.0.0").import(ComponentType::of::<LoopBack>()),
            )
        }
    }

    struct LoopBack;

    impl Component for LoopBack {
        fn construct(_: &mut Args) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn annotation() -> Annotation {
            Annotation::Module(ModuleDescriptor::new("1.0.0").import(ComponentType::of::<Loop>()))
        }
    }

    struct Unversioned;

    impl Component for Unversioned {
        fn construct(_: &mut Args) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn annotation() -> Annotation {
            Annotation::Module(ModuleDescriptor::new(""))
        }
    }

    #[test]
    fn levels_follow_depth() {
        let root = resolve(ComponentType::of::<Top>()).unwrap();
        let middle = &root.modules()[0];
        let leaf = &middle.modules()[0];

        assert_eq!(root.level(), ModuleLevel::Root);
        assert!(root.parent().is_none());
        assert_eq!(middle.level(), ModuleLevel::Primary);
        assert_eq!(leaf.level(), ModuleLevel::Secondary);
        assert_eq!(leaf.parent().unwrap().name(), "Middle");
    }

    #[test]
    fn only_injection_tokens_reach_descendants() {
        let root = resolve(ComponentType::of::<Top>()).unwrap();
        let leaf = &root.modules()[0].modules()[0];

        let tokens: Vec<Token> = leaf.providers().iter().map(Provider::provide).collect();
        assert_eq!(tokens, vec![*CONFIG]);
    }

    #[test]
    fn plain_component_is_not_a_module() {
        let err = resolve(ComponentType::of::<Service>()).unwrap_err();
        assert_eq!(err.to_string(), "'Service' is not a module: no module descriptor attached");
    }

    #[test]
    fn empty_version_is_rejected() {
        let err = resolve(ComponentType::of::<Unversioned>()).unwrap_err();
        assert!(matches!(err, ResolveError::MissingVersion { module: "Unversioned" }));
    }

    #[test]
    fn import_cycles_are_reported() {
        let err = resolve(ComponentType::of::<Loop>()).unwrap_err();
        assert_eq!(err.to_string(), "cyclic module import: Loop -> LoopBack -> Loop");
    }

    #[test]
    fn flatten_is_pre_order() {
        let root = resolve(ComponentType::of::<Top>()).unwrap();
        let names: Vec<&str> = root.flatten().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Top", "Middle", "Leaf"]);
    }
}
