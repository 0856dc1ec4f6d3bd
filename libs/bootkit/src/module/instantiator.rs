use std::sync::Arc;

use super::{CoreModule, Export};
use crate::di::{Injector, InjectorError, Provider};

#[derive(Debug, thiserror::Error)]
pub enum InstantiateError {
    #[error("module '{module}' is already instantiated")]
    AlreadyInstantiated { module: &'static str },

    #[error("module '{module}': {source}")]
    Injection {
        module: &'static str,
        #[source]
        source: InjectorError,
    },

    #[error("module '{module}' exports {token} but its injector cannot provide it: {source}")]
    Export {
        module: &'static str,
        token: crate::di::Token,
        #[source]
        source: InjectorError,
    },
}

impl InstantiateError {
    fn injection(module: &CoreModule) -> impl FnOnce(InjectorError) -> Self + '_ {
        |source| Self::Injection {
            module: module.name(),
            source,
        }
    }
}

/// Instantiate `module` and its subtree, children first.
///
/// Every node gets a fresh root injector built from its own providers, `extra`, and the
/// exports of its direct children. Token exports share the value already built in the
/// child's injector; class exports become class providers of the importer. Library
/// declarations are constructed once for their side effects.
///
/// A failure aborts the walk; subtrees instantiated before it are kept as they are.
///
/// # Errors
/// Returns the first dependency, construction or export failure, or
/// [`InstantiateError::AlreadyInstantiated`] when the node was instantiated before.
pub fn instantiate(
    module: &Arc<CoreModule>,
    extra: &[Provider],
) -> Result<Arc<CoreModule>, InstantiateError> {
    if module.di.get().is_some() {
        return Err(InstantiateError::AlreadyInstantiated {
            module: module.name(),
        });
    }

    for child in module.modules() {
        instantiate(child, extra)?;
    }

    let mut providers: Vec<Provider> = module.providers().to_vec();
    providers.extend_from_slice(extra);
    for child in module.modules() {
        providers.extend(harvest_exports(child)?);
    }

    let di = Injector::resolve_and_create(providers, None)
        .map_err(InstantiateError::injection(module))?;
    let instance = Injector::instantiate_component(module.token(), &di)
        .map_err(InstantiateError::injection(module))?;

    for declaration in module.declarations().iter().filter(|d| d.is_library()) {
        Injector::instantiate_component(declaration, &di)
            .map_err(InstantiateError::injection(module))?;
        tracing::trace!(
            module = module.name(),
            library = declaration.name(),
            "Library instantiated"
        );
    }

    if module.di.set(di).is_err() || module.instance.set(instance).is_err() {
        return Err(InstantiateError::AlreadyInstantiated {
            module: module.name(),
        });
    }
    tracing::debug!(module = module.name(), level = %module.level(), "Module instantiated");

    Ok(Arc::clone(module))
}

fn harvest_exports(child: &CoreModule) -> Result<Vec<Provider>, InstantiateError> {
    let Some(di) = child.di() else {
        return Ok(Vec::new());
    };

    child
        .exports()
        .iter()
        .map(|export| match export {
            Export::Token(token) => di
                .get_instance(token)
                .map(|value| Provider::use_instance(*token, value))
                .map_err(|source| InstantiateError::Export {
                    module: child.name(),
                    token: *token,
                    source,
                }),
            Export::Class(class) => Ok(Provider::from(class.clone())),
        })
        .collect()
}
