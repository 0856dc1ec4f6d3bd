//! Scoped singleton injector.
//!
//! An injector owns one resolved entry per token and lazily caches the value built for it.
//! Lookups that miss the local scope are delegated to the parent injector (if any), subject
//! to the visibility bounds of the requesting dependency.
//!
//! Notes:
//! - The entry map is immutable after creation; only the instance cache changes.
//! - The cache lock is never held while a value is being constructed, so constructors may
//!   trigger nested lookups.
//! - Cycles are detected per call through the resolution path, keyed by (injector, token).

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::component::{Args, ComponentType};
use super::provider::{
    Bound, Dependency, Provider, ResolvedFactory, ResolvedProvider, resolve_providers,
};
use super::{Component, Instance, Token, downcast};

#[derive(Debug, thiserror::Error)]
pub enum InjectorError {
    #[error("No provider for {token}! (required by {requester})")]
    NoProvider {
        token: Token,
        requester: &'static str,
    },

    #[error("Cannot mix multi providers and regular providers for {token}")]
    MixedMultiProvider { token: Token },

    #[error("Cannot instantiate cyclic dependency! {path}")]
    CyclicDependency { path: String },

    #[error("Error during instantiation of {requester}: {source}")]
    Construction {
        requester: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Type mismatch for {token}: expected {expected}")]
    TypeMismatch {
        token: Token,
        expected: &'static str,
    },

    #[error("Missing argument #{index} for {requester}")]
    MissingArgument {
        index: usize,
        requester: &'static str,
    },
}

/// Values of a multi token, in provider declaration order.
pub(crate) struct MultiValues(pub(crate) Vec<Instance>);

/// Tokens currently being built during one top-level lookup.
type ResolutionPath = Vec<(*const Injector, Token)>;

pub struct Injector {
    providers: HashMap<Token, ResolvedProvider>,
    cache: RwLock<HashMap<Token, Instance>>,
    parent: Option<Arc<Injector>>,
}

impl Injector {
    /// Resolve `providers` into a new scope, optionally delegating misses to `parent`.
    ///
    /// # Errors
    /// Returns [`InjectorError::MixedMultiProvider`] on conflicting declarations for one token.
    pub fn resolve_and_create(
        providers: impl IntoIterator<Item = Provider>,
        parent: Option<Arc<Injector>>,
    ) -> Result<Arc<Self>, InjectorError> {
        let providers = resolve_providers(providers)?;
        tracing::trace!(
            providers = providers.len(),
            has_parent = parent.is_some(),
            "Injector created"
        );
        Ok(Arc::new(Self {
            providers,
            cache: RwLock::new(HashMap::new()),
            parent,
        }))
    }

    #[inline]
    pub fn parent(&self) -> Option<&Arc<Injector>> {
        self.parent.as_ref()
    }

    /// `true` if this scope (not its ancestors) has an entry for `token`.
    pub fn has_provider(&self, token: &Token) -> bool {
        self.providers.contains_key(token)
    }

    /// Tokens registered in this scope.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.providers.keys()
    }

    /// Singleton for `token`, built on first request.
    ///
    /// # Errors
    /// Fails when the token (or one of its transitive dependencies) has no provider, a cycle is
    /// found, or a constructor/factory fails.
    pub fn get_instance(&self, token: &Token) -> Result<Instance, InjectorError> {
        let mut path = ResolutionPath::new();
        self.lookup(&Dependency::on(*token), "Injector", &mut path)?
            .ok_or(InjectorError::NoProvider {
                token: *token,
                requester: "Injector",
            })
    }

    /// Typed [`Injector::get_instance`].
    ///
    /// # Errors
    /// As [`Injector::get_instance`], plus [`InjectorError::TypeMismatch`].
    pub fn get<T: Any + Send + Sync>(&self, token: &Token) -> Result<Arc<T>, InjectorError> {
        downcast(*token, self.get_instance(token)?)
    }

    /// `None` instead of an error when nothing provides `token`.
    ///
    /// # Errors
    /// Fails when the token is provided but cannot be built, or is not a `T`.
    pub fn get_optional<T: Any + Send + Sync>(
        &self,
        token: &Token,
    ) -> Result<Option<Arc<T>>, InjectorError> {
        let mut path = ResolutionPath::new();
        match self.lookup(&Dependency::on(*token).optional(), "Injector", &mut path)? {
            Some(value) => downcast(*token, value).map(Some),
            None => Ok(None),
        }
    }

    /// All values contributed to a multi token.
    ///
    /// # Errors
    /// Fails when the token is missing, is not a multi token, or an entry is not a `T`.
    pub fn get_all<T: Any + Send + Sync>(
        &self,
        token: &Token,
    ) -> Result<Vec<Arc<T>>, InjectorError> {
        let values = downcast::<MultiValues>(*token, self.get_instance(token)?)?;
        values
            .0
            .iter()
            .map(|v| downcast(*token, Arc::clone(v)))
            .collect()
    }

    /// Singleton registered under the type token of `T`.
    ///
    /// # Errors
    /// As [`Injector::get`].
    pub fn resolve<T: Component>(&self) -> Result<Arc<T>, InjectorError> {
        self.get(&Token::of::<T>())
    }

    /// Construct `component` against `injector` without caching the result.
    ///
    /// Every call builds a distinct value; its dependencies are still the injector's singletons.
    ///
    /// # Errors
    /// Fails when a dependency cannot be resolved or the constructor fails.
    pub fn instantiate_component(
        component: &ComponentType,
        injector: &Injector,
    ) -> Result<Instance, InjectorError> {
        let mut path = ResolutionPath::new();
        let values = injector.resolve_deps(component.dependencies(), component.name(), &mut path)?;
        let mut args = Args::new(component.name(), values);
        component
            .construct(&mut args)
            .map_err(|source| construction_error(component.name(), source))
    }

    /// Typed [`Injector::instantiate_component`] for `T` against this injector.
    ///
    /// # Errors
    /// As [`Injector::instantiate_component`].
    pub fn instantiate<T: Component>(&self) -> Result<Arc<T>, InjectorError> {
        let value = Self::instantiate_component(&ComponentType::of::<T>(), self)?;
        downcast(Token::of::<T>(), value)
    }

    /// Every token reachable from `token` through this scope's entries (multi recipes unioned).
    ///
    /// Tokens provided outside this scope are listed but not expanded.
    pub fn transitive_dependencies(&self, token: &Token) -> Vec<Token> {
        let mut out: Vec<Token> = Vec::new();
        let mut stack = vec![*token];
        while let Some(current) = stack.pop() {
            let Some(entry) = self.providers.get(&current) else {
                continue;
            };
            for dep in entry.dependency_tokens() {
                if dep != *token && !out.contains(&dep) {
                    out.push(dep);
                    stack.push(dep);
                }
            }
        }
        out
    }

    fn resolve_deps(
        &self,
        deps: &[Dependency],
        requester: &'static str,
        path: &mut ResolutionPath,
    ) -> Result<Vec<(Dependency, Option<Instance>)>, InjectorError> {
        deps.iter()
            .map(|dep| Ok((*dep, self.lookup(dep, requester, path)?)))
            .collect()
    }

    /// Walk the scope chain for `dep`, honoring `skip_self` and the upper bound.
    fn lookup(
        &self,
        dep: &Dependency,
        requester: &'static str,
        path: &mut ResolutionPath,
    ) -> Result<Option<Instance>, InjectorError> {
        let mut current = if dep.skip_self {
            self.parent.as_deref()
        } else {
            Some(self)
        };

        while let Some(injector) = current {
            if let Some(value) = injector.get_own(&dep.token, path)? {
                return Ok(Some(value));
            }
            if dep.bound != Bound::Any {
                break;
            }
            current = injector.parent.as_deref();
        }

        if dep.optional {
            Ok(None)
        } else {
            Err(InjectorError::NoProvider {
                token: dep.token,
                requester,
            })
        }
    }

    /// Cached value or freshly built value from this scope's entry; `None` if there is no entry.
    fn get_own(
        &self,
        token: &Token,
        path: &mut ResolutionPath,
    ) -> Result<Option<Instance>, InjectorError> {
        if let Some(value) = self.cache.read().get(token) {
            return Ok(Some(Arc::clone(value)));
        }
        let Some(entry) = self.providers.get(token) else {
            return Ok(None);
        };

        let key = (std::ptr::from_ref(self), *token);
        if path.contains(&key) {
            let mut names: Vec<&str> = path.iter().map(|(_, t)| t.name()).collect();
            names.push(token.name());
            return Err(InjectorError::CyclicDependency {
                path: names.join(" -> "),
            });
        }

        path.push(key);
        let built = self.build(entry, path);
        path.pop();
        let value = built?;

        let mut cache = self.cache.write();
        Ok(Some(Arc::clone(cache.entry(*token).or_insert(value))))
    }

    fn build(
        &self,
        entry: &ResolvedProvider,
        path: &mut ResolutionPath,
    ) -> Result<Instance, InjectorError> {
        match entry {
            ResolvedProvider::Single(factory) => self.run_factory(factory, path),
            ResolvedProvider::Multi(factories) => {
                let values = factories
                    .iter()
                    .map(|f| self.run_factory(f, path))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(MultiValues(values)))
            }
        }
    }

    fn run_factory(
        &self,
        factory: &ResolvedFactory,
        path: &mut ResolutionPath,
    ) -> Result<Instance, InjectorError> {
        let values = self.resolve_deps(&factory.deps, factory.requester, path)?;
        let mut args = Args::new(factory.requester, values);
        factory
            .produce(&mut args)
            .map_err(|source| construction_error(factory.requester, source))
    }
}

/// Injector errors raised from inside a constructor (e.g. `args.next()?`) are passed through as is.
fn construction_error(requester: &'static str, source: anyhow::Error) -> InjectorError {
    match source.downcast::<InjectorError>() {
        Ok(inner) => inner,
        Err(source) => InjectorError::Construction { requester, source },
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tokens: Vec<&str> = self.providers.keys().map(Token::name).collect();
        f.debug_struct("Injector")
            .field("providers", &tokens)
            .field("cached", &self.cache.read().len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
