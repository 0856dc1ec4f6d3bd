//! Provider declarations and their normalization into resolvable recipes.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use super::component::{Args, ComponentType};
use super::{Component, InjectorError, Instance, Token};

/// How far up the injector chain a lookup may go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Bound {
    /// Walk every ancestor.
    #[default]
    Any,
    /// Only the scope the lookup starts in.
    SelfOnly,
    /// Stop at the host scope. Injectors carry no separate host boundary, so the host is the
    /// scope the lookup starts in.
    Host,
}

/// One constructor parameter: target token plus visibility modifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dependency {
    pub token: Token,
    pub optional: bool,
    pub skip_self: bool,
    pub bound: Bound,
}

impl Dependency {
    pub fn on(token: Token) -> Self {
        Self {
            token,
            optional: false,
            skip_self: false,
            bound: Bound::Any,
        }
    }

    /// Dependency on the type token of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::on(Token::of::<T>())
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Start the lookup at the parent scope.
    pub fn skip_self(mut self) -> Self {
        self.skip_self = true;
        self
    }

    pub fn self_only(mut self) -> Self {
        self.bound = Bound::SelfOnly;
        self
    }

    pub fn host(mut self) -> Self {
        self.bound = Bound::Host;
        self
    }
}

/// User factory: receives the resolved `deps` and returns the provided value.
pub type FactoryFn = Arc<dyn Fn(&mut Args) -> anyhow::Result<Instance> + Send + Sync>;

/// How a provider produces its value.
#[derive(Clone)]
pub enum Recipe {
    /// Construct a component through constructor injection.
    UseClass(ComponentType),
    /// Return a fixed value.
    UseValue(Instance),
    /// Invoke a factory with resolved dependency arguments.
    UseFactory {
        deps: Vec<Dependency>,
        factory: FactoryFn,
    },
    /// Alias to another token's resolved value.
    UseExisting(Token),
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseClass(class) => f.debug_tuple("UseClass").field(class).finish(),
            Self::UseValue(_) => f.write_str("UseValue(..)"),
            Self::UseFactory { deps, .. } => f
                .debug_struct("UseFactory")
                .field("deps", &deps.len())
                .finish_non_exhaustive(),
            Self::UseExisting(token) => f.debug_tuple("UseExisting").field(token).finish(),
        }
    }
}

/// A recipe registered under a token.
#[derive(Clone, Debug)]
pub struct Provider {
    provide: Token,
    multi: bool,
    recipe: Recipe,
}

impl Provider {
    /// `T` provided under its own type token (the bare-type shorthand).
    pub fn class<T: Component>() -> Self {
        ComponentType::of::<T>().into()
    }

    pub fn use_class(provide: Token, class: ComponentType) -> Self {
        Self::with_recipe(provide, Recipe::UseClass(class))
    }

    pub fn use_value<V: Any + Send + Sync>(provide: Token, value: V) -> Self {
        Self::use_instance(provide, Arc::new(value))
    }

    /// Fixed, already erased value (e.g. one taken from another injector).
    pub fn use_instance(provide: Token, value: Instance) -> Self {
        Self::with_recipe(provide, Recipe::UseValue(value))
    }

    pub fn use_factory<V, F>(provide: Token, deps: Vec<Dependency>, factory: F) -> Self
    where
        V: Any + Send + Sync,
        F: Fn(&mut Args) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        let factory: FactoryFn =
            Arc::new(move |args| factory(args).map(|v| Arc::new(v) as Instance));
        Self::with_recipe(provide, Recipe::UseFactory { deps, factory })
    }

    pub fn use_existing(provide: Token, existing: Token) -> Self {
        Self::with_recipe(provide, Recipe::UseExisting(existing))
    }

    fn with_recipe(provide: Token, recipe: Recipe) -> Self {
        Self {
            provide,
            multi: false,
            recipe,
        }
    }

    /// Contribute to an ordered list under the token instead of replacing it.
    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    #[inline]
    pub fn provide(&self) -> Token {
        self.provide
    }

    #[inline]
    pub fn is_multi(&self) -> bool {
        self.multi
    }

    #[inline]
    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }
}

impl From<ComponentType> for Provider {
    fn from(class: ComponentType) -> Self {
        Self::use_class(class.token(), class)
    }
}

/// Normalized recipe: dependency list plus a producer.
#[derive(Clone)]
pub(crate) struct ResolvedFactory {
    pub(crate) requester: &'static str,
    pub(crate) deps: Vec<Dependency>,
    produce: Produce,
}

#[derive(Clone)]
enum Produce {
    Class(ComponentType),
    Value(Instance),
    Factory(FactoryFn),
    Alias,
}

impl ResolvedFactory {
    fn from_provider(provider: Provider) -> Self {
        let requester = provider.provide.name();
        match provider.recipe {
            Recipe::UseClass(class) => Self {
                requester: class.name(),
                deps: class.dependencies().to_vec(),
                produce: Produce::Class(class),
            },
            Recipe::UseValue(value) => Self {
                requester,
                deps: Vec::new(),
                produce: Produce::Value(value),
            },
            Recipe::UseFactory { deps, factory } => Self {
                requester,
                deps,
                produce: Produce::Factory(factory),
            },
            Recipe::UseExisting(existing) => Self {
                requester,
                deps: vec![Dependency::on(existing)],
                produce: Produce::Alias,
            },
        }
    }

    pub(crate) fn produce(&self, args: &mut Args) -> anyhow::Result<Instance> {
        match &self.produce {
            Produce::Class(class) => class.construct(args),
            Produce::Value(value) => Ok(Arc::clone(value)),
            Produce::Factory(factory) => factory(args),
            Produce::Alias => {
                let (token, value) = args.next_instance()?;
                value.ok_or_else(|| {
                    InjectorError::NoProvider {
                        token,
                        requester: self.requester,
                    }
                    .into()
                })
            }
        }
    }
}

/// Resolved entry for one token: a single recipe, or the ordered recipes of a multi token.
#[derive(Clone)]
pub(crate) enum ResolvedProvider {
    Single(ResolvedFactory),
    Multi(Vec<ResolvedFactory>),
}

impl ResolvedProvider {
    /// Union of dependency tokens over every recipe, first occurrence order.
    pub(crate) fn dependency_tokens(&self) -> Vec<Token> {
        let factories = match self {
            Self::Single(f) => std::slice::from_ref(f),
            Self::Multi(fs) => fs.as_slice(),
        };
        let mut out: Vec<Token> = Vec::new();
        for dep in factories.iter().flat_map(|f| f.deps.iter()) {
            if !out.contains(&dep.token) {
                out.push(dep.token);
            }
        }
        out
    }
}

/// Turn declarations into one resolved entry per token.
///
/// Multi providers append in declaration order; a later regular provider replaces an earlier one.
///
/// # Errors
/// Returns [`InjectorError::MixedMultiProvider`] when a token receives both multi and regular
/// providers.
pub(crate) fn resolve_providers(
    providers: impl IntoIterator<Item = Provider>,
) -> Result<HashMap<Token, ResolvedProvider>, InjectorError> {
    let mut resolved: HashMap<Token, ResolvedProvider> = HashMap::new();

    for provider in providers {
        let token = provider.provide;
        let multi = provider.multi;
        let factory = ResolvedFactory::from_provider(provider);

        match resolved.entry(token) {
            Entry::Vacant(slot) => {
                slot.insert(if multi {
                    ResolvedProvider::Multi(vec![factory])
                } else {
                    ResolvedProvider::Single(factory)
                });
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), multi) {
                (ResolvedProvider::Multi(factories), true) => factories.push(factory),
                (ResolvedProvider::Single(existing), false) => *existing = factory,
                _ => return Err(InjectorError::MixedMultiProvider { token }),
            },
        }
    }

    Ok(resolved)
}
