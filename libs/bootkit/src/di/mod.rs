//! Hierarchical dependency injection.
//!
//! - [`Token`]: identity key (type token or opaque injection token).
//! - [`Provider`]: recipe producing a value for a token (class, value, factory, alias;
//!   optionally multi).
//! - [`Component`]/[`ComponentType`]: a constructible type with declared dependencies, metadata
//!   and hooks.
//! - [`Injector`]: resolves tokens to cached singletons, optionally delegating to a parent scope.

mod component;
mod injector;
mod provider;
mod token;

use std::any::Any;
use std::sync::Arc;

pub use component::{Annotation, Args, Component, ComponentType};
pub use injector::{Injector, InjectorError};
pub use provider::{Bound, Dependency, FactoryFn, Provider, Recipe};
pub use token::Token;

pub(crate) use injector::MultiValues;
pub(crate) use token::short_type_name;

/// Type-erased provided value.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Erase a concrete value into an [`Instance`].
pub fn instance<V: Any + Send + Sync>(value: V) -> Instance {
    Arc::new(value)
}

/// Typed view of an erased value.
pub(crate) fn downcast<T: Any + Send + Sync>(
    token: Token,
    value: Instance,
) -> Result<Arc<T>, InjectorError> {
    value
        .downcast::<T>()
        .map_err(|_| InjectorError::TypeMismatch {
            token,
            expected: short_type_name(std::any::type_name::<T>()),
        })
}
