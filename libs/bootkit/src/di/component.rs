//! Constructible component types.
//!
//! A Rust type becomes injectable by implementing [`Component`]; [`ComponentType`] is its
//! type-erased runtime handle (the thing providers, module descriptors and extensions refer to).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::provider::Dependency;
use super::{InjectorError, Instance, MultiValues, Token, downcast};
use crate::extension::ExtensionKind;
use crate::hooks::{HookTable, Hooks};
use crate::module::ModuleDescriptor;

/// Declarative metadata attached to a component type.
#[derive(Clone, Default)]
pub enum Annotation {
    /// Plain injectable service.
    #[default]
    Injectable,
    /// Module carrying a descriptor (providers, imports, exports, declarations).
    Module(ModuleDescriptor),
    /// Library component: instantiated once per declaring module for its side effects.
    Library,
    /// Extension loaded by the bootstrap orchestrator.
    Extension(ExtensionKind),
}

impl fmt::Debug for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Injectable => f.write_str("Injectable"),
            Self::Module(d) => f.debug_tuple("Module").field(&d.version()).finish(),
            Self::Library => f.write_str("Library"),
            Self::Extension(kind) => f.debug_tuple("Extension").field(kind).finish(),
        }
    }
}

/// A type the injector can construct.
///
/// ```ignore
/// struct UserService { repo: Arc<UserRepo> }
///
/// impl Component for UserService {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Dependency::of::<UserRepo>()]
///     }
///
///     fn construct(args: &mut Args) -> anyhow::Result<Self> {
///         Ok(Self { repo: args.next()? })
///     }
/// }
/// ```
pub trait Component: Sized + Send + Sync + 'static {
    /// Constructor dependencies, in the order `construct` consumes them.
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    /// Build the value from resolved dependencies.
    ///
    /// # Errors
    /// Any error is reported as a construction failure of this type.
    fn construct(args: &mut Args) -> anyhow::Result<Self>;

    /// Metadata; evaluated lazily, so module descriptors may reference each other.
    fn annotation() -> Annotation {
        Annotation::Injectable
    }

    /// Register the hook capabilities this type implements.
    fn hooks(hooks: &mut Hooks<Self>) {
        let _ = hooks;
    }
}

struct Inner {
    token: Token,
    dependencies: Vec<Dependency>,
    construct: fn(&mut Args) -> anyhow::Result<Instance>,
    annotation: fn() -> Annotation,
    hooks: HookTable,
}

/// Type-erased handle of a [`Component`]. Cheap to clone; equality is type identity.
#[derive(Clone)]
pub struct ComponentType(Arc<Inner>);

fn construct_erased<T: Component>(args: &mut Args) -> anyhow::Result<Instance> {
    T::construct(args).map(|value| Arc::new(value) as Instance)
}

impl ComponentType {
    pub fn of<T: Component>() -> Self {
        let mut hooks = Hooks::<T>::new();
        T::hooks(&mut hooks);
        Self(Arc::new(Inner {
            token: Token::of::<T>(),
            dependencies: T::dependencies(),
            construct: construct_erased::<T>,
            annotation: T::annotation,
            hooks: hooks.into_table(),
        }))
    }

    /// Type token of the component.
    #[inline]
    pub fn token(&self) -> Token {
        self.0.token
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.0.token.name()
    }

    #[inline]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.0.dependencies
    }

    pub fn annotation(&self) -> Annotation {
        (self.0.annotation)()
    }

    pub fn is_library(&self) -> bool {
        matches!(self.annotation(), Annotation::Library)
    }

    pub(crate) fn hooks(&self) -> &HookTable {
        &self.0.hooks
    }

    pub(crate) fn construct(&self, args: &mut Args) -> anyhow::Result<Instance> {
        (self.0.construct)(args)
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.0.token == other.0.token
    }
}

impl Eq for ComponentType {}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentType({})", self.name())
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved constructor arguments, consumed positionally.
pub struct Args {
    requester: &'static str,
    values: Vec<(Dependency, Option<Instance>)>,
    cursor: usize,
}

impl Args {
    pub(crate) fn new(
        requester: &'static str,
        values: Vec<(Dependency, Option<Instance>)>,
    ) -> Self {
        Self {
            requester,
            values,
            cursor: 0,
        }
    }

    /// Total number of resolved arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Next argument as an erased value; `None` for an absent optional dependency.
    ///
    /// # Errors
    /// Fails when every declared argument has already been consumed.
    pub fn next_instance(&mut self) -> Result<(Token, Option<Instance>), InjectorError> {
        let (dep, value) =
            self.values
                .get(self.cursor)
                .ok_or(InjectorError::MissingArgument {
                    index: self.cursor,
                    requester: self.requester,
                })?;
        self.cursor += 1;
        Ok((dep.token, value.clone()))
    }

    /// Next argument, which must be present.
    ///
    /// # Errors
    /// Fails when the argument is absent or is not a `T`.
    pub fn next<T: Any + Send + Sync>(&mut self) -> Result<Arc<T>, InjectorError> {
        let (token, value) = self.next_instance()?;
        let value = value.ok_or(InjectorError::NoProvider {
            token,
            requester: self.requester,
        })?;
        downcast(token, value)
    }

    /// Next argument of an optional dependency.
    ///
    /// # Errors
    /// Fails when the argument is present but is not a `T`.
    pub fn next_optional<T: Any + Send + Sync>(&mut self) -> Result<Option<Arc<T>>, InjectorError> {
        match self.next_instance()? {
            (token, Some(value)) => downcast(token, value).map(Some),
            (_, None) => Ok(None),
        }
    }

    /// Next argument of a multi-provider token, one entry per contributing provider.
    ///
    /// An absent optional multi dependency yields an empty list.
    ///
    /// # Errors
    /// Fails when the token is not a multi token or an entry is not a `T`.
    pub fn next_all<T: Any + Send + Sync>(&mut self) -> Result<Vec<Arc<T>>, InjectorError> {
        let (token, value) = self.next_instance()?;
        let Some(value) = value else {
            return Ok(Vec::new());
        };
        let multi = downcast::<MultiValues>(token, value)?;
        multi
            .0
            .iter()
            .map(|v| downcast(token, Arc::clone(v)))
            .collect()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("requester", &self.requester)
            .field("len", &self.values.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}
