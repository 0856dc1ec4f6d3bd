//! Module descriptors and the resolved module tree.
//!
//! A module is a [`Component`](crate::Component) whose annotation is
//! [`Annotation::Module`](crate::Annotation::Module). [`resolve`] turns the descriptor tree
//! into [`CoreModule`] nodes, [`instantiate`] builds one injector and one instance per node.

mod instantiator;
mod resolver;

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::di::{ComponentType, Injector, Instance, Provider, Token, downcast};

pub use instantiator::{InstantiateError, instantiate};
pub use resolver::{ResolveError, resolve};

/// Declarative module metadata.
#[derive(Clone, Debug, Default)]
pub struct ModuleDescriptor {
    version: String,
    providers: Vec<Provider>,
    imports: Vec<ModuleImport>,
    exports: Vec<Export>,
    declarations: Vec<ComponentType>,
}

impl ModuleDescriptor {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn provider(mut self, provider: impl Into<Provider>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.providers.extend(providers);
        self
    }

    pub fn import(mut self, import: impl Into<ModuleImport>) -> Self {
        self.imports.push(import.into());
        self
    }

    pub fn export(mut self, export: impl Into<Export>) -> Self {
        self.exports.push(export.into());
        self
    }

    /// Attach a component (typically a library) to the module.
    pub fn declare(mut self, component: ComponentType) -> Self {
        self.declarations.push(component);
        self
    }

    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline]
    pub fn declared_providers(&self) -> &[Provider] {
        &self.providers
    }

    #[inline]
    pub fn imports(&self) -> &[ModuleImport] {
        &self.imports
    }

    #[inline]
    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    #[inline]
    pub fn declarations(&self) -> &[ComponentType] {
        &self.declarations
    }
}

/// A child module, optionally paired with providers added only for it.
#[derive(Clone, Debug)]
pub struct ModuleImport {
    pub module: ComponentType,
    pub providers: Vec<Provider>,
}

impl ModuleImport {
    pub fn with_providers(
        module: ComponentType,
        providers: impl IntoIterator<Item = Provider>,
    ) -> Self {
        Self {
            module,
            providers: providers.into_iter().collect(),
        }
    }
}

impl From<ComponentType> for ModuleImport {
    fn from(module: ComponentType) -> Self {
        Self {
            module,
            providers: Vec::new(),
        }
    }
}

/// Something a module makes visible to its importer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Export {
    /// Share the value the child's injector holds for this token.
    Token(Token),
    /// Re-declare the class as a provider in the importer.
    Class(ComponentType),
}

impl Export {
    pub fn token(&self) -> Token {
        match self {
            Self::Token(token) => *token,
            Self::Class(class) => class.token(),
        }
    }
}

impl From<Token> for Export {
    fn from(token: Token) -> Self {
        Self::Token(token)
    }
}

impl From<ComponentType> for Export {
    fn from(class: ComponentType) -> Self {
        Self::Class(class)
    }
}

/// Depth class of a node in the module tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleLevel {
    /// The bootstrapped module; has no parent.
    Root,
    /// Direct import of the root.
    Primary,
    /// Anything deeper.
    Secondary,
}

impl ModuleLevel {
    pub(crate) fn child_of(parent: Option<&CoreModule>) -> Self {
        match parent.map(CoreModule::level) {
            None => Self::Root,
            Some(Self::Root) => Self::Primary,
            Some(_) => Self::Secondary,
        }
    }
}

impl fmt::Display for ModuleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Root => "ROOT",
            Self::Primary => "PRIMARY",
            Self::Secondary => "SECONDARY",
        })
    }
}

/// Resolved node of the module tree.
///
/// `modules` is filled by the resolver, `di` and `instance` by the instantiator. Each is
/// written once.
pub struct CoreModule {
    token: ComponentType,
    version: String,
    level: ModuleLevel,
    parent: Weak<CoreModule>,
    providers: Vec<Provider>,
    exports: Vec<Export>,
    declarations: Vec<ComponentType>,
    modules: OnceLock<Vec<Arc<CoreModule>>>,
    di: OnceLock<Arc<Injector>>,
    instance: OnceLock<Instance>,
}

impl CoreModule {
    #[inline]
    pub fn token(&self) -> &ComponentType {
        &self.token
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.token.name()
    }

    #[inline]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[inline]
    pub fn level(&self) -> ModuleLevel {
        self.level
    }

    /// The importing module; `None` for the root (or once the tree was dropped).
    pub fn parent(&self) -> Option<Arc<CoreModule>> {
        self.parent.upgrade()
    }

    /// Own providers, import-specific providers and injection tokens inherited from the parent.
    #[inline]
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    #[inline]
    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    #[inline]
    pub fn declarations(&self) -> &[ComponentType] {
        &self.declarations
    }

    /// Child modules in import order.
    pub fn modules(&self) -> &[Arc<CoreModule>] {
        self.modules.get().map_or(&[], Vec::as_slice)
    }

    /// The module's injector, once instantiated.
    pub fn di(&self) -> Option<&Arc<Injector>> {
        self.di.get()
    }

    /// The module's own instance, once instantiated.
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.get()
    }

    /// Typed view of the module instance.
    pub fn instance_as<T: std::any::Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let value = Arc::clone(self.instance.get()?);
        downcast(self.token.token(), value).ok()
    }

    pub fn is_instantiated(&self) -> bool {
        self.instance.get().is_some()
    }

    /// Pre-order list of this node and every descendant.
    pub fn flatten(self: &Arc<Self>) -> Vec<Arc<CoreModule>> {
        let mut out = Vec::new();
        let mut stack = vec![Arc::clone(self)];
        while let Some(node) = stack.pop() {
            stack.extend(node.modules().iter().rev().cloned());
            out.push(node);
        }
        out
    }
}

impl fmt::Debug for CoreModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreModule")
            .field("name", &self.name())
            .field("version", &self.version)
            .field("level", &self.level)
            .field("providers", &self.providers.len())
            .field("modules", &self.modules())
            .field("instantiated", &self.is_instantiated())
            .finish_non_exhaustive()
    }
}
