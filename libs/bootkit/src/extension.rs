//! Extension declarations, loaded-extension records and shutdown descriptors.

use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::config::ExtensionConfig;
use crate::di::{Annotation, ComponentType, Instance, Token, downcast};
use crate::hooks::HookFuture;

/// Injection token of the loaded logging extension's value, visible to later extensions.
pub static LOGGING_EXTENSION: LazyLock<Token> = LazyLock::new(|| Token::new("LOGGING_EXTENSION"));

/// Injection token of the config object of the extension being loaded.
pub static EXTENSION_CONFIG: LazyLock<Token> = LazyLock::new(|| Token::new("EXTENSION_CONFIG"));

/// What an extension declares itself to be.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExtensionKind {
    #[default]
    Default,
    /// Provides the logging backend; at most one per bootstrap.
    Logging,
}

impl ExtensionKind {
    pub fn of(extension: &ComponentType) -> Self {
        match extension.annotation() {
            Annotation::Extension(kind) => kind,
            _ => Self::Default,
        }
    }
}

/// An extension to load, with its config.
#[derive(Clone, Debug)]
pub struct ExtensionDecl {
    pub extension: ComponentType,
    pub config: ExtensionConfig,
}

impl ExtensionDecl {
    pub fn new(extension: ComponentType) -> Self {
        Self {
            extension,
            config: ExtensionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: impl Into<ExtensionConfig>) -> Self {
        self.config = config.into();
        self
    }
}

impl From<ComponentType> for ExtensionDecl {
    fn from(extension: ComponentType) -> Self {
        Self::new(extension)
    }
}

/// A loaded (or partially loaded) extension.
///
/// `value` is `None` when the load hook failed or timed out; the record is kept so its
/// shutdown hook still runs.
#[derive(Clone)]
pub struct ExtensionRecord {
    pub token: ComponentType,
    pub instance: Instance,
    pub value: Option<Instance>,
}

impl ExtensionRecord {
    pub fn name(&self) -> &'static str {
        self.token.name()
    }

    pub fn kind(&self) -> ExtensionKind {
        ExtensionKind::of(&self.token)
    }

    pub fn is_loaded(&self) -> bool {
        self.value.is_some()
    }

    /// Typed view of the extension object.
    pub fn instance_as<T: std::any::Any + Send + Sync>(&self) -> Option<Arc<T>> {
        downcast(self.token.token(), Arc::clone(&self.instance)).ok()
    }

    /// Typed view of the exposed value.
    pub fn value_as<T: std::any::Any + Send + Sync>(&self) -> Option<Arc<T>> {
        downcast(self.token.token(), Arc::clone(self.value.as_ref()?)).ok()
    }
}

impl fmt::Debug for ExtensionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRecord")
            .field("token", &self.token)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

/// Shutdown wave an extension's resolver runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShutdownPriority {
    /// Runs first, e.g. closing listeners.
    Important,
    /// Starts only after every important resolver settled.
    Normal,
}

impl fmt::Display for ShutdownPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Important => "IMPORTANT",
            Self::Normal => "NORMAL",
        })
    }
}

/// Returned by [`OnShutdown`](crate::hooks::OnShutdown): when to run and what to await.
///
/// The resolver should not start work before it is polled, otherwise wave ordering is lost.
pub struct ShutdownDescriptor {
    priority: ShutdownPriority,
    resolver: HookFuture<()>,
}

impl ShutdownDescriptor {
    pub fn new(priority: ShutdownPriority, resolver: HookFuture<()>) -> Self {
        Self { priority, resolver }
    }

    pub fn important(resolver: HookFuture<()>) -> Self {
        Self::new(ShutdownPriority::Important, resolver)
    }

    pub fn normal(resolver: HookFuture<()>) -> Self {
        Self::new(ShutdownPriority::Normal, resolver)
    }

    #[inline]
    pub fn priority(&self) -> ShutdownPriority {
        self.priority
    }

    pub fn into_resolver(self) -> HookFuture<()> {
        self.resolver
    }
}

impl fmt::Debug for ShutdownDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownDescriptor")
            .field("priority", &self.priority)
            .field("resolver", &self.resolver)
            .finish()
    }
}
