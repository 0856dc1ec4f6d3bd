//! # BootKit
//!
//! Application bootstrap runtime: a declarative module tree is resolved into a hierarchy of
//! dependency-injection scopes, instantiated bottom-up, extended by pluggable extensions and
//! driven through a fixed sequence of lifecycle hooks.
//!
//! ```ignore
//! use bootkit::{Annotation, Args, Bootstrap, Component, ComponentType, ModuleDescriptor};
//!
//! struct AppModule;
//!
//! impl Component for AppModule {
//!     fn construct(_: &mut Args) -> anyhow::Result<Self> {
//!         Ok(Self)
//!     }
//!
//!     fn annotation() -> Annotation {
//!         Annotation::Module(ModuleDescriptor::new("1.0.0"))
//!     }
//! }
//!
//! let session = Bootstrap::new(ComponentType::of::<AppModule>()).run().await?;
//! session.shutdown().await?;
//! ```

pub mod bootstrap;
pub mod config;
pub mod di;
pub mod extension;
pub mod hooks;
pub mod logger;
pub mod module;

pub use bootstrap::{Bootstrap, BootstrapError, BootstrapSession, Root, ShutdownError, bootstrap};
pub use config::{BootstrapOptions, ConfigError, ExtensionConfig};
pub use di::{
    Annotation, Args, Bound, Component, ComponentType, Dependency, Injector, InjectorError,
    Instance, Provider, Recipe, Token, instance,
};
pub use extension::{
    EXTENSION_CONFIG, ExtensionDecl, ExtensionKind, ExtensionRecord, LOGGING_EXTENSION,
    ShutdownDescriptor, ShutdownPriority,
};
pub use hooks::{
    Hook, HookFuture, Hooks, OnError, OnExtensionLoad, OnModuleInstantiated, OnRegister, OnShutdown,
    OnStart,
};
pub use logger::{LogSink, Logger, LoggingBackend};
pub use module::{CoreModule, Export, ModuleDescriptor, ModuleImport, ModuleLevel};
