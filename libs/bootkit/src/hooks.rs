//! Lifecycle hook capabilities and their dispatcher.
//!
//! Each hook is an explicit trait. A component opts in from
//! [`Component::hooks`](crate::Component::hooks):
//!
//! ```ignore
//! impl Component for AppModule {
//!     fn construct(_: &mut Args) -> anyhow::Result<Self> { Ok(Self) }
//!     fn hooks(hooks: &mut Hooks<Self>) {
//!         hooks.on_start().on_error();
//!     }
//! }
//! ```
//!
//! Registration stores a downcasting caster, so detection is a table lookup and invocation is
//! a typed call. Every hook returns a [`HookFuture`], whether the implementation finished
//! synchronously or not.

use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::config::ExtensionConfig;
use crate::di::{Component, ComponentType, Instance};
use crate::extension::ShutdownDescriptor;
use crate::module::CoreModule;

/// Result of a hook: either already available or still running.
///
/// Callers await it uniformly; the orchestrator additionally peeks at ready results where
/// "failed at trigger time" matters (see the start phase).
pub struct HookFuture<T> {
    state: State<T>,
}

enum State<T> {
    Ready(Option<anyhow::Result<T>>),
    Pending(BoxFuture<'static, anyhow::Result<T>>),
}

impl<T> HookFuture<T> {
    /// Wrap an already available result.
    pub fn ready(result: anyhow::Result<T>) -> Self {
        Self {
            state: State::Ready(Some(result)),
        }
    }

    pub fn ok(value: T) -> Self {
        Self::ready(Ok(value))
    }

    pub fn err(error: impl Into<anyhow::Error>) -> Self {
        Self::ready(Err(error.into()))
    }

    /// Wrap work that completes later.
    pub fn from_async<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            state: State::Pending(Box::pin(future)),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(Some(_)))
    }

    /// The result if it was available at trigger time, otherwise the future itself.
    ///
    /// # Errors
    /// Returns `self` back when the hook is still pending.
    pub fn try_into_ready(self) -> Result<anyhow::Result<T>, Self> {
        match self.state {
            State::Ready(Some(result)) => Ok(result),
            state => Err(Self { state }),
        }
    }
}

impl<T: Send + 'static> HookFuture<T> {
    /// Transform the eventual value, keeping ready results ready.
    pub fn map<U, F>(self, f: F) -> HookFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self.state {
            State::Ready(Some(result)) => HookFuture::ready(result.map(f)),
            State::Ready(None) => HookFuture::err(anyhow::anyhow!("hook result already taken")),
            State::Pending(future) => HookFuture::from_async(async move { future.await.map(f) }),
        }
    }
}

impl<T> From<anyhow::Result<T>> for HookFuture<T> {
    fn from(result: anyhow::Result<T>) -> Self {
        Self::ready(result)
    }
}

// The ready value is moved out, never pinned in place.
impl<T> Unpin for HookFuture<T> {}

impl<T> Future for HookFuture<T> {
    type Output = anyhow::Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            State::Ready(slot) => Poll::Ready(
                slot.take()
                    .unwrap_or_else(|| Err(anyhow::anyhow!("hook future polled after completion"))),
            ),
            State::Pending(future) => future.as_mut().poll(cx),
        }
    }
}

impl<T> fmt::Debug for HookFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Ready(Some(_)) => "ready",
            State::Ready(None) => "taken",
            State::Pending(_) => "pending",
        };
        f.debug_struct("HookFuture").field("state", &state).finish()
    }
}

/// Module hook: runs after the whole tree is instantiated, for every non-root module.
pub trait OnRegister: Send + Sync {
    fn on_register(&self) -> HookFuture<()>;
}

/// Root module hook: runs once bootstrap completed.
pub trait OnStart: Send + Sync {
    fn on_start(&self) -> HookFuture<()>;
}

/// Root module hook: receives errors reported through the session's error handler.
pub trait OnError: Send + Sync {
    fn on_error(&self, error: &anyhow::Error, data: Option<&serde_json::Value>) -> HookFuture<()>;
}

/// Extension hook: load the extension and return the capability value it exposes.
pub trait OnExtensionLoad: Send + Sync {
    fn on_extension_load(
        &self,
        module: &Arc<CoreModule>,
        config: &ExtensionConfig,
    ) -> HookFuture<Instance>;
}

/// Extension hook: runs once the module tree is instantiated.
pub trait OnModuleInstantiated: Send + Sync {
    fn on_module_instantiated(&self, module: &Arc<CoreModule>, value: &Instance) -> HookFuture<()>;
}

/// Extension hook: describe how to release the extension's resources.
///
/// `module` is `None` when shutdown runs before the module tree was resolved, and `value` is
/// `None` for an extension whose load did not complete.
pub trait OnShutdown: Send + Sync {
    fn on_shutdown(
        &self,
        module: Option<&Arc<CoreModule>>,
        value: Option<&Instance>,
    ) -> ShutdownDescriptor;
}

/// Hook names, used for detection and messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    Register,
    Start,
    Error,
    ExtensionLoad,
    ModuleInstantiated,
    Shutdown,
}

impl Hook {
    pub fn method_name(self) -> &'static str {
        match self {
            Self::Register => "on_register",
            Self::Start => "on_start",
            Self::Error => "on_error",
            Self::ExtensionLoad => "on_extension_load",
            Self::ModuleInstantiated => "on_module_instantiated",
            Self::Shutdown => "on_shutdown",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method_name())
    }
}

type Erased = dyn Any + Send + Sync;

/// Per-type capability table filled by [`Hooks`].
#[derive(Clone, Copy, Default)]
pub(crate) struct HookTable {
    register: Option<fn(&Erased) -> Option<&dyn OnRegister>>,
    start: Option<fn(&Erased) -> Option<&dyn OnStart>>,
    error: Option<fn(&Erased) -> Option<&dyn OnError>>,
    extension_load: Option<fn(&Erased) -> Option<&dyn OnExtensionLoad>>,
    module_instantiated: Option<fn(&Erased) -> Option<&dyn OnModuleInstantiated>>,
    shutdown: Option<fn(&Erased) -> Option<&dyn OnShutdown>>,
}

impl HookTable {
    fn has(&self, hook: Hook) -> bool {
        match hook {
            Hook::Register => self.register.is_some(),
            Hook::Start => self.start.is_some(),
            Hook::Error => self.error.is_some(),
            Hook::ExtensionLoad => self.extension_load.is_some(),
            Hook::ModuleInstantiated => self.module_instantiated.is_some(),
            Hook::Shutdown => self.shutdown.is_some(),
        }
    }
}

fn as_register<T: OnRegister + 'static>(v: &Erased) -> Option<&dyn OnRegister> {
    v.downcast_ref::<T>().map(|t| t as &dyn OnRegister)
}

fn as_start<T: OnStart + 'static>(v: &Erased) -> Option<&dyn OnStart> {
    v.downcast_ref::<T>().map(|t| t as &dyn OnStart)
}

fn as_error<T: OnError + 'static>(v: &Erased) -> Option<&dyn OnError> {
    v.downcast_ref::<T>().map(|t| t as &dyn OnError)
}

fn as_extension_load<T: OnExtensionLoad + 'static>(v: &Erased) -> Option<&dyn OnExtensionLoad> {
    v.downcast_ref::<T>().map(|t| t as &dyn OnExtensionLoad)
}

fn as_module_instantiated<T: OnModuleInstantiated + 'static>(
    v: &Erased,
) -> Option<&dyn OnModuleInstantiated> {
    v.downcast_ref::<T>().map(|t| t as &dyn OnModuleInstantiated)
}

fn as_shutdown<T: OnShutdown + 'static>(v: &Erased) -> Option<&dyn OnShutdown> {
    v.downcast_ref::<T>().map(|t| t as &dyn OnShutdown)
}

/// Capability registration for component type `T`.
pub struct Hooks<T> {
    table: HookTable,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> Hooks<T> {
    pub(crate) fn new() -> Self {
        Self {
            table: HookTable::default(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn into_table(self) -> HookTable {
        self.table
    }

    pub fn on_register(&mut self) -> &mut Self
    where
        T: OnRegister,
    {
        self.table.register = Some(as_register::<T>);
        self
    }

    pub fn on_start(&mut self) -> &mut Self
    where
        T: OnStart,
    {
        self.table.start = Some(as_start::<T>);
        self
    }

    pub fn on_error(&mut self) -> &mut Self
    where
        T: OnError,
    {
        self.table.error = Some(as_error::<T>);
        self
    }

    pub fn on_extension_load(&mut self) -> &mut Self
    where
        T: OnExtensionLoad,
    {
        self.table.extension_load = Some(as_extension_load::<T>);
        self
    }

    pub fn on_module_instantiated(&mut self) -> &mut Self
    where
        T: OnModuleInstantiated,
    {
        self.table.module_instantiated = Some(as_module_instantiated::<T>);
        self
    }

    pub fn on_shutdown(&mut self) -> &mut Self
    where
        T: OnShutdown,
    {
        self.table.shutdown = Some(as_shutdown::<T>);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("{hook} hook missing on {component}")]
    Missing { hook: Hook, component: &'static str },

    #[error("{hook} hook of {component} invoked with an instance of another type")]
    InstanceMismatch { hook: Hook, component: &'static str },

    #[error("{hook} hook returned an unexpected outcome")]
    UnexpectedOutcome { hook: Hook },
}

/// What to do when the component does not implement the hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingHook {
    /// Produce [`HookError::Missing`].
    Fail,
    /// Resolve to [`HookOutcome::Skipped`].
    Skip,
}

/// A hook invocation together with its arguments.
#[derive(Clone, Copy)]
pub enum HookCall<'a> {
    Register,
    Start,
    Error {
        error: &'a anyhow::Error,
        data: Option<&'a serde_json::Value>,
    },
    ExtensionLoad {
        module: &'a Arc<CoreModule>,
        config: &'a ExtensionConfig,
    },
    ModuleInstantiated {
        module: &'a Arc<CoreModule>,
        value: &'a Instance,
    },
    Shutdown {
        module: Option<&'a Arc<CoreModule>>,
        value: Option<&'a Instance>,
    },
}

impl HookCall<'_> {
    pub fn hook(&self) -> Hook {
        match self {
            Self::Register => Hook::Register,
            Self::Start => Hook::Start,
            Self::Error { .. } => Hook::Error,
            Self::ExtensionLoad { .. } => Hook::ExtensionLoad,
            Self::ModuleInstantiated { .. } => Hook::ModuleInstantiated,
            Self::Shutdown { .. } => Hook::Shutdown,
        }
    }
}

/// Normalized hook result.
pub enum HookOutcome {
    /// A unit hook finished.
    Completed,
    /// The extension-load hook produced its capability value.
    Value(Instance),
    /// The shutdown hook produced its descriptor.
    Shutdown(ShutdownDescriptor),
    /// The hook is not implemented and the caller asked for a pass-through.
    Skipped,
}

impl HookOutcome {
    /// # Errors
    /// Fails unless the outcome is [`HookOutcome::Value`].
    pub fn into_value(self) -> Result<Instance, HookError> {
        match self {
            Self::Value(value) => Ok(value),
            _ => Err(HookError::UnexpectedOutcome {
                hook: Hook::ExtensionLoad,
            }),
        }
    }

    /// # Errors
    /// Fails unless the outcome is [`HookOutcome::Shutdown`].
    pub fn into_shutdown(self) -> Result<ShutdownDescriptor, HookError> {
        match self {
            Self::Shutdown(descriptor) => Ok(descriptor),
            _ => Err(HookError::UnexpectedOutcome {
                hook: Hook::Shutdown,
            }),
        }
    }
}

impl fmt::Debug for HookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("Completed"),
            Self::Value(_) => f.write_str("Value(..)"),
            Self::Shutdown(d) => f.debug_tuple("Shutdown").field(&d.priority()).finish(),
            Self::Skipped => f.write_str("Skipped"),
        }
    }
}

/// `true` iff instances of `component` implement `hook`.
pub fn has_hook(hook: Hook, component: &ComponentType) -> bool {
    component.hooks().has(hook)
}

/// Invoke `call` on `instance` of `component`, normalized into a [`HookFuture`].
pub fn trigger_hook(
    call: HookCall<'_>,
    component: &ComponentType,
    instance: &Instance,
    missing: MissingHook,
) -> HookFuture<HookOutcome> {
    let hook = call.hook();
    let table = component.hooks();
    let target: &Erased = instance.as_ref();

    // Resolve the capability: absent entry => missing hook; entry present but instance of
    // another type => caller error.
    macro_rules! capability {
        ($field:ident) => {
            match table.$field {
                None => return missing_hook(hook, component, missing),
                Some(cast) => match cast(target) {
                    Some(capability) => capability,
                    None => {
                        return HookFuture::err(HookError::InstanceMismatch {
                            hook,
                            component: component.name(),
                        });
                    }
                },
            }
        };
    }

    tracing::trace!(hook = %hook, component = component.name(), "Triggering hook");

    match call {
        HookCall::Register => capability!(register)
            .on_register()
            .map(|()| HookOutcome::Completed),
        HookCall::Start => capability!(start).on_start().map(|()| HookOutcome::Completed),
        HookCall::Error { error, data } => capability!(error)
            .on_error(error, data)
            .map(|()| HookOutcome::Completed),
        HookCall::ExtensionLoad { module, config } => capability!(extension_load)
            .on_extension_load(module, config)
            .map(HookOutcome::Value),
        HookCall::ModuleInstantiated { module, value } => capability!(module_instantiated)
            .on_module_instantiated(module, value)
            .map(|()| HookOutcome::Completed),
        HookCall::Shutdown { module, value } => {
            HookFuture::ok(HookOutcome::Shutdown(capability!(shutdown).on_shutdown(module, value)))
        }
    }
}

fn missing_hook(
    hook: Hook,
    component: &ComponentType,
    missing: MissingHook,
) -> HookFuture<HookOutcome> {
    match missing {
        MissingHook::Fail => HookFuture::err(HookError::Missing {
            hook,
            component: component.name(),
        }),
        MissingHook::Skip => HookFuture::ok(HookOutcome::Skipped),
    }
}
