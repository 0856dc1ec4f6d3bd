//! Bootstrap orchestrator.
//!
//! Phases, in order: validate → resolve → extensions (sequential, with timeout) →
//! instantiate → register (concurrent) → start. Any failure after validation runs extension
//! shutdown before the error is returned.

mod session;
mod shutdown;
mod signals;

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BootstrapOptions;
use crate::di::{ComponentType, Injector, Instance, Provider};
use crate::extension::{EXTENSION_CONFIG, ExtensionDecl, ExtensionKind, LOGGING_EXTENSION};
use crate::hooks::{Hook, HookCall, MissingHook, has_hook, trigger_hook};
use crate::logger::Logger;
use crate::module::{self, CoreModule, InstantiateError, ModuleLevel, ResolveError};

pub use session::BootstrapSession;
pub use shutdown::ShutdownError;
pub use signals::{ShutdownSignal, wait_for_shutdown};

/// What to bootstrap.
#[derive(Clone)]
pub enum Root {
    /// A component type carrying a module descriptor.
    Module(ComponentType),
    /// An already built value; always rejected, a root must be a type.
    Value(Instance),
}

impl Root {
    pub fn module<T: crate::Component>() -> Self {
        Self::Module(ComponentType::of::<T>())
    }
}

impl From<ComponentType> for Root {
    fn from(module: ComponentType) -> Self {
        Self::Module(module)
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Module(module) => f.debug_tuple("Module").field(module).finish(),
            Self::Value(_) => f.write_str("Value(..)"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Bootstrap failed: no module provided")]
    NoModule,

    #[error("Bootstrap failed: module must be a function/class")]
    NotAModuleType,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("{extension}: {source}")]
    Extension {
        extension: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Instantiate(#[from] InstantiateError),

    #[error("{module}: {hook} failed: {source}")]
    ModuleHook {
        module: &'static str,
        hook: Hook,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
}

impl BootstrapError {
    fn extension(extension: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Extension { extension, source }
    }
}

/// Builder for one bootstrap call.
///
/// ```ignore
/// let session = Bootstrap::new(ComponentType::of::<AppModule>())
///     .extension(
///         ExtensionDecl::new(ComponentType::of::<HttpExtension>())
///             .with_config(json!({ "port": 8080 })),
///     )
///     .run()
///     .await?;
/// ```
#[derive(Debug)]
pub struct Bootstrap {
    root: Option<Root>,
    extensions: Vec<ExtensionDecl>,
    options: BootstrapOptions,
}

impl Bootstrap {
    pub fn new(root: impl Into<Root>) -> Self {
        Self::from_root(Some(root.into()))
    }

    /// Start from a possibly absent root.
    pub fn from_root(root: Option<Root>) -> Self {
        Self {
            root,
            extensions: Vec::new(),
            options: BootstrapOptions::default(),
        }
    }

    pub fn extension(mut self, extension: impl Into<ExtensionDecl>) -> Self {
        self.extensions.push(extension.into());
        self
    }

    pub fn extensions(mut self, extensions: impl IntoIterator<Item = ExtensionDecl>) -> Self {
        self.extensions.extend(extensions);
        self
    }

    pub fn options(mut self, options: BootstrapOptions) -> Self {
        self.options = options;
        self
    }

    /// Run every phase and return the session of the started application.
    ///
    /// # Errors
    /// Returns the first failure. Validation failures return immediately; every later
    /// failure is returned after extension shutdown ran, and a failing shutdown replaces it.
    pub async fn run(self) -> Result<Arc<BootstrapSession>, BootstrapError> {
        let Self {
            root,
            extensions,
            options,
        } = self;

        let root = validate(root)?;
        let shutdown_on_signal = options.shutdown_on_signal;
        let session = Arc::new(BootstrapSession::new(options));

        match run_phases(&session, root, extensions).await {
            Ok(()) => {
                if shutdown_on_signal {
                    spawn_signal_shutdown(&session);
                }
                tracing::info!("Bootstrap completed");
                Ok(session)
            }
            Err(err) => Err(fail(&session, err).await),
        }
    }
}

/// Function form of [`Bootstrap`].
///
/// # Errors
/// As [`Bootstrap::run`].
pub async fn bootstrap(
    root: Option<Root>,
    extensions: Vec<ExtensionDecl>,
    options: BootstrapOptions,
) -> Result<Arc<BootstrapSession>, BootstrapError> {
    Bootstrap::from_root(root)
        .extensions(extensions)
        .options(options)
        .run()
        .await
}

fn validate(root: Option<Root>) -> Result<ComponentType, BootstrapError> {
    match root {
        None => Err(BootstrapError::NoModule),
        Some(Root::Value(_)) => Err(BootstrapError::NotAModuleType),
        Some(Root::Module(module)) => Ok(module),
    }
}

async fn run_phases(
    session: &Arc<BootstrapSession>,
    root: ComponentType,
    extensions: Vec<ExtensionDecl>,
) -> Result<(), BootstrapError> {
    let module = run_resolve_phase(session, root)?;
    run_extension_phase(session, &module, extensions).await?;
    run_instantiate_phase(session, &module)?;
    run_register_phase(session, &module).await?;
    run_start_phase(session, &module)
}

fn run_resolve_phase(
    session: &BootstrapSession,
    root: ComponentType,
) -> Result<Arc<CoreModule>, BootstrapError> {
    tracing::info!(module = root.name(), "Phase: resolve");
    let module = module::resolve(root)?;
    session.set_module(Arc::clone(&module));
    Ok(module)
}

/// Extensions load one at a time, in declaration order.
async fn run_extension_phase(
    session: &BootstrapSession,
    module: &Arc<CoreModule>,
    extensions: Vec<ExtensionDecl>,
) -> Result<(), BootstrapError> {
    tracing::info!(count = extensions.len(), "Phase: extensions");
    let timeout = session.options().extension_timeout;
    for decl in extensions {
        load_extension(session, module, decl, timeout).await?;
    }
    Ok(())
}

async fn load_extension(
    session: &BootstrapSession,
    module: &Arc<CoreModule>,
    decl: ExtensionDecl,
    timeout: Duration,
) -> Result<(), BootstrapError> {
    let ExtensionDecl { extension, config } = decl;
    let name = extension.name();
    let config = config.bind(name);
    tracing::debug!(extension = name, "Loading extension");

    let logging = session.logging_extension();
    if ExtensionKind::of(&extension) == ExtensionKind::Logging
        && let Some(existing) = &logging
    {
        return Err(BootstrapError::extension(name)(anyhow::anyhow!(
            "Only one logging extension is allowed, already loaded: {}",
            existing.name()
        )));
    }

    let mut providers = vec![
        Provider::use_value(*EXTENSION_CONFIG, config.clone()),
        Logger::provider(name),
    ];
    if let Some(value) = logging.and_then(|record| record.value) {
        providers.push(Provider::use_instance(*LOGGING_EXTENSION, value));
    }

    let instance = Injector::resolve_and_create(providers, None)
        .and_then(|di| Injector::instantiate_component(&extension, &di))
        .map_err(|e| BootstrapError::extension(name)(e.into()))?;
    let index = session.push_extension(extension.clone(), Arc::clone(&instance));

    let call = HookCall::ExtensionLoad {
        module,
        config: &config,
    };
    let load = trigger_hook(call, &extension, &instance, MissingHook::Fail);
    let outcome = match load.try_into_ready() {
        Ok(result) => result,
        // A pending load runs detached: the timeout only stops the wait for it.
        Err(pending) => match tokio::time::timeout(timeout, tokio::spawn(pending)).await {
            Ok(joined) => joined.unwrap_or_else(|e| Err(anyhow::Error::new(e))),
            Err(_) => {
                tracing::warn!(extension = name, ?timeout, "Extension load timed out");
                return Err(BootstrapError::extension(name)(anyhow::anyhow!(
                    "Timeout occurred while loading extension"
                )));
            }
        },
    };
    let value = outcome
        .and_then(|o| o.into_value().map_err(anyhow::Error::from))
        .map_err(BootstrapError::extension(name))?;

    session.complete_extension(index, value);
    tracing::info!(
        extension = name,
        kind = ?ExtensionKind::of(&extension),
        "Extension loaded"
    );
    Ok(())
}

fn run_instantiate_phase(
    session: &BootstrapSession,
    module: &Arc<CoreModule>,
) -> Result<(), BootstrapError> {
    tracing::info!("Phase: instantiate");
    let providers = session.extension_providers();
    module::instantiate(module, &providers)?;
    Ok(())
}

/// Register hooks of every non-root module, then module-instantiated hooks of every
/// extension. Calls within each step run concurrently and all settle before the first
/// error is returned.
async fn run_register_phase(
    session: &BootstrapSession,
    module: &Arc<CoreModule>,
) -> Result<(), BootstrapError> {
    tracing::info!("Phase: register");

    let registrations = module
        .flatten()
        .into_iter()
        .filter(|m| m.level() != ModuleLevel::Root && has_hook(Hook::Register, m.token()))
        .filter_map(|m| {
            let hook =
                trigger_hook(HookCall::Register, m.token(), m.instance()?, MissingHook::Fail);
            let name = m.name();
            Some(async move {
                hook.await.map(drop).map_err(|source| BootstrapError::ModuleHook {
                    module: name,
                    hook: Hook::Register,
                    source,
                })
            })
        })
        .collect::<Vec<_>>();
    first_error(join_all(registrations).await)?;

    let notifications = session
        .extensions()
        .into_iter()
        .filter(|r| has_hook(Hook::ModuleInstantiated, &r.token))
        .filter_map(|r| {
            let call = HookCall::ModuleInstantiated {
                module,
                value: r.value.as_ref()?,
            };
            let hook = trigger_hook(call, &r.token, &r.instance, MissingHook::Fail);
            let name = r.name();
            Some(async move {
                hook.await
                    .map(drop)
                    .map_err(BootstrapError::extension(name))
            })
        })
        .collect::<Vec<_>>();
    first_error(join_all(notifications).await)
}

/// Trigger the root's start hook. Only a failure available at trigger time fails bootstrap;
/// a pending start runs in the background and reports errors through the session.
fn run_start_phase(
    session: &Arc<BootstrapSession>,
    module: &Arc<CoreModule>,
) -> Result<(), BootstrapError> {
    tracing::info!("Phase: start");
    let Some(instance) = module.instance() else {
        return Err(BootstrapError::ModuleHook {
            module: module.name(),
            hook: Hook::Start,
            source: anyhow::anyhow!("module is not instantiated"),
        });
    };
    if !has_hook(Hook::Start, module.token()) {
        return Ok(());
    }

    let start = trigger_hook(HookCall::Start, module.token(), instance, MissingHook::Fail);
    match start.try_into_ready() {
        Ok(result) => result.map(drop).map_err(|source| BootstrapError::ModuleHook {
            module: module.name(),
            hook: Hook::Start,
            source,
        }),
        Err(pending) => {
            let session = Arc::clone(session);
            tokio::spawn(async move {
                if let Err(error) = pending.await {
                    session.handle_error(error, None).await;
                }
            });
            Ok(())
        }
    }
}

fn first_error(results: Vec<Result<(), BootstrapError>>) -> Result<(), BootstrapError> {
    results.into_iter().find(Result::is_err).unwrap_or(Ok(()))
}

/// Shut down after a failed phase; a shutdown failure replaces the phase error.
async fn fail(session: &BootstrapSession, err: BootstrapError) -> BootstrapError {
    tracing::error!(error = %err, "Bootstrap failed, shutting down");
    match session.shutdown().await {
        Ok(_) => err,
        Err(shutdown_err) => {
            tracing::error!(
                original = %err,
                error = %shutdown_err,
                "Shutdown failed after bootstrap failure"
            );
            BootstrapError::Shutdown(shutdown_err)
        }
    }
}

/// Exit the process after shutdown once Ctrl+C or SIGTERM arrives.
fn spawn_signal_shutdown(session: &Arc<BootstrapSession>) {
    let session = Arc::clone(session);
    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => {}
            signal = wait_for_shutdown() => {
                if let Err(e) = signal {
                    tracing::error!(
                        error = %e,
                        "Signal handling failed; shutdown on signal disabled"
                    );
                    return;
                }
                let code = match session.shutdown().await {
                    Ok(_) => 0,
                    Err(e) => {
                        tracing::error!(error = %e, "Shutdown failed");
                        1
                    }
                };
                std::process::exit(code);
            }
        }
    });
}
