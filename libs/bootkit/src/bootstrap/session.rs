use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::shutdown::{ShutdownError, shutdown_extensions};
use crate::config::BootstrapOptions;
use crate::di::{ComponentType, Instance, Provider};
use crate::extension::{ExtensionKind, ExtensionRecord};
use crate::hooks::{Hook, HookCall, MissingHook, has_hook, trigger_hook};
use crate::module::CoreModule;

/// State of one bootstrap call: the module tree and the extensions loaded for it.
///
/// Every call owns its own session, so concurrent bootstraps do not share extension lists.
pub struct BootstrapSession {
    options: BootstrapOptions,
    module: RwLock<Option<Arc<CoreModule>>>,
    extensions: RwLock<Vec<ExtensionRecord>>,
    cancel: CancellationToken,
}

impl BootstrapSession {
    pub(crate) fn new(options: BootstrapOptions) -> Self {
        Self {
            options,
            module: RwLock::new(None),
            extensions: RwLock::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    #[inline]
    pub fn options(&self) -> &BootstrapOptions {
        &self.options
    }

    /// The root module; `None` if bootstrap failed before resolution.
    pub fn module(&self) -> Option<Arc<CoreModule>> {
        self.module.read().clone()
    }

    /// Loaded extensions in load order, partially loaded ones included.
    pub fn extensions(&self) -> Vec<ExtensionRecord> {
        self.extensions.read().clone()
    }

    /// Typed value exposed by `extension`, if it finished loading.
    pub fn extension_value<T: std::any::Any + Send + Sync>(
        &self,
        extension: &ComponentType,
    ) -> Option<Arc<T>> {
        self.extensions
            .read()
            .iter()
            .find(|r| &r.token == extension)
            .and_then(ExtensionRecord::value_as::<T>)
    }

    /// Cancelled once shutdown starts.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Release every loaded extension: important resolvers first, then normal ones.
    ///
    /// Safe to call more than once; each call re-runs the shutdown hooks.
    ///
    /// # Errors
    /// Returns the first failing resolver; a failure in the important wave skips the normal one.
    pub async fn shutdown(&self) -> Result<bool, ShutdownError> {
        self.cancel.cancel();
        let module = self.module();
        let extensions = self.extensions();
        shutdown_extensions(module.as_ref(), &extensions).await
    }

    /// Report an error to the root module's error hook, or log it when there is none.
    pub async fn handle_error(&self, error: anyhow::Error, data: Option<serde_json::Value>) {
        let Some(module) = self.module() else {
            tracing::error!(error = %error, "Unhandled error (no module bootstrapped)");
            return;
        };
        let handles_errors = has_hook(Hook::Error, module.token());
        let Some(instance) = module.instance().filter(|_| handles_errors) else {
            tracing::error!(module = module.name(), error = %error, "Unhandled error");
            return;
        };

        let call = HookCall::Error {
            error: &error,
            data: data.as_ref(),
        };
        let hook = trigger_hook(call, module.token(), instance, MissingHook::Skip);
        if let Err(hook_error) = hook.await {
            tracing::error!(
                module = module.name(),
                error = %error,
                hook_error = %hook_error,
                "Error hook failed"
            );
        }
    }

    pub(crate) fn set_module(&self, module: Arc<CoreModule>) {
        *self.module.write() = Some(module);
    }

    /// Register a partially loaded extension; returns its index.
    pub(crate) fn push_extension(&self, token: ComponentType, instance: Instance) -> usize {
        let mut extensions = self.extensions.write();
        extensions.push(ExtensionRecord {
            token,
            instance,
            value: None,
        });
        extensions.len() - 1
    }

    pub(crate) fn complete_extension(&self, index: usize, value: Instance) {
        if let Some(record) = self.extensions.write().get_mut(index) {
            record.value = Some(value);
        }
    }

    /// The loaded logging extension, if any.
    pub(crate) fn logging_extension(&self) -> Option<ExtensionRecord> {
        self.extensions
            .read()
            .iter()
            .find(|r| r.kind() == ExtensionKind::Logging && r.is_loaded())
            .cloned()
    }

    /// `{provide: extension, use_value: value}` for every loaded extension.
    pub(crate) fn extension_providers(&self) -> Vec<Provider> {
        self.extensions
            .read()
            .iter()
            .filter_map(|r| {
                r.value
                    .as_ref()
                    .map(|value| Provider::use_instance(r.token.token(), Arc::clone(value)))
            })
            .collect()
    }
}

impl fmt::Debug for BootstrapSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extensions = self.extensions.read();
        let names: Vec<&str> = extensions.iter().map(ExtensionRecord::name).collect();
        f.debug_struct("BootstrapSession")
            .field("module", &self.module.read().as_ref().map(|m| m.name()))
            .field("extensions", &names)
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}
