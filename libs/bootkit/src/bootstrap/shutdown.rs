//! Two-wave extension shutdown.

use futures::future::join_all;
use std::sync::Arc;

use crate::extension::{ExtensionRecord, ShutdownPriority};
use crate::hooks::{Hook, HookCall, HookFuture, MissingHook, has_hook, trigger_hook};
use crate::module::CoreModule;

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("{extension}: shutdown failed: {source}")]
    Extension {
        extension: &'static str,
        priority: Option<ShutdownPriority>,
        #[source]
        source: anyhow::Error,
    },
}

/// Release every extension implementing the shutdown hook.
///
/// Descriptors are collected from all extensions first. Important resolvers then run
/// concurrently and all settle before any normal resolver is polled. A failure in the
/// important wave skips the normal wave.
pub(crate) async fn shutdown_extensions(
    module: Option<&Arc<CoreModule>>,
    extensions: &[ExtensionRecord],
) -> Result<bool, ShutdownError> {
    let mut important = Vec::new();
    let mut normal = Vec::new();

    for record in extensions.iter().filter(|r| has_hook(Hook::Shutdown, &r.token)) {
        let call = HookCall::Shutdown {
            module,
            value: record.value.as_ref(),
        };
        let descriptor = trigger_hook(call, &record.token, &record.instance, MissingHook::Skip)
            .await
            .and_then(|outcome| outcome.into_shutdown().map_err(anyhow::Error::from))
            .map_err(|source| ShutdownError::Extension {
                extension: record.name(),
                priority: None,
                source,
            })?;

        let priority = descriptor.priority();
        let entry = (record.name(), descriptor.into_resolver());
        match priority {
            ShutdownPriority::Important => important.push(entry),
            ShutdownPriority::Normal => normal.push(entry),
        }
    }

    tracing::info!(
        important = important.len(),
        normal = normal.len(),
        "Shutting down extensions"
    );
    run_wave(ShutdownPriority::Important, important).await?;
    run_wave(ShutdownPriority::Normal, normal).await?;
    Ok(true)
}

async fn run_wave(
    priority: ShutdownPriority,
    resolvers: Vec<(&'static str, HookFuture<()>)>,
) -> Result<(), ShutdownError> {
    if resolvers.is_empty() {
        return Ok(());
    }

    let (names, futures): (Vec<_>, Vec<_>) = resolvers.into_iter().unzip();
    let results = join_all(futures).await;

    let mut first_error = None;
    for (name, result) in names.into_iter().zip(results) {
        match result {
            Ok(()) => tracing::debug!(extension = name, %priority, "Extension shut down"),
            Err(e) => {
                tracing::warn!(
                    extension = name,
                    %priority,
                    error = %e,
                    "Extension shutdown failed"
                );
                first_error.get_or_insert(ShutdownError::Extension {
                    extension: name,
                    priority: Some(priority),
                    source: e,
                });
            }
        }
    }

    first_error.map_or(Ok(()), Err)
}
