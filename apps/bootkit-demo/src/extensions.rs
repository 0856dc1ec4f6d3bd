//! Demo extensions: a console logging backend and a background ticker.

use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use bootkit::{
    Annotation, Args, Component, CoreModule, Dependency, ExtensionConfig, ExtensionKind, HookFuture,
    Hooks, Instance, LogSink, Logger, LoggingBackend, OnExtensionLoad, OnShutdown,
    ShutdownDescriptor, instance,
};

/// Writes extension log lines through `tracing` with a `[context]` prefix.
struct ConsoleSink;

impl LogSink for ConsoleSink {
    fn log(&self, level: Level, context: &str, message: &str) {
        match level {
            Level::ERROR => tracing::error!("[{context}] {message}"),
            Level::WARN => tracing::warn!("[{context}] {message}"),
            Level::INFO => tracing::info!("[{context}] {message}"),
            _ => tracing::debug!("[{context}] {message}"),
        }
    }
}

pub struct ConsoleLogging;

impl Component for ConsoleLogging {
    fn construct(_: &mut Args) -> anyhow::Result<Self> {
        Ok(Self)
    }

    fn annotation() -> Annotation {
        Annotation::Extension(ExtensionKind::Logging)
    }

    fn hooks(hooks: &mut Hooks<Self>) {
        hooks.on_extension_load();
    }
}

impl OnExtensionLoad for ConsoleLogging {
    fn on_extension_load(&self, _: &Arc<CoreModule>, _: &ExtensionConfig) -> HookFuture<Instance> {
        HookFuture::ok(instance(LoggingBackend::new(ConsoleSink)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TickerConfig {
    interval_ms: u64,
}

/// Value exposed by [`Ticker`]: the number of ticks so far.
#[derive(Debug, Default)]
pub struct TickerHandle {
    ticks: AtomicU64,
}

impl TickerHandle {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

/// Background task counting ticks until shutdown.
pub struct Ticker {
    logger: Arc<Logger>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Component for Ticker {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<Logger>()]
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self> {
        Ok(Self {
            logger: args.next()?,
            task: Mutex::new(None),
        })
    }

    fn hooks(hooks: &mut Hooks<Self>) {
        hooks.on_extension_load().on_shutdown();
    }
}

impl OnExtensionLoad for Ticker {
    fn on_extension_load(
        &self,
        module: &Arc<CoreModule>,
        config: &ExtensionConfig,
    ) -> HookFuture<Instance> {
        let config = match config.required::<TickerConfig>() {
            Ok(config) => config,
            Err(e) => return HookFuture::err(e),
        };
        if config.interval_ms == 0 {
            return HookFuture::err(anyhow::anyhow!("interval_ms must be positive"));
        }

        let handle = Arc::new(TickerHandle::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(tick(
            Duration::from_millis(config.interval_ms),
            Arc::clone(&handle),
            cancel.clone(),
        ));
        *self.task.lock() = Some((cancel, task));

        self.logger
            .info(format_args!("ticking every {}ms for {}", config.interval_ms, module.name()));
        HookFuture::ok(handle as Instance)
    }
}

impl OnShutdown for Ticker {
    fn on_shutdown(
        &self,
        _: Option<&Arc<CoreModule>>,
        value: Option<&Instance>,
    ) -> ShutdownDescriptor {
        let task = self.task.lock().take();
        let handle = value.and_then(|v| Arc::clone(v).downcast::<TickerHandle>().ok());
        let logger = Arc::clone(&self.logger);

        ShutdownDescriptor::important(HookFuture::from_async(async move {
            if let Some((cancel, task)) = task {
                cancel.cancel();
                task.await?;
            }
            let ticks = handle.map_or(0, |h| h.ticks());
            logger.info(format_args!("stopped after {ticks} ticks"));
            Ok(())
        }))
    }
}

async fn tick(interval: Duration, handle: Arc<TickerHandle>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(interval);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                handle.ticks.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
