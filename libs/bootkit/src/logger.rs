//! Logger facade injected into extensions.
//!
//! Messages go to the loaded logging extension's [`LogSink`] when there is one, and to
//! `tracing` otherwise.

use std::fmt;
use std::sync::Arc;

use tracing::Level;

use crate::di::{Dependency, Provider, Token};
use crate::extension::LOGGING_EXTENSION;

/// Output of a logging extension.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, context: &str, message: &str);
}

/// The value a logging extension exposes from its load hook.
#[derive(Clone)]
pub struct LoggingBackend(Arc<dyn LogSink>);

impl LoggingBackend {
    pub fn new(sink: impl LogSink + 'static) -> Self {
        Self(Arc::new(sink))
    }

    pub fn from_arc(sink: Arc<dyn LogSink>) -> Self {
        Self(sink)
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.0
    }
}

impl fmt::Debug for LoggingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LoggingBackend(..)")
    }
}

/// Context-bound logger.
#[derive(Clone)]
pub struct Logger {
    context: &'static str,
    backend: Option<LoggingBackend>,
}

impl Logger {
    /// Logger writing straight to `tracing`.
    pub fn new(context: &'static str) -> Self {
        Self {
            context,
            backend: None,
        }
    }

    pub fn with_backend(context: &'static str, backend: LoggingBackend) -> Self {
        Self {
            context,
            backend: Some(backend),
        }
    }

    /// Factory provider under the `Logger` type token, bound to `context`.
    ///
    /// The backend is taken from [`LOGGING_EXTENSION`] if that token resolves to a
    /// [`LoggingBackend`].
    pub fn provider(context: &'static str) -> Provider {
        Provider::use_factory(
            Token::of::<Logger>(),
            vec![Dependency::on(*LOGGING_EXTENSION).optional()],
            move |args| {
                let (_, value) = args.next_instance()?;
                let backend = match value.map(|v| v.downcast::<LoggingBackend>()) {
                    Some(Ok(backend)) => Some((*backend).clone()),
                    Some(Err(_)) => {
                        tracing::warn!(
                            context,
                            "Logging extension value is not a LoggingBackend; using tracing"
                        );
                        None
                    }
                    None => None,
                };
                Ok(Self { context, backend })
            },
        )
    }

    #[inline]
    pub fn context(&self) -> &'static str {
        self.context
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn log(&self, level: Level, message: impl fmt::Display) {
        let message = message.to_string();
        if let Some(backend) = &self.backend {
            backend.0.log(level, self.context, &message);
            return;
        }
        match level {
            Level::ERROR => tracing::error!(context = self.context, "{message}"),
            Level::WARN => tracing::warn!(context = self.context, "{message}"),
            Level::INFO => tracing::info!(context = self.context, "{message}"),
            Level::DEBUG => tracing::debug!(context = self.context, "{message}"),
            _ => tracing::trace!(context = self.context, "{message}"),
        }
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::ERROR, message);
    }

    pub fn warn(&self, message: impl fmt::Display) {
        self.log(Level::WARN, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::INFO, message);
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::DEBUG, message);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("context", &self.context)
            .field("backend", &self.backend.is_some())
            .finish()
    }
}
