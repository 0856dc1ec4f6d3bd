//! Demo module tree: `AppModule` (root) imports `GreetingModule` (primary).

use std::sync::Arc;

use bootkit::{
    Annotation, Args, Component, ComponentType, Dependency, HookFuture, Hooks, ModuleDescriptor,
    OnError, OnRegister, OnStart,
};

use crate::extensions::{Ticker, TickerHandle};

/// Greets with the ticker's current count.
pub struct GreetingService {
    ticker: Arc<TickerHandle>,
}

impl GreetingService {
    pub fn greet(&self, name: &str) -> String {
        format!("hello {name}, {} ticks so far", self.ticker.ticks())
    }
}

impl Component for GreetingService {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<Ticker>()]
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self> {
        Ok(Self {
            ticker: args.next()?,
        })
    }
}

pub struct GreetingModule;

impl Component for GreetingModule {
    fn construct(_: &mut Args) -> anyhow::Result<Self> {
        Ok(Self)
    }

    fn annotation() -> Annotation {
        Annotation::Module(
            ModuleDescriptor::new("1.0.0")
                .provider(ComponentType::of::<GreetingService>())
                .export(ComponentType::of::<GreetingService>()),
        )
    }

    fn hooks(hooks: &mut Hooks<Self>) {
        hooks.on_register();
    }
}

impl OnRegister for GreetingModule {
    fn on_register(&self) -> HookFuture<()> {
        tracing::info!("GreetingModule registered");
        HookFuture::ok(())
    }
}

pub struct AppModule {
    greeter: Arc<GreetingService>,
}

impl Component for AppModule {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<GreetingService>()]
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self> {
        Ok(Self {
            greeter: args.next()?,
        })
    }

    fn annotation() -> Annotation {
        Annotation::Module(
            ModuleDescriptor::new("1.0.0").import(ComponentType::of::<GreetingModule>()),
        )
    }

    fn hooks(hooks: &mut Hooks<Self>) {
        hooks.on_start().on_error();
    }
}

impl OnStart for AppModule {
    fn on_start(&self) -> HookFuture<()> {
        let greeter = Arc::clone(&self.greeter);
        HookFuture::from_async(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
            loop {
                interval.tick().await;
                tracing::info!("{}", greeter.greet("bootkit"));
            }
        })
    }
}

impl OnError for AppModule {
    fn on_error(&self, error: &anyhow::Error, data: Option<&serde_json::Value>) -> HookFuture<()> {
        let data = data.map_or_else(String::new, ToString::to_string);
        tracing::error!(error = %error, data = %data, "Application error");
        HookFuture::ok(())
    }
}
