mod app;
mod extensions;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use bootkit::{Bootstrap, BootstrapOptions, BootstrapSession, ComponentType, ExtensionDecl};

use crate::app::AppModule;
use crate::extensions::{ConsoleLogging, Ticker};

/// BootKit demo - bootstraps a small module tree with a logging and a ticker extension
#[derive(Parser)]
#[command(name = "bootkit-demo")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a YAML file with bootstrap options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ticker interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    interval_ms: u64,

    /// Print effective bootstrap options (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(path) = &cli.config
        && !path.is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.display());
    }

    // defaults -> YAML (if provided) -> env (BOOTKIT__*)
    let options = BootstrapOptions::load(cli.config.as_deref())?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&options)?);
        return Ok(());
    }

    let session = Bootstrap::new(ComponentType::of::<AppModule>())
        .extension(ComponentType::of::<ConsoleLogging>())
        .extension(
            ExtensionDecl::new(ComponentType::of::<Ticker>())
                .with_config(serde_json::json!({ "interval_ms": cli.interval_ms })),
        )
        .options(options)
        .run()
        .await?;

    run_until_stopped(&session).await?;
    tracing::info!("bootkit-demo stopped");
    Ok(())
}

/// Wait for a shutdown signal and release the extensions.
async fn run_until_stopped(session: &BootstrapSession) -> Result<()> {
    if session.options().shutdown_on_signal {
        // The library's signal task runs shutdown and exits the process.
        return std::future::pending().await;
    }

    bootkit::bootstrap::wait_for_shutdown().await?;
    session.shutdown().await?;
    Ok(())
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
