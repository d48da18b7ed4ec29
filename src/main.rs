use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use voicelink::config::{Config, RuntimeConfig};
use voicelink::engine::Engine;

fn main() -> ExitCode {
    // Exit-code contract: 0 ok, 1 argument error, 2 runtime error,
    // 3 anything unexpected.
    std::panic::set_hook(Box::new(|info| {
        eprintln!("unexpected failure: {info}");
        std::process::exit(3);
    }));

    let args = match Config::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };
    let cfg = match args.validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    match run(cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

#[tokio::main]
async fn run(cfg: RuntimeConfig) -> Result<()> {
    let engine = Engine::start(&cfg)?;
    info!("running, press Ctrl-C to stop");

    wait_for_shutdown().await?;
    info!("shutdown signal received");

    engine.stop()
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("install SIGTERM handler")?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r.context("install SIGINT handler")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("install Ctrl-C handler")?;
    Ok(())
}
