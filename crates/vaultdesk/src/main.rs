//! Vaultdesk launcher.
//!
//! The first launch becomes the primary instance and presents vault
//! directories; every later launch forwards its paths to the primary and
//! exits.

mod console;

use anyhow::Result;
use clap::Parser;
use console::ConsolePresenter;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vaultdesk_core::{
    bind_primary, negotiate, AppConfig, ApplicationIdentity, CommandDispatcher, InstanceArbiter,
    Launch, PrimaryClaim, ShutdownCoordinator, ShutdownRegistry,
};

/// Environment variable holding the log filter; `RUST_LOG` is the fallback.
const LOG_ENV: &str = "VAULTDESK_LOG";

#[derive(Parser, Debug)]
#[command(name = "vaultdesk")]
#[command(about = "Open vaults in the running Vaultdesk instance")]
struct Args {
    /// Vault directories or key files to open
    #[arg(value_name = "PATH", trailing_var_arg = true, allow_hyphen_values = true)]
    paths: Vec<String>,
}

fn init_logging() {
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    // Launch problems are reported, never turned into a failing exit status.
    if let Err(e) = run(args).await {
        error!("{:#}", e);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let arbiter = InstanceArbiter::new(ApplicationIdentity::default());
    let dispatcher = CommandDispatcher::default();

    match negotiate(&arbiter, &dispatcher, &args.paths).await? {
        Launch::Primary(claim) => run_primary(claim, dispatcher, args.paths).await,
        Launch::Forwarded { accepted } => {
            info!(
                "{} is already running; handed over {} path(s)",
                AppConfig::APP_NAME,
                accepted
            );
            Ok(())
        }
        Launch::Unconfirmed { sent } => {
            warn!(
                "{} did not confirm {} path(s); not resending",
                AppConfig::APP_NAME,
                sent
            );
            Ok(())
        }
        Launch::Abandoned => Ok(()),
    }
}

async fn run_primary(
    claim: PrimaryClaim,
    dispatcher: CommandDispatcher,
    launch_args: Vec<String>,
) -> Result<()> {
    info!(
        "Starting {} (pid {}, exclusive: {})",
        AppConfig::APP_NAME,
        std::process::id(),
        claim.is_exclusive()
    );

    let registry = Arc::new(ShutdownRegistry::new());
    let coordinator = match ShutdownCoordinator::install(registry.clone()) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            warn!("Termination handler unavailable, relying on quit only: {}", e);
            ShutdownCoordinator::new(registry.clone())
        }
    };

    let presenter = Arc::new(ConsolePresenter::default());
    let addr = bind_primary(claim, &registry, dispatcher, presenter.clone(), launch_args)?;
    info!("Accepting paths from later launches on {}", addr);

    // Last task: wake the main loop once everything else is torn down.
    let (exit_tx, mut exit_rx) = watch::channel(false);
    registry.add("exit-main-loop", move || {
        let _ = exit_tx.send(true);
    })?;

    if let Err(e) = console::spawn_command_reader(coordinator.clone()) {
        warn!("Console commands unavailable: {}", e);
    }
    info!("Type 'quit' or press Ctrl-C to exit");

    let _ = exit_rx.wait_for(|done| *done).await;
    info!(
        "{} exited after presenting {} vault(s)",
        AppConfig::APP_NAME,
        presenter.presented()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_collect_paths() {
        let args = Args::try_parse_from(["vaultdesk", "/a/vault", "b.masterkey"]).unwrap();
        assert_eq!(args.paths, vec!["/a/vault", "b.masterkey"]);
    }

    #[test]
    fn test_args_accept_hyphenated_paths() {
        let args = Args::try_parse_from(["vaultdesk", "-odd-name", "vault", "-d"]).unwrap();
        assert_eq!(args.paths, vec!["-odd-name", "vault", "-d"]);
    }

    #[test]
    fn test_args_without_paths() {
        let args = Args::try_parse_from(["vaultdesk"]).unwrap();
        assert!(args.paths.is_empty());
    }
}
