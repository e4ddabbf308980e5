//! Startup negotiation between a new launch and any running primary.

use super::arbiter::{Acquisition, InstanceArbiter, PrimaryClaim};
use crate::channel::{self, RawArgument};
use crate::config::InstanceConfig;
use crate::dispatch::CommandDispatcher;
use crate::error::{Result, VaultdeskError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How this launch should proceed.
#[derive(Debug)]
pub enum Launch {
    /// This process is the primary and must run the application.
    Primary(PrimaryClaim),
    /// Arguments were handed to the running primary; exit now.
    Forwarded { accepted: usize },
    /// The request reached a primary that never acknowledged it. The
    /// arguments may or may not have been opened; they are not resent.
    Unconfirmed { sent: usize },
    /// No primary could be reached in any attempt; arguments were dropped.
    Abandoned,
}

/// Decide whether to run as primary or forward `raw_args` to one.
///
/// A secondary that cannot reach the primary (e.g. it died between holding
/// the lock and accepting connections) tries arbitration again, so the
/// user's arguments are only dropped when every attempt fails.
pub async fn negotiate(
    arbiter: &InstanceArbiter,
    dispatcher: &CommandDispatcher,
    raw_args: &[RawArgument],
) -> Result<Launch> {
    negotiate_with_timeout(arbiter, dispatcher, raw_args, InstanceConfig::SEND_TIMEOUT).await
}

/// [`negotiate`] with an explicit per-attempt send timeout.
pub async fn negotiate_with_timeout(
    arbiter: &InstanceArbiter,
    dispatcher: &CommandDispatcher,
    raw_args: &[RawArgument],
    send_timeout: Duration,
) -> Result<Launch> {
    let mut targets: Option<Vec<RawArgument>> = None;

    for attempt in 1..=InstanceConfig::ARBITRATION_ATTEMPTS {
        if let Acquisition::Primary(claim) = acquire(arbiter).await? {
            return Ok(Launch::Primary(claim));
        }

        // Resolve locally once so relative paths keep this process's working
        // directory, then forward absolute targets.
        if targets.is_none() {
            targets = Some(resolve_locally(dispatcher, raw_args).await?);
        }
        let forward = targets.as_deref().unwrap_or_default();

        if forward.is_empty() {
            debug!("Secondary instance has nothing to forward");
            return Ok(Launch::Forwarded { accepted: 0 });
        }

        match channel::send_with_timeout(arbiter, forward, send_timeout).await {
            Ok(accepted) => {
                info!("Forwarded {} argument(s) to the running instance", accepted);
                return Ok(Launch::Forwarded { accepted });
            }
            Err(VaultdeskError::DeliveryUnconfirmed { reason }) => {
                warn!(
                    "Sent {} argument(s) without confirmation: {}",
                    forward.len(),
                    reason
                );
                return Ok(Launch::Unconfirmed {
                    sent: forward.len(),
                });
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    "Arbitration attempt {}/{}: {}",
                    attempt,
                    InstanceConfig::ARBITRATION_ATTEMPTS,
                    e
                );
            }
            Err(e) => return Err(e),
        }
    }

    warn!(
        "Dropping {} argument(s): no running instance could be reached",
        targets.map(|t| t.len()).unwrap_or(0)
    );
    Ok(Launch::Abandoned)
}

async fn acquire(arbiter: &InstanceArbiter) -> Result<Acquisition> {
    let arbiter = arbiter.clone();
    tokio::task::spawn_blocking(move || arbiter.acquire())
        .await
        .map_err(|e| VaultdeskError::Other(format!("Instance arbitration failed: {}", e)))?
}

/// Resolve `raw_args` here and make the targets absolute, so they mean the
/// same thing in the primary's working directory.
async fn resolve_locally(
    dispatcher: &CommandDispatcher,
    raw_args: &[RawArgument],
) -> Result<Vec<RawArgument>> {
    let dispatcher = dispatcher.clone();
    let raw_args = raw_args.to_vec();
    let resolved = tokio::task::spawn_blocking(move || dispatcher.resolve_all(&raw_args))
        .await
        .map_err(|e| VaultdeskError::Other(format!("Argument resolution failed: {}", e)))?;
    Ok(resolved
        .into_iter()
        .filter_map(|path| match std::path::absolute(&path) {
            Ok(absolute) => Some(absolute.to_string_lossy().into_owned()),
            Err(e) => {
                debug!("Dropping {}: {}", path.display(), e);
                None
            }
        })
        .collect())
}
