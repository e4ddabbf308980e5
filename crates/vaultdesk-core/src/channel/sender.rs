//! Secondary-side delivery of arguments to the primary.
//!
//! A send is short-lived: read the published endpoint, connect, write one
//! `open_paths` request, wait for the acknowledgement, close. The endpoint may
//! not be published yet when a secondary loses the race to a primary that is
//! still starting, so the endpoint is polled until the overall timeout.
//!
//! A request that was written in full is never sent again.

use super::protocol::{read_frame, write_frame, ChannelRequest, ChannelResponse, OpenPathsResult};
use super::RawArgument;
use crate::config::InstanceConfig;
use crate::error::{Result, VaultdeskError};
use crate::instance::{EndpointRecord, InstanceArbiter};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

/// Deliver `args` to the primary using [`InstanceConfig::SEND_TIMEOUT`].
///
/// Returns how many arguments the primary accepted.
pub async fn send(arbiter: &InstanceArbiter, args: &[RawArgument]) -> Result<usize> {
    send_with_timeout(arbiter, args, InstanceConfig::SEND_TIMEOUT).await
}

/// Deliver `args` to the primary, giving up after `timeout`.
///
/// Fails with `ChannelUnreachable` when no live primary accepts the request
/// in time; a fresh arbitration round may then succeed. Once the request has
/// been written in full, any failure is `DeliveryUnconfirmed` instead, since
/// the primary may already have queued the arguments.
pub async fn send_with_timeout(
    arbiter: &InstanceArbiter,
    args: &[RawArgument],
    timeout: Duration,
) -> Result<usize> {
    let deadline = Instant::now() + timeout;
    let (stream, record) = tokio::time::timeout_at(deadline, connect_to_primary(arbiter))
        .await
        .map_err(|_| {
            VaultdeskError::unreachable(format!(
                "no primary for {} answered within {:?}",
                arbiter.identity(),
                timeout
            ))
        })?;
    exchange(stream, &record, args, deadline).await
}

async fn connect_to_primary(arbiter: &InstanceArbiter) -> (TcpStream, EndpointRecord) {
    loop {
        if let Some(record) = arbiter.read_endpoint() {
            match connect(&record).await {
                Ok(stream) => return (stream, record),
                Err(e) => debug!("Primary at {} not accepting yet: {}", record.addr(), e),
            }
        }
        tokio::time::sleep(InstanceConfig::ENDPOINT_POLL_INTERVAL).await;
    }
}

async fn connect(record: &EndpointRecord) -> Result<TcpStream> {
    tokio::time::timeout(InstanceConfig::CONNECT_TIMEOUT, TcpStream::connect(record.addr()))
        .await
        .map_err(|_| VaultdeskError::unreachable(format!("connect to {} timed out", record.addr())))?
        .map_err(|e| VaultdeskError::unreachable(format!("connect to {}: {}", record.addr(), e)))
}

/// One request, one acknowledgement, both bounded by `deadline`.
async fn exchange(
    mut stream: TcpStream,
    record: &EndpointRecord,
    args: &[RawArgument],
    deadline: Instant,
) -> Result<usize> {
    let describe = |what: &str| format!("primary (PID {}) {} on port {}", record.pid, what, record.port);

    let request = ChannelRequest::open_paths(args, 1);
    let request_bytes = serde_json::to_vec(&request)?;

    let (mut reader, mut writer) = stream.split();

    // A partially written frame is discarded by the primary, so this stage
    // is still safe to retry.
    match tokio::time::timeout_at(deadline, write_frame(&mut writer, &request_bytes)).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => return Err(VaultdeskError::unreachable(describe("dropped the request"))),
        Err(_) => return Err(VaultdeskError::unreachable(describe("stalled the request"))),
    }

    let response_bytes = match tokio::time::timeout_at(deadline, read_frame(&mut reader)).await {
        Ok(Ok(Some(bytes))) => bytes,
        Ok(Ok(None)) => return Err(VaultdeskError::unconfirmed(describe("closed the connection"))),
        Ok(Err(_)) => return Err(VaultdeskError::unconfirmed(describe("failed to answer"))),
        Err(_) => return Err(VaultdeskError::unconfirmed(describe("did not answer in time"))),
    };

    let response: ChannelResponse =
        serde_json::from_slice(&response_bytes).map_err(|e| VaultdeskError::Json {
            message: format!("Failed to parse channel response: {}", e),
            source: Some(e),
        })?;

    if let Some(err) = response.error {
        return Err(VaultdeskError::Other(format!(
            "Primary rejected arguments ({}): {}",
            err.code, err.message
        )));
    }

    let result = response
        .result
        .ok_or_else(|| VaultdeskError::Other("Channel response missing result".to_string()))?;
    let result: OpenPathsResult = serde_json::from_value(result)?;

    debug!(
        "Primary (PID {}) accepted {} argument(s)",
        record.pid, result.accepted
    );
    Ok(result.accepted)
}
