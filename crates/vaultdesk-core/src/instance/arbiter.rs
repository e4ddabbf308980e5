//! Exclusive acquisition of the instance lock.
//!
//! The lock is an advisory exclusive lock on `<identity>.lock`. The OS drops it
//! when the holding process exits for any reason, so a claim left behind by a
//! crashed primary is reclaimed by the next acquisition without any cleanup.

use super::identity::ApplicationIdentity;
use super::InstanceRole;
use crate::error::{Result, VaultdeskError};
use crate::platform;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Published location of a primary's argument listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub pid: u32,
    pub port: u16,
}

impl EndpointRecord {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

/// Outcome of a single arbitration attempt.
#[derive(Debug)]
pub enum Acquisition {
    Primary(PrimaryClaim),
    Secondary,
}

impl Acquisition {
    pub fn role(&self) -> InstanceRole {
        match self {
            Acquisition::Primary(_) => InstanceRole::Primary,
            Acquisition::Secondary => InstanceRole::Secondary,
        }
    }
}

/// Everything the primary holds for as long as it owns the instance.
///
/// Dropping the claim (or calling [`release`](Self::release)) withdraws the
/// published endpoint and unlocks.
#[derive(Debug)]
pub struct PrimaryClaim {
    lock: Option<File>,
    listener: Option<TcpListener>,
    addr: SocketAddr,
    endpoint_path: PathBuf,
    published: bool,
}

impl PrimaryClaim {
    /// Address of the bound (not yet accepting) argument listener.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// False when arbitration was unavailable and this process assumed the
    /// primary role without holding the lock.
    pub fn is_exclusive(&self) -> bool {
        self.lock.is_some()
    }

    /// Whether the endpoint file was written for secondaries to find.
    pub fn is_published(&self) -> bool {
        self.published
    }

    /// Hand the bound listener to the argument channel. Only succeeds once.
    pub fn take_listener(&mut self) -> Result<TcpListener> {
        self.listener
            .take()
            .ok_or_else(|| VaultdeskError::Other("Listener already taken from claim".to_string()))
    }

    /// Withdraw the endpoint and release the lock.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.published {
            self.published = false;
            // Only remove the file if it still names us; a later primary may
            // already have replaced it.
            let ours = read_record(&self.endpoint_path)
                .map(|record| record.pid == std::process::id())
                .unwrap_or(false);
            if ours {
                if let Err(e) = std::fs::remove_file(&self.endpoint_path) {
                    debug!(
                        "Could not remove endpoint file {}: {}",
                        self.endpoint_path.display(),
                        e
                    );
                }
            }
        }

        self.listener = None;

        if let Some(lock) = self.lock.take() {
            if let Err(e) = FileExt::unlock(&lock) {
                debug!("Instance unlock failed (released on close): {}", e);
            }
            debug!("Released instance lock");
        }
    }
}

impl Drop for PrimaryClaim {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Decides whether this process is the primary instance for an identity.
#[derive(Debug, Clone)]
pub struct InstanceArbiter {
    identity: ApplicationIdentity,
    dir: PathBuf,
}

impl InstanceArbiter {
    /// Arbiter using the per-user runtime directory.
    pub fn new(identity: ApplicationIdentity) -> Self {
        Self::with_dir(identity, platform::instance_dir())
    }

    /// Arbiter keeping its lock and endpoint files in `dir`.
    pub fn with_dir(identity: ApplicationIdentity, dir: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            dir: dir.into(),
        }
    }

    pub fn identity(&self) -> &ApplicationIdentity {
        &self.identity
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn endpoint_path(&self) -> PathBuf {
        self.identity.endpoint_path(&self.dir)
    }

    /// Attempt to become the primary instance.
    ///
    /// Exactly one of any number of concurrent callers on the same identity
    /// gets `Primary`. When the lock cannot be used at all the caller is
    /// treated as primary without exclusivity, and its endpoint is not
    /// published.
    ///
    /// Errors only if the loopback listener cannot be bound.
    pub fn acquire(&self) -> Result<Acquisition> {
        let lock = match self.try_lock() {
            Ok(Some(lock)) => Some(lock),
            Ok(None) => {
                debug!("Instance lock for {} is held elsewhere", self.identity);
                return Ok(Acquisition::Secondary);
            }
            Err(e) => {
                warn!("{}; continuing as primary without exclusivity", e);
                None
            }
        };

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let addr = listener.local_addr()?;

        let mut claim = PrimaryClaim {
            lock,
            listener: Some(listener),
            addr,
            endpoint_path: self.endpoint_path(),
            published: false,
        };

        let record = EndpointRecord {
            pid: std::process::id(),
            port: addr.port(),
        };
        if claim.lock.is_none() {
            // An unlocked primary must never replace the endpoint of one that
            // does hold the lock.
            info!(
                "Primary instance for {} (PID {}) running unpublished on {}",
                self.identity, record.pid, addr
            );
            return Ok(Acquisition::Primary(claim));
        }
        match self.publish(&record) {
            Ok(()) => {
                claim.published = true;
                info!(
                    "Primary instance for {} (PID {}) listening on {}",
                    self.identity, record.pid, addr
                );
            }
            Err(e) => warn!("Failed to publish instance endpoint: {}", e),
        }

        Ok(Acquisition::Primary(claim))
    }

    /// Read the endpoint of a live primary, if one has been published.
    ///
    /// Records naming a dead process are treated as absent.
    pub fn read_endpoint(&self) -> Option<EndpointRecord> {
        let path = self.endpoint_path();
        let record = read_record(&path)?;
        if !platform::is_process_alive(record.pid) {
            debug!(
                "Ignoring stale endpoint {} (PID {} not running)",
                path.display(),
                record.pid
            );
            return None;
        }
        Some(record)
    }

    /// `Ok(Some)` when the lock was won, `Ok(None)` when another holder has it.
    fn try_lock(&self) -> Result<Option<File>> {
        let lock_path = self.identity.lock_path(&self.dir);
        let unavailable = |e: std::io::Error| VaultdeskError::ArbitrationUnavailable {
            path: lock_path.clone(),
            message: e.to_string(),
            source: Some(e),
        };

        platform::ensure_private_dir(&self.dir).map_err(|e| VaultdeskError::ArbitrationUnavailable {
            path: lock_path.clone(),
            message: e.to_string(),
            source: None,
        })?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(unavailable)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(file)),
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(unavailable(e)),
        }
    }

    fn publish(&self, record: &EndpointRecord) -> Result<()> {
        let path = self.endpoint_path();
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| VaultdeskError::io_with_path(e, &self.dir))?;
        serde_json::to_writer(&mut tmp, record)?;
        tmp.flush()?;
        tmp.persist(&path)
            .map_err(|e| VaultdeskError::io_with_path(e.error, &path))?;
        Ok(())
    }
}

fn read_record(path: &Path) -> Option<EndpointRecord> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Unreadable endpoint file {}: {}", path.display(), e);
            None
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
