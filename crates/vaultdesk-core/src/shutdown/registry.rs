//! Registry of pending cleanup tasks.

use crate::error::{Result, VaultdeskError};
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info};

type TaskFn = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Token returned by [`ShutdownRegistry::add`], used to withdraw a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShutdownHandle(u64);

/// What a call to [`ShutdownRegistry::run`] did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that completed normally.
    pub executed: usize,
    /// Tasks that panicked or returned an error.
    pub faulted: usize,
}

impl ShutdownReport {
    /// True when this call found nothing to run.
    pub fn is_noop(&self) -> bool {
        self.executed == 0 && self.faulted == 0
    }
}

struct PendingTask {
    label: String,
    task: TaskFn,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    pending: BTreeMap<u64, PendingTask>,
    drained: bool,
}

/// Thread-safe set of cleanup tasks, drained exactly once.
///
/// `run` swaps the pending set for an empty one under the lock and executes
/// the swapped-out tasks outside it. Concurrent callers never run the same
/// task twice, and a task may itself call `add`/`remove` without deadlocking.
#[derive(Default)]
pub struct ShutdownRegistry {
    state: Mutex<RegistryState>,
}

impl std::fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ShutdownRegistry")
            .field("pending", &state.pending.len())
            .field("drained", &state.drained)
            .finish()
    }
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup task. `label` names it in logs.
    ///
    /// Fails with `ShutdownStarted` once the registry has been drained.
    pub fn add<F>(&self, label: impl Into<String>, task: F) -> Result<ShutdownHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_fallible(label, move || {
            task();
            Ok(())
        })
    }

    /// Register a cleanup task whose error is reported like a panic.
    pub fn add_fallible<F>(&self, label: impl Into<String>, task: F) -> Result<ShutdownHandle>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let label = label.into();
        let mut state = self.lock();
        if state.drained {
            debug!("Rejected shutdown task '{}' after shutdown", label);
            return Err(VaultdeskError::ShutdownStarted);
        }
        let id = state.next_id;
        state.next_id += 1;
        debug!("Registered shutdown task '{}' (#{})", label, id);
        state.pending.insert(
            id,
            PendingTask {
                label,
                task: Box::new(task),
            },
        );
        Ok(ShutdownHandle(id))
    }

    /// Withdraw a task. Returns false if it already ran or was removed.
    pub fn remove(&self, handle: ShutdownHandle) -> bool {
        self.lock().pending.remove(&handle.0).is_some()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn has_run(&self) -> bool {
        self.lock().drained
    }

    /// Run every pending task once, in registration order.
    ///
    /// Faults are logged and counted, never propagated. A call that finds the
    /// set already drained is a no-op.
    pub fn run(&self) -> ShutdownReport {
        let tasks = {
            let mut state = self.lock();
            state.drained = true;
            std::mem::take(&mut state.pending)
        };

        let mut report = ShutdownReport::default();
        if tasks.is_empty() {
            debug!("Shutdown registry already drained");
            return report;
        }

        info!("Running {} shutdown task(s)", tasks.len());
        for PendingTask { label, task } in tasks.into_values() {
            let outcome = match catch_unwind(AssertUnwindSafe(task)) {
                Ok(result) => result,
                Err(payload) => Err(VaultdeskError::Other(panic_message(payload.as_ref()))),
            };
            match outcome {
                Ok(()) => {
                    debug!("Shutdown task '{}' finished", label);
                    report.executed += 1;
                }
                Err(e) => {
                    let fault = VaultdeskError::ShutdownTaskFault {
                        task: label,
                        message: e.to_string(),
                    };
                    error!("{}", fault);
                    report.faulted += 1;
                }
            }
        }
        report
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Tasks never run under the lock, so a poisoned state is still sound.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}
