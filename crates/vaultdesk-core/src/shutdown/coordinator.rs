//! Binds the shutdown registry to every shutdown trigger.

use super::registry::{ShutdownRegistry, ShutdownReport};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// What asked the application to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownTrigger {
    /// Explicit quit from the UI.
    Quit,
    /// Termination notice from the OS (Ctrl-C, SIGTERM, SIGHUP, console close).
    Termination,
}

impl ShutdownTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShutdownTrigger::Quit => "quit",
            ShutdownTrigger::Termination => "termination",
        }
    }
}

impl std::fmt::Display for ShutdownTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runs the registry from any trigger.
///
/// Both triggers call the same idempotent [`ShutdownRegistry::run`]; whichever
/// arrives first does the work and later ones are no-ops.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    registry: Arc<ShutdownRegistry>,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<ShutdownRegistry>) -> Self {
        Self { registry }
    }

    /// Create a coordinator and hook it to OS termination notices.
    ///
    /// The OS hook is process-wide and can only be installed once.
    pub fn install(registry: Arc<ShutdownRegistry>) -> Result<Self> {
        let coordinator = Self::new(registry);
        coordinator.install_os_hook()?;
        Ok(coordinator)
    }

    /// Run the registry when the OS asks the process to terminate.
    ///
    /// The handler runs on a dedicated thread outside normal control flow.
    pub fn install_os_hook(&self) -> Result<()> {
        let coordinator = self.clone();
        ctrlc::set_handler(move || {
            coordinator.trigger(ShutdownTrigger::Termination);
        })?;
        debug!("Termination handler installed");
        Ok(())
    }

    /// Explicit quit from the UI.
    pub fn quit(&self) -> ShutdownReport {
        self.trigger(ShutdownTrigger::Quit)
    }

    pub fn trigger(&self, trigger: ShutdownTrigger) -> ShutdownReport {
        info!("Shutdown requested ({})", trigger);
        let report = self.registry.run();
        if report.is_noop() {
            debug!("Shutdown already handled; {} trigger ignored", trigger);
        } else {
            info!(
                "Shutdown complete: {} task(s) ran, {} faulted",
                report.executed, report.faulted
            );
        }
        report
    }

    pub fn registry(&self) -> &Arc<ShutdownRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn test_quit_runs_registered_tasks() {
        let registry = Arc::new(ShutdownRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        registry
            .add("count", move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let coordinator = ShutdownCoordinator::new(registry.clone());
        assert_eq!(coordinator.quit().executed, 1);
        assert!(coordinator.trigger(ShutdownTrigger::Termination).is_noop());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_triggers_run_once() {
        let registry = Arc::new(ShutdownRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        for i in 0..10 {
            let c = counter.clone();
            registry
                .add(format!("task-{}", i), move || {
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        let coordinator = ShutdownCoordinator::new(registry);
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [ShutdownTrigger::Quit, ShutdownTrigger::Termination]
            .into_iter()
            .map(|trigger| {
                let coordinator = coordinator.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    coordinator.trigger(trigger)
                })
            })
            .collect();

        let executed: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap().executed)
            .sum();
        assert_eq!(executed, 10);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(ShutdownTrigger::Quit.to_string(), "quit");
        assert_eq!(ShutdownTrigger::Termination.to_string(), "termination");
    }
}
