//! Vaultdesk Core - single-instance launch and orderly shutdown.
//!
//! This crate holds the systems logic behind the Vaultdesk desktop app:
//!
//! - **Instance arbitration**: one primary process per user; later launches
//!   become secondaries ([`instance`])
//! - **Argument handoff**: secondaries forward their paths to the primary
//!   over a loopback channel ([`channel`])
//! - **Dispatch**: raw paths become vault directories to present ([`dispatch`])
//! - **Shutdown**: cleanup tasks run exactly once from whichever trigger fires
//!   first ([`shutdown`])
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vaultdesk_core::{
//!     bind_primary, negotiate, ApplicationIdentity, CommandDispatcher, InstanceArbiter, Launch,
//!     ShutdownCoordinator, ShutdownRegistry,
//! };
//!
//! let arbiter = InstanceArbiter::new(ApplicationIdentity::default());
//! let dispatcher = CommandDispatcher::default();
//! match negotiate(&arbiter, &dispatcher, &args).await? {
//!     Launch::Primary(claim) => {
//!         let registry = Arc::new(ShutdownRegistry::new());
//!         let coordinator = ShutdownCoordinator::install(registry.clone())?;
//!         bind_primary(claim, &registry, dispatcher, presenter, args)?;
//!         // run the UI; call coordinator.quit() from its quit action
//!     }
//!     Launch::Forwarded { .. } | Launch::Abandoned => {}
//! }
//! ```

pub mod binding;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod instance;
pub mod platform;
pub mod shutdown;

// Re-export commonly used types
pub use binding::{bind_primary, ListenerBinding, Presenter};
pub use channel::{ArgumentListener, ArgumentStream, ListenerHandle, RawArgument};
pub use config::{AppConfig, InstanceConfig, VaultConfig};
pub use dispatch::CommandDispatcher;
pub use error::{Result, VaultdeskError};
pub use instance::{
    negotiate, Acquisition, ApplicationIdentity, InstanceArbiter, InstanceRole, Launch,
    PrimaryClaim,
};
pub use shutdown::{
    ShutdownCoordinator, ShutdownHandle, ShutdownRegistry, ShutdownReport, ShutdownTrigger,
};
