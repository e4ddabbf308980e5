//! Deterministic teardown.
//!
//! Components that own a resource register a cleanup task with the
//! [`ShutdownRegistry`] they were handed at construction. The
//! [`ShutdownCoordinator`] runs the registry from every shutdown trigger; the
//! registry guarantees the tasks run once no matter how many triggers fire.

pub mod coordinator;
pub mod registry;

pub use coordinator::{ShutdownCoordinator, ShutdownTrigger};
pub use registry::{ShutdownHandle, ShutdownRegistry, ShutdownReport};
