//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here rather than being
//! scattered through the instance and channel code.
//!
//! - `paths` - Per-user runtime directory for the lock and endpoint files
//! - `process` - Process liveness checks for stale endpoint detection

pub mod paths;
pub mod process;

pub use paths::{ensure_private_dir, instance_dir, runtime_base_dir};
pub use process::is_process_alive;
