//! Cross-process single-instance arbitration.
//!
//! Exactly one process per user and identity holds the instance lock and acts
//! as the *primary*. Every other launch is a *secondary*: it forwards its
//! arguments to the primary over the [`channel`](crate::channel) and exits.
//!
//! # Files
//!
//! Both live in [`platform::instance_dir`](crate::platform::instance_dir):
//! - `<identity>.lock` - advisory exclusive lock held for the primary's lifetime
//! - `<identity>.endpoint` - JSON `{pid, port}` of the primary's listener

pub mod arbiter;
pub mod identity;
pub mod launch;

pub use arbiter::{Acquisition, EndpointRecord, InstanceArbiter, PrimaryClaim};
pub use identity::ApplicationIdentity;
pub use launch::{negotiate, Launch};

/// Role of this process, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceRole {
    Primary,
    Secondary,
}

impl InstanceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceRole::Primary => "primary",
            InstanceRole::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for InstanceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
