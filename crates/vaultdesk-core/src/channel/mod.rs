//! One-shot argument handoff from secondary launches to the primary.
//!
//! Uses length-prefixed JSON-RPC 2.0 over loopback TCP, the port being
//! published by the primary's [`InstanceArbiter`](crate::instance::InstanceArbiter).
//!
//! - **Listener**: runs in the primary, yields an [`ArgumentStream`]
//! - **Sender**: used once by a secondary, bounded by a timeout
//! - **Protocol**: framing and message types shared by both

pub mod listener;
pub mod protocol;
pub mod sender;

pub use listener::{ArgumentListener, ArgumentStream, ListenerHandle};
pub use protocol::{ChannelRequest, ChannelResponse};
pub use sender::{send, send_with_timeout};

/// A user- or OS-supplied path string, uninterpreted.
pub type RawArgument = String;
