//! Centralized configuration for the Vaultdesk core.
//!
//! Everything here is a compile-time constant; the core owns no persisted
//! settings.

use std::time::Duration;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "Vaultdesk";
    /// Key that identifies this application to the instance lock.
    pub const APPLICATION_KEY: &'static str = "VaultdeskGUI";
    /// Per-user directory name holding the lock and endpoint files.
    pub const APP_DIR_NAME: &'static str = "vaultdesk";
}

/// Configuration for single-instance arbitration and argument forwarding.
pub struct InstanceConfig;

impl InstanceConfig {
    pub const LOCK_FILE_EXT: &'static str = "lock";
    pub const ENDPOINT_FILE_EXT: &'static str = "endpoint";

    // Secondary side
    pub const SEND_TIMEOUT: Duration = Duration::from_secs(3);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);
    pub const ENDPOINT_POLL_INTERVAL: Duration = Duration::from_millis(50);
    /// First attempt plus one retry after an unreachable primary.
    pub const ARBITRATION_ATTEMPTS: u32 = 2;

    // Primary side
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024; // 1 MiB
    pub const MAX_CONNECTIONS: usize = 32;
}

/// Vault conventions recognised by the command dispatcher.
pub struct VaultConfig;

impl VaultConfig {
    /// Suffix of the key file that marks a directory as a vault.
    pub const MASTERKEY_FILE_EXT: &'static str = ".masterkey";
}
