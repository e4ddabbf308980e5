//! Platform-specific path utilities.

use crate::config::AppConfig;
use crate::error::{Result, VaultdeskError};
use std::path::{Path, PathBuf};

/// Base directory for per-session runtime files.
///
/// # Platform Behavior
/// - **Linux**: `$XDG_RUNTIME_DIR` when set (per user, cleared on logout)
/// - **Windows/macOS**: the user cache directory
/// - Anything else falls back to the system temp directory
pub fn runtime_base_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
}

/// Directory holding this application's instance lock and endpoint files.
///
/// Not created here; see [`ensure_private_dir`].
pub fn instance_dir() -> PathBuf {
    runtime_base_dir().join(AppConfig::APP_DIR_NAME)
}

/// Create `dir` if missing, with owner-only permissions on Unix.
pub fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| VaultdeskError::io_with_path(e, dir))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| VaultdeskError::io_with_path(e, dir))?;
        }
    }
    Ok(())
}
