//! Turns raw path arguments into vault directories to present.
//!
//! Rules, in order:
//! 1. A path that does not exist is created as a directory, so the app can be
//!    pointed at a vault location that does not exist yet.
//! 2. An existing regular file is accepted only if it is a vault key file
//!    (suffix match, case-insensitive); its parent directory is the target.
//! 3. An existing directory is the target itself. Anything else is ignored.
//!
//! Paths are returned as given; relative ones stay relative to the current
//! working directory. An empty or blank argument is ignored rather than
//! taken as the working directory.
//!
//! All filesystem calls here block; callers on an async runtime should use
//! `spawn_blocking`.

use crate::config::VaultConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolves raw arguments into directories.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    key_suffix: String,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new(VaultConfig::MASTERKEY_FILE_EXT)
    }
}

impl CommandDispatcher {
    /// Dispatcher recognising key files ending in `key_suffix`.
    pub fn new(key_suffix: impl Into<String>) -> Self {
        Self {
            key_suffix: key_suffix.into().to_lowercase(),
        }
    }

    /// Resolve one argument. `None` means the argument is ignored.
    pub fn resolve(&self, raw: &str) -> Option<PathBuf> {
        if raw.trim().is_empty() {
            debug!("Ignoring empty argument");
            return None;
        }

        let path = PathBuf::from(raw);
        match path.try_exists() {
            Ok(false) => Self::create_directory(path),
            Ok(true) => self.resolve_existing(path),
            Err(e) => {
                debug!("Ignoring {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Resolve several arguments, keeping order and dropping ignored ones.
    pub fn resolve_all<I, S>(&self, raw: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        raw.into_iter()
            .filter_map(|arg| self.resolve(arg.as_ref()))
            .collect()
    }

    /// Whether `path` names a vault key file.
    pub fn is_key_file(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase().ends_with(&self.key_suffix))
            .unwrap_or(false)
    }

    fn create_directory(path: PathBuf) -> Option<PathBuf> {
        if let Err(e) = fs::create_dir_all(&path) {
            debug!("Could not create {}: {}", path.display(), e);
            return None;
        }
        if path.is_dir() {
            debug!("Created vault location {}", path.display());
            Some(path)
        } else {
            None
        }
    }

    fn resolve_existing(&self, path: PathBuf) -> Option<PathBuf> {
        let metadata = match fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                debug!("Ignoring {}: {}", path.display(), e);
                return None;
            }
        };

        if metadata.is_file() {
            if self.is_key_file(&path) {
                return match path.parent() {
                    Some(parent) if parent.as_os_str().is_empty() => Some(PathBuf::from(".")),
                    parent => parent.map(Path::to_path_buf),
                };
            }
            debug!("Ignoring non-vault file {}", path.display());
            return None;
        }

        if metadata.is_dir() {
            Some(path)
        } else {
            None
        }
    }
}
