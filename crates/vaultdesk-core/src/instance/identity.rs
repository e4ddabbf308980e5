//! Application identity used as the exclusivity key.

use crate::config::{AppConfig, InstanceConfig};
use std::path::{Path, PathBuf};

/// Stable key identifying this application to the instance lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApplicationIdentity(String);

impl ApplicationIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe stem derived from the key.
    ///
    /// Characters outside `[A-Za-z0-9_-]` become `_`; an empty key maps to
    /// `instance`.
    pub fn file_stem(&self) -> String {
        let stem: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if stem.is_empty() {
            "instance".to_string()
        } else {
            stem
        }
    }

    pub fn lock_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.file_stem(), InstanceConfig::LOCK_FILE_EXT))
    }

    pub fn endpoint_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!(
            "{}.{}",
            self.file_stem(),
            InstanceConfig::ENDPOINT_FILE_EXT
        ))
    }
}

impl Default for ApplicationIdentity {
    fn default() -> Self {
        Self::new(AppConfig::APPLICATION_KEY)
    }
}

impl std::fmt::Display for ApplicationIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
