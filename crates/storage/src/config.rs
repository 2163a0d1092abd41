//! Storage engine configuration
//!
//! The backend is a closed set of variants selected here, never by runtime
//! type inspection. The TOML form is a `[storage]` table inside the MVCC
//! configuration file:
//!
//! ```toml
//! [storage]
//! sync_writes = true
//!
//! [storage.engine]
//! kind = "persistent"
//! dir = "/var/lib/strata"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Backend selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineKind {
    /// Ordered map only; all data lost on drop
    #[default]
    InMemory,
    /// Ordered map plus an append-only batch log in `dir`
    Persistent {
        /// Data directory
        dir: PathBuf,
    },
}

/// Storage engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend to open
    #[serde(default)]
    pub engine: EngineKind,

    /// fsync the batch log after every commit (persistent engine only)
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

fn default_sync_writes() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            engine: EngineKind::InMemory,
            sync_writes: default_sync_writes(),
        }
    }
}

impl StorageConfig {
    /// In-memory engine configuration
    pub fn in_memory() -> Self {
        StorageConfig::default()
    }

    /// Persistent engine rooted at `dir`
    pub fn persistent(dir: impl AsRef<Path>) -> Self {
        StorageConfig {
            engine: EngineKind::Persistent {
                dir: dir.as_ref().to_path_buf(),
            },
            ..StorageConfig::default()
        }
    }

    /// Set whether commits fsync the log
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Data directory, for persistent engines
    pub fn data_dir(&self) -> Option<&Path> {
        match &self.engine {
            EngineKind::InMemory => None,
            EngineKind::Persistent { dir } => Some(dir),
        }
    }
}
