//! MVCC store configuration
//!
//! Built once and passed to `MvccStore::open`; there is no global
//! configuration. Loadable from a TOML file:
//!
//! ```toml
//! gc_batch_keys = 256
//! latch_timeout_ms = 5000
//!
//! [limits]
//! max_key_bytes = 65536
//! max_value_bytes = 67108864
//!
//! [storage]
//! sync_writes = true
//!
//! [storage.engine]
//! kind = "in_memory"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use strata_core::Limits;
use strata_storage::StorageConfig;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for `MvccConfig`
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Underlying parse error
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl From<ConfigError> for strata_core::Error {
    fn from(e: ConfigError) -> Self {
        strata_core::Error::InvalidArgument(e.to_string())
    }
}

/// MVCC store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MvccConfig {
    /// Storage engine selection
    #[serde(default)]
    pub storage: StorageConfig,

    /// Key and value size limits
    #[serde(default)]
    pub limits: Limits,

    /// Logical keys collected per GC batch
    #[serde(default = "default_gc_batch_keys")]
    pub gc_batch_keys: usize,

    /// Maximum wait for a contended latch, in milliseconds
    #[serde(default = "default_latch_timeout_ms")]
    pub latch_timeout_ms: u64,
}

fn default_gc_batch_keys() -> usize {
    256
}

fn default_latch_timeout_ms() -> u64 {
    5000
}

impl Default for MvccConfig {
    fn default() -> Self {
        MvccConfig {
            storage: StorageConfig::default(),
            limits: Limits::default(),
            gc_batch_keys: default_gc_batch_keys(),
            latch_timeout_ms: default_latch_timeout_ms(),
        }
    }
}

impl MvccConfig {
    /// In-memory store with default settings
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Persistent store in `dir` with default settings
    pub fn persistent(dir: impl AsRef<Path>) -> Self {
        MvccConfig {
            storage: StorageConfig::persistent(dir),
            ..Self::default()
        }
    }

    /// Replace the storage configuration
    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }

    /// Replace the size limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the GC batch size in logical keys
    pub fn with_gc_batch_keys(mut self, keys: usize) -> Self {
        self.gc_batch_keys = keys;
        self
    }

    /// Set the latch wait bound
    pub fn with_latch_timeout(mut self, timeout: Duration) -> Self {
        self.latch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Latch wait bound
    pub fn latch_timeout(&self) -> Duration {
        Duration::from_millis(self.latch_timeout_ms)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gc_batch_keys == 0 {
            return Err(ConfigError::Invalid {
                field: "gc_batch_keys",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.latch_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "latch_timeout_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.limits.max_key_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "limits.max_key_bytes",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The default config file content, with comments
    pub fn default_toml() -> &'static str {
        r#"# Strata MVCC configuration

# Logical keys collected per GC batch (default: 256)
gc_batch_keys = 256

# Maximum wait for a contended key latch, in milliseconds (default: 5000)
latch_timeout_ms = 5000

[limits]
max_key_bytes = 65536
max_value_bytes = 67108864

[storage]
# fsync the batch log after every commit (persistent engine only)
sync_writes = true

[storage.engine]
# "in_memory" or "persistent"
kind = "in_memory"
# dir = "/var/lib/strata"
"#
    }
}
