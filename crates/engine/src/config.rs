//! Engine configuration via `kwstore.toml`
//!
//! On first open through [`Engine::open_default`](crate::Engine::open_default)
//! a commented default `kwstore.toml` is written into the data directory.
//! To change settings, edit the file and reopen.
//!
//! The hashing key is deliberately not part of this file: `obfuscate_index`
//! only says that a key must be supplied by the application at open time.

use std::path::Path;
use std::time::Duration;

use kwstore_core::{Error, Limits, Result, MAX_SIGNATURE_LEN};
use serde::{Deserialize, Serialize};

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "kwstore.toml";

/// Engine configuration loaded from `kwstore.toml`.
///
/// # Example
///
/// ```toml
/// signature_len = 24
/// max_items = 12000
/// journal_migrate_bytes = 524288
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Characters of the hex term signature kept (1..=24).
    pub signature_len: usize,
    /// Key the term hasher with the application-supplied key.
    pub obfuscate_index: bool,
    /// Entries a container may hold before it is split on save.
    pub max_items: usize,
    /// Largest set stored as literal values instead of a compressed blob.
    pub literal_max: usize,
    /// Most recently used containers a routine flush keeps resident.
    pub cache_keep: usize,
    /// Changes that force a retained container to be flushed.
    pub flush_min_changes: usize,
    /// Seconds a container may stay dirty before it is flushed anyway.
    pub dirty_grace_secs: u64,
    /// Seconds of inactivity after which a retained container is evicted.
    pub expire_secs: u64,
    /// Journal size below which an unforced migration pass is skipped.
    pub journal_migrate_bytes: u64,
    /// Migrations between two cache flushes during an optimize.
    pub flush_every: usize,
    /// fsync journal appends and container writes.
    pub fsync: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signature_len: MAX_SIGNATURE_LEN,
            obfuscate_index: false,
            max_items: kwstore_core::DEFAULT_MAX_ITEMS,
            literal_max: kwstore_core::DEFAULT_LITERAL_MAX,
            cache_keep: 5,
            flush_min_changes: 100,
            dirty_grace_secs: 30,
            expire_secs: 600,
            journal_migrate_bytes: 512 * 1024,
            flush_every: 25,
            fsync: false,
        }
    }
}

impl EngineConfig {
    /// Storage limits derived from this config.
    pub fn limits(&self) -> Limits {
        Limits {
            signature_len: self.signature_len,
            max_items: self.max_items,
            literal_max: self.literal_max,
        }
    }

    /// How long a retained container may stay dirty.
    pub fn dirty_grace(&self) -> Duration {
        Duration::from_secs(self.dirty_grace_secs)
    }

    /// How long an untouched retained container stays cached.
    pub fn expire_after(&self) -> Duration {
        Duration::from_secs(self.expire_secs)
    }

    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<()> {
        self.limits().validate()?;
        if self.flush_every == 0 {
            return Err(Error::InvalidConfig(
                "flush_every must be positive".to_string(),
            ));
        }
        if self.dirty_grace_secs > self.expire_secs {
            return Err(Error::InvalidConfig(format!(
                "dirty_grace_secs ({}) must not exceed expire_secs ({})",
                self.dirty_grace_secs, self.expire_secs
            )));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# kwstore posting list engine configuration
#
# Characters of the hex term signature (1..=24). Changing this on an
# existing index makes every stored term unreachable.
signature_len = 24

# Key term signatures with the application key so that file names do not
# reveal which terms are indexed. The key is supplied at open time.
obfuscate_index = false

# Entries a container file may hold before it is split on save.
max_items = 12000

# Sets up to this size are stored as literal values, larger ones as a
# compressed bitmask.
literal_max = 15

# Cache write-back policy
cache_keep = 5
flush_min_changes = 100
dirty_grace_secs = 30
expire_secs = 600

# Optimizer: journal size (bytes) below which routine migration is skipped,
# and how many migrations run between cache flushes.
journal_migrate_bytes = 524288
flush_every = 25

# fsync every journal append and container write (slower, safer)
fsync = false
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
