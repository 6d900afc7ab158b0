//! Persistence configuration via `ldstore.toml`
//!
//! Every field has a default, so an empty file is a valid configuration.

use crate::error::{PersistenceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "ldstore.toml";

/// Default maximum payload bytes per fragment (8 KiB)
pub const DEFAULT_FRAGMENT_CAPACITY: u32 = 8 * 1024;

/// Default number of documents returned by a buffered read
pub const DEFAULT_READ_LIMIT: u32 = 100;

/// Persistence configuration loaded from `ldstore.toml`.
///
/// # Example
///
/// ```toml
/// fragment_capacity = 8192
/// default_read_limit = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Maximum payload bytes of a single fragment.
    #[serde(default = "default_fragment_capacity")]
    pub fragment_capacity: u32,
    /// Documents returned by buffered reads when the caller gives no limit.
    #[serde(default = "default_read_limit")]
    pub default_read_limit: u32,
}

fn default_fragment_capacity() -> u32 {
    DEFAULT_FRAGMENT_CAPACITY
}

fn default_read_limit() -> u32 {
    DEFAULT_READ_LIMIT
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            fragment_capacity: DEFAULT_FRAGMENT_CAPACITY,
            default_read_limit: DEFAULT_READ_LIMIT,
        }
    }
}

impl PersistenceConfig {
    /// Tiny fragments, so every non-trivial string spans several of them
    pub fn for_testing() -> Self {
        Self {
            fragment_capacity: 8,
            default_read_limit: 10,
        }
    }

    /// Set the fragment capacity
    pub fn with_fragment_capacity(mut self, capacity: u32) -> Self {
        self.fragment_capacity = capacity;
        self
    }

    /// Set the default read limit
    pub fn with_default_read_limit(mut self, limit: u32) -> Self {
        self.default_read_limit = limit;
        self
    }

    /// Check value constraints.
    ///
    /// # Errors
    ///
    /// Returns an error if the capacity or the read limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.fragment_capacity == 0 {
            return Err(PersistenceError::config(
                "fragment_capacity must be at least 1",
            ));
        }
        if self.default_read_limit == 0 {
            return Err(PersistenceError::config(
                "default_read_limit must be at least 1",
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# ldstore persistence configuration
#
# Maximum payload bytes of one fragment (default: 8192).
# Longer string values are split across several fragments.
fragment_capacity = 8192

# Documents returned by buffered reads when no limit is given (default: 100).
default_read_limit = 100
"#
    }

    /// Parse and validate config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: PersistenceConfig = toml::from_str(content)
            .map_err(|e| PersistenceError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            PersistenceError::Config(msg) => {
                PersistenceError::config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PersistenceError::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
