use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use arbor_lineage::DEFAULT_BUFFER_SIZE;
use arbor_tree::RebuildOptions;

use crate::error::{CatalogError, CatalogResult};

/// Top-level configuration, usually read from `arbor.toml`.
///
/// Every section is optional; missing values take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArborConfig {
    pub storage: StorageConfig,
    pub rebuild: RebuildOptions,
    pub reader: ReaderConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory of a filesystem part store; in-memory when unset.
    pub root: Option<PathBuf>,
    /// Tree layouts kept in memory in front of the filesystem store; 0 disables the cache.
    pub tree_cache_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            tree_cache_capacity: 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Read-ahead per branch cursor.
    pub buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl ArborConfig {
    pub fn from_toml_str(s: &str) -> CatalogResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| CatalogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
            .map_err(|e| CatalogError::Config(format!("{}: {e}", path.display())))
    }

    pub fn to_toml_string(&self) -> CatalogResult<String> {
        toml::to_string_pretty(self).map_err(|e| CatalogError::Config(e.to_string()))
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if self.rebuild.target_part_entries == 0 {
            return Err(CatalogError::Config(
                "rebuild.target_part_entries must be at least 1".into(),
            ));
        }
        if self.reader.buffer_size == 0 {
            return Err(CatalogError::Config("reader.buffer_size must be at least 1".into()));
        }
        Ok(())
    }
}
