//! Mount configuration for an [`ArchiveManager`](crate::manager::ArchiveManager)
//!
//! ```toml
//! [pack]
//! table_size = 200
//! writable = false
//!
//! [[archive]]
//! name = "assets/base.pack"
//! type = "pack"
//!
//! [[archive]]
//! name = "assets/override"
//! type = "filesystem"
//! ```
//!
//! Archives are mounted in the order they are listed, which is also the
//! order lookups search them in.

use crate::archive::PackArchiveFactory;
use crate::error::{ArchiveError, ArchiveResult};
use crate::pack::{MAX_FILE_NODE_NUM, MIN_FILE_NODE_NUM};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// One archive to mount
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MountConfig {
    pub name: String,

    #[serde(rename = "type")]
    pub archive_type: String,
}

/// Settings for pack archives created from this configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Table size of packs created on load
    pub table_size: u32,

    /// Open packs read-write
    pub writable: bool,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            table_size: MIN_FILE_NODE_NUM,
            writable: false,
        }
    }
}

impl PackConfig {
    /// Factory producing pack archives with these settings
    pub fn factory(&self) -> PackArchiveFactory {
        if self.writable {
            PackArchiveFactory::writable(self.table_size)
        } else {
            PackArchiveFactory::new()
        }
    }
}

/// Archive manager configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ManagerConfig {
    #[serde(default, rename = "archive")]
    pub archives: Vec<MountConfig>,

    /// Pack settings; without a `[pack]` section the pack factory already
    /// registered on the manager is left in place
    #[serde(default)]
    pub pack: Option<PackConfig>,
}

impl ManagerConfig {
    pub fn from_toml_str(source: &str) -> ArchiveResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> ArchiveResult<Self> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> ArchiveResult<()> {
        if let Some(pack) = &self.pack {
            let size = pack.table_size;
            if !(MIN_FILE_NODE_NUM..=MAX_FILE_NODE_NUM).contains(&size) {
                return Err(ArchiveError::Config(format!(
                    "pack.table_size {} outside {}..={}",
                    size, MIN_FILE_NODE_NUM, MAX_FILE_NODE_NUM
                )));
            }
        }
        for mount in &self.archives {
            if mount.name.is_empty() || mount.archive_type.is_empty() {
                return Err(ArchiveError::Config(
                    "archive entries need a name and a type".to_string(),
                ));
            }
        }
        Ok(())
    }
}
