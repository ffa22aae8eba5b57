//! Registry of archive factories and mounted archives
//!
//! The manager owns every archive it loads. Archives are searched in the
//! order they were loaded, so an earlier mount shadows a later one that holds
//! a file of the same name.
//!
//! # Example
//!
//! ```no_run
//! use respack::manager::ArchiveManager;
//! use std::io::Read;
//!
//! let mut manager = ArchiveManager::with_default_factories();
//! manager.load("mods", "filesystem")?;
//! manager.load("base.pack", "pack")?;
//!
//! if let Some(mut stream) = manager.exists("textures/grass.png")? {
//!     let mut data = Vec::new();
//!     stream.read_to_end(&mut data)?;
//! }
//! # Ok::<(), respack::error::ArchiveError>(())
//! ```

use crate::archive::{Archive, ArchiveFactory, FileSystemArchiveFactory, PackArchiveFactory};
use crate::config::ManagerConfig;
use crate::error::{ArchiveError, ArchiveResult};
use crate::stream::DataStream;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A loaded archive and the type it was created for
struct Mounted {
    name: String,
    archive_type: String,
    archive: Arc<dyn Archive>,
}

/// Owns archive factories and the archives created from them
#[derive(Default)]
pub struct ArchiveManager {
    factories: HashMap<String, Box<dyn ArchiveFactory>>,
    mounted: Vec<Mounted>,
}

impl ArchiveManager {
    /// A manager with no factories
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager with the `filesystem` and read-only `pack` factories
    pub fn with_default_factories() -> Self {
        let mut manager = Self::new();
        manager.register_factory(Box::new(FileSystemArchiveFactory));
        manager.register_factory(Box::new(PackArchiveFactory::new()));
        manager
    }

    /// Register `factory` under its type string, replacing any factory of the
    /// same type
    pub fn register_factory(&mut self, factory: Box<dyn ArchiveFactory>) {
        let archive_type = factory.archive_type().to_string();
        if self.factories.insert(archive_type.clone(), factory).is_some() {
            warn!(archive_type = %archive_type, "replaced archive factory");
        } else {
            debug!(archive_type = %archive_type, "registered archive factory");
        }
    }

    pub fn unregister_factory(&mut self, archive_type: &str) -> Option<Box<dyn ArchiveFactory>> {
        self.factories.remove(archive_type)
    }

    pub fn has_factory(&self, archive_type: &str) -> bool {
        self.factories.contains_key(archive_type)
    }

    /// Create and load the archive `name` with the factory for
    /// `archive_type`. Loading a name that is already loaded returns the
    /// existing archive.
    pub fn load(&mut self, name: &str, archive_type: &str) -> ArchiveResult<Arc<dyn Archive>> {
        if let Some(existing) = self.get(name) {
            warn!(archive = name, "archive already loaded");
            return Ok(existing);
        }

        let factory = match self.factories.get(archive_type) {
            Some(factory) => factory,
            None => {
                error!(archive = name, archive_type, "no factory for archive type");
                return Err(ArchiveError::UnknownArchiveType(archive_type.to_string()));
            }
        };

        let archive = factory.create_instance(name)?;
        if let Err(e) = archive.load() {
            factory.destroy_instance(archive);
            return Err(e);
        }

        info!(archive = name, archive_type, "archive loaded");
        self.mounted.push(Mounted {
            name: name.to_string(),
            archive_type: archive_type.to_string(),
            archive: archive.clone(),
        });
        Ok(archive)
    }

    /// Load every archive listed in `config`, in order. A `[pack]` section
    /// replaces the pack factory before anything is loaded.
    pub fn load_config(&mut self, config: &ManagerConfig) -> ArchiveResult<Vec<Arc<dyn Archive>>> {
        config.validate()?;
        if let Some(pack) = &config.pack {
            self.register_factory(Box::new(pack.factory()));
        }
        config
            .archives
            .iter()
            .map(|mount| self.load(&mount.name, &mount.archive_type))
            .collect()
    }

    /// Unload and destroy the archive `name`
    pub fn unload(&mut self, name: &str) -> ArchiveResult<()> {
        let index = self
            .mounted
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| ArchiveError::UnknownArchive(name.to_string()))?;
        let mounted = self.mounted.remove(index);
        self.release(mounted)
    }

    /// Unload and destroy `archive`, which must have come from this manager
    pub fn unload_archive(&mut self, archive: &Arc<dyn Archive>) -> ArchiveResult<()> {
        let index = self
            .mounted
            .iter()
            .position(|m| Arc::ptr_eq(&m.archive, archive))
            .ok_or_else(|| ArchiveError::UnknownArchive(archive.name().to_string()))?;
        let mounted = self.mounted.remove(index);
        self.release(mounted)
    }

    fn release(&self, mounted: Mounted) -> ArchiveResult<()> {
        let unloaded = mounted.archive.unload();
        let factory = match self.factories.get(&mounted.archive_type) {
            Some(factory) => factory,
            None => {
                error!(
                    archive = %mounted.name,
                    archive_type = %mounted.archive_type,
                    "archive factory missing while unloading"
                );
                return Err(ArchiveError::FactoryMissing {
                    name: mounted.name,
                    archive_type: mounted.archive_type,
                });
            }
        };
        factory.destroy_instance(mounted.archive);
        debug!(archive = %mounted.name, "archive unloaded");
        unloaded
    }

    /// Open `filename` from the first archive that holds it
    pub fn exists(&self, filename: &str) -> ArchiveResult<Option<Box<dyn DataStream>>> {
        for mounted in &self.mounted {
            if mounted.archive.exists(filename)? {
                return mounted.archive.open(filename);
            }
        }
        Ok(None)
    }

    /// First archive that holds `filename`
    pub fn find_archive(&self, filename: &str) -> ArchiveResult<Option<Arc<dyn Archive>>> {
        for mounted in &self.mounted {
            if mounted.archive.exists(filename)? {
                return Ok(Some(mounted.archive.clone()));
            }
        }
        Ok(None)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Archive>> {
        self.mounted
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.archive.clone())
    }

    /// Loaded archives in load order
    pub fn archives(&self) -> impl Iterator<Item = &Arc<dyn Archive>> {
        self.mounted.iter().map(|m| &m.archive)
    }

    pub fn len(&self) -> usize {
        self.mounted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mounted.is_empty()
    }

    /// Unload every archive in load order. Every archive is released even if
    /// some fail; the first failure is returned.
    pub fn shutdown(&mut self) -> ArchiveResult<()> {
        let mut first_error = None;
        for mounted in std::mem::take(&mut self.mounted) {
            if let Err(e) = self.release(mounted) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for ArchiveManager {
    fn drop(&mut self) {
        for mounted in std::mem::take(&mut self.mounted) {
            let factory_missing = !self.factories.contains_key(&mounted.archive_type);
            let name = mounted.name.clone();
            if let Err(e) = self.release(mounted) {
                warn!(archive = %name, error = %e, "failed to release archive");
            }
            debug_assert!(!factory_missing, "archive factory missing for {}", name);
        }
    }
}
