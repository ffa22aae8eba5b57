use crate::archive::{directories_of, is_top_level, Archive, ArchiveFactory, Capabilities, FileInfo};
use crate::error::{ArchiveError, ArchiveResult};
use crate::pack::{AccessMode, CompressType, ResourcePack, MIN_FILE_NODE_NUM};
use crate::stream::{DataStream, MemoryDataStream};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Type string of resource pack archives
pub const PACK_ARCHIVE_TYPE: &str = "pack";

/// Archive backed by one [`ResourcePack`] file. The archive name is the pack
/// path.
pub struct PackArchive {
    name: String,
    access: AccessMode,
    table_size: u32,
    pack: Mutex<Option<ResourcePack>>,
}

impl PackArchive {
    pub fn new(name: &str, access: AccessMode) -> Self {
        Self::with_table_size(name, access, MIN_FILE_NODE_NUM)
    }

    /// Like [`new`](Self::new); a writable archive whose pack file does not
    /// exist yet creates it with `table_size` slots on load
    pub fn with_table_size(name: &str, access: AccessMode, table_size: u32) -> Self {
        Self {
            name: name.to_string(),
            access,
            table_size,
            pack: Mutex::new(None),
        }
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// Run `f` on the open pack while holding the archive lock
    fn with_pack<T>(&self, f: impl FnOnce(&mut ResourcePack) -> ArchiveResult<T>) -> ArchiveResult<T> {
        let mut guard = self.pack.lock();
        match guard.as_mut() {
            Some(pack) => f(pack),
            None => Err(ArchiveError::NotLoaded(self.name.clone())),
        }
    }
}

impl Archive for PackArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn archive_type(&self) -> &str {
        PACK_ARCHIVE_TYPE
    }

    fn is_case_sensitive(&self) -> bool {
        true
    }

    fn load(&self) -> ArchiveResult<()> {
        let mut guard = self.pack.lock();
        if guard.is_some() {
            return Ok(());
        }

        let path = Path::new(&self.name);
        let pack = if !path.exists() && self.access == AccessMode::ReadWrite {
            debug!(path = %path.display(), table_size = self.table_size, "creating pack archive");
            ResourcePack::create(path, self.table_size)?
        } else {
            ResourcePack::open(path, self.access)?
        };
        *guard = Some(pack);
        Ok(())
    }

    fn unload(&self) -> ArchiveResult<()> {
        let mut guard = self.pack.lock();
        if let Some(mut pack) = guard.take() {
            pack.close_file()?;
        }
        Ok(())
    }

    fn open(&self, filename: &str) -> ArchiveResult<Option<Box<dyn DataStream>>> {
        self.with_pack(|pack| {
            if !pack.is_file_exist(filename) {
                return Ok(None);
            }
            let data = pack.read_file_to_vec(filename)?;
            Ok(Some(Box::new(MemoryDataStream::new(filename, data)) as Box<dyn DataStream>))
        })
    }

    fn list(&self, recursive: bool, dirs: bool) -> ArchiveResult<Vec<String>> {
        self.with_pack(|pack| {
            let names = pack.live_files().map(|node| node.name.as_str());
            if dirs {
                return Ok(directories_of(names, recursive));
            }
            Ok(names
                .filter(|name| recursive || is_top_level(name))
                .map(str::to_string)
                .collect())
        })
    }

    fn list_file_info(&self, dirs: bool) -> ArchiveResult<Vec<FileInfo>> {
        self.with_pack(|pack| {
            if dirs {
                let names = pack.live_files().map(|node| node.name.as_str());
                return Ok(directories_of(names, true)
                    .iter()
                    .map(|dir| FileInfo::new(&self.name, dir, 0, 0))
                    .collect());
            }
            Ok(pack
                .live_files()
                .map(|node| {
                    FileInfo::new(
                        &self.name,
                        node.name.as_str(),
                        node.compress_size as u64,
                        node.real_size as u64,
                    )
                })
                .collect())
        })
    }

    fn exists(&self, filename: &str) -> ArchiveResult<bool> {
        self.with_pack(|pack| Ok(pack.is_file_exist(filename)))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            writable: self.access == AccessMode::ReadWrite,
            async_load: false,
        }
    }

    fn add_file(&self, filename: &str, data: &[u8]) -> ArchiveResult<()> {
        if self.access != AccessMode::ReadWrite {
            return Err(self.unsupported("add_file"));
        }
        self.with_pack(|pack| Ok(pack.add_bytes(filename, data, CompressType::Zlib)?))
    }

    fn remove_file(&self, filename: &str) -> ArchiveResult<()> {
        if self.access != AccessMode::ReadWrite {
            return Err(self.unsupported("remove_file"));
        }
        self.with_pack(|pack| Ok(pack.del_file(filename)?))
    }
}

impl Drop for PackArchive {
    fn drop(&mut self) {
        if let Some(mut pack) = self.pack.get_mut().take() {
            if let Err(e) = pack.close_file() {
                warn!(archive = %self.name, error = %e, "failed to close pack archive");
            }
        }
    }
}

/// Creates [`PackArchive`]s opened with one access mode
#[derive(Debug, Clone)]
pub struct PackArchiveFactory {
    access: AccessMode,
    table_size: u32,
}

impl PackArchiveFactory {
    /// Factory for read-only pack archives
    pub fn new() -> Self {
        Self {
            access: AccessMode::ReadOnly,
            table_size: MIN_FILE_NODE_NUM,
        }
    }

    pub fn writable(table_size: u32) -> Self {
        Self {
            access: AccessMode::ReadWrite,
            table_size,
        }
    }
}

impl Default for PackArchiveFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveFactory for PackArchiveFactory {
    fn archive_type(&self) -> &str {
        PACK_ARCHIVE_TYPE
    }

    fn create_instance(&self, name: &str) -> ArchiveResult<Arc<dyn Archive>> {
        Ok(Arc::new(PackArchive::with_table_size(
            name,
            self.access,
            self.table_size,
        )))
    }
}
