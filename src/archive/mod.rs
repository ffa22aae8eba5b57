//! Archive backends
//!
//! An [`Archive`] is a named, typed container the engine loads assets from.
//! Every backend guards its state with one mutex that is held for the whole
//! of each call. The lock is not reentrant: an implementation must never call
//! back into its own public methods while holding it.

mod external;
mod filesystem;
mod pack_archive;

pub use external::{ExternalArchive, ExternalArchiveFactory, ExternalEntry, ExternalHandle, ExternalOpener};
pub use filesystem::{FileSystemArchive, FileSystemArchiveFactory, FILESYSTEM_ARCHIVE_TYPE};
pub use pack_archive::{PackArchive, PackArchiveFactory, PACK_ARCHIVE_TYPE};

use crate::error::{ArchiveError, ArchiveResult};
use crate::stream::DataStream;
use serde::Serialize;
use std::sync::Arc;

/// Called with the archive name and the outcome when a load finishes
pub type LoadCallback = Arc<dyn Fn(&str, &ArchiveResult<()>) + Send + Sync>;

/// Optional operations an archive supports beyond reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// `add_file` and `remove_file` are available
    pub writable: bool,
    /// `set_load_callback` is available
    pub async_load: bool,
}

/// Metadata of one archived file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// Name of the archive holding the file
    pub archive: String,
    /// Full name inside the archive
    pub filename: String,
    /// Directory part of `filename`, with a trailing slash when not empty
    pub path: String,
    /// File part of `filename`
    pub basename: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl FileInfo {
    pub fn new(archive: &str, filename: &str, compressed_size: u64, uncompressed_size: u64) -> Self {
        let (path, basename) = split_name(filename);
        Self {
            archive: archive.to_string(),
            filename: filename.to_string(),
            path: path.to_string(),
            basename: basename.to_string(),
            compressed_size,
            uncompressed_size,
        }
    }
}

/// Common contract of every archive backend
pub trait Archive: Send + Sync {
    fn name(&self) -> &str;

    /// Type string the archive was created for
    fn archive_type(&self) -> &str;

    fn is_case_sensitive(&self) -> bool;

    fn load(&self) -> ArchiveResult<()>;

    fn unload(&self) -> ArchiveResult<()>;

    /// Open a file for reading; `None` if the archive does not hold it
    fn open(&self, filename: &str) -> ArchiveResult<Option<Box<dyn DataStream>>>;

    /// File names, or directory names when `dirs` is set
    fn list(&self, recursive: bool, dirs: bool) -> ArchiveResult<Vec<String>>;

    fn list_file_info(&self, dirs: bool) -> ArchiveResult<Vec<FileInfo>>;

    fn exists(&self, filename: &str) -> ArchiveResult<bool>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn add_file(&self, _filename: &str, _data: &[u8]) -> ArchiveResult<()> {
        Err(self.unsupported("add_file"))
    }

    fn remove_file(&self, _filename: &str) -> ArchiveResult<()> {
        Err(self.unsupported("remove_file"))
    }

    fn set_load_callback(&self, _callback: LoadCallback) -> ArchiveResult<()> {
        Err(self.unsupported("set_load_callback"))
    }

    #[doc(hidden)]
    fn unsupported(&self, operation: &'static str) -> ArchiveError {
        ArchiveError::Unsupported {
            archive_type: self.archive_type().to_string(),
            operation,
        }
    }
}

/// Creates and destroys archives of one type
pub trait ArchiveFactory: Send + Sync {
    /// Type string this factory is registered under
    fn archive_type(&self) -> &str;

    /// Build an unloaded archive named `name`
    fn create_instance(&self, name: &str) -> ArchiveResult<Arc<dyn Archive>>;

    /// Release an archive created by this factory. It has been unloaded.
    fn destroy_instance(&self, archive: Arc<dyn Archive>) {
        drop(archive);
    }
}

/// Split `dir/sub/file.ext` into (`dir/sub/`, `file.ext`)
pub(crate) fn split_name(filename: &str) -> (&str, &str) {
    match filename.rfind('/') {
        Some(pos) => filename.split_at(pos + 1),
        None => ("", filename),
    }
}

/// Directory prefixes of `names`, without trailing slash, deduplicated and
/// sorted. Only top-level directories unless `recursive`.
pub(crate) fn directories_of<'a>(names: impl Iterator<Item = &'a str>, recursive: bool) -> Vec<String> {
    let mut dirs = std::collections::BTreeSet::new();
    for name in names {
        let mut parts: Vec<&str> = name.split('/').collect();
        parts.pop();
        let depth = if recursive { parts.len() } else { parts.len().min(1) };
        for i in 1..=depth {
            dirs.insert(parts[..i].join("/"));
        }
    }
    dirs.into_iter().collect()
}

/// Whether `name` passes a non-recursive listing (no directory part)
pub(crate) fn is_top_level(name: &str) -> bool {
    !name.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("a/b/c.txt"), ("a/b/", "c.txt"));
        assert_eq!(split_name("c.txt"), ("", "c.txt"));
    }

    #[test]
    fn test_file_info_parts() {
        let info = FileInfo::new("base.pack", "textures/ui/button.png", 10, 20);
        assert_eq!(info.path, "textures/ui/");
        assert_eq!(info.basename, "button.png");
        assert_eq!(info.archive, "base.pack");
    }

    #[test]
    fn test_directories_of() {
        let names = ["a/b/c.txt", "a/d.txt", "e.txt", "f/g.txt"];
        assert_eq!(
            directories_of(names.iter().copied(), true),
            vec!["a", "a/b", "f"]
        );
        assert_eq!(directories_of(names.iter().copied(), false), vec!["a", "f"]);
    }
}
