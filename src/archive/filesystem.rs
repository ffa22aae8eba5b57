use crate::archive::{Archive, ArchiveFactory, Capabilities, FileInfo};
use crate::error::{ArchiveError, ArchiveResult};
use crate::stream::{DataStream, FileDataStream};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// Type string of loose-directory archives
pub const FILESYSTEM_ARCHIVE_TYPE: &str = "filesystem";

/// Archive over a directory of loose files. The archive name is the
/// directory path.
pub struct FileSystemArchive {
    name: String,
    root: PathBuf,
    loaded: Mutex<bool>,
}

impl FileSystemArchive {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            root: PathBuf::from(name),
            loaded: Mutex::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an archive-relative name to a path under the root. Absolute names
    /// and names escaping the root are rejected.
    fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let relative = Path::new(filename);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if filename.is_empty() || escapes {
            return None;
        }
        Some(self.root.join(relative))
    }

    fn ensure_loaded(&self, loaded: bool) -> ArchiveResult<()> {
        if loaded {
            Ok(())
        } else {
            Err(ArchiveError::NotLoaded(self.name.clone()))
        }
    }

    /// Walk the directory, returning archive-relative names with `/`
    /// separators and the metadata length of each entry
    fn scan(&self, recursive: bool, dirs: bool) -> ArchiveResult<Vec<(String, u64)>> {
        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
        {
            let entry = entry?;
            let file_type = entry.file_type();
            if (dirs && !file_type.is_dir()) || (!dirs && !file_type.is_file()) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| ArchiveError::Io(io::Error::new(io::ErrorKind::Other, e)))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let len = if dirs { 0 } else { entry.metadata()?.len() };
            entries.push((name, len));
        }
        Ok(entries)
    }
}

impl Archive for FileSystemArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn archive_type(&self) -> &str {
        FILESYSTEM_ARCHIVE_TYPE
    }

    fn is_case_sensitive(&self) -> bool {
        !cfg!(windows)
    }

    fn load(&self) -> ArchiveResult<()> {
        let mut loaded = self.loaded.lock();
        if !self.root.is_dir() {
            return Err(ArchiveError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", self.root.display()),
            )));
        }
        *loaded = true;
        debug!(root = %self.root.display(), "loaded filesystem archive");
        Ok(())
    }

    fn unload(&self) -> ArchiveResult<()> {
        *self.loaded.lock() = false;
        Ok(())
    }

    fn open(&self, filename: &str) -> ArchiveResult<Option<Box<dyn DataStream>>> {
        let loaded = self.loaded.lock();
        self.ensure_loaded(*loaded)?;
        match self.resolve(filename) {
            Some(path) if path.is_file() => {
                Ok(Some(Box::new(FileDataStream::open(filename, &path)?)))
            }
            _ => Ok(None),
        }
    }

    fn list(&self, recursive: bool, dirs: bool) -> ArchiveResult<Vec<String>> {
        let loaded = self.loaded.lock();
        self.ensure_loaded(*loaded)?;
        Ok(self
            .scan(recursive, dirs)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    fn list_file_info(&self, dirs: bool) -> ArchiveResult<Vec<FileInfo>> {
        let loaded = self.loaded.lock();
        self.ensure_loaded(*loaded)?;
        Ok(self
            .scan(true, dirs)?
            .into_iter()
            .map(|(name, len)| FileInfo::new(&self.name, &name, len, len))
            .collect())
    }

    fn exists(&self, filename: &str) -> ArchiveResult<bool> {
        let loaded = self.loaded.lock();
        self.ensure_loaded(*loaded)?;
        Ok(self.resolve(filename).is_some_and(|path| path.is_file()))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            writable: true,
            async_load: false,
        }
    }

    fn add_file(&self, filename: &str, data: &[u8]) -> ArchiveResult<()> {
        let loaded = self.loaded.lock();
        self.ensure_loaded(*loaded)?;
        let path = self.resolve(filename).ok_or_else(|| {
            ArchiveError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file name: {}", filename),
            ))
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        Ok(())
    }

    fn remove_file(&self, filename: &str) -> ArchiveResult<()> {
        let loaded = self.loaded.lock();
        self.ensure_loaded(*loaded)?;
        let path = self.resolve(filename).ok_or_else(|| {
            ArchiveError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid file name: {}", filename),
            ))
        })?;
        fs::remove_file(path)?;
        Ok(())
    }
}

/// Creates [`FileSystemArchive`]s
#[derive(Debug, Default)]
pub struct FileSystemArchiveFactory;

impl ArchiveFactory for FileSystemArchiveFactory {
    fn archive_type(&self) -> &str {
        FILESYSTEM_ARCHIVE_TYPE
    }

    fn create_instance(&self, name: &str) -> ArchiveResult<Arc<dyn Archive>> {
        Ok(Arc::new(FileSystemArchive::new(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populated() -> (TempDir, FileSystemArchive) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("textures/ui")).unwrap();
        fs::write(dir.path().join("readme.txt"), b"read me").unwrap();
        fs::write(dir.path().join("textures/grass.png"), b"png bytes").unwrap();
        fs::write(dir.path().join("textures/ui/button.png"), b"button").unwrap();

        let archive = FileSystemArchive::new(dir.path().to_str().unwrap());
        archive.load().unwrap();
        (dir, archive)
    }

    #[test]
    fn test_not_loaded() {
        let dir = TempDir::new().unwrap();
        let archive = FileSystemArchive::new(dir.path().to_str().unwrap());
        assert!(matches!(archive.exists("x"), Err(ArchiveError::NotLoaded(_))));

        let missing = FileSystemArchive::new(dir.path().join("nope").to_str().unwrap());
        assert!(missing.load().is_err());
    }

    #[test]
    fn test_list() {
        let (_dir, archive) = populated();
        assert_eq!(
            archive.list(true, false).unwrap(),
            vec!["readme.txt", "textures/grass.png", "textures/ui/button.png"]
        );
        assert_eq!(archive.list(false, false).unwrap(), vec!["readme.txt"]);
        assert_eq!(
            archive.list(true, true).unwrap(),
            vec!["textures", "textures/ui"]
        );
    }

    #[test]
    fn test_open_and_exists() {
        let (_dir, archive) = populated();
        assert!(archive.exists("textures/grass.png").unwrap());
        assert!(!archive.exists("textures").unwrap());
        assert!(!archive.exists("missing.png").unwrap());

        let mut stream = archive.open("textures/ui/button.png").unwrap().unwrap();
        assert_eq!(stream.size(), 6);
        assert_eq!(stream.read_all().unwrap(), b"button");
        assert!(archive.open("missing.png").unwrap().is_none());
    }

    #[test]
    fn test_path_traversal_rejected() {
        let (dir, archive) = populated();
        fs::write(dir.path().parent().unwrap().join("outside.txt"), b"secret").ok();
        assert!(archive.open("../outside.txt").unwrap().is_none());
        assert!(!archive.exists("/etc/passwd").unwrap());
        assert!(archive.add_file("../escape.txt", b"x").is_err());
    }

    #[test]
    fn test_file_info() {
        let (_dir, archive) = populated();
        let infos = archive.list_file_info(false).unwrap();
        let grass = infos.iter().find(|i| i.basename == "grass.png").unwrap();
        assert_eq!(grass.path, "textures/");
        assert_eq!(grass.uncompressed_size, 9);
        assert_eq!(grass.compressed_size, 9);
    }

    #[test]
    fn test_add_and_remove() {
        let (dir, archive) = populated();
        assert!(archive.capabilities().writable);
        archive.add_file("new/dir/file.bin", b"fresh").unwrap();
        assert_eq!(fs::read(dir.path().join("new/dir/file.bin")).unwrap(), b"fresh");

        archive.remove_file("new/dir/file.bin").unwrap();
        assert!(!archive.exists("new/dir/file.bin").unwrap());
        assert!(archive.remove_file("new/dir/file.bin").is_err());
        assert!(matches!(
            archive.set_load_callback(Arc::new(|_: &str, _: &ArchiveResult<()>| {})),
            Err(ArchiveError::Unsupported { .. })
        ));
    }
}
