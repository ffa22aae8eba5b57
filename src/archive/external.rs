//! Archives read through a third-party library handle
//!
//! The library is reached only through [`ExternalHandle`]; an
//! [`ExternalOpener`] produces a handle for an archive name. This keeps
//! foreign formats (zip bundles, vendor containers) out of the crate while
//! still letting them be mounted in an [`ArchiveManager`](crate::manager::ArchiveManager).

use crate::archive::{is_top_level, Archive, ArchiveFactory, Capabilities, FileInfo, LoadCallback};
use crate::error::{ArchiveError, ArchiveResult};
use crate::stream::{DataStream, MemoryDataStream};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// One entry reported by an external handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalEntry {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub is_dir: bool,
}

impl ExternalEntry {
    pub fn file(name: &str, compressed_size: u64, uncompressed_size: u64) -> Self {
        Self {
            name: name.to_string(),
            compressed_size,
            uncompressed_size,
            is_dir: false,
        }
    }

    pub fn dir(name: &str) -> Self {
        Self {
            name: name.trim_end_matches('/').to_string(),
            compressed_size: 0,
            uncompressed_size: 0,
            is_dir: true,
        }
    }
}

/// An open archive inside a third-party library
pub trait ExternalHandle: Send {
    /// Every entry of the archive
    fn entries(&mut self) -> ArchiveResult<Vec<ExternalEntry>>;

    /// Decoded bytes of the entry named `name`
    fn read(&mut self, name: &str) -> ArchiveResult<Vec<u8>>;
}

/// Opens the external archive named by its argument
pub type ExternalOpener = Arc<dyn Fn(&str) -> ArchiveResult<Box<dyn ExternalHandle>> + Send + Sync>;

#[derive(Default)]
struct ExternalState {
    handle: Option<Box<dyn ExternalHandle>>,
    entries: Vec<ExternalEntry>,
    callback: Option<LoadCallback>,
}

/// Archive backed by an [`ExternalHandle`]
pub struct ExternalArchive {
    name: String,
    archive_type: String,
    case_sensitive: bool,
    opener: ExternalOpener,
    state: Mutex<ExternalState>,
}

impl ExternalArchive {
    pub fn new(name: &str, archive_type: &str, opener: ExternalOpener) -> Self {
        Self {
            name: name.to_string(),
            archive_type: archive_type.to_string(),
            case_sensitive: true,
            opener,
            state: Mutex::new(ExternalState::default()),
        }
    }

    /// Match file names without regard to ASCII case
    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    fn matches(&self, entry: &ExternalEntry, filename: &str) -> bool {
        if self.case_sensitive {
            entry.name == filename
        } else {
            entry.name.eq_ignore_ascii_case(filename)
        }
    }

    fn loaded_state<'a>(&self, state: &'a mut ExternalState) -> ArchiveResult<&'a mut Box<dyn ExternalHandle>> {
        state
            .handle
            .as_mut()
            .ok_or_else(|| ArchiveError::NotLoaded(self.name.clone()))
    }

    fn open_handle(&self, state: &mut ExternalState) -> ArchiveResult<()> {
        if state.handle.is_some() {
            return Ok(());
        }
        let mut handle = (self.opener)(&self.name)?;
        let entries = handle.entries()?;
        debug!(archive = %self.name, entries = entries.len(), "loaded external archive");
        state.entries = entries;
        state.handle = Some(handle);
        Ok(())
    }
}

impl Archive for ExternalArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn archive_type(&self) -> &str {
        &self.archive_type
    }

    fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn load(&self) -> ArchiveResult<()> {
        let (result, callback) = {
            let mut state = self.state.lock();
            let result = self.open_handle(&mut state);
            (result, state.callback.clone())
        };
        // Invoked unlocked so the callback may query this archive
        if let Some(callback) = callback {
            callback(&self.name, &result);
        }
        result
    }

    fn unload(&self) -> ArchiveResult<()> {
        let mut state = self.state.lock();
        state.handle = None;
        state.entries.clear();
        Ok(())
    }

    fn open(&self, filename: &str) -> ArchiveResult<Option<Box<dyn DataStream>>> {
        let mut state = self.state.lock();
        self.loaded_state(&mut state)?;
        let entry_name = match state
            .entries
            .iter()
            .find(|e| !e.is_dir && self.matches(e, filename))
        {
            Some(entry) => entry.name.clone(),
            None => return Ok(None),
        };
        let data = self.loaded_state(&mut state)?.read(&entry_name)?;
        Ok(Some(Box::new(MemoryDataStream::new(entry_name, data))))
    }

    fn list(&self, recursive: bool, dirs: bool) -> ArchiveResult<Vec<String>> {
        let mut state = self.state.lock();
        self.loaded_state(&mut state)?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.is_dir == dirs && (recursive || is_top_level(&e.name)))
            .map(|e| e.name.clone())
            .collect())
    }

    fn list_file_info(&self, dirs: bool) -> ArchiveResult<Vec<FileInfo>> {
        let mut state = self.state.lock();
        self.loaded_state(&mut state)?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.is_dir == dirs)
            .map(|e| FileInfo::new(&self.name, &e.name, e.compressed_size, e.uncompressed_size))
            .collect())
    }

    fn exists(&self, filename: &str) -> ArchiveResult<bool> {
        let mut state = self.state.lock();
        self.loaded_state(&mut state)?;
        Ok(state
            .entries
            .iter()
            .any(|e| !e.is_dir && self.matches(e, filename)))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            writable: false,
            async_load: true,
        }
    }

    fn set_load_callback(&self, callback: LoadCallback) -> ArchiveResult<()> {
        self.state.lock().callback = Some(callback);
        Ok(())
    }
}

impl fmt::Debug for ExternalArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalArchive")
            .field("name", &self.name)
            .field("archive_type", &self.archive_type)
            .field("case_sensitive", &self.case_sensitive)
            .finish_non_exhaustive()
    }
}

/// Creates [`ExternalArchive`]s for one type string
#[derive(Clone)]
pub struct ExternalArchiveFactory {
    archive_type: String,
    case_sensitive: bool,
    opener: ExternalOpener,
}

impl ExternalArchiveFactory {
    pub fn new(archive_type: &str, opener: ExternalOpener) -> Self {
        Self {
            archive_type: archive_type.to_string(),
            case_sensitive: true,
            opener,
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

impl ArchiveFactory for ExternalArchiveFactory {
    fn archive_type(&self) -> &str {
        &self.archive_type
    }

    fn create_instance(&self, name: &str) -> ArchiveResult<Arc<dyn Archive>> {
        let archive = ExternalArchive::new(name, &self.archive_type, self.opener.clone());
        let archive = if self.case_sensitive {
            archive
        } else {
            archive.case_insensitive()
        };
        Ok(Arc::new(archive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Helper: in-memory stand-in for a vendor archive
    struct MockHandle {
        files: BTreeMap<String, Vec<u8>>,
    }

    impl ExternalHandle for MockHandle {
        fn entries(&mut self) -> ArchiveResult<Vec<ExternalEntry>> {
            let mut entries = vec![ExternalEntry::dir("data/")];
            for (name, data) in &self.files {
                entries.push(ExternalEntry::file(name, data.len() as u64 / 2, data.len() as u64));
            }
            Ok(entries)
        }

        fn read(&mut self, name: &str) -> ArchiveResult<Vec<u8>> {
            self.files
                .get(name)
                .cloned()
                .ok_or_else(|| ArchiveError::External(format!("no entry {}", name)))
        }
    }

    fn mock_opener() -> ExternalOpener {
        Arc::new(|name: &str| -> ArchiveResult<Box<dyn ExternalHandle>> {
            if name != "bundle.zip" {
                return Err(ArchiveError::External(format!("cannot open {}", name)));
            }
            let mut files = BTreeMap::new();
            files.insert("readme.md".to_string(), b"# bundle".to_vec());
            files.insert("data/table.csv".to_string(), b"a,b\n1,2\n".to_vec());
            Ok(Box::new(MockHandle { files }))
        })
    }

    #[test]
    fn test_load_and_read() {
        let archive = ExternalArchive::new("bundle.zip", "zip", mock_opener());
        assert!(matches!(archive.exists("readme.md"), Err(ArchiveError::NotLoaded(_))));
        archive.load().unwrap();

        assert_eq!(archive.archive_type(), "zip");
        assert!(archive.exists("data/table.csv").unwrap());
        assert!(!archive.exists("data").unwrap());

        let mut stream = archive.open("readme.md").unwrap().unwrap();
        assert_eq!(stream.read_all().unwrap(), b"# bundle");
        assert!(archive.open("missing").unwrap().is_none());

        assert_eq!(archive.list(false, false).unwrap(), vec!["readme.md"]);
        assert_eq!(archive.list(true, false).unwrap().len(), 2);
        assert_eq!(archive.list(true, true).unwrap(), vec!["data"]);

        let infos = archive.list_file_info(false).unwrap();
        let csv = infos.iter().find(|i| i.basename == "table.csv").unwrap();
        assert_eq!(csv.uncompressed_size, 8);
        assert_eq!(csv.compressed_size, 4);
    }

    #[test]
    fn test_case_insensitive() {
        let factory = ExternalArchiveFactory::new("zip", mock_opener()).case_insensitive();
        let archive = factory.create_instance("bundle.zip").unwrap();
        archive.load().unwrap();
        assert!(!archive.is_case_sensitive());
        assert!(archive.exists("README.MD").unwrap());
        assert_eq!(
            archive.open("Data/Table.csv").unwrap().unwrap().name(),
            "data/table.csv"
        );
    }

    #[test]
    fn test_load_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));

        let archive = ExternalArchive::new("other.zip", "zip", mock_opener());
        assert!(archive.capabilities().async_load);
        let (c, f) = (calls.clone(), failures.clone());
        archive
            .set_load_callback(Arc::new(move |name: &str, result: &ArchiveResult<()>| {
                assert_eq!(name, "other.zip");
                c.fetch_add(1, Ordering::SeqCst);
                if result.is_err() {
                    f.fetch_add(1, Ordering::SeqCst);
                }
            }))
            .unwrap();

        assert!(archive.load().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_read_only() {
        let archive = ExternalArchive::new("bundle.zip", "zip", mock_opener());
        archive.load().unwrap();
        assert!(matches!(
            archive.add_file("x", b"y"),
            Err(ArchiveError::Unsupported { .. })
        ));
        archive.unload().unwrap();
        assert!(matches!(archive.list(true, false), Err(ArchiveError::NotLoaded(_))));
    }
}
