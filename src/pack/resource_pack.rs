use crate::error::{PackError, Result};
use crate::pack::codec::{effective_type, Codec};
use crate::pack::format::{
    CompressType, FileNode, NodeName, PackHeader, UseFlag, FILE_NODE_SIZE, HEADER_SIZE,
    MAX_FILE_NODE_NUM, MIN_FILE_NODE_NUM, VERSION_OFFSET, version_field,
};
use crate::pack::node_table::{FileNodeTable, SlotLookup};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How an existing pack is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    #[default]
    ReadOnly,
    ReadWrite,
}

/// Where the bytes of a file being added come from
enum Payload<'a> {
    /// In-memory data, encoded by the codec
    Bytes(&'a [u8], CompressType),
    /// A loose file on disk, encoded by the codec
    Loose(&'a Path, CompressType),
    /// Pre-encoded bytes stored verbatim
    Raw {
        stored: &'a [u8],
        real_size: u32,
        compress_type: CompressType,
    },
}

/// A resource pack: fixed header, fixed-capacity file table and a payload
/// heap of per-file compressed data.
///
/// Mutations are kept in memory and the table is written back on
/// [`close_file`](Self::close_file) or [`flush`](Self::flush). Deleting a
/// file only marks its slot; space is never reclaimed in place. When the table
/// runs out of empty slots, adding a file rebuilds the pack with a larger
/// table first.
#[derive(Debug, Default)]
pub struct ResourcePack {
    pub(super) file: Option<File>,
    pub(super) path: PathBuf,
    pub(super) access: AccessMode,
    pub(super) header: PackHeader,
    pub(super) table: FileNodeTable,
    pub(super) dirty: bool,
    codec: Codec,
    last_error: Option<String>,
}

impl ResourcePack {
    /// An empty, unopened pack handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pack file and open it read-write
    pub fn create<P: AsRef<Path>>(path: P, table_size: u32) -> Result<Self> {
        let mut pack = Self::new();
        pack.create_file(path.as_ref(), table_size)?;
        pack.open_file(path.as_ref(), AccessMode::ReadWrite)?;
        Ok(pack)
    }

    /// Open an existing pack file
    pub fn open<P: AsRef<Path>>(path: P, access: AccessMode) -> Result<Self> {
        let mut pack = Self::new();
        pack.open_file(path.as_ref(), access)?;
        Ok(pack)
    }

    /// Write a new, empty pack to `path`. The table size is clamped into
    /// [`MIN_FILE_NODE_NUM`, `MAX_FILE_NODE_NUM`]. The file is not kept open.
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P, table_size: u32) -> Result<()> {
        let result = self.create_file_inner(path.as_ref(), table_size);
        self.track(result)
    }

    fn create_file_inner(&mut self, path: &Path, table_size: u32) -> Result<()> {
        if self.file.is_some() {
            return Err(PackError::AlreadyOpen);
        }
        if path.exists() {
            return Err(PackError::AlreadyExists(path.display().to_string()));
        }

        let node_count = table_size.clamp(MIN_FILE_NODE_NUM, MAX_FILE_NODE_NUM);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => PackError::AlreadyExists(path.display().to_string()),
                _ => PackError::Io(e),
            })?;
        let mut writer = BufWriter::new(file);

        PackHeader::new(node_count).write_to(&mut writer)?;
        let empty = FileNode::default();
        for _ in 0..node_count {
            empty.write_to(&mut writer)?;
        }
        writer.flush()?;

        debug!(path = %path.display(), node_count, "created pack");
        Ok(())
    }

    /// Open an existing pack, validate its header and load its table
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P, access: AccessMode) -> Result<()> {
        let result = self.open_file_inner(path.as_ref(), access);
        self.track(result)
    }

    fn open_file_inner(&mut self, path: &Path, access: AccessMode) -> Result<()> {
        if self.file.is_some() {
            return Err(PackError::AlreadyOpen);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(access == AccessMode::ReadWrite)
            .open(path)?;
        let file_len = file.metadata()?.len();

        let header = PackHeader::read_from(&mut file)?;
        header.validate()?;
        if header.table_end() > file_len {
            return Err(PackError::CorruptTable(format!(
                "table ends at {} but file is {} bytes",
                header.table_end(),
                file_len
            )));
        }

        file.seek(SeekFrom::Start(header.file_list_offset as u64))?;
        let mut raw = vec![0u8; header.node_count as usize * FILE_NODE_SIZE];
        file.read_exact(&mut raw)?;

        let mut nodes = Vec::with_capacity(header.node_count as usize);
        for record in raw.chunks_exact(FILE_NODE_SIZE) {
            let node = FileNode::read_from(record)?;
            check_node_bounds(&node, &header, file_len)?;
            nodes.push(node);
        }
        let table = FileNodeTable::from_nodes(nodes)?;

        debug!(
            path = %path.display(),
            node_count = header.node_count,
            live = table.live_count(),
            "opened pack"
        );

        self.file = Some(file);
        self.path = path.to_path_buf();
        self.access = access;
        self.header = header;
        self.table = table;
        self.dirty = false;
        Ok(())
    }

    /// Add a loose file from disk under `name`
    pub fn add_file<P: AsRef<Path>>(
        &mut self,
        source: P,
        name: &str,
        compress_type: CompressType,
    ) -> Result<()> {
        let result = self.insert(name, Payload::Loose(source.as_ref(), compress_type));
        self.track(result)
    }

    /// Add in-memory data under `name`
    pub fn add_bytes(&mut self, name: &str, data: &[u8], compress_type: CompressType) -> Result<()> {
        let result = self.insert(name, Payload::Bytes(data, compress_type));
        self.track(result)
    }

    /// Add bytes that are already encoded. `template` supplies the real size
    /// and compression type; `stored` is written verbatim.
    pub fn add_raw(&mut self, name: &str, template: &FileNode, stored: &[u8]) -> Result<()> {
        let result = self.insert(
            name,
            Payload::Raw {
                stored,
                real_size: template.real_size,
                compress_type: template.compress_type,
            },
        );
        self.track(result)
    }

    fn insert(&mut self, name: &str, payload: Payload<'_>) -> Result<()> {
        let name = NodeName::new(name)?;
        self.ensure_writable()?;
        if self.table.is_empty() {
            return Err(PackError::CorruptTable("file list error".to_string()));
        }
        if self.table.find_by_name(name.as_str()).is_some() {
            return Err(PackError::Duplicate(name.to_string()));
        }
        if let Payload::Raw {
            stored,
            real_size,
            compress_type,
        } = &payload
        {
            check_raw_payload(&name, stored.len(), *real_size, *compress_type)?;
        }

        let mut rebuilt = false;
        let slot = loop {
            match self.table.first_empty_slot() {
                SlotLookup::Found(slot) => break slot,
                SlotLookup::Full if !rebuilt => {
                    self.rebuild()?;
                    rebuilt = true;
                }
                SlotLookup::Full => {
                    return Err(PackError::Rebuild(
                        "table still full after rebuild".to_string(),
                    ))
                }
                SlotLookup::NoTable => return Err(PackError::NotOpen),
            }
        };

        let file = self.file.as_mut().ok_or(PackError::NotOpen)?;
        let (real_size, compress_type, stored) = match payload {
            Payload::Bytes(data, compress_type) => {
                (data.len(), compress_type, self.codec.compress(data, compress_type)?)
            }
            Payload::Loose(source, compress_type) => {
                let (real_size, stored) = self.codec.compress_file(source, compress_type)?;
                (real_size, compress_type, stored)
            }
            Payload::Raw {
                stored,
                real_size,
                compress_type,
            } => (real_size as usize, compress_type, stored),
        };
        let real_size = u32::try_from(real_size).map_err(|_| PackError::TooLarge(real_size as u64))?;
        let compress_size = stored.len() as u32;
        let offset = append_payload(file, stored)?;

        self.table.mark_in_use(
            slot,
            FileNode {
                name,
                offset,
                real_size,
                compress_size,
                compress_type,
                use_flag: UseFlag::InUsing,
            },
        )?;
        self.dirty = true;

        debug!(slot, offset, real_size, compress_size, "added file to pack");
        Ok(())
    }

    /// Soft-delete a file. The slot is marked deleted and the payload stays
    /// in the pack until a rebuild.
    pub fn del_file(&mut self, name: &str) -> Result<()> {
        let result = self.del_file_inner(name);
        self.track(result)
    }

    fn del_file_inner(&mut self, name: &str) -> Result<()> {
        self.ensure_writable()?;
        let slot = self.table.mark_deleted(name)?;
        self.dirty = true;
        debug!(file = name, slot, "deleted file from pack");
        Ok(())
    }

    /// Overwrite the version string in memory and on disk immediately
    pub fn set_version(&mut self, version: &str) -> Result<()> {
        let result = self.set_version_inner(version);
        self.track(result)
    }

    fn set_version_inner(&mut self, version: &str) -> Result<()> {
        let field = version_field(version)?;
        self.ensure_writable()?;
        let file = self.file.as_mut().ok_or(PackError::NotOpen)?;
        file.seek(SeekFrom::Start(VERSION_OFFSET))?;
        file.write_all(&field)?;
        self.header.version = field;
        Ok(())
    }

    pub fn version(&self) -> String {
        self.header.version_string()
    }

    /// Write the table back if it changed, keeping the pack open
    pub fn flush(&mut self) -> Result<()> {
        let result = self.flush_inner();
        self.track(result)
    }

    fn flush_inner(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or(PackError::NotOpen)?;
        if !self.dirty {
            return Ok(());
        }

        file.seek(SeekFrom::Start(self.header.file_list_offset as u64))?;
        let mut writer = BufWriter::new(&mut *file);
        for node in self.table.nodes() {
            node.write_to(&mut writer)?;
        }
        writer.flush()?;
        drop(writer);
        file.sync_data()?;

        self.dirty = false;
        Ok(())
    }

    /// Flush the table if dirty and release the file handle. The handle is
    /// released even if the flush fails.
    pub fn close_file(&mut self) -> Result<()> {
        if self.file.is_none() {
            let result = Err(PackError::NotOpen);
            return self.track(result);
        }

        let result = self.flush_inner();
        self.file = None;
        self.header = PackHeader::default();
        self.table = FileNodeTable::default();
        self.dirty = false;
        debug!(path = %self.path.display(), "closed pack");
        self.track(result)
    }

    /// Decode a file into the internal output buffer and borrow it
    pub fn read_file(&mut self, name: &str) -> Result<&[u8]> {
        let result = self.decode(name);
        self.track(result)?;
        Ok(self.codec.output())
    }

    /// Decode a file into a new vector
    pub fn read_file_to_vec(&mut self, name: &str) -> Result<Vec<u8>> {
        self.read_file(name).map(<[u8]>::to_vec)
    }

    fn decode(&mut self, name: &str) -> Result<usize> {
        let file = self.file.as_mut().ok_or(PackError::NotOpen)?;
        let slot = self
            .table
            .find_by_name(name)
            .ok_or_else(|| PackError::NotFound(name.to_string()))?;
        let node = self
            .table
            .get(slot)
            .ok_or_else(|| PackError::CorruptTable(format!("slot {} out of range", slot)))?;
        self.codec.decompress(file, node)
    }

    /// Read the stored (still encoded) bytes of a file
    pub fn read_compressed(&mut self, name: &str) -> Result<Vec<u8>> {
        let result = self.read_compressed_inner(name);
        self.track(result)
    }

    fn read_compressed_inner(&mut self, name: &str) -> Result<Vec<u8>> {
        let file = self.file.as_mut().ok_or(PackError::NotOpen)?;
        let node = self
            .table
            .find_by_name(name)
            .and_then(|slot| self.table.get(slot))
            .ok_or_else(|| PackError::NotFound(name.to_string()))?;

        let mut stored = vec![0u8; node.compress_size as usize];
        file.seek(SeekFrom::Start(node.offset as u64))?;
        file.read_exact(&mut stored)?;
        Ok(stored)
    }

    pub fn is_file_exist(&self, name: &str) -> bool {
        self.table.find_by_name(name).is_some()
    }

    /// Metadata of a live file
    pub fn node(&self, name: &str) -> Option<&FileNode> {
        self.table.find_by_name(name).and_then(|slot| self.table.get(slot))
    }

    /// The whole table, every slot state included
    pub fn file_list(&self) -> &[FileNode] {
        self.table.nodes()
    }

    /// Live files in slot order
    pub fn live_files(&self) -> impl Iterator<Item = &FileNode> {
        self.table.live_nodes().map(|(_, node)| node)
    }

    pub fn live_count(&self) -> usize {
        self.table.live_count()
    }

    /// Number of table slots
    pub fn node_count(&self) -> u32 {
        self.header.node_count
    }

    pub fn file_list_offset(&self) -> u32 {
        self.header.file_list_offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn access(&self) -> AccessMode {
        self.access
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Message of the most recent failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Drop scratch buffers that grew past the high-water mark
    pub fn release_extra_memory(&mut self) {
        self.codec.release_extra_memory();
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.file.is_none() {
            return Err(PackError::NotOpen);
        }
        if self.access != AccessMode::ReadWrite {
            return Err(PackError::ReadOnly);
        }
        Ok(())
    }

    /// Remember the message of a failed call
    pub(super) fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }
}

impl Drop for ResourcePack {
    fn drop(&mut self) {
        if self.file.is_some() {
            if let Err(e) = self.close_file() {
                warn!(path = %self.path.display(), error = %e, "failed to close pack on drop");
            }
        }
    }
}

/// Append `stored` at the end of the pack and return its offset
fn append_payload(file: &mut File, stored: &[u8]) -> Result<u32> {
    let offset = file.seek(SeekFrom::End(0))?;
    let end = offset + stored.len() as u64;
    if end > u32::MAX as u64 {
        return Err(PackError::TooLarge(end));
    }
    file.write_all(stored)?;
    Ok(offset as u32)
}

/// Pre-encoded bytes stored uncompressed must be exactly `real_size` long
fn check_raw_payload(
    name: &NodeName,
    stored_len: usize,
    real_size: u32,
    compress_type: CompressType,
) -> Result<()> {
    let real_size = real_size as usize;
    if effective_type(real_size, compress_type) == CompressType::None && stored_len != real_size {
        return Err(PackError::Codec(format!(
            "{}: {} stored bytes for {} bytes of uncompressed data",
            name, stored_len, real_size
        )));
    }
    Ok(())
}

/// Used slots must point at payload, never into the header or the table
fn check_node_bounds(node: &FileNode, header: &PackHeader, file_len: u64) -> Result<()> {
    if node.use_flag == UseFlag::NotUsing {
        return Ok(());
    }

    let offset = node.offset as u64;
    let in_table = offset >= header.file_list_offset as u64 && offset < header.table_end();
    if offset < HEADER_SIZE as u64 || in_table || node.end() > file_len {
        return Err(PackError::CorruptTable(format!(
            "{}: payload [{}, {}) outside the payload region of a {} byte file",
            node.name,
            offset,
            node.end(),
            file_len
        )));
    }
    Ok(())
}
