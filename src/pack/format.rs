use crate::error::{PackError, Result};
use std::fmt;
use std::io::{Read, Write};

/// Smallest table a pack can be created with
pub const MIN_FILE_NODE_NUM: u32 = 50;

/// Largest table a pack can grow to
pub const MAX_FILE_NODE_NUM: u32 = 20000;

/// Size of the fixed name field, terminator included
pub const NAME_FIELD_SIZE: usize = 64;

/// Longest name that fits the name field
pub const MAX_NAME_LENGTH: usize = NAME_FIELD_SIZE - 1;

/// Size of the fixed version field
pub const VERSION_FIELD_SIZE: usize = 64;

/// Header size in bytes: file list offset, node count, version
pub const HEADER_SIZE: usize = 4 + 4 + VERSION_FIELD_SIZE;

/// Byte position of the version field inside the header
pub const VERSION_OFFSET: u64 = 8;

/// On-disk size of one file node record (78 bytes of fields, 2 of padding)
pub const FILE_NODE_SIZE: usize = 80;

/// Inputs shorter than this are stored verbatim even when zlib is requested
pub const MIN_COMPRESS_SIZE: usize = 8;

/// Compression applied to one stored file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressType {
    #[default]
    None = 0,
    Zlib = 1,
}

impl CompressType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Zlib),
            _ => Err(PackError::InvalidCompressType(value)),
        }
    }
}

/// Slot state of a file node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum UseFlag {
    #[default]
    NotUsing = 0,
    InUsing = 1,
    Deleted = 2,
}

impl UseFlag {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::NotUsing),
            1 => Ok(Self::InUsing),
            2 => Ok(Self::Deleted),
            _ => Err(PackError::InvalidUseFlag(value)),
        }
    }
}

/// A file name validated to fit the fixed 64-byte name field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodeName(String);

impl NodeName {
    /// Validate a caller-supplied name. Names are never truncated.
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(PackError::InvalidName("name is empty".to_string()));
        }
        if name.contains('\0') {
            return Err(PackError::InvalidName(format!(
                "{:?} contains a NUL byte",
                name
            )));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(PackError::NameTooLong {
                name: name.to_string(),
                len: name.len(),
                max: MAX_NAME_LENGTH,
            });
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_field(&self) -> [u8; NAME_FIELD_SIZE] {
        let mut field = [0u8; NAME_FIELD_SIZE];
        field[..self.0.len()].copy_from_slice(self.0.as_bytes());
        field
    }

    fn from_field(field: &[u8; NAME_FIELD_SIZE]) -> Result<Self> {
        let end = field.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_SIZE);
        if end == NAME_FIELD_SIZE {
            return Err(PackError::CorruptTable(
                "file name is not terminated".to_string(),
            ));
        }
        let name = std::str::from_utf8(&field[..end]).map_err(|e| {
            PackError::CorruptTable(format!("Invalid UTF-8 in file name: {}", e))
        })?;
        Ok(Self(name.to_string()))
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encode a version string into the fixed version field
pub fn version_field(version: &str) -> Result<[u8; VERSION_FIELD_SIZE]> {
    if version.len() >= VERSION_FIELD_SIZE || version.contains('\0') {
        return Err(PackError::VersionTooLong {
            len: version.len(),
            max: VERSION_FIELD_SIZE - 1,
        });
    }
    let mut field = [0u8; VERSION_FIELD_SIZE];
    field[..version.len()].copy_from_slice(version.as_bytes());
    Ok(field)
}

/// Decode the version field, stopping at the first NUL
pub fn version_str(field: &[u8; VERSION_FIELD_SIZE]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(VERSION_FIELD_SIZE);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Pack header at the beginning of the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackHeader {
    pub file_list_offset: u32,
    pub node_count: u32,
    pub version: [u8; VERSION_FIELD_SIZE],
}

impl PackHeader {
    /// Header of a freshly created pack whose table directly follows the header
    pub fn new(node_count: u32) -> Self {
        Self {
            file_list_offset: HEADER_SIZE as u32,
            node_count,
            version: [0u8; VERSION_FIELD_SIZE],
        }
    }

    pub fn version_string(&self) -> String {
        version_str(&self.version)
    }

    /// First byte after the file table
    pub fn table_end(&self) -> u64 {
        self.file_list_offset as u64 + self.node_count as u64 * FILE_NODE_SIZE as u64
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.file_list_offset.to_le_bytes())?;
        writer.write_all(&self.node_count.to_le_bytes())?;
        writer.write_all(&self.version)?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let file_list_offset = read_u32(&mut reader)?;
        let node_count = read_u32(&mut reader)?;
        let mut version = [0u8; VERSION_FIELD_SIZE];
        reader.read_exact(&mut version)?;

        Ok(Self {
            file_list_offset,
            node_count,
            version,
        })
    }

    /// Bounds checks performed before the table is trusted
    pub fn validate(&self) -> Result<()> {
        if self.file_list_offset == 0 {
            return Err(PackError::CorruptTable(
                "file list offset is zero".to_string(),
            ));
        }
        if (self.file_list_offset as usize) < HEADER_SIZE {
            return Err(PackError::CorruptTable(format!(
                "file list offset {} overlaps the header",
                self.file_list_offset
            )));
        }
        if !(MIN_FILE_NODE_NUM..=MAX_FILE_NODE_NUM).contains(&self.node_count) {
            return Err(PackError::CorruptTable(format!(
                "node count {} outside [{}, {}]",
                self.node_count, MIN_FILE_NODE_NUM, MAX_FILE_NODE_NUM
            )));
        }
        Ok(())
    }
}

impl Default for PackHeader {
    fn default() -> Self {
        Self {
            file_list_offset: 0,
            node_count: 0,
            version: [0u8; VERSION_FIELD_SIZE],
        }
    }
}

/// Metadata record describing one stored file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileNode {
    pub name: NodeName,
    pub offset: u32,
    pub real_size: u32,
    pub compress_size: u32,
    pub compress_type: CompressType,
    pub use_flag: UseFlag,
}

impl FileNode {
    pub fn is_live(&self) -> bool {
        self.use_flag == UseFlag::InUsing
    }

    /// One past the last stored byte
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.compress_size as u64
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.name.to_field())?;
        writer.write_all(&self.offset.to_le_bytes())?;
        writer.write_all(&self.real_size.to_le_bytes())?;
        writer.write_all(&self.compress_size.to_le_bytes())?;
        writer.write_all(&[self.compress_type as u8, self.use_flag as u8])?;
        writer.write_all(&[0u8; 2])?;
        Ok(())
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut raw = [0u8; FILE_NODE_SIZE];
        reader.read_exact(&mut raw)?;
        Self::decode(&raw)
    }

    fn decode(raw: &[u8; FILE_NODE_SIZE]) -> Result<Self> {
        let mut name_field = [0u8; NAME_FIELD_SIZE];
        name_field.copy_from_slice(&raw[..NAME_FIELD_SIZE]);

        let use_flag = UseFlag::from_u8(raw[77])?;
        let name = match use_flag {
            UseFlag::NotUsing => NodeName::default(),
            _ => NodeName::from_field(&name_field)?,
        };
        if use_flag != UseFlag::NotUsing && name.is_empty() {
            return Err(PackError::CorruptTable(
                "used slot has an empty name".to_string(),
            ));
        }

        Ok(Self {
            name,
            offset: le_u32(&raw[64..68]),
            real_size: le_u32(&raw[68..72]),
            compress_size: le_u32(&raw[72..76]),
            compress_type: CompressType::from_u8(raw[76])?,
            use_flag,
        })
    }
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u32<R: Read>(mut reader: R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
