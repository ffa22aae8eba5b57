use std::io;
use thiserror::Error;

/// Result type for pack operations
pub type Result<T> = std::result::Result<T, PackError>;

/// Result type for archive and manager operations
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

/// Errors raised by the resource pack layer
#[derive(Debug, Error)]
pub enum PackError {
    // Lifecycle errors
    #[error("Pack is not open")]
    NotOpen,

    #[error("Pack already holds an open file handle")]
    AlreadyOpen,

    #[error("Pack file already exists: {0}")]
    AlreadyExists(String),

    #[error("Pack was opened read-only")]
    ReadOnly,

    // Name and version validation
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("[{name}] is too long ({len} bytes, max {max})")]
    NameTooLong { name: String, len: usize, max: usize },

    #[error("Version string too long ({len} bytes, max {max})")]
    VersionTooLong { len: usize, max: usize },

    // Table errors
    #[error("File already exists in pack: {0}")]
    Duplicate(String),

    #[error("File not found in pack: {0}")]
    NotFound(String),

    #[error("Corrupted file table: {0}")]
    CorruptTable(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompressType(u8),

    #[error("Invalid use flag: {0}")]
    InvalidUseFlag(u8),

    // Payload errors
    #[error("Codec failure: {0}")]
    Codec(String),

    #[error("Rebuild failed: {0}")]
    Rebuild(String),

    #[error("Pack would exceed 4 GiB addressable size ({0} bytes)")]
    TooLarge(u64),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by archives and the archive manager
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Pack error: {0}")]
    Pack(#[from] PackError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive is not loaded: {0}")]
    NotLoaded(String),

    #[error("Operation not supported by {archive_type} archive: {operation}")]
    Unsupported {
        archive_type: String,
        operation: &'static str,
    },

    #[error("No archive factory registered for type: {0}")]
    UnknownArchiveType(String),

    #[error("No archive factory for type {archive_type} while destroying archive {name}")]
    FactoryMissing { name: String, archive_type: String },

    #[error("Archive not registered: {0}")]
    UnknownArchive(String),

    #[error("External archive error: {0}")]
    External(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for ArchiveError {
    fn from(err: toml::de::Error) -> Self {
        ArchiveError::Config(err.to_string())
    }
}

impl From<walkdir::Error> for ArchiveError {
    fn from(err: walkdir::Error) -> Self {
        ArchiveError::Io(err.into())
    }
}
