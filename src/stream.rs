//! Byte streams handed out by archives

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

/// A readable, seekable stream over one archived file
pub trait DataStream: Read + Seek + Send {
    /// Name of the file the stream was opened for
    fn name(&self) -> &str;

    /// Total size in bytes
    fn size(&self) -> u64;

    /// Read the remaining bytes into a vector
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.read_to_end(&mut data)?;
        Ok(data)
    }
}

/// Stream over decoded bytes held in memory
#[derive(Debug)]
pub struct MemoryDataStream {
    name: String,
    cursor: Cursor<Vec<u8>>,
}

impl MemoryDataStream {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            cursor: Cursor::new(data),
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Read for MemoryDataStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryDataStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl DataStream for MemoryDataStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }
}

/// Stream over a loose file on disk
#[derive(Debug)]
pub struct FileDataStream {
    name: String,
    file: File,
    size: u64,
}

impl FileDataStream {
    pub fn open(name: impl Into<String>, path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            name: name.into(),
            file,
            size,
        })
    }
}

impl Read for FileDataStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileDataStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl DataStream for FileDataStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }
}
