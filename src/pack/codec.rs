//! Per-file compression with reusable scratch buffers
//!
//! Buffers grow on demand and are released once they exceed
//! [`SCRATCH_HIGH_WATER`], bounding the memory a long-lived pack retains.

use crate::error::{PackError, Result};
use crate::pack::format::{CompressType, FileNode, MIN_COMPRESS_SIZE};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Retained size above which scratch buffers are released
pub const SCRATCH_HIGH_WATER: usize = 1024 * 1024;

/// Zlib codec owning the raw, compressed, stored and output buffers
#[derive(Debug, Default)]
pub struct Codec {
    raw: Vec<u8>,
    compressed: Vec<u8>,
    stored: Vec<u8>,
    output: Vec<u8>,
}

impl Codec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `data` for storage. The returned slice is what goes on disk;
    /// its length is the node's `compress_size`.
    pub fn compress<'a>(&'a mut self, data: &'a [u8], compress_type: CompressType) -> Result<&'a [u8]> {
        match effective_type(data.len(), compress_type) {
            CompressType::None => Ok(data),
            CompressType::Zlib => {
                deflate_into(data, &mut self.compressed)?;
                Ok(self.compressed.as_slice())
            }
        }
    }

    /// Read a loose file into the raw buffer and encode it.
    /// Returns the real size and the stored bytes.
    pub fn compress_file(&mut self, path: &Path, compress_type: CompressType) -> Result<(usize, &[u8])> {
        let mut file = File::open(path)?;
        self.raw.clear();
        file.read_to_end(&mut self.raw)?;

        let real_size = self.raw.len();
        match effective_type(real_size, compress_type) {
            CompressType::None => Ok((real_size, self.raw.as_slice())),
            CompressType::Zlib => {
                deflate_into(&self.raw, &mut self.compressed)?;
                Ok((real_size, self.compressed.as_slice()))
            }
        }
    }

    /// Read the stored bytes of `node` from `source` and decode them into the
    /// output buffer. Returns the real size; the bytes are in [`output`](Self::output).
    pub fn decompress<R: Read + Seek>(&mut self, source: &mut R, node: &FileNode) -> Result<usize> {
        self.release_extra_memory();

        let real_size = node.real_size as usize;
        let stored_size = node.compress_size as usize;

        match effective_type(real_size, node.compress_type) {
            CompressType::None => {
                if stored_size != real_size {
                    return Err(PackError::CorruptTable(format!(
                        "{}: stored size {} differs from real size {} for uncompressed data",
                        node.name, stored_size, real_size
                    )));
                }
                self.output.clear();
                self.output.resize(real_size, 0);
                source.seek(SeekFrom::Start(node.offset as u64))?;
                source.read_exact(&mut self.output)?;
            }
            CompressType::Zlib => {
                self.stored.clear();
                self.stored.resize(stored_size, 0);
                source.seek(SeekFrom::Start(node.offset as u64))?;
                source.read_exact(&mut self.stored)?;

                // One spare byte exposes streams that inflate past real_size
                self.output.clear();
                self.output.resize(real_size + 1, 0);
                let produced = inflate_into(&self.stored, &mut self.output)?;
                if produced != real_size {
                    return Err(PackError::Codec(format!(
                        "{}: inflated {} bytes, expected {}",
                        node.name, produced, real_size
                    )));
                }
                self.output.truncate(real_size);

                if self.stored.capacity() > SCRATCH_HIGH_WATER {
                    self.stored = Vec::new();
                }
            }
        }

        Ok(real_size)
    }

    /// Output of the last successful [`decompress`](Self::decompress)
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Release every buffer that grew past the high-water mark
    pub fn release_extra_memory(&mut self) {
        for buf in [&mut self.raw, &mut self.stored, &mut self.output] {
            if buf.capacity() > SCRATCH_HIGH_WATER {
                *buf = Vec::new();
            }
        }
        // The compress buffer is sized from 2x the input; keep one at the mark
        if self.compressed.capacity() > 2 * SCRATCH_HIGH_WATER {
            self.compressed = Vec::new();
        }
    }

    /// Bytes currently held by all scratch buffers
    pub fn retained_bytes(&self) -> usize {
        self.raw.capacity() + self.compressed.capacity() + self.stored.capacity() + self.output.capacity()
    }
}

/// Tiny inputs are stored verbatim even when zlib is requested
/// Encoding actually applied to `real_size` bytes requested as `requested`
pub(super) fn effective_type(real_size: usize, requested: CompressType) -> CompressType {
    if requested == CompressType::Zlib && real_size < MIN_COMPRESS_SIZE {
        CompressType::None
    } else {
        requested
    }
}

fn deflate_into(data: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let wanted = (data.len() * 2).max(SCRATCH_HIGH_WATER);
    if out.capacity() < data.len() * 2 {
        *out = Vec::with_capacity(wanted);
    }
    out.clear();

    let mut encoder = Compress::new(Compression::fast(), true);
    let status = encoder
        .compress_vec(data, out, FlushCompress::Finish)
        .map_err(|e| PackError::Codec(format!("zlib compression failed: {}", e)))?;
    if status != Status::StreamEnd {
        return Err(PackError::Codec(format!(
            "zlib compression did not finish ({:?}) for {} bytes",
            status,
            data.len()
        )));
    }
    Ok(())
}

fn inflate_into(stored: &[u8], out: &mut [u8]) -> Result<usize> {
    let mut decoder = Decompress::new(true);
    let status = decoder
        .decompress(stored, out, FlushDecompress::Finish)
        .map_err(|e| PackError::Codec(format!("zlib decompression failed: {}", e)))?;
    if status != Status::StreamEnd {
        return Err(PackError::Codec(format!(
            "zlib stream incomplete ({:?})",
            status
        )));
    }
    Ok(decoder.total_out() as usize)
}
