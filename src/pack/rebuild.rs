//! Pack compaction: grows the file table by rewriting the pack
//!
//! The payload heap is copied byte for byte, deleted payload included; only
//! table capacity is gained. The rebuilt pack is staged next to the original
//! as `<file>.new` and swapped in only after it is complete.

use crate::error::{PackError, Result};
use crate::pack::format::{HEADER_SIZE, MAX_FILE_NODE_NUM};
use crate::pack::resource_pack::{AccessMode, ResourcePack};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Table size past which growth switches from doubling to fixed steps
pub const DOUBLING_LIMIT: u32 = 10000;

/// Fixed growth step for large tables
pub const GROWTH_STEP: u32 = 2000;

/// Next table size for a pack whose table of `current` slots is full
pub fn next_table_size(current: u32) -> u32 {
    let grown = if current.saturating_mul(2) > DOUBLING_LIMIT {
        current.saturating_add(GROWTH_STEP)
    } else {
        current * 2
    };
    grown.min(MAX_FILE_NODE_NUM)
}

/// `path` with `suffix` appended to its file name
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

impl ResourcePack {
    /// Grow the table of the open pack. The pack is open again afterwards,
    /// whether the rebuild succeeded or not.
    pub(super) fn rebuild(&mut self) -> Result<()> {
        if self.file.is_none() {
            return Err(PackError::NotOpen);
        }

        let old_count = self.header.node_count;
        let new_count = next_table_size(old_count);
        if new_count <= old_count {
            return Err(PackError::Rebuild(format!(
                "table already at maximum capacity ({} slots)",
                old_count
            )));
        }

        let original = self.path.clone();
        let access = self.access;
        let staged = sibling_path(&original, "new");
        info!(
            path = %original.display(),
            old_count,
            new_count,
            "rebuilding pack"
        );

        if let Err(e) = self.build_staged(&original, &staged, new_count) {
            let _ = fs::remove_file(&staged);
            self.recover(&original, access);
            return Err(PackError::Rebuild(format!(
                "staging {} failed: {}",
                staged.display(),
                e
            )));
        }

        self.swap_in(&original, &staged, access)
    }

    /// Write the grown copy of this pack to `staged`. Closes this pack.
    fn build_staged(&mut self, original: &Path, staged: &Path, new_count: u32) -> Result<()> {
        if staged.exists() {
            fs::remove_file(staged)?;
        }

        let mut rebuilt = ResourcePack::new();
        rebuilt.create_file(staged, new_count)?;
        rebuilt.open_file(staged, AccessMode::ReadWrite)?;
        rebuilt.set_version(&self.version())?;

        // Payload a producer placed between the header and the table moves
        // behind the new table, ahead of the payload that followed the old one
        let list_offset = self.header.file_list_offset as u64;
        let leading = list_offset - HEADER_SIZE as u64;
        let old_payload = self.header.table_end();
        let new_payload = rebuilt.header.table_end();

        let file_len = self.file.as_ref().ok_or(PackError::NotOpen)?.metadata()?.len();
        let new_len = new_payload + leading + (file_len - old_payload);
        if new_len > u32::MAX as u64 {
            return Err(PackError::TooLarge(new_len));
        }

        let relocate = |offset: u32| -> u32 {
            let offset = offset as u64;
            let moved = if offset < list_offset {
                offset - HEADER_SIZE as u64 + new_payload
            } else {
                offset - old_payload + new_payload + leading
            };
            moved as u32
        };
        rebuilt.table.copy_from(self.table.nodes(), relocate)?;
        rebuilt.dirty = true;

        self.close_file()?;

        let mut source = File::open(original)?;
        let target = rebuilt.file.as_mut().ok_or(PackError::NotOpen)?;
        target.seek(SeekFrom::Start(new_payload))?;
        if leading > 0 {
            source.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
            io::copy(&mut (&mut source).take(leading), target)?;
        }
        source.seek(SeekFrom::Start(old_payload))?;
        let copied = io::copy(&mut source, target)?;
        if copied != file_len - old_payload {
            return Err(PackError::Rebuild(format!(
                "copied {} payload bytes, expected {}",
                copied,
                file_len - old_payload
            )));
        }

        rebuilt.close_file()
    }

    /// Move the original aside, put the staged pack in its place and reopen.
    /// The original is restored if the staged pack cannot be opened.
    fn swap_in(&mut self, original: &Path, staged: &Path, access: AccessMode) -> Result<()> {
        let backup = sibling_path(original, "old");
        if backup.exists() {
            warn!(path = %backup.display(), "removing stale pre-rebuild pack");
            if let Err(e) = fs::remove_file(&backup) {
                let _ = fs::remove_file(staged);
                self.recover(original, access);
                return Err(PackError::Rebuild(format!(
                    "remove stale {} failed: {}",
                    backup.display(),
                    e
                )));
            }
        }

        if let Err(e) = fs::rename(original, &backup) {
            let _ = fs::remove_file(staged);
            self.recover(original, access);
            return Err(PackError::Rebuild(format!(
                "move old pack aside failed: {}",
                e
            )));
        }

        if let Err(e) = fs::rename(staged, original) {
            self.restore_backup(original, &backup, access);
            return Err(PackError::Rebuild(format!(
                "rename rebuilt pack failed: {}",
                e
            )));
        }

        if let Err(e) = self.open_file(original, access) {
            let _ = fs::remove_file(original);
            self.restore_backup(original, &backup, access);
            return Err(PackError::Rebuild(format!(
                "open rebuilt pack failed: {}",
                e
            )));
        }

        if let Err(e) = fs::remove_file(&backup) {
            warn!(path = %backup.display(), error = %e, "failed to remove pre-rebuild pack");
        }
        info!(path = %original.display(), node_count = self.header.node_count, "pack rebuilt");
        Ok(())
    }

    fn restore_backup(&mut self, original: &Path, backup: &Path, access: AccessMode) {
        if let Err(e) = fs::rename(backup, original) {
            error!(
                original = %original.display(),
                backup = %backup.display(),
                error = %e,
                "failed to restore pack after rebuild failure"
            );
            return;
        }
        self.recover(original, access);
    }

    /// Reopen the original pack after a failed rebuild
    fn recover(&mut self, original: &Path, access: AccessMode) {
        if self.file.is_some() {
            return;
        }
        if let Err(e) = self.open_file(original, access) {
            error!(path = %original.display(), error = %e, "failed to reopen pack after rebuild failure");
        }
    }
}
