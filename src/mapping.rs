// CLASSIFICATION: COMMUNITY
// Filename: mapping.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Tracks the file handles through which a shadow framebuffer has been
//! memory-mapped, so a context switch can find every live mapping.
//! More than one handle per record is rare.

use log::debug;

use crate::error::{FbNsError, FbResult};
use crate::fbns_types::FileHandle;

/// One tracked file handle and the number of live mappings through it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappingTrackEntry {
    pub file: FileHandle,
    pub count: usize,
}

/// Per-record table of mapped file handles.
#[derive(Debug, Default)]
pub struct MappingTable {
    entries: Vec<MappingTrackEntry>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more mapping through `file`. Returns the new count.
    pub fn track(&mut self, file: FileHandle) -> FbResult<usize> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.file == file) {
            entry.count += 1;
            return Ok(entry.count);
        }
        self.entries
            .try_reserve(1)
            .map_err(|_| FbNsError::OutOfMemory {
                what: "mapping table entry",
            })?;
        debug!("mapping table grows to {} entries", self.entries.len() + 1);
        self.entries.push(MappingTrackEntry { file, count: 1 });
        Ok(1)
    }

    /// Drop one mapping through `file`. Returns the remaining count.
    ///
    /// # Panics
    /// If `file` was never tracked: every mapping path tracks before it
    /// can untrack.
    pub fn untrack(&mut self, file: FileHandle) -> usize {
        let pos = match self.entries.iter().position(|e| e.file == file) {
            Some(pos) => pos,
            None => panic!("untrack of {file} which is not tracked"),
        };
        let entry = &mut self.entries[pos];
        entry.count -= 1;
        let remaining = entry.count;
        if remaining == 0 {
            self.entries.swap_remove(pos);
            debug!("mapping table drops {file}, {} left", self.entries.len());
        }
        remaining
    }

    /// Use count for `file`, if tracked.
    pub fn count(&self, file: FileHandle) -> Option<usize> {
        self.entries.iter().find(|e| e.file == file).map(|e| e.count)
    }

    /// Snapshot of tracked handles for one remap pass.
    pub fn enumerate(&self) -> Vec<FileHandle> {
        self.entries.iter().map(|e| e.file).collect()
    }

    pub fn entries(&self) -> &[MappingTrackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
