// CLASSIFICATION: COMMUNITY
// Filename: vm.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Boundary to the host virtual-memory subsystem.
//!
//! [`VmHost`] is what the multiplexer needs from the host: install and
//! remove a mapping, enumerate the mappings made through a file handle, and
//! retarget one mapping at a different buffer. [`SimulatedVm`] implements
//! it in-process with one lock per address space.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::debug;

use crate::buffer::SharedBuffer;
use crate::error::Errno;
use crate::fbns_types::{AddressSpaceId, FileHandle, PAGE_SIZE};

/// One user-space mapping of a framebuffer file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappingRegion {
    pub space: AddressSpaceId,
    pub start: usize,
    pub len: usize,
    /// Offset into the framebuffer, in pages.
    pub pgoff: usize,
    pub file: FileHandle,
}

impl MappingRegion {
    pub fn new(space: AddressSpaceId, start: usize, len: usize, file: FileHandle) -> Self {
        Self {
            space,
            start,
            len,
            pgoff: 0,
            file,
        }
    }

    /// Byte offset into the framebuffer, `None` if `pgoff` overflows.
    pub fn offset(&self) -> Option<usize> {
        self.pgoff.checked_mul(PAGE_SIZE)
    }

    /// Byte offset of the end of the mapped range, `None` on overflow.
    pub fn offset_end(&self) -> Option<usize> {
        self.offset()?.checked_add(self.len)
    }

    pub fn end(&self) -> usize {
        self.start.saturating_add(self.len)
    }

    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end()
    }
}

/// What a mapping points at.
#[derive(Clone, Debug)]
pub struct BufferSource {
    pub buffer: SharedBuffer,
    pub offset: usize,
}

/// Host virtual-memory services used by the multiplexer.
pub trait VmHost: Send + Sync {
    /// Install a new mapping backed by `source`.
    fn install_mapping(&self, region: &MappingRegion, source: BufferSource) -> Result<(), Errno>;

    /// The mapping starting at `start` in `space`, if any.
    fn find_mapping(&self, space: AddressSpaceId, start: usize) -> Option<MappingRegion>;

    /// Remove the mapping starting at `start` in `space`.
    fn remove_mapping(&self, space: AddressSpaceId, start: usize) -> Result<MappingRegion, Errno>;

    /// Every live mapping made through `file`.
    fn enumerate_mappings(&self, file: FileHandle) -> Vec<MappingRegion>;

    /// Point an existing mapping at `source` in one step.
    fn replace_mapping(&self, region: &MappingRegion, source: BufferSource) -> Result<(), Errno>;
}

struct Vma {
    region: MappingRegion,
    source: BufferSource,
}

#[derive(Default)]
struct AddressSpace {
    vmas: Vec<Vma>,
}

impl AddressSpace {
    fn find(&self, addr: usize) -> Option<&Vma> {
        self.vmas.iter().find(|v| v.region.contains(addr))
    }
}

/// In-process address spaces backed by [`SharedBuffer`]s.
///
/// Replacing a mapping swaps its source under the address-space lock, so
/// readers never observe the mapping absent.
#[derive(Default)]
pub struct SimulatedVm {
    spaces: RwLock<HashMap<AddressSpaceId, Arc<Mutex<AddressSpace>>>>,
    failing: Mutex<HashSet<(AddressSpaceId, usize)>>,
}

impl SimulatedVm {
    pub fn new() -> Self {
        Self::default()
    }

    fn space(&self, id: AddressSpaceId) -> Option<Arc<Mutex<AddressSpace>>> {
        self.spaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn space_or_create(&self, id: AddressSpaceId) -> Arc<Mutex<AddressSpace>> {
        if let Some(space) = self.space(id) {
            return space;
        }
        let mut spaces = self.spaces.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(spaces.entry(id).or_default())
    }

    /// Read `len` bytes at user address `addr` of `space`.
    pub fn read(&self, space: AddressSpaceId, addr: usize, len: usize) -> Result<Vec<u8>, Errno> {
        let mm = self.space(space).ok_or(Errno::EFAULT)?;
        let mm = mm.lock().unwrap_or_else(PoisonError::into_inner);
        let vma = mm.find(addr).ok_or(Errno::EFAULT)?;
        if addr.checked_add(len).map_or(true, |end| end > vma.region.end()) {
            return Err(Errno::EFAULT);
        }
        let mut out = vec![0u8; len];
        let at = vma.source.offset + (addr - vma.region.start);
        vma.source.buffer.read_at(at, &mut out);
        Ok(out)
    }

    /// Write `data` at user address `addr` of `space`.
    pub fn write(&self, space: AddressSpaceId, addr: usize, data: &[u8]) -> Result<(), Errno> {
        let mm = self.space(space).ok_or(Errno::EFAULT)?;
        let mm = mm.lock().unwrap_or_else(PoisonError::into_inner);
        let vma = mm.find(addr).ok_or(Errno::EFAULT)?;
        if addr
            .checked_add(data.len())
            .map_or(true, |end| end > vma.region.end())
        {
            return Err(Errno::EFAULT);
        }
        let at = vma.source.offset + (addr - vma.region.start);
        vma.source.buffer.write_at(at, data);
        Ok(())
    }

    /// Buffer currently behind the mapping containing `addr`.
    pub fn backing_of(&self, space: AddressSpaceId, addr: usize) -> Option<SharedBuffer> {
        let mm = self.space(space)?;
        let mm = mm.lock().unwrap_or_else(PoisonError::into_inner);
        mm.find(addr).map(|v| v.source.buffer.clone())
    }

    /// Make the next replacement of the mapping at `start` fail.
    pub fn fail_next_replace(&self, space: AddressSpaceId, start: usize) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((space, start));
    }
}

impl VmHost for SimulatedVm {
    fn install_mapping(&self, region: &MappingRegion, source: BufferSource) -> Result<(), Errno> {
        let mm = self.space_or_create(region.space);
        let mut mm = mm.lock().unwrap_or_else(PoisonError::into_inner);
        let overlaps = mm
            .vmas
            .iter()
            .any(|v| region.start < v.region.end() && v.region.start < region.end());
        if overlaps || region.len == 0 {
            return Err(Errno::EINVAL);
        }
        debug!(
            "install {} [{:#x}, {:#x}) -> buffer {}",
            region.space,
            region.start,
            region.end(),
            source.buffer.id()
        );
        mm.vmas.push(Vma {
            region: *region,
            source,
        });
        Ok(())
    }

    fn find_mapping(&self, space: AddressSpaceId, start: usize) -> Option<MappingRegion> {
        let mm = self.space(space)?;
        let mm = mm.lock().unwrap_or_else(PoisonError::into_inner);
        mm.vmas
            .iter()
            .find(|v| v.region.start == start)
            .map(|v| v.region)
    }

    fn remove_mapping(&self, space: AddressSpaceId, start: usize) -> Result<MappingRegion, Errno> {
        let mm = self.space(space).ok_or(Errno::EINVAL)?;
        let mut mm = mm.lock().unwrap_or_else(PoisonError::into_inner);
        let pos = mm
            .vmas
            .iter()
            .position(|v| v.region.start == start)
            .ok_or(Errno::EINVAL)?;
        Ok(mm.vmas.remove(pos).region)
    }

    fn enumerate_mappings(&self, file: FileHandle) -> Vec<MappingRegion> {
        let spaces: Vec<_> = self
            .spaces
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut found = Vec::new();
        for mm in spaces {
            let mm = mm.lock().unwrap_or_else(PoisonError::into_inner);
            found.extend(
                mm.vmas
                    .iter()
                    .filter(|v| v.region.file == file)
                    .map(|v| v.region),
            );
        }
        found
    }

    fn replace_mapping(&self, region: &MappingRegion, source: BufferSource) -> Result<(), Errno> {
        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(region.space, region.start))
        {
            return Err(Errno::EAGAIN);
        }
        let mm = self.space(region.space).ok_or(Errno::EFAULT)?;
        let mut mm = mm.lock().unwrap_or_else(PoisonError::into_inner);
        let vma = mm
            .vmas
            .iter_mut()
            .find(|v| v.region.start == region.start && v.region.file == region.file)
            .ok_or(Errno::EFAULT)?;
        debug!(
            "remap {} [{:#x}, {:#x}) buffer {} -> {}",
            region.space,
            region.start,
            region.end(),
            vma.source.buffer.id(),
            source.buffer.id()
        );
        vma.source = source;
        Ok(())
    }
}
