// CLASSIFICATION: COMMUNITY
// Filename: shadow.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Shadow device records: one namespace's virtual view of one physical
//! framebuffer.
//!
//! A record owns the backing buffer that background drawing lands in, the
//! palette writes and mode-set queued while the namespace is in the
//! background, and the table of file handles it has been mapped through.
//! Records are created and looked up through [`FbMux`](crate::mux::FbMux);
//! the reference count here only decides when the multiplexer frees one.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::buffer::{BackingAllocator, BackingBuffer, SharedBuffer};
use crate::device::FramebufferDevice;
use crate::error::{FbNsError, FbResult};
use crate::fbns_types::{ColorRegister, FbOp, FixedInfo, NamespaceId, ScreenGeometry, SlotIndex};
use crate::mapping::{MappingTable, MappingTrackEntry};
use crate::ops::OpTable;

/// Mutable part of a shadow record, guarded by the record lock.
#[derive(Debug)]
pub(crate) struct ShadowState {
    pub(crate) active: bool,
    pub(crate) freed: bool,
    pub(crate) var: ScreenGeometry,
    pub(crate) pending_var: Option<ScreenGeometry>,
    pub(crate) colregs: Vec<ColorRegister>,
    pub(crate) mappings: MappingTable,
    pub(crate) backing: Option<BackingBuffer>,
}

impl ShadowState {
    /// Buffer user mappings should see right now.
    pub(crate) fn current_buffer(&self, device: &dyn FramebufferDevice) -> Option<SharedBuffer> {
        if self.active {
            device.screen()
        } else {
            self.backing.as_ref().map(|b| b.buffer().clone())
        }
    }

    pub(crate) fn queue_colreg(&mut self, reg: ColorRegister) -> FbResult<()> {
        self.colregs.try_reserve(1).map_err(|_| FbNsError::OutOfMemory {
            what: "pending color register",
        })?;
        self.colregs.push(reg);
        Ok(())
    }

    pub(crate) fn ensure_live(&self, ns: NamespaceId, slot: SlotIndex) -> FbResult<()> {
        if self.freed {
            Err(FbNsError::InvalidState(format!(
                "shadow {slot} of {ns} has been torn down"
            )))
        } else {
            Ok(())
        }
    }
}

/// One namespace's virtual framebuffer.
pub struct ShadowDevice {
    ns: NamespaceId,
    slot: SlotIndex,
    device: Arc<dyn FramebufferDevice>,
    fix: FixedInfo,
    ops: OpTable,
    refcount: AtomicUsize,
    ignored: AtomicU64,
    state: Mutex<ShadowState>,
}

impl std::fmt::Debug for ShadowDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShadowDevice")
            .field("ns", &self.ns)
            .field("slot", &self.slot)
            .field("refcount", &self.refcount())
            .field("fix", &self.fix)
            .finish()
    }
}

impl ShadowDevice {
    /// Build a record for `device` in `ns`, allocating its backing buffer.
    ///
    /// Nothing is retained if the allocation fails.
    pub(crate) fn create(
        ns: NamespaceId,
        device: Arc<dyn FramebufferDevice>,
        allocator: &BackingAllocator,
        active: bool,
    ) -> FbResult<Self> {
        let hw_fix = device.fix();
        let slot = device.slot();
        let vlen = hw_fix.smem_len;
        let backing = if vlen > 0 {
            Some(allocator.allocate(vlen)?)
        } else {
            None
        };
        let fix = FixedInfo {
            id: hw_fix.id.clone(),
            smem_start: backing.as_ref().map_or(0, |b| b.buffer().id() << 32),
            smem_len: vlen,
            line_length: hw_fix.line_length,
        };
        info!(
            "new shadow {} ({}) size {:#x} for {} ({})",
            slot,
            hw_fix.id,
            vlen,
            ns,
            if active { "active" } else { "background" }
        );
        Ok(Self {
            ns,
            slot,
            ops: OpTable::for_caps(device.caps()),
            state: Mutex::new(ShadowState {
                active,
                freed: false,
                var: device.var(),
                pending_var: None,
                colregs: Vec::new(),
                mappings: MappingTable::new(),
                backing,
            }),
            device,
            fix,
            refcount: AtomicUsize::new(0),
            ignored: AtomicU64::new(0),
        })
    }

    pub fn namespace(&self) -> NamespaceId {
        self.ns
    }

    pub fn slot(&self) -> SlotIndex {
        self.slot
    }

    /// The physical device this record shadows.
    pub fn device(&self) -> &Arc<dyn FramebufferDevice> {
        &self.device
    }

    /// Fixed parameters of the virtual device; the buffer is the backing one.
    pub fn fix(&self) -> &FixedInfo {
        &self.fix
    }

    pub fn op_table(&self) -> &OpTable {
        &self.ops
    }

    pub fn refcount(&self) -> usize {
        self.refcount.load(Ordering::Acquire)
    }

    pub(crate) fn get(&self) -> usize {
        self.refcount.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop a reference unless it is the last one.
    pub(crate) fn put_unless_last(&self) -> bool {
        self.refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                (c > 1).then(|| c - 1)
            })
            .is_ok()
    }

    /// Drop a reference, returning how many remain.
    ///
    /// # Panics
    /// If the record holds no references.
    pub(crate) fn put(&self) -> usize {
        match self
            .refcount
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => self.unreferenced(),
        }
    }

    /// Panic if the record holds no references.
    pub(crate) fn assert_referenced(&self) {
        if self.refcount() == 0 {
            self.unreferenced();
        }
    }

    fn unreferenced(&self) -> ! {
        panic!(
            "release of shadow {} in {} with no outstanding references",
            self.slot, self.ns
        )
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ShadowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Release the backing buffer and queued state. Idempotent.
    pub(crate) fn free(&self) -> bool {
        let mut state = self.lock();
        if state.freed {
            return false;
        }
        state.freed = true;
        state.backing = None;
        state.colregs = Vec::new();
        state.pending_var = None;
        state.mappings.clear();
        info!("del shadow {} of {}", self.slot, self.ns);
        true
    }

    pub(crate) fn note_ignored(&self, op: FbOp) {
        let n = self.ignored.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("{} on {} of {} accepted without effect ({n} so far)", op, self.slot, self.ns);
    }

    /// Number of calls accepted but not carried out (colormap, cursor,
    /// rotate, ioctl while in the background).
    pub fn ignored_ops(&self) -> u64 {
        self.ignored.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn is_freed(&self) -> bool {
        self.lock().freed
    }

    /// Current virtual geometry.
    pub fn var(&self) -> ScreenGeometry {
        self.lock().var
    }

    /// Mode-set waiting for activation, if any.
    pub fn pending_var(&self) -> Option<ScreenGeometry> {
        self.lock().pending_var
    }

    /// Palette writes waiting for activation, oldest first.
    pub fn pending_colregs(&self) -> Vec<ColorRegister> {
        self.lock().colregs.clone()
    }

    pub fn tracked(&self) -> Vec<MappingTrackEntry> {
        self.lock().mappings.entries().to_vec()
    }

    pub fn backing(&self) -> Option<SharedBuffer> {
        self.lock().backing.as_ref().map(|b| b.buffer().clone())
    }

    /// Buffer that reads, writes and new mappings go to right now.
    pub fn current_buffer(&self) -> Option<SharedBuffer> {
        self.lock().current_buffer(self.device.as_ref())
    }
}
