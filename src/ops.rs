// CLASSIFICATION: COMMUNITY
// Filename: ops.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Operation interceptor for shadow devices.
//!
//! Every call on a shadow goes through [`ShadowOps`], which looks up the
//! record's [`OpTable`] and either forwards to the physical driver, queues
//! the change until the namespace is activated, or accepts the call without
//! effect and counts it.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::buffer::SharedBuffer;
use crate::device::{FbCaps, FbOps, FramebufferDevice};
use crate::diag;
use crate::error::{FbNsError, FbResult};
use crate::fbns_types::{
    AddressSpaceId, BlitCaps, ColorMap, ColorRegister, CursorState, FbOp, ScreenGeometry,
};
use crate::mux::FbMux;
use crate::shadow::ShadowDevice;
use crate::vm::{BufferSource, MappingRegion};

/// How a shadow handles one operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpPolicy {
    /// Always handled by the physical driver.
    PassThrough,
    /// Forwarded while active, stored on the record and replayed on
    /// activation otherwise.
    QueueWhileInactive,
    /// Forwarded while active, accepted without effect otherwise.
    Unsupported,
    /// Maps whichever buffer is current for the namespace.
    MapCurrent,
    /// The driver does not implement the operation.
    Absent,
    /// Lifecycle entry points owned by acquire/release.
    Forbidden,
}

/// Per-record dispatch table, fixed when the record is created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpTable {
    policies: [OpPolicy; FbOp::ALL.len()],
}

impl OpTable {
    pub fn for_caps(caps: FbCaps) -> Self {
        Self {
            policies: FbOp::ALL.map(|op| Self::select(op, caps)),
        }
    }

    fn select(op: FbOp, caps: FbCaps) -> OpPolicy {
        if !caps.provides(op) {
            return OpPolicy::Absent;
        }
        match op {
            FbOp::Open | FbOp::Release | FbOp::Destroy => OpPolicy::Forbidden,
            FbOp::SetPar | FbOp::SetColreg => OpPolicy::QueueWhileInactive,
            FbOp::SetCmap | FbOp::Cursor | FbOp::Rotate | FbOp::Ioctl | FbOp::CompatIoctl => {
                OpPolicy::Unsupported
            }
            FbOp::Mmap => OpPolicy::MapCurrent,
            FbOp::CheckVar
            | FbOp::GetCaps
            | FbOp::Sync
            | FbOp::PanDisplay
            | FbOp::DebugEnter
            | FbOp::DebugLeave => OpPolicy::PassThrough,
        }
    }

    pub fn policy(&self, op: FbOp) -> OpPolicy {
        self.policies[op as usize]
    }
}

/// The namespace-aware operation surface of one shadow record.
pub struct ShadowOps<'a> {
    mux: &'a FbMux,
    record: Arc<ShadowDevice>,
}

impl<'a> ShadowOps<'a> {
    pub(crate) fn new(mux: &'a FbMux, record: Arc<ShadowDevice>) -> Self {
        Self { mux, record }
    }

    pub fn record(&self) -> &Arc<ShadowDevice> {
        &self.record
    }

    fn device(&self) -> &dyn FramebufferDevice {
        self.record.device().as_ref()
    }

    fn enter(&self, op: FbOp) -> FbResult<OpPolicy> {
        if self.mux.config().debug_diff {
            diag::log_diff(&self.record);
        }
        match self.record.op_table().policy(op) {
            OpPolicy::Forbidden => panic!(
                "{op} reached shadow {} of {} through the operation surface",
                self.record.slot(),
                self.record.namespace()
            ),
            OpPolicy::Absent => Err(FbNsError::NotSupported(op)),
            policy => Ok(policy),
        }
    }

    /// Forward `op` when active, otherwise count it and return `idle`.
    fn forward_or_ignore<T>(
        &self,
        op: FbOp,
        idle: T,
        forward: impl FnOnce(&dyn FramebufferDevice) -> FbResult<T>,
    ) -> FbResult<T> {
        self.enter(op)?;
        let state = self.record.lock();
        state.ensure_live(self.record.namespace(), self.record.slot())?;
        if state.active {
            return forward(self.device());
        }
        warn!(
            "{op} on background {} of {} is not virtualised; call ignored",
            self.record.slot(),
            self.record.namespace()
        );
        self.record.note_ignored(op);
        Ok(idle)
    }

    /// Map the current buffer into `region.space` and track the mapping.
    pub fn mmap(&self, region: &MappingRegion) -> FbResult<()> {
        self.enter(FbOp::Mmap)?;
        let _table = self.mux.lock_table()?;
        let mut state = self.record.lock();
        state.ensure_live(self.record.namespace(), self.record.slot())?;
        let buffer = state.current_buffer(self.device()).ok_or_else(|| {
            FbNsError::InvalidArgument(format!("{} has no pixel memory", self.record.slot()))
        })?;
        let offset = match region.offset_end() {
            Some(end) if region.len > 0 && end <= buffer.len() => region.offset(),
            _ => None,
        };
        let Some(offset) = offset else {
            return Err(FbNsError::InvalidArgument(format!(
                "mapping of {:#x} bytes at page {:#x} exceeds buffer of {:#x}",
                region.len,
                region.pgoff,
                buffer.len()
            )));
        };
        let source = BufferSource { buffer, offset };
        self.mux
            .vm()
            .install_mapping(region, source)
            .map_err(|e| FbNsError::device(FbOp::Mmap, e))?;
        match state.mappings.track(region.file) {
            Ok(count) => {
                debug!("{} mapped via {} ({count} live)", self.record.slot(), region.file);
                Ok(())
            }
            Err(e) => {
                let _ = self.mux.vm().remove_mapping(region.space, region.start);
                Err(e)
            }
        }
    }

    /// Remove the mapping at `start` and untrack its file handle.
    ///
    /// Only mappings made through this record can be removed. A torn-down
    /// record may still remove mappings no live record tracks.
    pub fn munmap(&self, space: AddressSpaceId, start: usize) -> FbResult<MappingRegion> {
        let table = self.mux.lock_table()?;
        let region = self
            .mux
            .vm()
            .find_mapping(space, start)
            .ok_or_else(|| FbNsError::InvalidArgument(format!("no mapping at {start:#x}")))?;
        let owned = match table.tracker_of(region.file) {
            Some(owner) => Arc::ptr_eq(&owner, &self.record),
            None => self.record.is_freed(),
        };
        if !owned {
            return Err(FbNsError::InvalidArgument(format!(
                "mapping at {start:#x} in {space} was not made through {} of {}",
                self.record.slot(),
                self.record.namespace()
            )));
        }
        let mut state = self.record.lock();
        let region = self
            .mux
            .vm()
            .remove_mapping(space, start)
            .map_err(|e| FbNsError::InvalidArgument(format!("no mapping at {start:#x}: {e}")))?;
        if !state.freed {
            let left = state.mappings.untrack(region.file);
            debug!("{} unmapped via {} ({left} live)", self.record.slot(), region.file);
        }
        Ok(region)
    }

    /// Copy out of the current buffer. Returns the number of bytes read.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> FbResult<usize> {
        Ok(self
            .current_buffer()?
            .map_or(0, |buf| buf.read_at(offset, out)))
    }

    /// Copy into the current buffer. Returns the number of bytes written.
    pub fn write(&self, offset: usize, data: &[u8]) -> FbResult<usize> {
        Ok(self
            .current_buffer()?
            .map_or(0, |buf| buf.write_at(offset, data)))
    }

    pub fn current_buffer(&self) -> FbResult<Option<SharedBuffer>> {
        let state = self.record.lock();
        state.ensure_live(self.record.namespace(), self.record.slot())?;
        Ok(state.current_buffer(self.device()))
    }
}

impl FbOps for ShadowOps<'_> {
    fn open(&self, _user: bool) -> FbResult<()> {
        self.enter(FbOp::Open).map(|_| ())
    }

    fn release(&self, _user: bool) -> FbResult<()> {
        self.enter(FbOp::Release).map(|_| ())
    }

    fn destroy(&self) {
        let _ = self.enter(FbOp::Destroy);
    }

    fn check_var(&self, var: &mut ScreenGeometry) -> FbResult<()> {
        self.enter(FbOp::CheckVar)?;
        self.device()
            .check_var(var)
            .map_err(|e| FbNsError::device(FbOp::CheckVar, e))
    }

    fn set_par(&self, var: ScreenGeometry) -> FbResult<()> {
        self.enter(FbOp::SetPar)?;
        let mut state = self.record.lock();
        state.ensure_live(self.record.namespace(), self.record.slot())?;
        state.var = var;
        if state.active {
            let dev = self.device();
            dev.set_var(var);
            return dev.set_par().map_err(|e| FbNsError::device(FbOp::SetPar, e));
        }
        debug!(
            "mode {}x{}@{} stored for {} of {}",
            var.xres,
            var.yres,
            var.bits_per_pixel,
            self.record.slot(),
            self.record.namespace()
        );
        state.pending_var = Some(var);
        Ok(())
    }

    fn set_colreg(&self, reg: ColorRegister) -> FbResult<()> {
        self.enter(FbOp::SetColreg)?;
        let mut state = self.record.lock();
        state.ensure_live(self.record.namespace(), self.record.slot())?;
        if state.active {
            return self
                .device()
                .set_colreg(&reg)
                .map_err(|e| FbNsError::device(FbOp::SetColreg, e));
        }
        state.queue_colreg(reg)?;
        debug!(
            "colreg {} queued for {} ({} pending)",
            reg.regno,
            self.record.slot(),
            state.colregs.len()
        );
        Ok(())
    }

    fn set_cmap(&self, cmap: &ColorMap) -> FbResult<()> {
        self.forward_or_ignore(FbOp::SetCmap, (), |dev| {
            dev.set_cmap(cmap)
                .map_err(|e| FbNsError::device(FbOp::SetCmap, e))
        })
    }

    fn cursor(&self, cursor: &CursorState) -> FbResult<()> {
        self.forward_or_ignore(FbOp::Cursor, (), |dev| {
            dev.cursor(cursor)
                .map_err(|e| FbNsError::device(FbOp::Cursor, e))
        })
    }

    fn rotate(&self, angle: u32) -> FbResult<()> {
        self.forward_or_ignore(FbOp::Rotate, (), |dev| {
            dev.rotate(angle);
            Ok(())
        })
    }

    fn ioctl(&self, cmd: u32, arg: u64) -> FbResult<i64> {
        self.forward_or_ignore(FbOp::Ioctl, 0, |dev| {
            dev.ioctl(cmd, arg)
                .map_err(|e| FbNsError::device(FbOp::Ioctl, e))
        })
    }

    fn compat_ioctl(&self, cmd: u32, arg: u64) -> FbResult<i64> {
        self.forward_or_ignore(FbOp::CompatIoctl, 0, |dev| {
            dev.ioctl(cmd, arg)
                .map_err(|e| FbNsError::device(FbOp::CompatIoctl, e))
        })
    }

    fn get_caps(&self, var: &ScreenGeometry) -> FbResult<BlitCaps> {
        self.enter(FbOp::GetCaps)?;
        Ok(self.device().get_caps(var))
    }

    fn debug_enter(&self) -> FbResult<()> {
        self.enter(FbOp::DebugEnter)?;
        info!("debugger entry on {} from {}", self.record.slot(), self.record.namespace());
        self.device()
            .debug_enter()
            .map_err(|e| FbNsError::device(FbOp::DebugEnter, e))
    }

    fn debug_leave(&self) -> FbResult<()> {
        self.enter(FbOp::DebugLeave)?;
        info!("debugger exit on {} from {}", self.record.slot(), self.record.namespace());
        self.device()
            .debug_leave()
            .map_err(|e| FbNsError::device(FbOp::DebugLeave, e))
    }
}
