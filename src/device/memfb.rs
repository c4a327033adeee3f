// CLASSIFICATION: COMMUNITY
// Filename: memfb.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! In-memory framebuffer driver.
//!
//! Keeps its pixels in a [`SharedBuffer`] and records every driver call so
//! tests and the simulator can observe exactly what reached the hardware.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use log::debug;

use super::{FbCaps, FramebufferDevice};
use crate::buffer::SharedBuffer;
use crate::error::{Errno, FbNsError, FbResult};
use crate::fbns_types::{
    BlitCaps, ColorMap, ColorRegister, CursorState, FixedInfo, ScreenGeometry, SlotIndex,
};

/// A driver entry point as observed by [`MemoryFramebuffer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriverCall {
    CheckVar(ScreenGeometry),
    SetPar(ScreenGeometry),
    SetColreg(ColorRegister),
    SetCmap(ColorMap),
    Cursor(CursorState),
    Rotate(u32),
    Ioctl { cmd: u32, arg: u64 },
    GetCaps,
    Sync,
    PanDisplay(ScreenGeometry),
    DebugEnter,
    DebugLeave,
}

#[derive(Default)]
struct Faults {
    colreg: HashSet<u32>,
    set_par: Option<Errno>,
}

/// A `vfb`-style device whose hardware buffer is ordinary memory.
pub struct MemoryFramebuffer {
    slot: SlotIndex,
    fix: FixedInfo,
    caps: FbCaps,
    var: Mutex<ScreenGeometry>,
    screen: Option<SharedBuffer>,
    calls: Mutex<Vec<DriverCall>>,
    faults: Mutex<Faults>,
}

/// Builder for [`MemoryFramebuffer`].
pub struct MemoryFramebufferBuilder {
    slot: SlotIndex,
    id: String,
    var: ScreenGeometry,
    smem_len: Option<usize>,
    caps: FbCaps,
}

impl MemoryFramebufferBuilder {
    pub fn id(mut self, id: &str) -> Self {
        self.id = id.into();
        self
    }

    pub fn geometry(mut self, var: ScreenGeometry) -> Self {
        self.var = var;
        self
    }

    /// Override the buffer length derived from the geometry.
    pub fn smem_len(mut self, len: usize) -> Self {
        self.smem_len = Some(len);
        self
    }

    pub fn caps(mut self, caps: FbCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn build(self) -> FbResult<MemoryFramebuffer> {
        let len = match self.smem_len {
            Some(len) => len,
            None => self.var.buffer_len().ok_or_else(|| {
                FbNsError::InvalidArgument(format!("mode {:?} does not fit in memory", self.var))
            })?,
        };
        let screen = if len > 0 {
            Some(SharedBuffer::zeroed(len)?)
        } else {
            None
        };
        let fix = FixedInfo {
            id: self.id,
            smem_start: screen.as_ref().map_or(0, |s| s.id() << 32),
            smem_len: len,
            line_length: self.var.xres_virtual.saturating_mul(self.var.bits_per_pixel) / 8,
        };
        Ok(MemoryFramebuffer {
            slot: self.slot,
            fix,
            caps: self.caps,
            var: Mutex::new(self.var),
            screen,
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
        })
    }
}

impl MemoryFramebuffer {
    /// Start a 64x48, 32bpp device with every optional operation.
    pub fn builder(slot: SlotIndex) -> MemoryFramebufferBuilder {
        MemoryFramebufferBuilder {
            slot,
            id: "memfb".into(),
            var: ScreenGeometry::new(64, 48, 32),
            smem_len: None,
            caps: FbCaps::all(),
        }
    }

    /// Every call recorded so far, oldest first.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded calls of one kind.
    pub fn calls_matching(&self, pred: impl Fn(&DriverCall) -> bool) -> Vec<DriverCall> {
        self.calls().into_iter().filter(|c| pred(c)).collect()
    }

    pub fn clear_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Make palette writes to `regno` fail with `EINVAL`.
    pub fn fail_colreg(&self, regno: u32) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .colreg
            .insert(regno);
    }

    /// Make mode commits fail with `errno`.
    pub fn fail_set_par(&self, errno: Errno) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_par = Some(errno);
    }

    fn record(&self, call: DriverCall) {
        debug!("{} driver call {:?}", self.slot, call);
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

impl FramebufferDevice for MemoryFramebuffer {
    fn slot(&self) -> SlotIndex {
        self.slot
    }

    fn fix(&self) -> FixedInfo {
        self.fix.clone()
    }

    fn var(&self) -> ScreenGeometry {
        *self.var.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_var(&self, var: ScreenGeometry) {
        *self.var.lock().unwrap_or_else(PoisonError::into_inner) = var;
    }

    fn screen(&self) -> Option<SharedBuffer> {
        self.screen.clone()
    }

    fn caps(&self) -> FbCaps {
        self.caps
    }

    fn check_var(&self, var: &mut ScreenGeometry) -> Result<(), Errno> {
        self.record(DriverCall::CheckVar(*var));
        match var.buffer_len() {
            Some(len) if len <= self.fix.smem_len => Ok(()),
            _ => Err(Errno::EINVAL),
        }
    }

    fn set_par(&self) -> Result<(), Errno> {
        let var = self.var();
        self.record(DriverCall::SetPar(var));
        match self.faults.lock().unwrap_or_else(PoisonError::into_inner).set_par {
            Some(errno) => Err(errno),
            None => Ok(()),
        }
    }

    fn set_colreg(&self, reg: &ColorRegister) -> Result<(), Errno> {
        self.record(DriverCall::SetColreg(*reg));
        let faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        if faults.colreg.contains(&reg.regno) {
            Err(Errno::EINVAL)
        } else {
            Ok(())
        }
    }

    fn set_cmap(&self, cmap: &ColorMap) -> Result<(), Errno> {
        self.record(DriverCall::SetCmap(cmap.clone()));
        Ok(())
    }

    fn cursor(&self, cursor: &CursorState) -> Result<(), Errno> {
        self.record(DriverCall::Cursor(*cursor));
        Ok(())
    }

    fn rotate(&self, angle: u32) {
        self.record(DriverCall::Rotate(angle));
    }

    fn ioctl(&self, cmd: u32, arg: u64) -> Result<i64, Errno> {
        self.record(DriverCall::Ioctl { cmd, arg });
        Ok(0)
    }

    fn get_caps(&self, var: &ScreenGeometry) -> BlitCaps {
        self.record(DriverCall::GetCaps);
        BlitCaps {
            x: var.xres,
            y: var.yres,
            len: var.bits_per_pixel,
            flags: 0,
        }
    }

    fn sync(&self) {
        self.record(DriverCall::Sync);
    }

    fn pan_display(&self, var: &ScreenGeometry) -> Result<(), Errno> {
        self.record(DriverCall::PanDisplay(*var));
        Ok(())
    }

    fn debug_enter(&self) -> Result<(), Errno> {
        self.record(DriverCall::DebugEnter);
        Ok(())
    }

    fn debug_leave(&self) -> Result<(), Errno> {
        self.record(DriverCall::DebugLeave);
        Ok(())
    }
}
