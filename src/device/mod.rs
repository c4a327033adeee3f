// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Physical framebuffer drivers and the operation surface they share with
//! shadow devices.

pub mod memfb;

use std::sync::Arc;

use bitflags::bitflags;

use crate::buffer::SharedBuffer;
use crate::error::{Errno, FbNsError, FbResult};
use crate::fbns_types::{
    BlitCaps, ColorMap, ColorRegister, CursorState, FbOp, FixedInfo, ScreenGeometry, SlotIndex,
};

pub use memfb::{DriverCall, MemoryFramebuffer};

bitflags! {
    /// Optional operations a driver implements.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct FbCaps: u32 {
        const SETCMAP     = 1 << 0;
        const CURSOR      = 1 << 1;
        const ROTATE      = 1 << 2;
        const IOCTL       = 1 << 3;
        const COMPAT_IOCTL = 1 << 4;
        const GET_CAPS    = 1 << 5;
        const SYNC        = 1 << 6;
        const PAN_DISPLAY = 1 << 7;
        const DEBUG_ENTER = 1 << 8;
        const DEBUG_LEAVE = 1 << 9;
    }
}

impl FbCaps {
    /// Capability bit guarding `op`, if the operation is optional.
    pub fn for_op(op: FbOp) -> Option<FbCaps> {
        match op {
            FbOp::SetCmap => Some(FbCaps::SETCMAP),
            FbOp::Cursor => Some(FbCaps::CURSOR),
            FbOp::Rotate => Some(FbCaps::ROTATE),
            FbOp::Ioctl => Some(FbCaps::IOCTL),
            FbOp::CompatIoctl => Some(FbCaps::COMPAT_IOCTL),
            FbOp::GetCaps => Some(FbCaps::GET_CAPS),
            FbOp::Sync => Some(FbCaps::SYNC),
            FbOp::PanDisplay => Some(FbCaps::PAN_DISPLAY),
            FbOp::DebugEnter => Some(FbCaps::DEBUG_ENTER),
            FbOp::DebugLeave => Some(FbCaps::DEBUG_LEAVE),
            _ => None,
        }
    }

    /// Whether a driver with these capabilities provides `op`.
    pub fn provides(self, op: FbOp) -> bool {
        FbCaps::for_op(op).map_or(true, |bit| self.contains(bit))
    }
}

/// A real display device, owned by its driver.
///
/// Mode-set follows the two-step convention: the caller stores the new
/// geometry with [`set_var`](FramebufferDevice::set_var) and then commits
/// it with [`set_par`](FramebufferDevice::set_par). Optional operations are
/// only called when [`caps`](FramebufferDevice::caps) advertises them.
pub trait FramebufferDevice: Send + Sync {
    fn slot(&self) -> SlotIndex;
    fn fix(&self) -> FixedInfo;
    fn var(&self) -> ScreenGeometry;
    fn set_var(&self, var: ScreenGeometry);
    /// Hardware pixel memory, if the device exposes any.
    fn screen(&self) -> Option<SharedBuffer>;
    fn caps(&self) -> FbCaps;

    fn open(&self, _user: bool) -> Result<(), Errno> {
        Ok(())
    }
    fn release(&self, _user: bool) -> Result<(), Errno> {
        Ok(())
    }
    fn check_var(&self, _var: &mut ScreenGeometry) -> Result<(), Errno> {
        Ok(())
    }
    fn set_par(&self) -> Result<(), Errno>;
    fn set_colreg(&self, reg: &ColorRegister) -> Result<(), Errno>;
    fn set_cmap(&self, _cmap: &ColorMap) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }
    fn cursor(&self, _cursor: &CursorState) -> Result<(), Errno> {
        Err(Errno::ENOSYS)
    }
    fn rotate(&self, _angle: u32) {}
    fn ioctl(&self, _cmd: u32, _arg: u64) -> Result<i64, Errno> {
        Err(Errno::ENOTTY)
    }
    fn get_caps(&self, _var: &ScreenGeometry) -> BlitCaps {
        BlitCaps::default()
    }
    fn sync(&self) {}
    fn pan_display(&self, _var: &ScreenGeometry) -> Result<(), Errno> {
        Ok(())
    }
    fn debug_enter(&self) -> Result<(), Errno> {
        Ok(())
    }
    fn debug_leave(&self) -> Result<(), Errno> {
        Ok(())
    }
}

/// The framebuffer operation surface as seen by drawing callers.
///
/// Implemented by [`HardwareOps`] for direct access and by the shadow
/// interceptor for namespace-aware access.
pub trait FbOps {
    fn open(&self, user: bool) -> FbResult<()>;
    fn release(&self, user: bool) -> FbResult<()>;
    fn destroy(&self);
    fn check_var(&self, var: &mut ScreenGeometry) -> FbResult<()>;
    fn set_par(&self, var: ScreenGeometry) -> FbResult<()>;
    fn set_colreg(&self, reg: ColorRegister) -> FbResult<()>;
    fn set_cmap(&self, cmap: &ColorMap) -> FbResult<()>;
    fn cursor(&self, cursor: &CursorState) -> FbResult<()>;
    fn rotate(&self, angle: u32) -> FbResult<()>;
    fn ioctl(&self, cmd: u32, arg: u64) -> FbResult<i64>;
    fn compat_ioctl(&self, cmd: u32, arg: u64) -> FbResult<i64>;
    fn get_caps(&self, var: &ScreenGeometry) -> FbResult<BlitCaps>;
    fn debug_enter(&self) -> FbResult<()>;
    fn debug_leave(&self) -> FbResult<()>;
}

/// Direct, unmultiplexed access to a driver.
#[derive(Clone)]
pub struct HardwareOps {
    device: Arc<dyn FramebufferDevice>,
}

impl HardwareOps {
    pub fn new(device: Arc<dyn FramebufferDevice>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Arc<dyn FramebufferDevice> {
        &self.device
    }

    fn require(&self, op: FbOp) -> FbResult<()> {
        if self.device.caps().provides(op) {
            Ok(())
        } else {
            Err(FbNsError::NotSupported(op))
        }
    }
}

impl FbOps for HardwareOps {
    fn open(&self, user: bool) -> FbResult<()> {
        self.device
            .open(user)
            .map_err(|e| FbNsError::device(FbOp::Open, e))
    }

    fn release(&self, user: bool) -> FbResult<()> {
        self.device
            .release(user)
            .map_err(|e| FbNsError::device(FbOp::Release, e))
    }

    fn destroy(&self) {}

    fn check_var(&self, var: &mut ScreenGeometry) -> FbResult<()> {
        self.device
            .check_var(var)
            .map_err(|e| FbNsError::device(FbOp::CheckVar, e))
    }

    fn set_par(&self, var: ScreenGeometry) -> FbResult<()> {
        self.device.set_var(var);
        self.device
            .set_par()
            .map_err(|e| FbNsError::device(FbOp::SetPar, e))
    }

    fn set_colreg(&self, reg: ColorRegister) -> FbResult<()> {
        self.device
            .set_colreg(&reg)
            .map_err(|e| FbNsError::device(FbOp::SetColreg, e))
    }

    fn set_cmap(&self, cmap: &ColorMap) -> FbResult<()> {
        self.require(FbOp::SetCmap)?;
        self.device
            .set_cmap(cmap)
            .map_err(|e| FbNsError::device(FbOp::SetCmap, e))
    }

    fn cursor(&self, cursor: &CursorState) -> FbResult<()> {
        self.require(FbOp::Cursor)?;
        self.device
            .cursor(cursor)
            .map_err(|e| FbNsError::device(FbOp::Cursor, e))
    }

    fn rotate(&self, angle: u32) -> FbResult<()> {
        self.require(FbOp::Rotate)?;
        self.device.rotate(angle);
        Ok(())
    }

    fn ioctl(&self, cmd: u32, arg: u64) -> FbResult<i64> {
        self.require(FbOp::Ioctl)?;
        self.device
            .ioctl(cmd, arg)
            .map_err(|e| FbNsError::device(FbOp::Ioctl, e))
    }

    fn compat_ioctl(&self, cmd: u32, arg: u64) -> FbResult<i64> {
        self.require(FbOp::CompatIoctl)?;
        self.device
            .ioctl(cmd, arg)
            .map_err(|e| FbNsError::device(FbOp::CompatIoctl, e))
    }

    fn get_caps(&self, var: &ScreenGeometry) -> FbResult<BlitCaps> {
        self.require(FbOp::GetCaps)?;
        Ok(self.device.get_caps(var))
    }

    fn debug_enter(&self) -> FbResult<()> {
        self.require(FbOp::DebugEnter)?;
        self.device
            .debug_enter()
            .map_err(|e| FbNsError::device(FbOp::DebugEnter, e))
    }

    fn debug_leave(&self) -> FbResult<()> {
        self.require(FbOp::DebugLeave)?;
        self.device
            .debug_leave()
            .map_err(|e| FbNsError::device(FbOp::DebugLeave, e))
    }
}
