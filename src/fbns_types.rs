// CLASSIFICATION: COMMUNITY
// Filename: fbns_types.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Common cross-module types for the framebuffer namespace multiplexer.

use std::fmt;

use crate::error::{FbNsError, FbResult};

/// Number of physical framebuffer slots a multiplexer can host.
pub const FB_MAX: usize = 32;

/// Granularity of user-space mappings.
pub const PAGE_SIZE: usize = 4096;

/// Index of a physical framebuffer (`fb0`, `fb1`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIndex(usize);

impl SlotIndex {
    /// Validate `index` against [`FB_MAX`].
    pub fn new(index: usize) -> FbResult<Self> {
        if index < FB_MAX {
            Ok(Self(index))
        } else {
            Err(FbNsError::InvalidState(format!(
                "framebuffer slot {index} out of range (max {FB_MAX})"
            )))
        }
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fb{}", self.0)
    }
}

/// Opaque identity of an isolated execution context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespaceId(pub u64);

impl NamespaceId {
    /// The initial namespace. It always drives the hardware.
    pub const INIT: NamespaceId = NamespaceId(0);

    pub fn is_init(self) -> bool {
        self == Self::INIT
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_init() {
            write!(f, "ns:init")
        } else {
            write!(f, "ns:{}", self.0)
        }
    }
}

/// Inode-equivalent handle of an opened framebuffer file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(pub u64);

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inode:{:#x}", self.0)
    }
}

/// Identity of one consumer address space (one process).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AddressSpaceId(pub u32);

impl fmt::Display for AddressSpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mm:{}", self.0)
    }
}

/// Variable screen parameters ("var").
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub xoffset: u32,
    pub yoffset: u32,
    pub bits_per_pixel: u32,
    pub rotate: u32,
}

impl ScreenGeometry {
    /// Visible geometry with a matching virtual resolution.
    pub fn new(xres: u32, yres: u32, bits_per_pixel: u32) -> Self {
        Self {
            xres,
            yres,
            xres_virtual: xres,
            yres_virtual: yres,
            bits_per_pixel,
            ..Self::default()
        }
    }

    /// Bytes needed to hold the virtual resolution, `None` if that does not
    /// fit in `usize`.
    pub fn buffer_len(&self) -> Option<usize> {
        let bits = (self.xres_virtual as usize)
            .checked_mul(self.yres_virtual as usize)?
            .checked_mul(self.bits_per_pixel as usize)?;
        Some(bits / 8)
    }
}

/// Fixed hardware parameters ("fix").
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FixedInfo {
    pub id: String,
    pub smem_start: u64,
    pub smem_len: usize,
    pub line_length: u32,
}

/// One palette ("color register") write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColorRegister {
    pub regno: u32,
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub transp: u16,
}

impl ColorRegister {
    pub fn new(regno: u32, red: u16, green: u16, blue: u16, transp: u16) -> Self {
        Self {
            regno,
            red,
            green,
            blue,
            transp,
        }
    }
}

/// A contiguous colormap update starting at `start`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ColorMap {
    pub start: u32,
    pub entries: Vec<ColorRegister>,
}

/// Hardware cursor request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorState {
    pub enable: bool,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Blit capabilities reported by a driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BlitCaps {
    pub x: u32,
    pub y: u32,
    pub len: u32,
    pub flags: u32,
}

/// Direction of a namespace context switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchDirection {
    Activate,
    Deactivate,
}

impl SwitchDirection {
    pub fn activates(self) -> bool {
        matches!(self, SwitchDirection::Activate)
    }
}

impl fmt::Display for SwitchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchDirection::Activate => write!(f, "activate"),
            SwitchDirection::Deactivate => write!(f, "deactivate"),
        }
    }
}

/// Entry points of the framebuffer operation surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FbOp {
    Open,
    Release,
    Destroy,
    CheckVar,
    SetPar,
    SetColreg,
    SetCmap,
    Cursor,
    Rotate,
    Ioctl,
    CompatIoctl,
    Mmap,
    GetCaps,
    Sync,
    PanDisplay,
    DebugEnter,
    DebugLeave,
}

impl FbOp {
    pub const ALL: [FbOp; 17] = [
        FbOp::Open,
        FbOp::Release,
        FbOp::Destroy,
        FbOp::CheckVar,
        FbOp::SetPar,
        FbOp::SetColreg,
        FbOp::SetCmap,
        FbOp::Cursor,
        FbOp::Rotate,
        FbOp::Ioctl,
        FbOp::CompatIoctl,
        FbOp::Mmap,
        FbOp::GetCaps,
        FbOp::Sync,
        FbOp::PanDisplay,
        FbOp::DebugEnter,
        FbOp::DebugLeave,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FbOp::Open => "fb_open",
            FbOp::Release => "fb_release",
            FbOp::Destroy => "fb_destroy",
            FbOp::CheckVar => "fb_check_var",
            FbOp::SetPar => "fb_set_par",
            FbOp::SetColreg => "fb_setcolreg",
            FbOp::SetCmap => "fb_setcmap",
            FbOp::Cursor => "fb_cursor",
            FbOp::Rotate => "fb_rotate",
            FbOp::Ioctl => "fb_ioctl",
            FbOp::CompatIoctl => "fb_compat_ioctl",
            FbOp::Mmap => "fb_mmap",
            FbOp::GetCaps => "fb_get_caps",
            FbOp::Sync => "fb_sync",
            FbOp::PanDisplay => "fb_pan_display",
            FbOp::DebugEnter => "fb_debug_enter",
            FbOp::DebugLeave => "fb_debug_leave",
        }
    }
}

impl fmt::Display for FbOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_len_covers_virtual_resolution() {
        let mut var = ScreenGeometry::new(640, 480, 16);
        assert_eq!(var.buffer_len(), Some(640 * 480 * 2));
        var.yres_virtual = 960;
        assert_eq!(var.buffer_len(), Some(640 * 960 * 2));
    }

    #[test]
    fn oversized_geometry_has_no_length() {
        let var = ScreenGeometry::new(u32::MAX, u32::MAX, u32::MAX);
        assert_eq!(var.buffer_len(), None);
    }
}
