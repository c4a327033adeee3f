// CLASSIFICATION: COMMUNITY
// Filename: switch.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Context-switch engine.
//!
//! Each record of the switching namespace goes through the same sequence
//! under the table lock and its own record lock:
//!
//! 1. flip the activity flag
//! 2. retarget every live user mapping at the now-current buffer
//! 3. copy pixels (backing to screen on activation, screen to backing on
//!    deactivation)
//! 4. on activation only, replay queued palette writes then the queued mode
//! 5. on activation only, optionally pan to force a redisplay
//!
//! A failing step is logged and remembered; later steps still run and the
//! first failure is returned.
//!
//! Known race: between steps 2 and 3 a process may write through a freshly
//! retargeted mapping and have the write overwritten by the copy.

use log::{debug, info, warn};

use crate::device::{FbCaps, FramebufferDevice};
use crate::error::{Errno, FbNsError, FbResult, FirstError};
use crate::fbns_types::{FbOp, NamespaceId, SwitchDirection};
use crate::mux::FbMux;
use crate::shadow::{ShadowDevice, ShadowState};
use crate::vm::BufferSource;

impl FbMux {
    /// Bring `ns` to the foreground on every device it has touched.
    pub fn activate(&self, ns: NamespaceId) -> FbResult<()> {
        self.switch_namespace(ns, SwitchDirection::Activate)
    }

    /// Send `ns` to the background on every device it has touched.
    pub fn deactivate(&self, ns: NamespaceId) -> FbResult<()> {
        self.switch_namespace(ns, SwitchDirection::Deactivate)
    }

    fn switch_namespace(&self, ns: NamespaceId, dir: SwitchDirection) -> FbResult<()> {
        if ns.is_init() && !dir.activates() {
            info!("{ns} always drives the hardware; deactivate ignored");
            return Ok(());
        }
        let table = self.lock_table()?;
        let state = table
            .get(ns)
            .ok_or_else(|| FbNsError::InvalidState(format!("unknown namespace {ns}")))?;
        info!("{dir} {ns}");
        let mut first = FirstError::default();
        for record in state.records() {
            first.note(self.switch_record(record, dir));
        }
        first.into_result()
    }

    /// Run the switch sequence on one record. Caller holds the table lock.
    pub(crate) fn switch_record(&self, record: &ShadowDevice, dir: SwitchDirection) -> FbResult<()> {
        let mut state = record.lock();
        if state.freed {
            return Ok(());
        }
        if state.active == dir.activates() {
            debug!("{} of {} already in requested state", record.slot(), record.namespace());
            return Ok(());
        }
        state.active = dir.activates();
        let device = record.device().as_ref();

        let mut first = FirstError::default();
        first.note(self.remap(record, &state));
        swap_content(device, &state, dir);
        if dir.activates() {
            first.note(flush_colregs(device, &mut state));
            first.note(flush_mode(device, &mut state));
            if self.config().force_pan {
                force_pan(device);
            }
        }
        info!("{} of {}: switch {dir} complete", record.slot(), record.namespace());
        first.into_result()
    }

    fn remap(&self, record: &ShadowDevice, state: &ShadowState) -> FbResult<()> {
        let target = state.current_buffer(record.device().as_ref());
        let mut first = FirstError::default();
        for file in state.mappings.enumerate() {
            for region in self.vm().enumerate_mappings(file) {
                let result = match (&target, region.offset()) {
                    (None, _) => Err(Errno::ENXIO),
                    (Some(buf), Some(offset))
                        if region.offset_end().is_some_and(|end| end <= buf.len()) =>
                    {
                        self.vm().replace_mapping(
                            &region,
                            BufferSource {
                                buffer: buf.clone(),
                                offset,
                            },
                        )
                    }
                    (Some(_), _) => Err(Errno::EINVAL),
                };
                match result {
                    Ok(()) => debug!(
                        "remapped {} [{:#x}, {:#x}) of {}",
                        region.space,
                        region.start,
                        region.end(),
                        file
                    ),
                    Err(errno) => {
                        warn!(
                            "remap of {} [{:#x}, {:#x}) via {} failed: {errno}",
                            region.space,
                            region.start,
                            region.end(),
                            file
                        );
                        first.note::<()>(Err(FbNsError::RemapFailed { file, errno }));
                    }
                }
            }
        }
        first.into_result()
    }
}

fn swap_content(device: &dyn FramebufferDevice, state: &ShadowState, dir: SwitchDirection) {
    let screen = device.screen();
    let backing = state.backing.as_ref().map(|b| b.buffer());
    let (Some(screen), Some(backing)) = (screen, backing) else {
        debug!("{}: nothing to copy", device.slot());
        return;
    };
    if screen.is_empty() || backing.is_empty() {
        return;
    }
    if device.caps().contains(FbCaps::SYNC) {
        device.sync();
    }
    let copied = match dir {
        SwitchDirection::Activate => screen.copy_from(backing),
        SwitchDirection::Deactivate => backing.copy_from(&screen),
    };
    debug!("{}: {dir} copied {copied:#x} bytes", device.slot());
}

fn flush_colregs(device: &dyn FramebufferDevice, state: &mut ShadowState) -> FbResult<()> {
    let queued = std::mem::take(&mut state.colregs);
    if queued.is_empty() {
        return Ok(());
    }
    debug!("{}: replaying {} colregs", device.slot(), queued.len());
    let mut first = FirstError::default();
    for reg in &queued {
        let result = device.set_colreg(reg);
        if let Err(errno) = result {
            warn!("{}: replay of colreg {} failed: {errno}", device.slot(), reg.regno);
        }
        first.note(result.map_err(|e| FbNsError::device(FbOp::SetColreg, e)));
    }
    first.into_result()
}

fn flush_mode(device: &dyn FramebufferDevice, state: &mut ShadowState) -> FbResult<()> {
    let Some(var) = state.pending_var.take() else {
        return Ok(());
    };
    debug!(
        "{}: committing stored mode {}x{}@{}",
        device.slot(),
        var.xres,
        var.yres,
        var.bits_per_pixel
    );
    device.set_var(var);
    device.set_par().map_err(|e| {
        warn!("{}: stored mode rejected: {e}", device.slot());
        FbNsError::device(FbOp::SetPar, e)
    })
}

fn force_pan(device: &dyn FramebufferDevice) {
    if !device.caps().contains(FbCaps::PAN_DISPLAY) {
        return;
    }
    if let Err(e) = device.pan_display(&device.var()) {
        warn!("{}: forced pan failed: {e}", device.slot());
    }
}
