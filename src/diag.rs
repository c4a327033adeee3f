// CLASSIFICATION: COMMUNITY
// Filename: diag.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Debug description of shadow records and shadow-vs-hardware divergence.

use log::debug;

use crate::shadow::ShadowDevice;

/// One field where a shadow and its physical device disagree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: &'static str,
    pub shadow: String,
    pub hardware: String,
}

impl FieldDiff {
    fn check<T: PartialEq + ToString>(
        out: &mut Vec<FieldDiff>,
        field: &'static str,
        shadow: T,
        hardware: T,
    ) {
        if shadow != hardware {
            out.push(FieldDiff {
                field,
                shadow: shadow.to_string(),
                hardware: hardware.to_string(),
            });
        }
    }
}

/// One-line summary of a record.
pub fn describe(record: &ShadowDevice) -> String {
    let var = record.var();
    let fix = record.fix();
    format!(
        "{} {} id={} smem={:#x}+{:#x} var={}x{} virt={}x{} off={},{} bpp={} rot={} active={} refs={} pending_colregs={} pending_mode={} tracked={} ignored={}",
        record.namespace(),
        record.slot(),
        fix.id,
        fix.smem_start,
        fix.smem_len,
        var.xres,
        var.yres,
        var.xres_virtual,
        var.yres_virtual,
        var.xoffset,
        var.yoffset,
        var.bits_per_pixel,
        var.rotate,
        record.is_active(),
        record.refcount(),
        record.pending_colregs().len(),
        record.pending_var().is_some(),
        record.tracked().len(),
        record.ignored_ops(),
    )
}

/// Fields where the record's view differs from the physical device.
pub fn diff(record: &ShadowDevice) -> Vec<FieldDiff> {
    let mut out = Vec::new();
    let hw_fix = record.device().fix();
    let fix = record.fix();
    FieldDiff::check(&mut out, "id", fix.id.as_str(), hw_fix.id.as_str());
    FieldDiff::check(&mut out, "smem_len", fix.smem_len, hw_fix.smem_len);
    FieldDiff::check(&mut out, "line_length", fix.line_length, hw_fix.line_length);

    let var = record.var();
    let hw_var = record.device().var();
    FieldDiff::check(&mut out, "xres", var.xres, hw_var.xres);
    FieldDiff::check(&mut out, "yres", var.yres, hw_var.yres);
    FieldDiff::check(&mut out, "xres_virtual", var.xres_virtual, hw_var.xres_virtual);
    FieldDiff::check(&mut out, "yres_virtual", var.yres_virtual, hw_var.yres_virtual);
    FieldDiff::check(&mut out, "xoffset", var.xoffset, hw_var.xoffset);
    FieldDiff::check(&mut out, "yoffset", var.yoffset, hw_var.yoffset);
    FieldDiff::check(&mut out, "bits_per_pixel", var.bits_per_pixel, hw_var.bits_per_pixel);
    FieldDiff::check(&mut out, "rotate", var.rotate, hw_var.rotate);

    let backing_len = record.backing().map_or(0, |b| b.len());
    let screen_len = record.device().screen().map_or(0, |s| s.len());
    FieldDiff::check(&mut out, "buffer_len", backing_len, screen_len);
    out
}

/// Log every divergence at debug level.
pub fn log_diff(record: &ShadowDevice) {
    for d in diff(record) {
        debug!(
            "{} {} differs on {}: shadow {} hardware {}",
            record.namespace(),
            record.slot(),
            d.field,
            d.shadow,
            d.hardware
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::BackingAllocator;
    use crate::config::BackingStrategy;
    use crate::device::{FramebufferDevice, MemoryFramebuffer};
    use crate::fbns_types::{NamespaceId, ScreenGeometry, SlotIndex};

    #[test]
    fn fresh_record_matches_hardware() {
        let dev = Arc::new(
            MemoryFramebuffer::builder(SlotIndex::new(0).unwrap())
                .build()
                .unwrap(),
        );
        let alloc = BackingAllocator::new(BackingStrategy::Full, None);
        let rec = ShadowDevice::create(NamespaceId(1), dev.clone(), &alloc, false).unwrap();
        assert!(diff(&rec).is_empty());

        dev.set_var(ScreenGeometry::new(32, 24, 32));
        let fields: Vec<_> = diff(&rec).into_iter().map(|d| d.field).collect();
        assert_eq!(fields, vec!["xres", "yres", "xres_virtual", "yres_virtual"]);
        assert!(describe(&rec).contains("ns:1 fb0 id=memfb"));
    }
}
