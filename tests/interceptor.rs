// CLASSIFICATION: COMMUNITY
// Filename: interceptor.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

use std::sync::Arc;

use fbns::device::{DriverCall, FbOps};
use fbns::fbns_types::{ColorMap, CursorState, FbOp};
use fbns::{
    AddressSpaceId, ColorRegister, FbCaps, FbMux, FbNsConfig, FbNsError, FileHandle,
    ForegroundTracker, FramebufferDevice, MappingRegion, MemoryFramebuffer, NamespaceId,
    ScreenGeometry, ShadowDevice, SimulatedVm, SlotIndex, PAGE_SIZE,
};

const NS: NamespaceId = NamespaceId(2);

fn setup(caps: FbCaps) -> (FbMux, Arc<MemoryFramebuffer>, Arc<ShadowDevice>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mux = FbMux::new(
        Arc::new(ForegroundTracker::new()),
        Arc::new(SimulatedVm::new()),
        FbNsConfig::builtin(),
    );
    let slot = SlotIndex::new(0).unwrap();
    let fb = Arc::new(MemoryFramebuffer::builder(slot).caps(caps).build().unwrap());
    mux.register_device(fb.clone()).unwrap();
    mux.namespace_created(NS).unwrap();
    let rec = mux.acquire(NS, slot).unwrap();
    (mux, fb, rec)
}

#[test]
fn validation_and_caps_pass_through() {
    let (mux, fb, rec) = setup(FbCaps::all());
    let ops = mux.ops(&rec);
    let mut ok = ScreenGeometry::new(32, 32, 32);
    assert!(ops.check_var(&mut ok).is_ok());
    let mut huge = ScreenGeometry::new(4096, 4096, 32);
    assert!(matches!(
        ops.check_var(&mut huge),
        Err(FbNsError::DeviceOperationFailed {
            op: FbOp::CheckVar,
            ..
        })
    ));
    let caps = ops.get_caps(&ok).unwrap();
    assert_eq!((caps.x, caps.y, caps.len), (32, 32, 32));
    assert_eq!(
        fb.calls_matching(|c| matches!(c, DriverCall::CheckVar(_) | DriverCall::GetCaps))
            .len(),
        3
    );
}

#[test]
fn background_extras_are_counted_not_forwarded() {
    let (mux, fb, rec) = setup(FbCaps::all());
    let ops = mux.ops(&rec);
    ops.set_cmap(&ColorMap::default()).unwrap();
    ops.cursor(&CursorState::default()).unwrap();
    ops.rotate(90).unwrap();
    assert_eq!(ops.ioctl(0x4600, 0).unwrap(), 0);
    assert_eq!(ops.compat_ioctl(0x4600, 0).unwrap(), 0);
    assert_eq!(rec.ignored_ops(), 5);
    assert!(fb.calls().is_empty());
}

#[test]
fn active_shadow_forwards_everything() {
    let (mux, fb, rec) = setup(FbCaps::all());
    mux.activate(NS).unwrap();
    fb.clear_calls();
    let ops = mux.ops(&rec);
    let reg = ColorRegister::new(5, 1, 2, 3, 4);
    ops.set_colreg(reg).unwrap();
    ops.cursor(&CursorState::default()).unwrap();
    ops.rotate(180).unwrap();
    let mode = ScreenGeometry::new(16, 16, 32);
    ops.set_par(mode).unwrap();
    assert_eq!(
        fb.calls(),
        vec![
            DriverCall::SetColreg(reg),
            DriverCall::Cursor(CursorState::default()),
            DriverCall::Rotate(180),
            DriverCall::SetPar(mode),
        ]
    );
    assert_eq!(fb.var(), mode);
    assert!(rec.pending_var().is_none());
    assert_eq!(rec.ignored_ops(), 0);
}

#[test]
fn missing_driver_ops_are_not_supported() {
    let (mux, _fb, rec) = setup(FbCaps::empty());
    let ops = mux.ops(&rec);
    assert_eq!(
        ops.cursor(&CursorState::default()),
        Err(FbNsError::NotSupported(FbOp::Cursor))
    );
    assert_eq!(
        ops.get_caps(&ScreenGeometry::default()),
        Err(FbNsError::NotSupported(FbOp::GetCaps))
    );
    assert_eq!(ops.debug_enter(), Err(FbNsError::NotSupported(FbOp::DebugEnter)));
    assert_eq!(rec.ignored_ops(), 0);
}

#[test]
fn debugger_hooks_reach_hardware_while_inactive() {
    let (mux, fb, rec) = setup(FbCaps::all());
    let ops = mux.ops(&rec);
    ops.debug_enter().unwrap();
    ops.debug_leave().unwrap();
    assert_eq!(fb.calls(), vec![DriverCall::DebugEnter, DriverCall::DebugLeave]);
}

#[test]
#[should_panic(expected = "through the operation surface")]
fn open_through_shadow_panics() {
    let (mux, _fb, rec) = setup(FbCaps::all());
    let _ = mux.ops(&rec).open(true);
}

#[test]
#[should_panic(expected = "through the operation surface")]
fn release_through_shadow_panics() {
    let (mux, _fb, rec) = setup(FbCaps::all());
    let _ = mux.ops(&rec).release(true);
}

#[test]
#[should_panic(expected = "through the operation surface")]
fn destroy_through_shadow_panics() {
    let (mux, _fb, rec) = setup(FbCaps::all());
    mux.ops(&rec).destroy();
}

#[test]
fn mmap_maps_current_buffer_and_tracks() {
    let (mux, fb, rec) = setup(FbCaps::all());
    let ops = mux.ops(&rec);
    let len = rec.fix().smem_len;
    let space = AddressSpaceId(4);

    let mut region = MappingRegion::new(space, 0x8000, PAGE_SIZE, FileHandle(1));
    region.pgoff = 1;
    ops.mmap(&region).unwrap();
    ops.write(PAGE_SIZE + 3, &[0x11]).unwrap();
    let mut out = [0u8; 1];
    ops.read(PAGE_SIZE + 3, &mut out).unwrap();
    assert_eq!(out[0], 0x11);
    assert_eq!(rec.tracked()[0].count, 1);
    assert!(ops
        .current_buffer()
        .unwrap()
        .unwrap()
        .same_as(&rec.backing().unwrap()));
    assert_ne!(fb.screen().unwrap().to_vec()[PAGE_SIZE + 3], 0x11);

    let too_big = MappingRegion::new(space, 0x100_0000, len + PAGE_SIZE, FileHandle(1));
    assert!(matches!(
        ops.mmap(&too_big),
        Err(FbNsError::InvalidArgument(_))
    ));
    assert_eq!(rec.tracked()[0].count, 1);

    let removed = ops.munmap(space, 0x8000).unwrap();
    assert_eq!(removed, region);
    assert!(rec.tracked().is_empty());
    assert!(ops.munmap(space, 0x8000).is_err());
}

#[test]
fn mapped_offset_reads_through_vm() {
    let _ = env_logger::builder().is_test(true).try_init();
    let vm = Arc::new(SimulatedVm::new());
    let mux = FbMux::new(
        Arc::new(ForegroundTracker::new()),
        vm.clone(),
        FbNsConfig::builtin(),
    );
    let slot = SlotIndex::new(0).unwrap();
    mux.register_device(Arc::new(MemoryFramebuffer::builder(slot).build().unwrap()))
        .unwrap();
    mux.namespace_created(NS).unwrap();
    let rec = mux.acquire(NS, slot).unwrap();
    let ops = mux.ops(&rec);

    let mut region = MappingRegion::new(AddressSpaceId(9), 0x2000, PAGE_SIZE, FileHandle(3));
    region.pgoff = 2;
    ops.mmap(&region).unwrap();
    ops.write(2 * PAGE_SIZE + 8, &[0x77]).unwrap();
    assert_eq!(vm.read(AddressSpaceId(9), 0x2008, 1).unwrap(), vec![0x77]);
}

#[test]
fn torn_down_shadow_rejects_calls() {
    let (mux, _fb, rec) = setup(FbCaps::all());
    mux.namespace_destroyed(NS).unwrap();
    let ops = mux.ops(&rec);
    assert!(matches!(
        ops.set_colreg(ColorRegister::new(0, 0, 0, 0, 0)),
        Err(FbNsError::InvalidState(_))
    ));
    assert!(matches!(
        ops.set_par(ScreenGeometry::new(8, 8, 32)),
        Err(FbNsError::InvalidState(_))
    ));
}

#[test]
fn overflowing_page_offset_is_rejected() {
    let (mux, _fb, rec) = setup(FbCaps::all());
    let mut region = MappingRegion::new(AddressSpaceId(4), 0x8000, PAGE_SIZE, FileHandle(1));
    region.pgoff = usize::MAX / PAGE_SIZE + 1;
    assert!(matches!(
        mux.ops(&rec).mmap(&region),
        Err(FbNsError::InvalidArgument(_))
    ));
    assert!(rec.tracked().is_empty());
}

#[test]
fn oversized_mode_fails_validation() {
    let (mux, _fb, rec) = setup(FbCaps::all());
    let mut var = ScreenGeometry::new(u32::MAX, u32::MAX, u32::MAX);
    assert_eq!(
        mux.ops(&rec).check_var(&mut var),
        Err(FbNsError::DeviceOperationFailed {
            op: FbOp::CheckVar,
            errno: fbns::Errno::EINVAL,
        })
    );
}

#[test]
fn munmap_of_another_namespaces_mapping_is_refused() {
    let _ = env_logger::builder().is_test(true).try_init();
    let vm = Arc::new(SimulatedVm::new());
    let mux = FbMux::new(
        Arc::new(ForegroundTracker::new()),
        vm.clone(),
        FbNsConfig::builtin(),
    );
    let slot = SlotIndex::new(0).unwrap();
    mux.register_device(Arc::new(MemoryFramebuffer::builder(slot).build().unwrap()))
        .unwrap();
    let (ns_a, ns_b) = (NamespaceId(2), NamespaceId(3));
    mux.namespace_created(ns_a).unwrap();
    mux.namespace_created(ns_b).unwrap();
    let a = mux.acquire(ns_a, slot).unwrap();
    let b = mux.acquire(ns_b, slot).unwrap();
    let space = AddressSpaceId(5);
    let ra = MappingRegion::new(space, 0x10000, PAGE_SIZE, FileHandle(1));
    let rb = MappingRegion::new(space, 0x20000, PAGE_SIZE, FileHandle(2));
    mux.ops(&a).mmap(&ra).unwrap();
    mux.ops(&b).mmap(&rb).unwrap();

    assert!(matches!(
        mux.ops(&a).munmap(space, rb.start),
        Err(FbNsError::InvalidArgument(_))
    ));
    assert!(vm.backing_of(space, rb.start).is_some());
    assert_eq!(b.tracked()[0].count, 1);
    assert_eq!(a.tracked()[0].count, 1);

    mux.activate(ns_b).unwrap();
    let again = mux.acquire(ns_b, slot).unwrap();
    assert!(Arc::ptr_eq(&again, &b));
    assert_eq!(mux.ops(&b).munmap(space, rb.start).unwrap(), rb);
    assert_eq!(mux.ops(&a).munmap(space, ra.start).unwrap(), ra);
}

#[test]
fn torn_down_shadow_can_still_unmap_its_mapping() {
    let (mux, _fb, rec) = setup(FbCaps::all());
    let region = MappingRegion::new(AddressSpaceId(6), 0x4000, PAGE_SIZE, FileHandle(8));
    mux.ops(&rec).mmap(&region).unwrap();
    mux.namespace_destroyed(NS).unwrap();
    assert_eq!(mux.ops(&rec).munmap(region.space, region.start).unwrap(), region);
}
