// CLASSIFICATION: COMMUNITY
// Filename: mapping_table.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use fbns::{
    FbMux, FbNsConfig, FileHandle, ForegroundTracker, MemoryFramebuffer, NamespaceId, ShadowDevice,
    SimulatedVm, SlotIndex,
};

fn record() -> (FbMux, Arc<ShadowDevice>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mux = FbMux::new(
        Arc::new(ForegroundTracker::new()),
        Arc::new(SimulatedVm::new()),
        FbNsConfig::builtin(),
    );
    let slot = SlotIndex::new(1).unwrap();
    mux.register_device(Arc::new(MemoryFramebuffer::builder(slot).build().unwrap()))
        .unwrap();
    mux.namespace_created(NamespaceId(6)).unwrap();
    let rec = mux.acquire(NamespaceId(6), slot).unwrap();
    (mux, rec)
}

#[test]
fn track_track_untrack_leaves_one() {
    let (mux, rec) = record();
    let f = FileHandle(0x42);
    assert_eq!(mux.track(&rec, f).unwrap(), 1);
    assert_eq!(mux.track(&rec, f).unwrap(), 2);
    assert_eq!(mux.untrack(&rec, f).unwrap(), 1);
    let tracked = rec.tracked();
    assert_eq!(tracked.len(), 1);
    assert_eq!((tracked[0].file, tracked[0].count), (f, 1));

    assert_eq!(mux.untrack(&rec, f).unwrap(), 0);
    assert!(rec.tracked().is_empty());
}

#[test]
fn third_untrack_is_a_contract_violation() {
    let (mux, rec) = record();
    let f = FileHandle(0x42);
    mux.track(&rec, f).unwrap();
    mux.track(&rec, f).unwrap();
    mux.untrack(&rec, f).unwrap();
    mux.untrack(&rec, f).unwrap();
    let err = panic::catch_unwind(AssertUnwindSafe(|| mux.untrack(&rec, f))).unwrap_err();
    let msg = err.downcast_ref::<String>().cloned().unwrap_or_default();
    assert!(msg.contains("not tracked"), "unexpected panic: {msg}");

    assert_eq!(mux.track(&rec, f).unwrap(), 1);
    mux.namespace_created(NamespaceId(7)).unwrap();
    let other = mux.acquire(NamespaceId(7), rec.slot()).unwrap();
    assert_eq!(other.refcount(), 1);
}

#[test]
fn handles_are_counted_independently() {
    let (mux, rec) = record();
    mux.track(&rec, FileHandle(1)).unwrap();
    mux.track(&rec, FileHandle(2)).unwrap();
    mux.track(&rec, FileHandle(2)).unwrap();
    mux.untrack(&rec, FileHandle(1)).unwrap();
    let tracked = rec.tracked();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].file, FileHandle(2));
    assert_eq!(tracked[0].count, 2);
}

#[test]
fn tracking_a_torn_down_record_fails() {
    let (mux, rec) = record();
    mux.namespace_destroyed(NamespaceId(6)).unwrap();
    assert!(mux.track(&rec, FileHandle(9)).is_err());
}
