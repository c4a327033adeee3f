// CLASSIFICATION: COMMUNITY
// Filename: shadow_lifecycle.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use fbns::{
    FbMux, FbNsConfig, FbNsError, ForegroundTracker, MemoryFramebuffer, NamespaceId, SimulatedVm,
    SlotIndex,
};

fn setup(config: FbNsConfig) -> (FbMux, Arc<MemoryFramebuffer>, SlotIndex) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mux = FbMux::new(
        Arc::new(ForegroundTracker::new()),
        Arc::new(SimulatedVm::new()),
        config,
    );
    let slot = SlotIndex::new(0).unwrap();
    let fb = Arc::new(MemoryFramebuffer::builder(slot).build().unwrap());
    mux.register_device(fb.clone()).unwrap();
    mux.namespace_created(NamespaceId(1)).unwrap();
    (mux, fb, slot)
}

#[test]
fn acquire_twice_returns_same_record() {
    let (mux, _fb, slot) = setup(FbNsConfig::builtin());
    let a = mux.acquire(NamespaceId(1), slot).unwrap();
    let b = mux.acquire(NamespaceId(1), slot).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.refcount(), 2);
    assert_eq!(mux.allocator_stats().total, 1);

    mux.release(&a).unwrap();
    assert_eq!(b.refcount(), 1);
    assert!(mux.lookup(NamespaceId(1), slot).unwrap().is_some());
    mux.release(&b).unwrap();
    assert_eq!(b.refcount(), 0);
    assert!(mux.lookup(NamespaceId(1), slot).unwrap().is_none());
    assert!(b.is_freed());
    assert_eq!(mux.allocator_stats().live, 0);
}

#[test]
fn reacquire_after_free_builds_new_record() {
    let (mux, _fb, slot) = setup(FbNsConfig::builtin());
    let first = mux.acquire(NamespaceId(1), slot).unwrap();
    mux.release(&first).unwrap();
    let second = mux.acquire(NamespaceId(1), slot).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.refcount(), 1);
    assert_eq!(mux.allocator_stats().total, 2);
    assert_eq!(mux.allocator_stats().live, 1);
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_default()
}

#[test]
fn release_past_zero_is_caught() {
    let (mux, _fb, slot) = setup(FbNsConfig::builtin());
    mux.namespace_created(NamespaceId(2)).unwrap();
    let rec = mux.acquire(NamespaceId(1), slot).unwrap();
    mux.release(&rec).unwrap();

    let err = panic::catch_unwind(AssertUnwindSafe(|| mux.release(&rec))).unwrap_err();
    assert!(panic_message(err).contains("no outstanding references"));

    let other = mux.acquire(NamespaceId(2), slot).unwrap();
    assert_eq!(other.refcount(), 1);
    mux.activate(NamespaceId(2)).unwrap();
    mux.release(&other).unwrap();
}

#[test]
fn backing_limit_leaves_no_state() {
    let mut config = FbNsConfig::builtin();
    config.max_backing_bytes = Some(1024);
    let (mux, _fb, slot) = setup(config);
    let err = mux.acquire(NamespaceId(1), slot).unwrap_err();
    assert_eq!(
        err,
        FbNsError::OutOfMemory {
            what: "backing buffer"
        }
    );
    assert!(mux.lookup(NamespaceId(1), slot).unwrap().is_none());
    let stats = mux.allocator_stats();
    assert_eq!((stats.live, stats.total, stats.bytes), (0, 0, 0));
}

#[test]
fn zero_length_device_has_no_backing() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mux = FbMux::new(
        Arc::new(ForegroundTracker::new()),
        Arc::new(SimulatedVm::new()),
        FbNsConfig::builtin(),
    );
    let slot = SlotIndex::new(4).unwrap();
    let fb = Arc::new(MemoryFramebuffer::builder(slot).smem_len(0).build().unwrap());
    mux.register_device(fb).unwrap();
    mux.namespace_created(NamespaceId(2)).unwrap();
    let rec = mux.acquire(NamespaceId(2), slot).unwrap();
    assert!(rec.backing().is_none());
    assert_eq!(rec.fix().smem_len, 0);
    assert_eq!(mux.allocator_stats().total, 0);
    mux.activate(NamespaceId(2)).unwrap();
    assert!(rec.is_active());
    mux.release(&rec).unwrap();
}

#[test]
fn unknown_namespace_and_empty_slot_rejected() {
    let (mux, _fb, slot) = setup(FbNsConfig::builtin());
    assert!(matches!(
        mux.acquire(NamespaceId(77), slot),
        Err(FbNsError::InvalidState(_))
    ));
    assert!(matches!(
        mux.acquire(NamespaceId(1), SlotIndex::new(5).unwrap()),
        Err(FbNsError::InvalidState(_))
    ));
    assert!(SlotIndex::new(fbns::FB_MAX).is_err());
    assert!(mux.namespace_created(NamespaceId(1)).is_err());
}

#[test]
fn namespace_destroy_frees_outstanding_records() {
    let (mux, _fb, slot) = setup(FbNsConfig::builtin());
    let rec = mux.acquire(NamespaceId(1), slot).unwrap();
    mux.namespace_destroyed(NamespaceId(1)).unwrap();
    assert!(rec.is_freed());
    assert!(rec.backing().is_none());
    assert_eq!(mux.allocator_stats().live, 0);
    assert!(!mux.namespaces().unwrap().contains(&NamespaceId(1)));

    // the late release only drops the count
    mux.release(&rec).unwrap();
    assert_eq!(rec.refcount(), 0);
}

#[test]
fn initial_activity_follows_host() {
    let _ = env_logger::builder().is_test(true).try_init();
    let host = Arc::new(ForegroundTracker::with_foreground(NamespaceId(3)));
    let mux = FbMux::new(host, Arc::new(SimulatedVm::new()), FbNsConfig::builtin());
    let slot = SlotIndex::new(0).unwrap();
    mux.register_device(Arc::new(MemoryFramebuffer::builder(slot).build().unwrap()))
        .unwrap();
    mux.namespace_created(NamespaceId(3)).unwrap();
    mux.namespace_created(NamespaceId(4)).unwrap();

    let fg = mux.acquire(NamespaceId(3), slot).unwrap();
    let bg = mux.acquire(NamespaceId(4), slot).unwrap();
    let init = mux.acquire(NamespaceId::INIT, slot).unwrap();
    assert!(fg.is_active());
    assert!(!bg.is_active());
    assert!(init.is_active());
}
