// CLASSIFICATION: COMMUNITY
// Filename: context_switch.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use fbns::device::FbOps;
use fbns::{
    AddressSpaceId, ColorRegister, FbMux, FbNsConfig, FileHandle, ForegroundTracker,
    MappingRegion, MemoryFramebuffer, NamespaceId, ScreenGeometry, SimulatedVm, SlotIndex,
};

fn make_mux() -> (FbMux, Arc<MemoryFramebuffer>, NamespaceId) {
    let mux = FbMux::new(
        Arc::new(ForegroundTracker::new()),
        Arc::new(SimulatedVm::new()),
        FbNsConfig::builtin(),
    );
    let slot = SlotIndex::new(0).unwrap();
    let fb = Arc::new(
        MemoryFramebuffer::builder(slot)
            .geometry(ScreenGeometry::new(640, 480, 32))
            .build()
            .unwrap(),
    );
    mux.register_device(fb.clone()).unwrap();
    let ns = NamespaceId(1);
    mux.namespace_created(ns).unwrap();
    let rec = mux.acquire(ns, slot).unwrap();
    let len = rec.fix().smem_len;
    let ops = mux.ops(&rec);
    for space in 0..4 {
        let region = MappingRegion::new(AddressSpaceId(space), 0x1000_0000, len, FileHandle(1));
        ops.mmap(&region).unwrap();
    }
    (mux, fb, ns)
}

fn bench_context_switch(c: &mut Criterion) {
    let (mux, fb, ns) = make_mux();
    c.bench_function("activate_deactivate_640x480", |b| {
        b.iter(|| {
            mux.activate(ns).unwrap();
            mux.deactivate(ns).unwrap();
            fb.clear_calls();
        });
    });

    let rec = mux.lookup(ns, SlotIndex::new(0).unwrap()).unwrap().unwrap();
    c.bench_function("activate_with_256_colregs", |b| {
        b.iter(|| {
            let ops = mux.ops(&rec);
            for regno in 0..256 {
                ops.set_colreg(ColorRegister::new(regno, 0, 0, 0, 0)).unwrap();
            }
            mux.activate(ns).unwrap();
            mux.deactivate(ns).unwrap();
            fb.clear_calls();
        });
    });
}

criterion_group!(benches, bench_context_switch);
criterion_main!(benches);
