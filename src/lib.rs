// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v1.0
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Namespace-aware framebuffer multiplexer.
//!
//! Every namespace gets its own view of each physical framebuffer. Only the
//! foreground namespace drives the hardware; background namespaces draw into
//! private backing buffers and queue their palette and mode changes. On a
//! namespace switch the [`FbMux`] retargets live mappings, swaps pixels and
//! replays the queued changes.

/// Common cross-module types.
pub mod fbns_types;

/// Error taxonomy.
pub mod error;

/// Environment-driven configuration.
pub mod config;

/// Pixel buffers and the backing allocator.
pub mod buffer;

/// Per-record mapped file tracking.
pub mod mapping;

/// Host virtual-memory boundary and its in-process model.
pub mod vm;

/// Physical drivers and the operation surface.
pub mod device;

/// Host namespace boundary and per-namespace shadow tables.
pub mod namespace;

/// Shadow device records.
pub mod shadow;

/// Operation interceptor.
pub mod ops;

/// Context-switch engine.
pub mod switch;

/// The multiplexer handle and host event dispatch.
pub mod mux;

/// Debug description and divergence diffing.
pub mod diag;

pub use buffer::{AllocStats, BackingAllocator, SharedBuffer};
pub use config::{BackingStrategy, FbNsConfig};
pub use device::{FbCaps, FbOps, FramebufferDevice, HardwareOps, MemoryFramebuffer};
pub use error::{Errno, FbNsError, FbResult};
pub use fbns_types::{
    AddressSpaceId, ColorRegister, FileHandle, NamespaceId, ScreenGeometry, SlotIndex, FB_MAX,
    PAGE_SIZE,
};
pub use mux::{FbMux, FbNsEvent, FbTarget};
pub use namespace::{ForegroundTracker, NamespaceHost};
pub use ops::{OpPolicy, OpTable, ShadowOps};
pub use shadow::ShadowDevice;
pub use vm::{MappingRegion, SimulatedVm, VmHost};
