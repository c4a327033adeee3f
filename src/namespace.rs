// CLASSIFICATION: COMMUNITY
// Filename: namespace.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Namespace-side state: the host query for foreground status and the
//! per-namespace table of shadow devices.

use std::sync::{Arc, PoisonError, RwLock};

use log::info;

use crate::fbns_types::{NamespaceId, SlotIndex, FB_MAX};
use crate::shadow::ShadowDevice;

/// Host namespace subsystem as seen by the multiplexer.
pub trait NamespaceHost: Send + Sync {
    /// Whether `ns` currently owns the display hardware.
    fn is_active(&self, ns: NamespaceId) -> bool;
}

/// Minimal host that tracks one foreground namespace.
#[derive(Debug, Default)]
pub struct ForegroundTracker {
    foreground: RwLock<Option<NamespaceId>>,
}

impl ForegroundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_foreground(ns: NamespaceId) -> Self {
        Self {
            foreground: RwLock::new(Some(ns)),
        }
    }

    /// Make `ns` the foreground namespace, returning the previous one.
    pub fn set_foreground(&self, ns: Option<NamespaceId>) -> Option<NamespaceId> {
        let mut fg = self.foreground.write().unwrap_or_else(PoisonError::into_inner);
        let prev = std::mem::replace(&mut *fg, ns);
        info!("foreground {:?} -> {:?}", prev, ns);
        prev
    }

    pub fn foreground(&self) -> Option<NamespaceId> {
        *self.foreground.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl NamespaceHost for ForegroundTracker {
    fn is_active(&self, ns: NamespaceId) -> bool {
        self.foreground() == Some(ns)
    }
}

/// Shadow devices owned by one namespace, one optional record per slot.
pub struct DeviceNamespaceState {
    id: NamespaceId,
    slots: [Option<Arc<ShadowDevice>>; FB_MAX],
}

impl DeviceNamespaceState {
    pub fn new(id: NamespaceId) -> Self {
        Self {
            id,
            slots: std::array::from_fn(|_| None),
        }
    }

    pub fn id(&self) -> NamespaceId {
        self.id
    }

    pub fn get(&self, slot: SlotIndex) -> Option<&Arc<ShadowDevice>> {
        self.slots[slot.index()].as_ref()
    }

    pub(crate) fn install(&mut self, slot: SlotIndex, record: Arc<ShadowDevice>) {
        self.slots[slot.index()] = Some(record);
    }

    /// Clear `slot` if it still holds `record`.
    pub(crate) fn detach(&mut self, record: &Arc<ShadowDevice>) -> bool {
        let entry = &mut self.slots[record.slot().index()];
        let holds = entry.as_ref().is_some_and(|cur| Arc::ptr_eq(cur, record));
        if holds {
            *entry = None;
        }
        holds
    }

    pub(crate) fn take(&mut self, slot: SlotIndex) -> Option<Arc<ShadowDevice>> {
        self.slots[slot.index()].take()
    }

    /// Live records in slot order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<ShadowDevice>> {
        self.slots.iter().flatten()
    }

    pub(crate) fn drain(&mut self) -> Vec<Arc<ShadowDevice>> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}
