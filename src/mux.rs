// CLASSIFICATION: COMMUNITY
// Filename: mux.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Framebuffer namespace multiplexer.
//!
//! [`FbMux`] owns the registered physical devices and the per-namespace
//! shadow tables. A single table lock serialises shadow creation and
//! teardown, mapping tracking, and whole context switches. Shadow reference
//! counts are atomic so dropping a non-final reference never takes it.
//!
//! Locks nest in one order: namespace table, shadow record, address space.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, info, warn};

use crate::buffer::{AllocStats, BackingAllocator};
use crate::config::FbNsConfig;
use crate::device::{FramebufferDevice, HardwareOps};
use crate::error::{FbNsError, FbResult};
use crate::fbns_types::{FileHandle, NamespaceId, SlotIndex, SwitchDirection, FB_MAX};
use crate::namespace::{DeviceNamespaceState, NamespaceHost};
use crate::ops::ShadowOps;
use crate::shadow::ShadowDevice;
use crate::vm::VmHost;

/// Notification delivered by the host.
#[derive(Clone)]
pub enum FbNsEvent {
    Activate(NamespaceId),
    Deactivate(NamespaceId),
    DeviceRegistered(Arc<dyn FramebufferDevice>),
    DeviceUnregistered(SlotIndex),
}

impl fmt::Debug for FbNsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FbNsEvent::Activate(ns) => write!(f, "Activate({ns})"),
            FbNsEvent::Deactivate(ns) => write!(f, "Deactivate({ns})"),
            FbNsEvent::DeviceRegistered(dev) => write!(f, "DeviceRegistered({})", dev.slot()),
            FbNsEvent::DeviceUnregistered(slot) => write!(f, "DeviceUnregistered({slot})"),
        }
    }
}

/// Where a namespace's drawing for one slot should go.
pub enum FbTarget {
    /// The namespace owns the display.
    Hardware(HardwareOps),
    /// The namespace is in the background. The caller holds one reference
    /// on the record and returns it with [`FbMux::release`].
    Shadow(Arc<ShadowDevice>),
}

/// Per-namespace shadow tables, guarded by the multiplexer's table lock.
#[derive(Default)]
pub(crate) struct NamespaceTable {
    namespaces: BTreeMap<NamespaceId, DeviceNamespaceState>,
}

impl NamespaceTable {
    pub(crate) fn get(&self, ns: NamespaceId) -> Option<&DeviceNamespaceState> {
        self.namespaces.get(&ns)
    }

    /// Live record whose mapping table tracks `file`.
    pub(crate) fn tracker_of(&self, file: FileHandle) -> Option<Arc<ShadowDevice>> {
        self.namespaces
            .values()
            .flat_map(DeviceNamespaceState::records)
            .find(|record| record.lock().mappings.count(file).is_some())
            .cloned()
    }

    fn get_mut(&mut self, ns: NamespaceId) -> FbResult<&mut DeviceNamespaceState> {
        self.namespaces
            .get_mut(&ns)
            .ok_or_else(|| FbNsError::InvalidState(format!("unknown namespace {ns}")))
    }
}

/// The multiplexer handle.
pub struct FbMux {
    config: FbNsConfig,
    host: Arc<dyn NamespaceHost>,
    vm: Arc<dyn VmHost>,
    allocator: BackingAllocator,
    devices: RwLock<Vec<Option<Arc<dyn FramebufferDevice>>>>,
    table: Mutex<NamespaceTable>,
}

impl FbMux {
    /// Build a multiplexer. The init namespace exists from the start.
    pub fn new(host: Arc<dyn NamespaceHost>, vm: Arc<dyn VmHost>, config: FbNsConfig) -> Self {
        let mut table = NamespaceTable::default();
        table
            .namespaces
            .insert(NamespaceId::INIT, DeviceNamespaceState::new(NamespaceId::INIT));
        info!(
            "framebuffer namespaces ready ({:?} backing, limit {:?})",
            config.backing, config.max_backing_bytes
        );
        Self {
            allocator: BackingAllocator::new(config.backing, config.max_backing_bytes),
            config,
            host,
            vm,
            devices: RwLock::new(vec![None; FB_MAX]),
            table: Mutex::new(table),
        }
    }

    pub fn config(&self) -> &FbNsConfig {
        &self.config
    }

    pub fn vm(&self) -> &Arc<dyn VmHost> {
        &self.vm
    }

    pub fn host(&self) -> &Arc<dyn NamespaceHost> {
        &self.host
    }

    pub fn allocator_stats(&self) -> AllocStats {
        self.allocator.stats()
    }

    pub(crate) fn lock_table(&self) -> FbResult<MutexGuard<'_, NamespaceTable>> {
        self.table.lock().map_err(|_| FbNsError::LockPoisoned)
    }

    /// Whether `ns` currently drives the hardware.
    pub fn is_active(&self, ns: NamespaceId) -> bool {
        ns.is_init() || self.host.is_active(ns)
    }

    /// Deliver a host notification.
    pub fn dispatch(&self, event: FbNsEvent) -> FbResult<()> {
        debug!("event {:?}", event);
        match event {
            FbNsEvent::Activate(ns) => self.activate(ns),
            FbNsEvent::Deactivate(ns) => self.deactivate(ns),
            FbNsEvent::DeviceRegistered(dev) => self.register_device(dev).map(|_| ()),
            FbNsEvent::DeviceUnregistered(slot) => self.unregister_device(slot).map(|_| ()),
        }
    }

    /// Create the shadow table for a new namespace.
    pub fn namespace_created(&self, ns: NamespaceId) -> FbResult<()> {
        let mut table = self.lock_table()?;
        if table.namespaces.contains_key(&ns) {
            return Err(FbNsError::InvalidState(format!("{ns} already exists")));
        }
        table.namespaces.insert(ns, DeviceNamespaceState::new(ns));
        info!("created framebuffer state for {ns}");
        Ok(())
    }

    /// Tear down a namespace and every shadow it still owns.
    pub fn namespace_destroyed(&self, ns: NamespaceId) -> FbResult<()> {
        let mut table = self.lock_table()?;
        if ns.is_init() {
            return Err(FbNsError::InvalidState("the init namespace is permanent".into()));
        }
        let mut state = table
            .namespaces
            .remove(&ns)
            .ok_or_else(|| FbNsError::InvalidState(format!("unknown namespace {ns}")))?;
        for record in state.drain() {
            let refs = record.refcount();
            if refs > 0 {
                warn!("{ns} destroyed with {} still holding {refs} references", record.slot());
            }
            record.free();
        }
        info!("destroyed framebuffer state for {ns}");
        Ok(())
    }

    pub fn namespaces(&self) -> FbResult<Vec<NamespaceId>> {
        Ok(self.lock_table()?.namespaces.keys().copied().collect())
    }

    /// Make a physical device available for multiplexing.
    pub fn register_device(&self, device: Arc<dyn FramebufferDevice>) -> FbResult<SlotIndex> {
        let slot = device.slot();
        let mut devices = self.devices.write().map_err(|_| FbNsError::LockPoisoned)?;
        let entry = &mut devices[slot.index()];
        if entry.is_some() {
            return Err(FbNsError::InvalidState(format!("{slot} already registered")));
        }
        info!("registered {} ({}, {:#x} bytes)", slot, device.fix().id, device.fix().smem_len);
        *entry = Some(device);
        Ok(slot)
    }

    /// Remove a physical device, deactivating and freeing its shadows first.
    pub fn unregister_device(&self, slot: SlotIndex) -> FbResult<Arc<dyn FramebufferDevice>> {
        let mut table = self.lock_table()?;
        if self.device(slot)?.is_none() {
            return Err(FbNsError::InvalidState(format!("{slot} is not registered")));
        }
        for state in table.namespaces.values_mut() {
            let Some(record) = state.take(slot) else {
                continue;
            };
            if record.is_active() {
                if let Err(e) = self.switch_record(&record, SwitchDirection::Deactivate) {
                    warn!("deactivating {} of {} on unregister: {e}", slot, state.id());
                }
            }
            record.free();
        }
        let mut devices = self.devices.write().map_err(|_| FbNsError::LockPoisoned)?;
        let device = devices[slot.index()]
            .take()
            .ok_or_else(|| FbNsError::InvalidState(format!("{slot} is not registered")))?;
        info!("unregistered {slot}");
        Ok(device)
    }

    pub fn device(&self, slot: SlotIndex) -> FbResult<Option<Arc<dyn FramebufferDevice>>> {
        let devices = self.devices.read().map_err(|_| FbNsError::LockPoisoned)?;
        Ok(devices[slot.index()].clone())
    }

    /// Get the shadow of `slot` in `ns`, creating it on first use.
    ///
    /// Every successful call must be paired with one [`FbMux::release`].
    pub fn acquire(&self, ns: NamespaceId, slot: SlotIndex) -> FbResult<Arc<ShadowDevice>> {
        let mut table = self.lock_table()?;
        let device = self
            .device(slot)?
            .ok_or_else(|| FbNsError::InvalidState(format!("{slot} is not registered")))?;
        let state = table.get_mut(ns)?;
        if let Some(record) = state.get(slot) {
            let refs = record.get();
            debug!("{slot} of {ns} acquired ({refs} refs)");
            return Ok(Arc::clone(record));
        }
        let active = self.is_active(ns);
        let record = Arc::new(ShadowDevice::create(ns, device, &self.allocator, active)?);
        record.get();
        state.install(slot, Arc::clone(&record));
        Ok(record)
    }

    /// Drop one reference; the last one detaches and frees the record.
    ///
    /// # Panics
    /// If `record` has no outstanding references.
    pub fn release(&self, record: &Arc<ShadowDevice>) -> FbResult<()> {
        if record.put_unless_last() {
            return Ok(());
        }
        record.assert_referenced();
        let mut table = self.lock_table()?;
        let left = record.put();
        if left > 0 {
            debug!("{} of {} released ({left} refs)", record.slot(), record.namespace());
            return Ok(());
        }
        if let Ok(state) = table.get_mut(record.namespace()) {
            state.detach(record);
        }
        record.free();
        Ok(())
    }

    /// Record without touching its reference count.
    pub fn lookup(&self, ns: NamespaceId, slot: SlotIndex) -> FbResult<Option<Arc<ShadowDevice>>> {
        let table = self.lock_table()?;
        Ok(table.get(ns).and_then(|s| s.get(slot)).cloned())
    }

    /// Hardware access for an active namespace, otherwise its shadow.
    pub fn resolve(&self, ns: NamespaceId, slot: SlotIndex) -> FbResult<FbTarget> {
        if self.is_active(ns) {
            let device = self
                .device(slot)?
                .ok_or_else(|| FbNsError::InvalidState(format!("{slot} is not registered")))?;
            return Ok(FbTarget::Hardware(HardwareOps::new(device)));
        }
        self.acquire(ns, slot).map(FbTarget::Shadow)
    }

    /// Operation surface of `record`.
    pub fn ops(&self, record: &Arc<ShadowDevice>) -> ShadowOps<'_> {
        ShadowOps::new(self, Arc::clone(record))
    }

    /// Count one more mapping of `record` through `file`.
    pub fn track(&self, record: &ShadowDevice, file: FileHandle) -> FbResult<usize> {
        let _table = self.lock_table()?;
        let mut state = record.lock();
        state.ensure_live(record.namespace(), record.slot())?;
        let count = state.mappings.track(file)?;
        debug!("{} of {} tracks {file} ({count})", record.slot(), record.namespace());
        Ok(count)
    }

    /// Forget one mapping of `record` through `file`.
    ///
    /// # Panics
    /// If `file` is not tracked by `record`.
    pub fn untrack(&self, record: &ShadowDevice, file: FileHandle) -> FbResult<usize> {
        if record.lock().mappings.count(file).is_none() {
            panic!("untrack of {file} which is not tracked");
        }
        let _table = self.lock_table()?;
        let count = record.lock().mappings.untrack(file);
        debug!("{} of {} untracks {file} ({count})", record.slot(), record.namespace());
        Ok(count)
    }
}
