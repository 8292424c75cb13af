use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use nvtree_types::BackendKind;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::Backend;

/// A device shared by every session that uses it.
pub type SharedBackend = Arc<Mutex<Box<dyn Backend>>>;

/// Lock a shared device, mapping poisoning to an error.
pub fn lock(device: &SharedBackend) -> StoreResult<MutexGuard<'_, Box<dyn Backend>>> {
    device.lock().map_err(|_| StoreError::Poisoned)
}

/// Source of device handles for sessions.
pub trait BackendFactory: Send + Sync {
    /// Handle for `(kind, unit)`. Repeated calls return the same device.
    fn open(&self, kind: BackendKind, unit: u32) -> StoreResult<SharedBackend>;
}

type Builder = dyn Fn(BackendKind, u32) -> StoreResult<Box<dyn Backend>> + Send + Sync;

/// Registry of devices, created lazily on first open.
pub struct DeviceSet {
    devices: Mutex<HashMap<(BackendKind, u32), SharedBackend>>,
    builder: Option<Box<Builder>>,
}

impl DeviceSet {
    /// Registry that only serves devices added with [`insert`](Self::insert).
    pub fn new() -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            builder: None,
        }
    }

    /// Registry that builds missing devices on demand.
    pub fn with_builder<F>(builder: F) -> Self
    where
        F: Fn(BackendKind, u32) -> StoreResult<Box<dyn Backend>> + Send + Sync + 'static,
    {
        Self {
            devices: Mutex::new(HashMap::new()),
            builder: Some(Box::new(builder)),
        }
    }

    /// Register a device, replacing any previous one for the same slot.
    pub fn insert(&self, unit: u32, backend: Box<dyn Backend>) -> StoreResult<SharedBackend> {
        let kind = backend.kind();
        let shared: SharedBackend = Arc::new(Mutex::new(backend));
        self.devices
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert((kind, unit), Arc::clone(&shared));
        Ok(shared)
    }

    pub fn len(&self) -> usize {
        self.devices.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeviceSet {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendFactory for DeviceSet {
    fn open(&self, kind: BackendKind, unit: u32) -> StoreResult<SharedBackend> {
        let mut devices = self.devices.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(device) = devices.get(&(kind, unit)) {
            return Ok(Arc::clone(device));
        }
        let builder = self
            .builder
            .as_ref()
            .ok_or(StoreError::NoDevice { kind, unit })?;
        let shared: SharedBackend = Arc::new(Mutex::new(builder(kind, unit)?));
        devices.insert((kind, unit), Arc::clone(&shared));
        debug!(%kind, unit, "device created");
        Ok(shared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::RamMirror;

    #[test]
    fn inserted_devices_are_shared() {
        let set = DeviceSet::new();
        let a = set.insert(0, Box::new(RamMirror::new(64))).unwrap();
        let b = set.open(BackendKind::Ram, 0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(matches!(
            set.open(BackendKind::Nor, 0),
            Err(StoreError::NoDevice { .. })
        ));
    }

    #[test]
    fn builder_runs_once_per_slot() {
        let set = DeviceSet::with_builder(|_, _| Ok(Box::new(RamMirror::new(32)) as Box<dyn Backend>));
        let a = set.open(BackendKind::Ram, 1).unwrap();
        let b = set.open(BackendKind::Ram, 1).unwrap();
        let c = set.open(BackendKind::Ram, 2).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn lock_gives_access() {
        let set = DeviceSet::new();
        let dev = set.insert(0, Box::new(RamMirror::new(8))).unwrap();
        lock(&dev).unwrap().write(0, b"hi").unwrap();
        let mut buf = [0u8; 2];
        lock(&dev).unwrap().read(0, &mut buf).unwrap();
        assert_eq!(&buf, b"hi");
    }
}
