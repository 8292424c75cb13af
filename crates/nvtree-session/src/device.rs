//! Lazily created, shared device bindings.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use nvtree_store::{lock, Backend, BackendFactory, FlashProbe, SharedBackend, StoreError};
use nvtree_types::BackendKind;
use tracing::{debug, info, warn};

use crate::error::SessionResult;

pub(crate) struct Binding {
    pub(crate) device: SharedBackend,
    pub(crate) probe: FlashProbe,
}

/// The devices a session has touched, each brought up once.
pub(crate) struct Devices {
    factory: Arc<dyn BackendFactory>,
    bound: HashMap<(BackendKind, u32), Binding>,
    retries: u32,
}

impl Devices {
    pub(crate) fn new(factory: Arc<dyn BackendFactory>, retries: u32) -> Self {
        Self {
            factory,
            bound: HashMap::new(),
            retries,
        }
    }

    /// Binding for `(kind, unit)`.
    ///
    /// The first use opens the device, powers it up (retrying with a reset
    /// in between) and probes it. Later uses only wake it if it went idle.
    pub(crate) fn acquire(&mut self, kind: BackendKind, unit: u32) -> SessionResult<&Binding> {
        match self.bound.entry((kind, unit)) {
            Entry::Occupied(entry) => {
                let binding = entry.into_mut();
                let delay = lock(&binding.device)?.wake_up();
                if let Some(delay) = delay {
                    debug!(%kind, unit, ?delay, "device woken");
                    std::thread::sleep(delay);
                }
                Ok(binding)
            }
            Entry::Vacant(slot) => {
                let device = self.factory.open(kind, unit)?;
                let probe = {
                    let mut dev = lock(&device)?;
                    bring_up(&mut **dev, kind, unit, self.retries)?
                };
                info!(%kind, unit, known = probe.known, "device bound");
                Ok(slot.insert(Binding { device, probe }))
            }
        }
    }

    pub(crate) fn release(&mut self) {
        self.bound.clear();
    }
}

fn bring_up(
    dev: &mut dyn Backend,
    kind: BackendKind,
    unit: u32,
    retries: u32,
) -> SessionResult<FlashProbe> {
    for attempt in 1..=retries {
        if dev.power_up()? {
            let probe = dev.probe()?;
            dev.set_bus_mode(probe.read_mode())?;
            if attempt > 1 {
                debug!(%kind, unit, attempt, "device came up after retries");
            }
            return Ok(probe);
        }
        dev.reset()?;
    }
    warn!(%kind, unit, attempts = retries, "device never came up");
    Err(StoreError::Unavailable {
        kind,
        unit,
        attempts: retries,
    }
    .into())
}
