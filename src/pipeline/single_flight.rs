use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::domain::SyncKey;

/// Keyed try-lock table. At most one guard exists per key; acquisition never waits.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    running: Arc<Mutex<HashSet<SyncKey>>>,
}

/// Holds a key until dropped.
#[derive(Debug)]
pub struct FlightGuard {
    key: SyncKey,
    running: Arc<Mutex<HashSet<SyncKey>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the key, or `None` if another holder has it.
    pub fn try_acquire(&self, key: &SyncKey) -> Option<FlightGuard> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if !running.insert(key.clone()) {
            return None;
        }
        Some(FlightGuard {
            key: key.clone(),
            running: self.running.clone(),
        })
    }

    pub fn is_running(&self, key: &SyncKey) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl FlightGuard {
    pub fn key(&self) -> &SyncKey {
        &self.key
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        debug!(key = %self.key, "Released sync key");
    }
}
