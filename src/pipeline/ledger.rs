use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::domain::{RunStatus, SyncKey, SyncRun, SyncState};

/// In-process record of the latest run per sync key, plus the run-id counter.
#[derive(Debug)]
pub struct RunLedger {
    next_run_id: AtomicU64,
    runs: RwLock<HashMap<SyncKey, SyncRun>>,
}

impl Default for RunLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLedger {
    pub fn new() -> Self {
        Self {
            next_run_id: AtomicU64::new(1),
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a run id and record the key's run as running.
    pub fn begin(&self, key: SyncKey) -> SyncRun {
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let run = SyncRun::start(run_id, key.clone());
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, run.clone());
        run
    }

    /// Store the finished run as the latest for its key.
    pub fn finish(&self, run: &SyncRun) {
        self.runs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(run.key.clone(), run.clone());
    }

    pub fn latest(&self, key: &SyncKey) -> Option<SyncRun> {
        self.runs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn state(&self, key: &SyncKey) -> SyncState {
        match self.latest(key).map(|run| run.status) {
            None => SyncState::Idle,
            Some(RunStatus::Running) => SyncState::Running,
            Some(RunStatus::Succeeded) => SyncState::Succeeded,
            Some(RunStatus::Failed) => SyncState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DatasetKind;

    fn key(tenant: &str) -> SyncKey {
        SyncKey::new(tenant, DatasetKind::new("RETAIL", "CREDIT"))
    }

    #[test]
    fn test_run_ids_increase_across_keys() {
        let ledger = RunLedger::new();
        let a = ledger.begin(key("BANK001"));
        let b = ledger.begin(key("BANK002"));
        let c = ledger.begin(key("BANK001"));
        assert!(a.run_id < b.run_id && b.run_id < c.run_id);
        assert_eq!(ledger.latest(&key("BANK001")).unwrap().run_id, c.run_id);
    }

    #[test]
    fn test_state_follows_latest_run() {
        let ledger = RunLedger::new();
        assert_eq!(ledger.state(&key("BANK001")), SyncState::Idle);

        let mut run = ledger.begin(key("BANK001"));
        assert_eq!(ledger.state(&key("BANK001")), SyncState::Running);

        run.fail("source missing".to_string());
        ledger.finish(&run);
        assert_eq!(ledger.state(&key("BANK001")), SyncState::Failed);
        assert_eq!(
            ledger.latest(&key("BANK001")).unwrap().error.as_deref(),
            Some("source missing")
        );
    }
}
