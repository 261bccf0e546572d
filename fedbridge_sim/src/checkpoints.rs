//! Checkpoint store of a simulated federate.
//!
//! Records go to a temporary sled database through `SledCheckpointStore`;
//! the model state itself is snapshotted in memory by `SimModel`.

use crate::model::SimModel;
use fedbridge_core::{CheckpointError, RestoreRequest, SledCheckpointStore};
use fedbridge_env::{CheckpointRecord, CheckpointStore, EnvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

pub struct SimCheckpoints {
    store: SledCheckpointStore,
    model: Arc<SimModel>,
    fail_saves: AtomicBool,
}

impl SimCheckpoints {
    pub fn new(model: Arc<SimModel>) -> Result<Self, CheckpointError> {
        let store = SledCheckpointStore::open_temp()?.with_simulation(model.clone());
        Ok(Self {
            store,
            model,
            fail_saves: AtomicBool::new(false),
        })
    }

    /// Makes subsequent saves fail.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Removes and returns the restore scheduled by the federate.
    pub fn take_pending_restore(&self) -> Result<Option<RestoreRequest>, CheckpointError> {
        self.store.take_pending_restore()
    }
}

impl CheckpointStore for SimCheckpoints {
    fn schedule_save(&self, label: &str, simulation_time: i64) -> Result<(), EnvError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            warn!("{}: refusing to save '{}'", self.model.name(), label);
            return Err(EnvError::checkpoint(format!("no space left for '{}'", label)));
        }
        self.model.snapshot(label);
        self.store.schedule_save(label, simulation_time)
    }

    fn list_saved(&self) -> Result<Vec<CheckpointRecord>, EnvError> {
        self.store.list_saved()
    }

    fn schedule_restore(
        &self,
        label: &str,
        simulation_start_time: i64,
        simulation_time: i64,
        deadline: i64,
    ) -> Result<(), EnvError> {
        self.store
            .schedule_restore(label, simulation_start_time, simulation_time, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedbridge_env::{LocalSimulation, Value};

    #[test]
    fn test_save_snapshots_model() {
        let model = Arc::new(SimModel::new("alpha", 500));
        let checkpoints = SimCheckpoints::new(model.clone()).unwrap();
        let v = model.create("Vehicle", "v1", [("speed", Value::Float64(4.0))]);

        checkpoints.schedule_save("CP1", 2_000).unwrap();
        let records = checkpoints.list_saved().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].simulation_start_time, 500);

        model.update(v, [("speed", Value::Float64(9.0))]).unwrap();
        model.restore("CP1").unwrap();
        assert_eq!(model.object(v).unwrap().properties["speed"], Value::Float64(4.0));
        assert_eq!(model.simulation_state(), fedbridge_env::SimulationState::Restored);
    }

    #[test]
    fn test_failing_saves_leave_no_record() {
        let model = Arc::new(SimModel::new("alpha", 0));
        let checkpoints = SimCheckpoints::new(model).unwrap();
        checkpoints.fail_saves(true);
        assert!(checkpoints.schedule_save("CP1", 1).is_err());
        assert!(checkpoints.list_saved().unwrap().is_empty());
    }

    #[test]
    fn test_restore_request_taken_once() {
        let model = Arc::new(SimModel::new("alpha", 0));
        let checkpoints = SimCheckpoints::new(model).unwrap();
        checkpoints.schedule_restore("CP1", 0, 100, i64::MAX).unwrap();
        let request = checkpoints.take_pending_restore().unwrap().unwrap();
        assert_eq!(request.label, "CP1");
        assert_eq!(checkpoints.take_pending_restore().unwrap(), None);
    }
}
