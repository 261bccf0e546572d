//! Persistent checkpoint index backed by sled.
//!
//! Layout:
//! - tree `checkpoints`: label -> `CheckpointRecord` (JSON)
//! - tree `catalogues`: label -> `CatalogueSnapshot` (JSON), when a catalogue is attached
//! - key `restore` in the default tree: the scheduled `RestoreRequest`

use crate::catalogue::{CatalogueSnapshot, SharedCatalogue};
use fedbridge_env::{CheckpointRecord, CheckpointStore, EnvError, LocalSimulation};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

const RECORDS_TREE: &str = "checkpoints";
const CATALOGUES_TREE: &str = "catalogues";
const RESTORE_KEY: &[u8] = b"restore";

/// Checkpoint storage errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<CheckpointError> for EnvError {
    fn from(e: CheckpointError) -> Self {
        EnvError::checkpoint(e.to_string())
    }
}

/// A restore scheduled for the local simulation to pick up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub label: String,
    pub simulation_start_time: i64,
    pub simulation_time: i64,
    pub deadline: i64,
}

/// Sled-based checkpoint store.
pub struct SledCheckpointStore {
    db: sled::Db,
    records: sled::Tree,
    catalogues: sled::Tree,
    simulation: Option<Arc<dyn LocalSimulation>>,
    catalogue: Option<SharedCatalogue>,
}

impl SledCheckpointStore {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let db = sled::open(path)
            .map_err(|e| CheckpointError::Storage(format!("Failed to open sled DB: {}", e)))?;
        Self::from_db(db)
    }

    /// Create a temporary store (for testing)
    pub fn open_temp() -> Result<Self, CheckpointError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| CheckpointError::Storage(format!("Failed to open temp DB: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, CheckpointError> {
        let records = db
            .open_tree(RECORDS_TREE)
            .map_err(|e| CheckpointError::Storage(format!("Failed to open tree: {}", e)))?;
        let catalogues = db
            .open_tree(CATALOGUES_TREE)
            .map_err(|e| CheckpointError::Storage(format!("Failed to open tree: {}", e)))?;
        Ok(Self {
            db,
            records,
            catalogues,
            simulation: None,
            catalogue: None,
        })
    }

    /// Records the simulation start time of each save from `simulation`.
    pub fn with_simulation(mut self, simulation: Arc<dyn LocalSimulation>) -> Self {
        self.simulation = Some(simulation);
        self
    }

    /// Stores a snapshot of `catalogue` with each save.
    pub fn with_catalogue(mut self, catalogue: SharedCatalogue) -> Self {
        self.catalogue = Some(catalogue);
        self
    }

    /// The catalogue snapshot saved under `label`, if any.
    pub fn catalogue_snapshot(&self, label: &str) -> Result<Option<CatalogueSnapshot>, CheckpointError> {
        self.catalogues
            .get(label)
            .map_err(|e| CheckpointError::Storage(format!("Read failed: {}", e)))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// The scheduled restore, if any.
    pub fn pending_restore(&self) -> Result<Option<RestoreRequest>, CheckpointError> {
        self.db
            .get(RESTORE_KEY)
            .map_err(|e| CheckpointError::Storage(format!("Read failed: {}", e)))?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Removes and returns the scheduled restore.
    pub fn take_pending_restore(&self) -> Result<Option<RestoreRequest>, CheckpointError> {
        let request = self
            .db
            .remove(RESTORE_KEY)
            .map_err(|e| CheckpointError::Storage(format!("Remove failed: {}", e)))?
            .map(|bytes| decode(&bytes))
            .transpose()?;
        self.flush()?;
        Ok(request)
    }

    fn flush(&self) -> Result<(), CheckpointError> {
        self.db
            .flush()
            .map_err(|e| CheckpointError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn put<T: Serialize>(tree: &sled::Tree, key: &[u8], value: &T) -> Result<(), CheckpointError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| CheckpointError::Serialization(e.to_string()))?;
        tree.insert(key, bytes)
            .map_err(|e| CheckpointError::Storage(format!("Insert failed: {}", e)))?;
        Ok(())
    }

    fn save(&self, label: &str, simulation_time: i64) -> Result<(), CheckpointError> {
        let record = CheckpointRecord {
            label: label.to_string(),
            simulation_time,
            simulation_start_time: self
                .simulation
                .as_ref()
                .map_or(0, |sim| sim.simulation_start_time()),
        };

        if let Some(catalogue) = &self.catalogue {
            // Serialized against the dispatch thread by the catalogue lock
            let snapshot = catalogue.lock().snapshot();
            debug!("Saving {} catalogue entries under '{}'", snapshot.objects.len(), label);
            Self::put(&self.catalogues, label.as_bytes(), &snapshot)?;
        }
        Self::put(&self.records, label.as_bytes(), &record)?;
        self.flush()?;
        info!("Checkpoint '{}' stored at {}", label, simulation_time);
        Ok(())
    }

    fn list(&self) -> Result<Vec<CheckpointRecord>, CheckpointError> {
        let mut records = Vec::new();
        for result in self.records.iter() {
            let (_, bytes) = result
                .map_err(|e| CheckpointError::Storage(format!("Iteration failed: {}", e)))?;
            records.push(decode(&bytes)?);
        }
        Ok(records)
    }
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CheckpointError> {
    serde_json::from_slice(bytes).map_err(|e| CheckpointError::Serialization(e.to_string()))
}

impl CheckpointStore for SledCheckpointStore {
    fn schedule_save(&self, label: &str, simulation_time: i64) -> Result<(), EnvError> {
        Ok(self.save(label, simulation_time)?)
    }

    fn list_saved(&self) -> Result<Vec<CheckpointRecord>, EnvError> {
        Ok(self.list()?)
    }

    fn schedule_restore(
        &self,
        label: &str,
        simulation_start_time: i64,
        simulation_time: i64,
        deadline: i64,
    ) -> Result<(), EnvError> {
        let request = RestoreRequest {
            label: label.to_string(),
            simulation_start_time,
            simulation_time,
            deadline,
        };
        Self::put(&self.db, RESTORE_KEY, &request)?;
        self.flush()?;
        info!("Restore of '{}' scheduled", label);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::ObjectCatalogue;
    use crate::testing::StubSimulation;
    use fedbridge_env::{ObjectClassHandle, ObjectHandle};

    #[test]
    fn test_save_then_find_by_label() {
        let store = SledCheckpointStore::open_temp().unwrap();
        store.schedule_save("CP1", 7_200_000).unwrap();
        store.schedule_save("CP2", 9_000_000).unwrap();

        let records = store.list_saved().unwrap();
        let cp1 = records.iter().find(|r| r.label == "CP1").unwrap();
        assert_eq!(cp1.simulation_time, 7_200_000);
        assert_eq!(cp1.simulation_start_time, 0);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_resave_replaces_record() {
        let store = SledCheckpointStore::open_temp().unwrap();
        store.schedule_save("CP1", 1).unwrap();
        store.schedule_save("CP1", 2).unwrap();
        let records = store.list_saved().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].simulation_time, 2);
    }

    #[test]
    fn test_start_time_taken_from_simulation() {
        let sim = Arc::new(StubSimulation::new());
        let store = SledCheckpointStore::open_temp().unwrap().with_simulation(sim);
        store.schedule_save("CP1", 100).unwrap();
        assert_eq!(store.list_saved().unwrap()[0].simulation_start_time, 0);
    }

    #[test]
    fn test_restore_slot() {
        let store = SledCheckpointStore::open_temp().unwrap();
        assert_eq!(store.pending_restore().unwrap(), None);

        store.schedule_restore("CP1", 1_000, 9_000, i64::MAX).unwrap();
        let expected = RestoreRequest {
            label: "CP1".into(),
            simulation_start_time: 1_000,
            simulation_time: 9_000,
            deadline: i64::MAX,
        };
        assert_eq!(store.pending_restore().unwrap(), Some(expected.clone()));
        assert_eq!(store.take_pending_restore().unwrap(), Some(expected));
        assert_eq!(store.pending_restore().unwrap(), None);
    }

    #[test]
    fn test_catalogue_snapshot_saved_with_checkpoint() {
        let catalogue = ObjectCatalogue::shared();
        catalogue
            .lock()
            .discover(ObjectHandle(3), ObjectClassHandle(1), "Platform", "tank-1");

        let store = SledCheckpointStore::open_temp()
            .unwrap()
            .with_catalogue(catalogue.clone());
        store.schedule_save("CP1", 10).unwrap();

        let snapshot = store.catalogue_snapshot("CP1").unwrap().unwrap();
        assert_eq!(snapshot.objects.len(), 1);
        assert_eq!(snapshot.objects[0].instance_name, "tank-1");
        assert_eq!(store.catalogue_snapshot("missing").unwrap(), None);
    }
}
