//! Local simulation, object model, checkpoint and policy abstractions.
//!
//! These are the collaborators a federate needs on the local side. The
//! federate never owns local objects; it only holds `LocalObjectId`s and
//! asks the model for their properties.

use crate::error::EnvError;
use crate::types::{LinkStatus, LocalObjectId, SimulationState};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The local simulation engine as seen by the time and checkpoint logic.
pub trait LocalSimulation: Send + Sync {
    /// Returns the current simulation lifecycle state.
    fn simulation_state(&self) -> SimulationState;

    /// Returns the local simulated time in milliseconds since the epoch.
    fn simulation_time(&self) -> i64;

    /// Returns the simulated time the current run started at.
    fn simulation_start_time(&self) -> i64;

    /// Declares the federate lookahead (milliseconds) to the local engine.
    fn set_lookahead(&self, lookahead_ms: i64);

    /// Makes local time advance wait for federation grants.
    fn attach_time_gate(&self, federate_name: &str);

    /// Releases local time advance from federation grants.
    fn detach_time_gate(&self, federate_name: &str);
}

/// Access to the local object model (the ODM side of translation).
pub trait LocalModel: Send + Sync {
    /// Returns the class name of a local object.
    fn class_of(&self, object: LocalObjectId) -> Option<String>;

    /// Reads a property of a local object.
    fn property(&self, object: LocalObjectId, name: &str) -> Option<Value>;

    /// Writes a property of a local object.
    fn set_property(&self, object: LocalObjectId, name: &str, value: Value) -> Result<(), EnvError>;

    /// Finds an existing local object by class and name.
    fn find_by_name(&self, class: &str, name: &str) -> Option<LocalObjectId>;

    /// Creates the local representation of a remote object.
    fn create_ghost(&self, class: &str, name: &str) -> Result<LocalObjectId, EnvError>;

    /// Destroys a ghost created by `create_ghost`.
    fn destroy_ghost(&self, object: LocalObjectId) -> Result<(), EnvError>;

    /// Returns the link status of a local object.
    fn link_status(&self, object: LocalObjectId) -> LinkStatus;

    /// Changes the link status of a local object.
    fn set_link_status(&self, object: LocalObjectId, status: LinkStatus) -> Result<(), EnvError>;

    /// Starts reporting create/change/delete events for a class.
    fn subscribe_class(&self, class: &str);

    /// Hands a translated interaction to the local simulation.
    fn deliver_interaction(&self, interaction: LocalInteraction) -> Result<(), EnvError>;
}

/// An interaction expressed in local model terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalInteraction {
    /// Local interaction class name
    pub class: String,

    /// Parameter values by local name
    pub parameters: BTreeMap<String, Value>,
}

impl LocalInteraction {
    /// Creates an interaction without parameters.
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

/// A saved checkpoint known to the checkpoint store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// Federation-wide save label
    pub label: String,

    /// Simulated time at save
    pub simulation_time: i64,

    /// Simulated time the saved run started at
    pub simulation_start_time: i64,
}

/// Schedules checkpoint writes and restores.
pub trait CheckpointStore: Send + Sync {
    /// Schedules a checkpoint under `label` at `simulation_time`.
    fn schedule_save(&self, label: &str, simulation_time: i64) -> Result<(), EnvError>;

    /// Lists saved checkpoints.
    fn list_saved(&self) -> Result<Vec<CheckpointRecord>, EnvError>;

    /// Schedules a restore of `label`, to be completed before `deadline`.
    fn schedule_restore(
        &self,
        label: &str,
        simulation_start_time: i64,
        simulation_time: i64,
        deadline: i64,
    ) -> Result<(), EnvError>;
}

/// Per-class publish/subscribe decisions (the Pub/Sub matrix).
pub trait PubSubPolicy: Send + Sync {
    fn is_object_published(&self, fom_class: &str) -> bool;
    fn is_object_subscribed(&self, fom_class: &str) -> bool;
    fn is_interaction_published(&self, fom_class: &str) -> bool;
    fn is_interaction_subscribed(&self, fom_class: &str) -> bool;
}
