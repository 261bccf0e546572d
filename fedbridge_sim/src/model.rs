//! In-memory local simulation and object model.
//!
//! Scenario code drives the model through `create`, `update`, `delete`,
//! `fire` and `set_state`; each of those queues the `LocalEvent` a real
//! simulation would report, for the harness to hand to the federate.
//! Writes coming from the federate (ghosts, reflected properties) go
//! through the `LocalModel` trait and queue nothing.

use fedbridge_core::LocalEvent;
use fedbridge_env::{
    EnvError, LinkStatus, LocalInteraction, LocalModel, LocalObjectId, LocalSimulation,
    SimulationState, Value,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{debug, info};

/// One object of the local model.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalObject {
    pub class: String,
    pub name: String,
    pub properties: BTreeMap<String, Value>,
    pub link: LinkStatus,
    /// Created on behalf of a remote object
    pub ghost: bool,
}

#[derive(Debug, Clone)]
struct ModelSnapshot {
    time: i64,
    objects: BTreeMap<LocalObjectId, LocalObject>,
}

#[derive(Debug)]
struct ModelState {
    state: SimulationState,
    time: i64,
    start_time: i64,
    lookahead: Option<i64>,
    time_gates: BTreeSet<String>,
    objects: BTreeMap<LocalObjectId, LocalObject>,
    next_id: u64,
    subscribed: BTreeSet<String>,
    events: VecDeque<LocalEvent>,
    delivered: Vec<LocalInteraction>,
    snapshots: HashMap<String, ModelSnapshot>,
}

impl ModelState {
    fn emit_for(&mut self, class: &str, event: LocalEvent) {
        if self.subscribed.contains(class) {
            self.events.push_back(event);
        }
    }

    fn object_mut(&mut self, object: LocalObjectId) -> Result<&mut LocalObject, EnvError> {
        self.objects
            .get_mut(&object)
            .ok_or(EnvError::UnknownObject(object.raw()))
    }
}

/// A local simulation with its object model.
#[derive(Debug)]
pub struct SimModel {
    name: String,
    inner: Mutex<ModelState>,
}

impl SimModel {
    pub fn new(name: impl Into<String>, start_time: i64) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(ModelState {
                state: SimulationState::Uninitialized,
                time: start_time,
                start_time,
                lookahead: None,
                time_gates: BTreeSet::new(),
                objects: BTreeMap::new(),
                next_id: 0,
                subscribed: BTreeSet::new(),
                events: VecDeque::new(),
                delivered: Vec::new(),
                snapshots: HashMap::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // SCENARIO SIDE
    // ========================================================================

    /// Changes the simulation state and reports it.
    pub fn set_state(&self, state: SimulationState) {
        let mut inner = self.inner.lock();
        if inner.state == state {
            return;
        }
        debug!("{}: simulation {:?} -> {:?}", self.name, inner.state, state);
        inner.state = state;
        inner.events.push_back(LocalEvent::SimulationStateChanged(state));
    }

    pub fn set_time(&self, time: i64) {
        self.inner.lock().time = time;
    }

    /// Creates a local object.
    pub fn create<I>(&self, class: &str, name: &str, properties: I) -> LocalObjectId
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = LocalObjectId(inner.next_id);
        inner.objects.insert(
            id,
            LocalObject {
                class: class.to_string(),
                name: name.to_string(),
                properties: properties
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                link: LinkStatus::Unlinked,
                ghost: false,
            },
        );
        inner.emit_for(class, LocalEvent::ObjectCreated(id));
        id
    }

    /// Changes properties of a local object.
    pub fn update<I>(&self, object: LocalObjectId, properties: I) -> Result<(), EnvError>
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        let mut inner = self.inner.lock();
        let record = inner.object_mut(object)?;
        let mut changed = Vec::new();
        for (name, value) in properties {
            record.properties.insert(name.to_string(), value);
            changed.push(name.to_string());
        }
        let class = record.class.clone();
        inner.emit_for(
            &class,
            LocalEvent::PropertiesChanged {
                object,
                properties: changed,
            },
        );
        Ok(())
    }

    /// Deletes a local object.
    pub fn delete(&self, object: LocalObjectId) -> Result<(), EnvError> {
        let mut inner = self.inner.lock();
        let record = inner
            .objects
            .remove(&object)
            .ok_or(EnvError::UnknownObject(object.raw()))?;
        inner.emit_for(&record.class, LocalEvent::ObjectDeleted(object));
        Ok(())
    }

    /// Fires a local interaction.
    pub fn fire(&self, interaction: LocalInteraction) {
        self.inner
            .lock()
            .events
            .push_back(LocalEvent::InteractionFired(interaction));
    }

    /// Queues a local alert.
    pub fn raise(&self, event: LocalEvent) {
        self.inner.lock().events.push_back(event);
    }

    /// Takes the queued events in order.
    pub fn take_events(&self) -> Vec<LocalEvent> {
        self.inner.lock().events.drain(..).collect()
    }

    // ========================================================================
    // CHECKPOINTS
    // ========================================================================

    /// Remembers the own objects and clock under `label`.
    pub fn snapshot(&self, label: &str) {
        let mut inner = self.inner.lock();
        let snapshot = ModelSnapshot {
            time: inner.time,
            objects: inner
                .objects
                .iter()
                .filter(|(_, o)| !o.ghost)
                .map(|(id, o)| (*id, o.clone()))
                .collect(),
        };
        debug!("{}: snapshot '{}' with {} objects", self.name, label, snapshot.objects.len());
        inner.snapshots.insert(label.to_string(), snapshot);
    }

    /// Rolls own objects and the clock back to the snapshot `label`.
    ///
    /// Reports `Restoring`, then the object differences as create, change
    /// and delete events, then `Restored`. Ghosts are left alone.
    pub fn restore(&self, label: &str) -> Result<(), EnvError> {
        let mut inner = self.inner.lock();
        let snapshot = inner
            .snapshots
            .get(label)
            .cloned()
            .ok_or_else(|| EnvError::simulation(format!("no snapshot '{}'", label)))?;

        inner.state = SimulationState::Restoring;
        inner
            .events
            .push_back(LocalEvent::SimulationStateChanged(SimulationState::Restoring));

        let current: Vec<LocalObjectId> = inner
            .objects
            .iter()
            .filter(|(_, o)| !o.ghost)
            .map(|(id, _)| *id)
            .collect();
        for id in current {
            if snapshot.objects.contains_key(&id) {
                continue;
            }
            if let Some(record) = inner.objects.remove(&id) {
                inner.emit_for(&record.class, LocalEvent::ObjectDeleted(id));
            }
        }

        for (id, saved) in &snapshot.objects {
            match inner.objects.insert(*id, saved.clone()) {
                None => inner.emit_for(&saved.class, LocalEvent::ObjectCreated(*id)),
                Some(previous) => {
                    let changed: Vec<String> = saved
                        .properties
                        .iter()
                        .filter(|(name, value)| previous.properties.get(*name) != Some(*value))
                        .map(|(name, _)| name.clone())
                        .collect();
                    if !changed.is_empty() {
                        inner.emit_for(
                            &saved.class,
                            LocalEvent::PropertiesChanged {
                                object: *id,
                                properties: changed,
                            },
                        );
                    }
                }
            }
        }

        inner.time = snapshot.time;
        inner.state = SimulationState::Restored;
        inner
            .events
            .push_back(LocalEvent::SimulationStateChanged(SimulationState::Restored));
        info!("{}: restored '{}' at {}", self.name, label, snapshot.time);
        Ok(())
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    pub fn object(&self, object: LocalObjectId) -> Option<LocalObject> {
        self.inner.lock().objects.get(&object).cloned()
    }

    /// Ghosts by instance name.
    pub fn ghosts(&self) -> BTreeMap<String, LocalObject> {
        self.inner
            .lock()
            .objects
            .values()
            .filter(|o| o.ghost)
            .map(|o| (o.name.clone(), o.clone()))
            .collect()
    }

    /// Ids of objects owned by this simulation.
    pub fn own_objects(&self) -> Vec<LocalObjectId> {
        self.inner
            .lock()
            .objects
            .iter()
            .filter(|(_, o)| !o.ghost)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn delivered(&self) -> Vec<LocalInteraction> {
        self.inner.lock().delivered.clone()
    }

    pub fn time_gates(&self) -> BTreeSet<String> {
        self.inner.lock().time_gates.clone()
    }

    pub fn lookahead(&self) -> Option<i64> {
        self.inner.lock().lookahead
    }
}

impl LocalSimulation for SimModel {
    fn simulation_state(&self) -> SimulationState {
        self.inner.lock().state
    }

    fn simulation_time(&self) -> i64 {
        self.inner.lock().time
    }

    fn simulation_start_time(&self) -> i64 {
        self.inner.lock().start_time
    }

    fn set_lookahead(&self, lookahead_ms: i64) {
        self.inner.lock().lookahead = Some(lookahead_ms);
    }

    fn attach_time_gate(&self, federate_name: &str) {
        self.inner.lock().time_gates.insert(federate_name.to_string());
    }

    fn detach_time_gate(&self, federate_name: &str) {
        self.inner.lock().time_gates.remove(federate_name);
    }
}

impl LocalModel for SimModel {
    fn class_of(&self, object: LocalObjectId) -> Option<String> {
        self.inner.lock().objects.get(&object).map(|o| o.class.clone())
    }

    fn property(&self, object: LocalObjectId, name: &str) -> Option<Value> {
        self.inner
            .lock()
            .objects
            .get(&object)
            .and_then(|o| o.properties.get(name).cloned())
    }

    fn set_property(&self, object: LocalObjectId, name: &str, value: Value) -> Result<(), EnvError> {
        self.inner
            .lock()
            .object_mut(object)?
            .properties
            .insert(name.to_string(), value);
        Ok(())
    }

    fn find_by_name(&self, class: &str, name: &str) -> Option<LocalObjectId> {
        self.inner
            .lock()
            .objects
            .iter()
            .find(|(_, o)| o.class == class && o.name == name)
            .map(|(id, _)| *id)
    }

    fn create_ghost(&self, class: &str, name: &str) -> Result<LocalObjectId, EnvError> {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = LocalObjectId(inner.next_id);
        inner.objects.insert(
            id,
            LocalObject {
                class: class.to_string(),
                name: name.to_string(),
                properties: BTreeMap::new(),
                link: LinkStatus::Unlinked,
                ghost: true,
            },
        );
        Ok(id)
    }

    fn destroy_ghost(&self, object: LocalObjectId) -> Result<(), EnvError> {
        let mut inner = self.inner.lock();
        match inner.objects.get(&object) {
            Some(o) if o.ghost => {
                inner.objects.remove(&object);
                Ok(())
            }
            Some(_) => Err(EnvError::simulation(format!("{} is not a ghost", object))),
            None => Err(EnvError::UnknownObject(object.raw())),
        }
    }

    fn link_status(&self, object: LocalObjectId) -> LinkStatus {
        self.inner
            .lock()
            .objects
            .get(&object)
            .map_or(LinkStatus::Unlinked, |o| o.link)
    }

    fn set_link_status(&self, object: LocalObjectId, status: LinkStatus) -> Result<(), EnvError> {
        self.inner.lock().object_mut(object)?.link = status;
        Ok(())
    }

    fn subscribe_class(&self, class: &str) {
        debug!("{}: reporting events of {}", self.name, class);
        self.inner.lock().subscribed.insert(class.to_string());
    }

    fn deliver_interaction(&self, interaction: LocalInteraction) -> Result<(), EnvError> {
        self.inner.lock().delivered.push(interaction);
        Ok(())
    }
}
