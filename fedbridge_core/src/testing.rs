//! In-memory collaborators for unit tests.

use fedbridge_env::{
    AttributeHandle, CheckpointRecord, CheckpointStore, EnvError, HandleResolver,
    InteractionClassHandle, LinkStatus, LocalInteraction, LocalModel, LocalObjectId,
    LocalSimulation, ObjectClassHandle, ParameterHandle, RequestId, RtiAmbassador, RtiRequest,
    SimulationState, Value,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ============================================================================
// RTI
// ============================================================================

#[derive(Default)]
struct Recording {
    requests: Vec<RtiRequest>,
    next_id: u64,
    fail_next: usize,
    succeed_before_failing: Option<usize>,
}

/// Records every accepted request; can be told to refuse sends.
#[derive(Default)]
pub struct RecordingAmbassador {
    inner: Mutex<Recording>,
}

impl RecordingAmbassador {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<RtiRequest> {
        self.inner.lock().requests.clone()
    }

    pub fn clear(&self) {
        self.inner.lock().requests.clear();
    }

    /// Id of the last accepted request.
    pub fn last_id(&self) -> RequestId {
        RequestId(self.inner.lock().next_id)
    }

    /// Refuses the next `n` submissions.
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().fail_next = n;
    }

    /// Accepts `n` more submissions, then refuses all.
    pub fn fail_after(&self, n: usize) {
        self.inner.lock().succeed_before_failing = Some(n);
    }
}

impl RtiAmbassador for RecordingAmbassador {
    fn submit(&self, request: RtiRequest) -> Result<RequestId, EnvError> {
        let mut inner = self.inner.lock();
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(EnvError::rti(format!("refused {}", request.name())));
        }
        if let Some(remaining) = inner.succeed_before_failing.as_mut() {
            if *remaining == 0 {
                return Err(EnvError::rti(format!("refused {}", request.name())));
            }
            *remaining -= 1;
        }
        inner.next_id += 1;
        inner.requests.push(request);
        Ok(RequestId(inner.next_id))
    }
}

/// Allocates handles on first lookup.
#[derive(Default)]
pub struct StubResolver {
    names: Mutex<HashMap<String, u32>>,
}

impl StubResolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn id(&self, key: String) -> u32 {
        let mut names = self.names.lock();
        let next = names.len() as u32 + 1;
        *names.entry(key).or_insert(next)
    }

    fn name_of(&self, prefix: &str, id: u32) -> Result<String, EnvError> {
        self.names
            .lock()
            .iter()
            .find(|(key, value)| **value == id && key.starts_with(prefix))
            .map(|(key, _)| key[prefix.len()..].to_string())
            .ok_or_else(|| EnvError::handle(format!("{}{}", prefix, id)))
    }
}

impl HandleResolver for StubResolver {
    fn object_class_handle(&self, class: &str) -> Result<ObjectClassHandle, EnvError> {
        Ok(ObjectClassHandle(self.id(format!("class:{}", class))))
    }

    fn attribute_handle(
        &self,
        class: ObjectClassHandle,
        attribute: &str,
    ) -> Result<AttributeHandle, EnvError> {
        Ok(AttributeHandle(self.id(format!("attr:{}:{}", class.raw(), attribute))))
    }

    fn attribute_name(
        &self,
        class: ObjectClassHandle,
        attribute: AttributeHandle,
    ) -> Result<String, EnvError> {
        self.name_of(&format!("attr:{}:", class.raw()), attribute.raw())
    }

    fn interaction_class_handle(&self, class: &str) -> Result<InteractionClassHandle, EnvError> {
        Ok(InteractionClassHandle(self.id(format!("interaction:{}", class))))
    }

    fn parameter_handle(
        &self,
        class: InteractionClassHandle,
        parameter: &str,
    ) -> Result<ParameterHandle, EnvError> {
        Ok(ParameterHandle(self.id(format!("param:{}:{}", class.raw(), parameter))))
    }

    fn parameter_name(
        &self,
        class: InteractionClassHandle,
        parameter: ParameterHandle,
    ) -> Result<String, EnvError> {
        self.name_of(&format!("param:{}:", class.raw()), parameter.raw())
    }
}

// ============================================================================
// LOCAL SIMULATION
// ============================================================================

struct SimState {
    state: SimulationState,
    time: i64,
    start_time: i64,
    lookahead: Option<i64>,
    attachments: usize,
    detachments: usize,
}

pub struct StubSimulation {
    inner: Mutex<SimState>,
}

impl StubSimulation {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SimState {
                state: SimulationState::Initialized,
                time: 0,
                start_time: 0,
                lookahead: None,
                attachments: 0,
                detachments: 0,
            }),
        }
    }

    pub fn set_state(&self, state: SimulationState) {
        self.inner.lock().state = state;
    }

    pub fn set_time(&self, time: i64) {
        self.inner.lock().time = time;
    }

    pub fn lookahead(&self) -> Option<i64> {
        self.inner.lock().lookahead
    }

    pub fn gate_attachments(&self) -> usize {
        self.inner.lock().attachments
    }

    pub fn gate_detachments(&self) -> usize {
        self.inner.lock().detachments
    }
}

impl LocalSimulation for StubSimulation {
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

    fn attach_time_gate(&self, _federate_name: &str) {
        self.inner.lock().attachments += 1;
    }

    fn detach_time_gate(&self, _federate_name: &str) {
        self.inner.lock().detachments += 1;
    }
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

#[derive(Default)]
struct Checkpoints {
    records: Vec<CheckpointRecord>,
    saves: Vec<(String, i64)>,
    restores: Vec<(String, i64, i64, i64)>,
    fail_saves: bool,
}

#[derive(Default)]
pub struct MemoryCheckpoints {
    inner: Mutex<Checkpoints>,
}

impl MemoryCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: CheckpointRecord) {
        self.inner.lock().records.push(record);
    }

    pub fn saves(&self) -> Vec<(String, i64)> {
        self.inner.lock().saves.clone()
    }

    pub fn restores(&self) -> Vec<(String, i64, i64, i64)> {
        self.inner.lock().restores.clone()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.inner.lock().fail_saves = fail;
    }
}

impl CheckpointStore for MemoryCheckpoints {
    fn schedule_save(&self, label: &str, simulation_time: i64) -> Result<(), EnvError> {
        let mut inner = self.inner.lock();
        if inner.fail_saves {
            return Err(EnvError::checkpoint("disk full"));
        }
        inner.saves.push((label.to_string(), simulation_time));
        inner.records.push(CheckpointRecord {
            label: label.to_string(),
            simulation_time,
            simulation_start_time: 0,
        });
        Ok(())
    }

    fn list_saved(&self) -> Result<Vec<CheckpointRecord>, EnvError> {
        Ok(self.inner.lock().records.clone())
    }

    fn schedule_restore(
        &self,
        label: &str,
        simulation_start_time: i64,
        simulation_time: i64,
        deadline: i64,
    ) -> Result<(), EnvError> {
        self.inner.lock().restores.push((
            label.to_string(),
            simulation_start_time,
            simulation_time,
            deadline,
        ));
        Ok(())
    }
}

// ============================================================================
// LOCAL MODEL
// ============================================================================

struct StubObject {
    class: String,
    name: String,
    ghost: bool,
    link: LinkStatus,
    properties: BTreeMap<String, Value>,
}

#[derive(Default)]
struct ModelState {
    objects: BTreeMap<LocalObjectId, StubObject>,
    next_id: u64,
    destroyed: Vec<LocalObjectId>,
    subscribed: BTreeSet<String>,
    delivered: Vec<LocalInteraction>,
    fail_ghosts: bool,
}

#[derive(Default)]
pub struct StubModel {
    inner: Mutex<ModelState>,
}

impl StubModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, class: &str, name: &str, ghost: bool) -> LocalObjectId {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = LocalObjectId(inner.next_id);
        inner.objects.insert(
            id,
            StubObject {
                class: class.to_string(),
                name: name.to_string(),
                ghost,
                link: LinkStatus::Unlinked,
                properties: BTreeMap::new(),
            },
        );
        id
    }

    /// Adds a local (non-ghost) object.
    pub fn add(&self, class: &str, name: &str) -> LocalObjectId {
        self.insert(class, name, false)
    }

    pub fn put(&self, object: LocalObjectId, name: &str, value: Value) {
        if let Some(obj) = self.inner.lock().objects.get_mut(&object) {
            obj.properties.insert(name.to_string(), value);
        }
    }

    pub fn exists(&self, object: LocalObjectId) -> bool {
        self.inner.lock().objects.contains_key(&object)
    }

    pub fn ghosts(&self) -> Vec<LocalObjectId> {
        self.inner
            .lock()
            .objects
            .iter()
            .filter(|(_, obj)| obj.ghost)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn destroyed(&self) -> Vec<LocalObjectId> {
        self.inner.lock().destroyed.clone()
    }

    pub fn subscribed(&self) -> BTreeSet<String> {
        self.inner.lock().subscribed.clone()
    }

    pub fn delivered(&self) -> Vec<LocalInteraction> {
        self.inner.lock().delivered.clone()
    }

    pub fn fail_ghosts(&self, fail: bool) {
        self.inner.lock().fail_ghosts = fail;
    }
}

impl LocalModel for StubModel {
    fn class_of(&self, object: LocalObjectId) -> Option<String> {
        self.inner.lock().objects.get(&object).map(|obj| obj.class.clone())
    }

    fn property(&self, object: LocalObjectId, name: &str) -> Option<Value> {
        self.inner
            .lock()
            .objects
            .get(&object)
            .and_then(|obj| obj.properties.get(name).cloned())
    }

    fn set_property(&self, object: LocalObjectId, name: &str, value: Value) -> Result<(), EnvError> {
        let mut inner = self.inner.lock();
        let obj = inner
            .objects
            .get_mut(&object)
            .ok_or(EnvError::UnknownObject(object.raw()))?;
        obj.properties.insert(name.to_string(), value);
        Ok(())
    }

    fn find_by_name(&self, class: &str, name: &str) -> Option<LocalObjectId> {
        self.inner
            .lock()
            .objects
            .iter()
            .find(|(_, obj)| obj.class == class && obj.name == name)
            .map(|(id, _)| *id)
    }

    fn create_ghost(&self, class: &str, name: &str) -> Result<LocalObjectId, EnvError> {
        if self.inner.lock().fail_ghosts {
            return Err(EnvError::simulation("ghost creation refused"));
        }
        Ok(self.insert(class, name, true))
    }

    fn destroy_ghost(&self, object: LocalObjectId) -> Result<(), EnvError> {
        let mut inner = self.inner.lock();
        inner
            .objects
            .remove(&object)
            .ok_or(EnvError::UnknownObject(object.raw()))?;
        inner.destroyed.push(object);
        Ok(())
    }

    fn link_status(&self, object: LocalObjectId) -> LinkStatus {
        self.inner
            .lock()
            .objects
            .get(&object)
            .map_or(LinkStatus::Unlinked, |obj| obj.link)
    }

    fn set_link_status(&self, object: LocalObjectId, status: LinkStatus) -> Result<(), EnvError> {
        let mut inner = self.inner.lock();
        let obj = inner
            .objects
            .get_mut(&object)
            .ok_or(EnvError::UnknownObject(object.raw()))?;
        obj.link = status;
        Ok(())
    }

    fn subscribe_class(&self, class: &str) {
        self.inner.lock().subscribed.insert(class.to_string());
    }

    fn deliver_interaction(&self, interaction: LocalInteraction) -> Result<(), EnvError> {
        self.inner.lock().delivered.push(interaction);
        Ok(())
    }
}
