//! Federate - the explicit context object that owns the three engines.
//!
//! All RTI callbacks and local simulation events of one federate enter
//! through `handle_callback` / `handle_local_event` on a single dispatch
//! thread:
//!
//! ```text
//!  RtiCallback ──┬─ object traffic ──► gate paused? ──yes──► backlog (FIFO)
//!                │                          │no
//!                │                          ▼
//!                │                   TranslationPipeline
//!                ├─ time ───────────► TimeSyncHandle
//!                ├─ save/restore ───► FederationCoordinator
//!                └─ RequestReturn ──► coordinator, then pipeline
//!
//!  LocalEvent ───► coordinator / pipeline / time
//! ```
//!
//! Federate status changes (post-join, pre-resign, post-resign) are fanned
//! out to the time engine and the pipeline in that order.

use crate::config::FederateConfig;
use crate::converter::{InteractionConverter, ObjectConverter};
use crate::federation::{
    FederateStatus, FederationCoordinator, LifecycleError, LifecycleEvent, PipelineGate,
};
use crate::pipeline::{PipelineContext, TranslationPipeline};
use crate::time_sync::{TimeSyncEngine, TimeSyncHandle};
use fedbridge_env::{
    CheckpointStore, HandleResolver, LocalInteraction, LocalModel, LocalObjectId,
    LocalSimulation, RequestId, RtiAmbassador, RtiCallback, RtiReturn, SimulationState,
};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// External collaborators of one federate.
#[derive(Clone)]
pub struct FederateServices {
    pub rti: Arc<dyn RtiAmbassador>,
    pub handles: Arc<dyn HandleResolver>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub simulation: Arc<dyn LocalSimulation>,
    pub model: Arc<dyn LocalModel>,
}

/// Notifications from the local simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    SimulationStateChanged(SimulationState),
    ObjectCreated(LocalObjectId),
    PropertiesChanged {
        object: LocalObjectId,
        properties: Vec<String>,
    },
    ObjectDeleted(LocalObjectId),
    InteractionFired(LocalInteraction),
    CheckpointSaveFailed,
    CheckpointRestoreFailed,
}

/// One federate: time engine, lifecycle coordinator and translation pipeline.
pub struct Federate {
    name: String,
    time: TimeSyncHandle,
    coordinator: FederationCoordinator,
    pipeline: TranslationPipeline,
    gate: Arc<PipelineGate>,
    backlog: VecDeque<RtiCallback>,
    time_started: bool,
}

impl Federate {
    pub fn new(config: &FederateConfig, services: FederateServices) -> Self {
        let gate = Arc::new(PipelineGate::new());
        let time = TimeSyncHandle::new(TimeSyncEngine::new(
            config.federate_name.clone(),
            config.time.clone(),
            Arc::clone(&services.rti),
            Arc::clone(&services.simulation),
        ));
        let coordinator = FederationCoordinator::new(
            config.federation_name.clone(),
            config.federate_name.clone(),
            config.fom_path.clone(),
            config.resign_action,
            Arc::clone(&services.rti),
            Arc::clone(&services.checkpoints),
            Arc::clone(&services.simulation),
            time.clone(),
            Arc::clone(&gate),
        );
        let pipeline = TranslationPipeline::new(
            config.federate_name.clone(),
            PipelineContext {
                rti: services.rti,
                handles: services.handles,
                model: services.model,
                policy: Arc::new(config.pubsub.clone()),
            },
            &config.liveness,
        );

        Self {
            name: config.federate_name.clone(),
            time,
            coordinator,
            pipeline,
            gate,
            backlog: VecDeque::new(),
            time_started: false,
        }
    }

    pub fn register_object_converter(&mut self, converter: Box<dyn ObjectConverter>) {
        self.pipeline.register_object_converter(converter);
    }

    pub fn register_interaction_converter(&mut self, converter: Box<dyn InteractionConverter>) {
        self.pipeline.register_interaction_converter(converter);
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    pub fn create_federation(&mut self) -> Result<RequestId, LifecycleError> {
        self.coordinator.create_federation()
    }

    pub fn destroy_federation(&mut self) -> Result<RequestId, LifecycleError> {
        self.coordinator.destroy_federation()
    }

    pub fn join_federation(&mut self) -> Result<RequestId, LifecycleError> {
        self.coordinator.join_federation()
    }

    /// Notifies components of the coming resignation, then resigns.
    pub fn resign_federation(&mut self) -> Result<RequestId, LifecycleError> {
        if !self.coordinator.is_joined() {
            return self.coordinator.resign_federation();
        }
        self.fan_out(FederateStatus::PreResign);
        self.coordinator.resign_federation()
    }

    fn fan_out(&mut self, status: FederateStatus) {
        debug!("{}: federate status {:?}", self.name, status);
        self.time.lock().on_federate_status_changed(status);
        self.pipeline.on_federate_status_changed(status);
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    /// Processes one RTI callback.
    ///
    /// Returns the lifecycle event a request return resolved to, if any.
    pub fn handle_callback(&mut self, callback: RtiCallback) -> Option<LifecycleEvent> {
        if callback.is_object_traffic() && self.gate.is_paused() {
            debug!("Pipeline paused, queueing callback");
            self.backlog.push_back(callback);
            return None;
        }
        self.drain_backlog();

        let event = self.dispatch(callback);
        self.drain_backlog();
        event
    }

    /// Processes queued pipeline callbacks in arrival order, unless paused.
    pub fn drain_backlog(&mut self) {
        while !self.gate.is_paused() {
            let Some(callback) = self.backlog.pop_front() else {
                break;
            };
            self.dispatch(callback);
        }
    }

    fn dispatch(&mut self, callback: RtiCallback) -> Option<LifecycleEvent> {
        match callback {
            RtiCallback::DiscoverObjectInstance { object, class, name } => {
                self.pipeline.process_discover(object, class, &name);
            }
            RtiCallback::ReflectAttributeValues {
                object,
                attributes,
                tag,
            } => self.pipeline.process_reflect(object, &attributes, &tag),
            RtiCallback::RemoveObjectInstance { object, .. } => {
                self.pipeline.process_remove(object);
            }
            RtiCallback::ProvideAttributeValueUpdate { object, attributes } => {
                self.pipeline
                    .process_provide_attribute_update(object, &attributes)
            }
            RtiCallback::ReceiveInteraction {
                class,
                parameters,
                tag,
            } => self
                .pipeline
                .process_receive_interaction(class, &parameters, &tag),

            RtiCallback::TimeAdvanceGrant { time } => self.time.lock().on_time_advance_grant(time),
            RtiCallback::TimeRegulationEnabled { time } => {
                self.time.lock().on_regulation_enabled(time)
            }
            RtiCallback::TimeRegulationDisabled => self.time.lock().on_regulation_disabled(),
            RtiCallback::TimeConstrainedEnabled { time } => {
                self.time.lock().on_constrained_enabled(time)
            }
            RtiCallback::TimeConstrainedDisabled => self.time.lock().on_constrained_disabled(),

            RtiCallback::InitiateFederateSave { label } => {
                self.coordinator.on_initiate_federate_save(&label)
            }
            RtiCallback::FederationSaved => self.coordinator.on_federation_saved(),
            RtiCallback::FederationNotSaved => self.coordinator.on_federation_not_saved(),
            RtiCallback::FederationRestoreBegun => self.coordinator.on_federation_restore_begun(),
            RtiCallback::InitiateFederateRestore { label, federate } => self
                .coordinator
                .on_initiate_federate_restore(&label, federate),
            RtiCallback::FederationRestored => self.coordinator.on_federation_restored(),
            RtiCallback::FederationNotRestored => self.coordinator.on_federation_not_restored(),

            RtiCallback::RequestReturn(ret) => return self.on_return(&ret),
        }
        None
    }

    fn on_return(&mut self, ret: &RtiReturn) -> Option<LifecycleEvent> {
        if let Some(event) = self.coordinator.on_return(ret) {
            match &event {
                LifecycleEvent::Joined(_) => self.fan_out(FederateStatus::PostJoin),
                LifecycleEvent::Resigned => {
                    self.fan_out(FederateStatus::PostResign);
                    self.backlog.clear();
                }
                _ => {}
            }
            return Some(event);
        }
        if self.pipeline.on_return(ret) {
            return None;
        }
        if let Err(e) = &ret.outcome {
            warn!("{}: request {} failed: {}", self.name, ret.request.raw(), e);
        }
        None
    }

    /// Processes one local simulation event.
    pub fn handle_local_event(&mut self, event: LocalEvent) {
        match event {
            LocalEvent::SimulationStateChanged(state) => {
                debug!("{}: simulation {:?}", self.name, state);
                self.coordinator.on_simulation_state(state);
                self.pipeline.on_simulation_state(state);
                if state == SimulationState::Running && !self.time_started {
                    self.time_started = true;
                    self.time.lock().start();
                }
            }
            LocalEvent::ObjectCreated(object) => self.pipeline.process_local_create(object),
            LocalEvent::PropertiesChanged { object, properties } => {
                self.pipeline.process_property_change(object, &properties)
            }
            LocalEvent::ObjectDeleted(object) => self.pipeline.process_local_delete(object),
            LocalEvent::InteractionFired(interaction) => {
                self.pipeline.process_local_interaction(&interaction)
            }
            LocalEvent::CheckpointSaveFailed => self.coordinator.on_checkpoint_save_failed(),
            LocalEvent::CheckpointRestoreFailed => self.coordinator.on_checkpoint_restore_failed(),
        }
    }

    /// Drives clock-based services (heartbeats, timeouts).
    pub fn tick(&mut self, now: i64) {
        self.pipeline.tick(now);
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Time handle for the simulation thread.
    pub fn time(&self) -> &TimeSyncHandle {
        &self.time
    }

    pub fn coordinator(&self) -> &FederationCoordinator {
        &self.coordinator
    }

    pub fn pipeline(&self) -> &TranslationPipeline {
        &self.pipeline
    }

    pub fn gate(&self) -> &Arc<PipelineGate> {
        &self.gate
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}
