//! Federation Lifecycle & Checkpoint Coordinator
//!
//! Drives create/join/resign/destroy and the HLA save/restore handshakes:
//!
//! ```text
//! InitiateFederateSave(label)
//!   ├─ simulation not RUNNING ──► FederateSaveNotComplete
//!   └─ pause gate ─► FederateSaveBegun ─► schedule_save ─► FederateSaveComplete
//!                     (any failure ──► FederateSaveNotComplete)
//!      resume gate (always)
//!
//! InitiateFederateRestore(label, handle)
//!   ├─ label unknown ──► FederateRestoreNotComplete
//!   └─ schedule_restore ─► arm ... simulation RESTORED ─► FederateRestoreComplete
//! ```

use crate::time_sync::TimeSyncHandle;
use fedbridge_env::{
    CheckpointRecord, CheckpointStore, EnvError, FederateHandle, LocalSimulation, RequestId,
    ResignAction, ReturnValue, RtiAmbassador, RtiException, RtiRequest, RtiReturn,
    SimulationState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Federate status notifications fanned out to every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FederateStatus {
    PostJoin,
    PreResign,
    PostResign,
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FederationState {
    NotJoined,
    JoinPending,
    Joined,
    SavePending,
    RestorePending,
    ResignPending,
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: FederationState,
    },

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Outcome of a lifecycle request, derived from its RTI return.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Created,
    CreateFailed(RtiException),
    Destroyed,
    DestroyFailed(RtiException),
    Joined(FederateHandle),
    JoinFailed(RtiException),
    Resigned,
    ResignFailed(RtiException),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleRequest {
    Create,
    Destroy,
    Join,
    Resign,
}

// ============================================================================
// PIPELINE GATE
// ============================================================================

/// Pause flag of inbound translation-pipeline processing.
#[derive(Debug, Default)]
pub struct PipelineGate {
    paused: AtomicBool,
}

impl PipelineGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Pauses the gate until the returned guard is dropped.
    pub fn pause_guard(self: &Arc<Self>) -> GatePause {
        self.pause();
        GatePause {
            gate: Arc::clone(self),
        }
    }
}

/// Resumes the gate on drop.
pub struct GatePause {
    gate: Arc<PipelineGate>,
}

impl Drop for GatePause {
    fn drop(&mut self) {
        self.gate.resume();
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Federation lifecycle and checkpoint coordinator.
pub struct FederationCoordinator {
    federation_name: String,
    federate_name: String,
    fom_path: String,
    resign_action: ResignAction,

    rti: Arc<dyn RtiAmbassador>,
    checkpoints: Arc<dyn CheckpointStore>,
    simulation: Arc<dyn LocalSimulation>,
    time: TimeSyncHandle,
    gate: Arc<PipelineGate>,

    state: FederationState,
    federate_handle: Option<FederateHandle>,
    pending: HashMap<RequestId, LifecycleRequest>,
    waiting_for_restored: bool,
}

impl FederationCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        federation_name: impl Into<String>,
        federate_name: impl Into<String>,
        fom_path: impl Into<String>,
        resign_action: ResignAction,
        rti: Arc<dyn RtiAmbassador>,
        checkpoints: Arc<dyn CheckpointStore>,
        simulation: Arc<dyn LocalSimulation>,
        time: TimeSyncHandle,
        gate: Arc<PipelineGate>,
    ) -> Self {
        Self {
            federation_name: federation_name.into(),
            federate_name: federate_name.into(),
            fom_path: fom_path.into(),
            resign_action,
            rti,
            checkpoints,
            simulation,
            time,
            gate,
            state: FederationState::NotJoined,
            federate_handle: None,
            pending: HashMap::new(),
            waiting_for_restored: false,
        }
    }

    // ========================================================================
    // LIFECYCLE REQUESTS
    // ========================================================================

    pub fn create_federation(&mut self) -> Result<RequestId, LifecycleError> {
        let request = RtiRequest::CreateFederationExecution {
            federation: self.federation_name.clone(),
            fom_path: self.fom_path.clone(),
        };
        self.submit(request, LifecycleRequest::Create)
    }

    pub fn destroy_federation(&mut self) -> Result<RequestId, LifecycleError> {
        let request = RtiRequest::DestroyFederationExecution {
            federation: self.federation_name.clone(),
        };
        self.submit(request, LifecycleRequest::Destroy)
    }

    pub fn join_federation(&mut self) -> Result<RequestId, LifecycleError> {
        if self.state != FederationState::NotJoined {
            return Err(LifecycleError::InvalidState {
                operation: "join",
                state: self.state,
            });
        }
        let request = RtiRequest::JoinFederationExecution {
            federation: self.federation_name.clone(),
            federate_name: self.federate_name.clone(),
        };
        let id = self.submit(request, LifecycleRequest::Join)?;
        self.state = FederationState::JoinPending;
        Ok(id)
    }

    /// Resigns with the configured resign action.
    pub fn resign_federation(&mut self) -> Result<RequestId, LifecycleError> {
        self.resign_federation_with(self.resign_action)
    }

    pub fn resign_federation_with(
        &mut self,
        action: ResignAction,
    ) -> Result<RequestId, LifecycleError> {
        if !self.is_joined() {
            return Err(LifecycleError::InvalidState {
                operation: "resign",
                state: self.state,
            });
        }
        let id = self.submit(
            RtiRequest::ResignFederationExecution { action },
            LifecycleRequest::Resign,
        )?;
        self.state = FederationState::ResignPending;
        Ok(id)
    }

    fn submit(
        &mut self,
        request: RtiRequest,
        kind: LifecycleRequest,
    ) -> Result<RequestId, LifecycleError> {
        debug!("Sending {}", request.name());
        let id = self.rti.submit(request)?;
        self.pending.insert(id, kind);
        Ok(id)
    }

    /// Classifies the return of a lifecycle request.
    ///
    /// Returns `None` for returns of requests this coordinator did not send.
    pub fn on_return(&mut self, ret: &RtiReturn) -> Option<LifecycleEvent> {
        let kind = self.pending.remove(&ret.request)?;
        let event = match (kind, &ret.outcome) {
            (LifecycleRequest::Create, Ok(_))
            | (LifecycleRequest::Create, Err(RtiException::FederationExecutionAlreadyExists)) => {
                info!("Federation {} available", self.federation_name);
                LifecycleEvent::Created
            }
            (LifecycleRequest::Create, Err(e)) => {
                error!("Failed to create federation {}: {}", self.federation_name, e);
                LifecycleEvent::CreateFailed(e.clone())
            }

            (LifecycleRequest::Destroy, Ok(_))
            | (LifecycleRequest::Destroy, Err(RtiException::FederationExecutionDoesNotExist)) => {
                info!("Federation {} destroyed", self.federation_name);
                LifecycleEvent::Destroyed
            }
            (LifecycleRequest::Destroy, Err(e)) => {
                warn!("Failed to destroy federation {}: {}", self.federation_name, e);
                LifecycleEvent::DestroyFailed(e.clone())
            }

            (LifecycleRequest::Join, Ok(ReturnValue::Federate(handle))) => {
                self.joined(Some(*handle))
            }
            (LifecycleRequest::Join, Ok(_))
            | (LifecycleRequest::Join, Err(RtiException::FederateAlreadyExecutionMember)) => {
                self.joined(None)
            }
            (LifecycleRequest::Join, Err(e)) => {
                error!("Failed to join federation {}: {}", self.federation_name, e);
                self.state = FederationState::NotJoined;
                LifecycleEvent::JoinFailed(e.clone())
            }

            (LifecycleRequest::Resign, Ok(_)) => {
                info!("{} resigned from {}", self.federate_name, self.federation_name);
                self.state = FederationState::NotJoined;
                self.federate_handle = None;
                self.waiting_for_restored = false;
                LifecycleEvent::Resigned
            }
            (LifecycleRequest::Resign, Err(e)) => {
                error!("Failed to resign from {}: {}", self.federation_name, e);
                self.state = FederationState::Joined;
                LifecycleEvent::ResignFailed(e.clone())
            }
        };
        Some(event)
    }

    fn joined(&mut self, handle: Option<FederateHandle>) -> LifecycleEvent {
        if handle.is_some() {
            self.federate_handle = handle;
        }
        self.state = FederationState::Joined;
        let handle = self.federate_handle.unwrap_or(FederateHandle(0));
        info!(
            "{} joined {} as {}",
            self.federate_name, self.federation_name, handle
        );
        LifecycleEvent::Joined(handle)
    }

    // ========================================================================
    // SAVE
    // ========================================================================

    /// Handles the RTI's request to save under `label`.
    pub fn on_initiate_federate_save(&mut self, label: &str) {
        let state = self.simulation.simulation_state();
        if state != SimulationState::Running {
            warn!("Refusing save '{}': simulation is {:?}", label, state);
            self.report(RtiRequest::FederateSaveNotComplete);
            return;
        }

        self.state = FederationState::SavePending;
        let _paused = self.gate.pause_guard();

        if let Err(e) = self.run_save(label) {
            error!("Save '{}' failed: {}", label, e);
            self.report(RtiRequest::FederateSaveNotComplete);
        }
    }

    fn run_save(&self, label: &str) -> Result<(), EnvError> {
        self.rti.submit(RtiRequest::FederateSaveBegun)?;

        let simulation_time = self.simulation.simulation_time();
        info!(
            "Saving '{}' at simulation time {} (federation time {})",
            label,
            simulation_time,
            self.time.federation_time()
        );
        self.checkpoints.schedule_save(label, simulation_time)?;

        self.rti.submit(RtiRequest::FederateSaveComplete)?;
        Ok(())
    }

    pub fn on_federation_saved(&mut self) {
        info!("Federation saved");
        self.back_to_joined();
    }

    pub fn on_federation_not_saved(&mut self) {
        warn!("Federation not saved");
        self.back_to_joined();
    }

    /// Local alert: the checkpoint write failed after it was scheduled.
    pub fn on_checkpoint_save_failed(&mut self) {
        error!("Checkpoint save failed");
        self.report(RtiRequest::FederateSaveNotComplete);
    }

    // ========================================================================
    // RESTORE
    // ========================================================================

    pub fn on_federation_restore_begun(&mut self) {
        info!("Federation restore begun");
        self.state = FederationState::RestorePending;
    }

    /// Handles the RTI's request to restore `label`.
    pub fn on_initiate_federate_restore(&mut self, label: &str, federate: FederateHandle) {
        let record = match self.find_checkpoint(label) {
            Ok(Some(record)) => record,
            Ok(None) => {
                error!("No checkpoint labelled '{}'", label);
                self.report(RtiRequest::FederateRestoreNotComplete);
                return;
            }
            Err(e) => {
                error!("Could not list checkpoints: {}", e);
                self.report(RtiRequest::FederateRestoreNotComplete);
                return;
            }
        };

        if let Err(e) = self.checkpoints.schedule_restore(
            &record.label,
            record.simulation_start_time,
            record.simulation_time,
            i64::MAX,
        ) {
            error!("Could not schedule restore of '{}': {}", label, e);
            self.report(RtiRequest::FederateRestoreNotComplete);
            return;
        }

        info!("Restore of '{}' scheduled as {}", label, federate);
        self.state = FederationState::RestorePending;
        self.federate_handle = Some(federate);
        self.waiting_for_restored = true;
    }

    fn find_checkpoint(&self, label: &str) -> Result<Option<CheckpointRecord>, EnvError> {
        Ok(self
            .checkpoints
            .list_saved()?
            .into_iter()
            .find(|record| record.label == label))
    }

    /// Reacts to local simulation state changes.
    pub fn on_simulation_state(&mut self, state: SimulationState) {
        if state == SimulationState::Restored && self.waiting_for_restored {
            info!("Local restore complete");
            self.waiting_for_restored = false;
            self.report(RtiRequest::FederateRestoreComplete);
        }
    }

    /// Local alert: the checkpoint restore failed after it was scheduled.
    pub fn on_checkpoint_restore_failed(&mut self) {
        error!("Checkpoint restore failed");
        self.waiting_for_restored = false;
        self.report(RtiRequest::FederateRestoreNotComplete);
    }

    pub fn on_federation_restored(&mut self) {
        info!("Federation restored");
        self.back_to_joined();
    }

    pub fn on_federation_not_restored(&mut self) {
        warn!("Federation not restored");
        self.waiting_for_restored = false;
        self.back_to_joined();
    }

    fn back_to_joined(&mut self) {
        if matches!(
            self.state,
            FederationState::SavePending | FederationState::RestorePending
        ) {
            self.state = FederationState::Joined;
        }
    }

    /// Sends a best-effort notification; failures are only logged.
    fn report(&self, request: RtiRequest) {
        let name = request.name();
        if let Err(e) = self.rti.submit(request) {
            debug!("Ignoring failure to send {}: {}", name, e);
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn state(&self) -> FederationState {
        self.state
    }

    pub fn is_joined(&self) -> bool {
        matches!(
            self.state,
            FederationState::Joined | FederationState::SavePending | FederationState::RestorePending
        )
    }

    pub fn federate_handle(&self) -> Option<FederateHandle> {
        self.federate_handle
    }

    pub fn federate_name(&self) -> &str {
        &self.federate_name
    }

    pub fn resign_action(&self) -> ResignAction {
        self.resign_action
    }

    pub fn is_waiting_for_restored(&self) -> bool {
        self.waiting_for_restored
    }

    pub fn gate(&self) -> &Arc<PipelineGate> {
        &self.gate
    }
}
