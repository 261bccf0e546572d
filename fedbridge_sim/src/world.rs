//! SimWorld - the simulation harness container.

use crate::checkpoints::SimCheckpoints;
use crate::fom::FomMappings;
use crate::model::SimModel;
use crate::rti::{SimRti, SimRtiPort};
use crate::SimError;

use fedbridge_core::{
    Federate, FederateConfig, FederateServices, LifecycleEvent, LivenessConfig, LocalEvent,
    PubSub, PubSubMatrix, TimeConfig,
};
use fedbridge_env::{ResignAction, SimulationState};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Federation execution name
    pub federation_name: String,

    /// Simulation start time in ms
    pub start_time: i64,

    /// Lookahead of regulating federates, in hours
    pub lookahead_hours: f64,

    /// Heartbeat and timeout settings of every federate
    pub liveness: LivenessConfig,

    /// Pump rounds before the federation is declared stalled
    pub max_rounds: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            federation_name: "SimFederation".to_string(),
            start_time: 1_704_067_200_000,
            lookahead_hours: 0.001,
            liveness: LivenessConfig::default(),
            max_rounds: 1_000,
        }
    }
}

impl SimConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_federation_name(mut self, name: impl Into<String>) -> Self {
        self.federation_name = name.into();
        self
    }

    pub fn with_start_time(mut self, start_time: i64) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_lookahead_hours(mut self, hours: f64) -> Self {
        self.lookahead_hours = hours;
        self
    }

    pub fn with_liveness(mut self, liveness: LivenessConfig) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Time settings for a federate with the given flags.
    pub fn time_config(&self, constrained: bool, regulating: bool) -> TimeConfig {
        TimeConfig {
            time_constrained: constrained,
            time_regulating: regulating,
            start_time: self.start_time,
            lookahead_hours: self.lookahead_hours,
        }
    }

    pub fn lookahead_ms(&self) -> i64 {
        self.time_config(false, true).lookahead_ms()
    }
}

/// What one simulated federate translates and how it takes part in time.
#[derive(Debug, Clone)]
pub struct FederateSpec {
    pub name: String,
    pub fom: FomMappings,
    pub pubsub: PubSubMatrix,
    pub constrained: bool,
    pub regulating: bool,
    pub resign_action: ResignAction,
}

impl FederateSpec {
    /// Standard mappings, publishing and subscribing everything, no time management.
    pub fn standard(name: impl Into<String>) -> Result<Self, SimError> {
        let fom = FomMappings::standard()?;
        let pubsub = fom.pubsub(PubSub::both());
        Ok(Self {
            name: name.into(),
            fom,
            pubsub,
            constrained: false,
            regulating: false,
            resign_action: ResignAction::DeleteObjects,
        })
    }

    /// Replaces the mappings; the pub/sub matrix follows with `flags`.
    pub fn with_fom(mut self, fom: FomMappings, flags: PubSub) -> Self {
        self.pubsub = fom.pubsub(flags);
        self.fom = fom;
        self
    }

    pub fn with_pubsub(mut self, pubsub: PubSubMatrix) -> Self {
        self.pubsub = pubsub;
        self
    }

    pub fn with_time(mut self, constrained: bool, regulating: bool) -> Self {
        self.constrained = constrained;
        self.regulating = regulating;
        self
    }

    pub fn with_resign_action(mut self, action: ResignAction) -> Self {
        self.resign_action = action;
        self
    }
}

/// A federate with its RTI connection, local simulation and checkpoint store.
pub struct SimFederate {
    pub federate: Federate,
    pub port: Arc<SimRtiPort>,
    pub model: Arc<SimModel>,
    pub checkpoints: Arc<SimCheckpoints>,
    /// Lifecycle outcomes in arrival order
    pub lifecycle: Vec<LifecycleEvent>,
}

impl SimFederate {
    /// Hands queued local events, RTI callbacks and a scheduled restore to
    /// the federate. Returns how many items were processed.
    fn step(&mut self) -> Result<usize, SimError> {
        let mut processed = 0;

        for event in self.model.take_events() {
            self.federate.handle_local_event(event);
            processed += 1;
        }

        while let Some(callback) = self.port.poll() {
            if let Some(event) = self.federate.handle_callback(callback) {
                debug!("{}: {:?}", self.federate.name(), event);
                self.lifecycle.push(event);
            }
            processed += 1;
        }

        if self.federate.coordinator().is_waiting_for_restored() {
            if let Some(request) = self.checkpoints.take_pending_restore()? {
                processed += 1;
                if let Err(e) = self.model.restore(&request.label) {
                    warn!("{}: restore of '{}' failed: {}", self.federate.name(), request.label, e);
                    self.federate
                        .handle_local_event(LocalEvent::CheckpointRestoreFailed);
                }
            }
        }

        Ok(processed)
    }

    pub fn name(&self) -> &str {
        self.federate.name()
    }

    /// Most recent lifecycle outcome.
    pub fn last_lifecycle(&self) -> Option<&LifecycleEvent> {
        self.lifecycle.last()
    }
}

/// The SimWorld - container for the entire simulated federation.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    rti: Arc<SimRti>,

    federates: Vec<SimFederate>,

    /// Wall clock driving heartbeats and timeouts, in ms
    clock: i64,

    /// Items processed by all pumps so far
    processed: u64,
}

impl SimWorld {
    /// Creates a world around a fresh RTI.
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            rti: SimRti::new(),
            federates: Vec::new(),
            clock: 0,
            processed: 0,
        }
    }

    /// Connects a new federate to the RTI and returns its index.
    pub fn add_federate(&mut self, spec: FederateSpec) -> Result<usize, SimError> {
        let port = self.rti.connect();
        let model = Arc::new(SimModel::new(spec.name.clone(), self.config.start_time));
        let checkpoints = Arc::new(SimCheckpoints::new(Arc::clone(&model))?);

        let config = FederateConfig {
            federation_name: self.config.federation_name.clone(),
            federate_name: spec.name.clone(),
            fom_path: "fedbridge.xml".to_string(),
            resign_action: spec.resign_action,
            time: self.config.time_config(spec.constrained, spec.regulating),
            liveness: self.config.liveness.clone(),
            pubsub: spec.pubsub.clone(),
        };
        config.validate()?;

        let services = FederateServices {
            rti: port.clone(),
            handles: port.clone(),
            checkpoints: checkpoints.clone(),
            simulation: model.clone(),
            model: model.clone(),
        };
        let mut federate = Federate::new(&config, services);
        spec.fom.register(&mut federate);

        info!("Federate '{}' connected on port {}", spec.name, port.id());
        self.federates.push(SimFederate {
            federate,
            port,
            model,
            checkpoints,
            lifecycle: Vec::new(),
        });
        Ok(self.federates.len() - 1)
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    /// Delivers everything queued until no federate has anything left.
    ///
    /// Returns the number of items processed.
    pub fn pump(&mut self) -> Result<usize, SimError> {
        let mut total = 0;
        for _ in 0..self.config.max_rounds {
            let mut round = 0;
            for node in &mut self.federates {
                round += node.step()?;
            }
            if round == 0 {
                self.processed += total as u64;
                return Ok(total);
            }
            total += round;
        }
        Err(SimError::Stalled(format!(
            "still busy after {} rounds",
            self.config.max_rounds
        )))
    }

    /// Advances the wall clock and drives heartbeats and timeouts.
    pub fn advance_clock(&mut self, dt_ms: i64) -> Result<(), SimError> {
        self.clock += dt_ms;
        for node in &mut self.federates {
            node.federate.tick(self.clock);
        }
        self.pump()?;
        Ok(())
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Creates the federation from the first federate, then joins everyone.
    pub fn create_and_join_all(&mut self) -> Result<(), SimError> {
        let first = self
            .federates
            .first_mut()
            .ok_or_else(|| SimError::Assertion("no federates".into()))?;
        first.federate.create_federation()?;
        self.pump()?;
        match self.federates[0].last_lifecycle() {
            Some(LifecycleEvent::Created) => {}
            other => {
                return Err(SimError::Assertion(format!(
                    "federation not created: {:?}",
                    other
                )))
            }
        }

        for index in 0..self.federates.len() {
            self.join(index)?;
        }
        Ok(())
    }

    /// Joins one federate to the existing federation.
    pub fn join(&mut self, index: usize) -> Result<(), SimError> {
        self.node_mut(index)?.federate.join_federation()?;
        self.pump()?;
        let node = self.node(index)?;
        if !node.federate.coordinator().is_joined() {
            return Err(SimError::Assertion(format!(
                "'{}' did not join: {:?}",
                node.name(),
                node.last_lifecycle()
            )));
        }
        Ok(())
    }

    /// Resigns one federate.
    pub fn resign(&mut self, index: usize) -> Result<(), SimError> {
        self.node_mut(index)?.federate.resign_federation()?;
        self.pump()?;
        Ok(())
    }

    /// Resigns every joined federate, then destroys the federation.
    pub fn resign_all(&mut self) -> Result<(), SimError> {
        for index in 0..self.federates.len() {
            if self.federates[index].federate.coordinator().is_joined() {
                self.resign(index)?;
            }
        }
        if let Some(last) = self.federates.last_mut() {
            last.federate.destroy_federation()?;
        }
        self.pump()?;
        Ok(())
    }

    pub fn set_state(&mut self, index: usize, state: SimulationState) -> Result<(), SimError> {
        self.node(index)?.model.set_state(state);
        self.pump()?;
        Ok(())
    }

    pub fn set_state_all(&mut self, state: SimulationState) -> Result<(), SimError> {
        for node in &self.federates {
            node.model.set_state(state);
        }
        self.pump()?;
        Ok(())
    }

    /// Starts a federation-wide save and runs it to completion.
    pub fn request_save(&mut self, label: &str) -> Result<(), SimError> {
        self.rti.request_federation_save(label)?;
        self.pump()?;
        Ok(())
    }

    /// Starts a federation-wide restore and runs it to completion.
    pub fn request_restore(&mut self, label: &str) -> Result<(), SimError> {
        self.rti.request_federation_restore(label)?;
        self.pump()?;
        Ok(())
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn rti(&self) -> &Arc<SimRti> {
        &self.rti
    }

    pub fn node(&self, index: usize) -> Result<&SimFederate, SimError> {
        self.federates
            .get(index)
            .ok_or_else(|| SimError::Assertion(format!("no federate #{}", index)))
    }

    pub fn node_mut(&mut self, index: usize) -> Result<&mut SimFederate, SimError> {
        self.federates
            .get_mut(index)
            .ok_or_else(|| SimError::Assertion(format!("no federate #{}", index)))
    }

    pub fn nodes(&self) -> &[SimFederate] {
        &self.federates
    }

    pub fn clock(&self) -> i64 {
        self.clock
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }
}
