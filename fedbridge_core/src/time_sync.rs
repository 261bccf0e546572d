//! The "TIME" Engine - Federation Time Synchronization
//!
//! Keeps local simulated time in step with federation logical time:
//! - Declares constrained/regulating mode once after join
//! - Issues at most one Time Advance Request (TAR) at a time
//! - Coalesces requests made while a TAR is in flight into one follow-up
//! - Releases blocked callers when the Time Advance Grant (TAG) arrives
//!
//! ```text
//!  simulation thread                 dispatch thread
//!  -----------------                 ---------------
//!  advance_to(t) ──► request_time_advance(t)
//!       │               └─► TimeAdvanceRequest(t + L) ──► RTI
//!       │ (blocks on oneshot)
//!       │                            TimeAdvanceGrant(g) ──► on_time_advance_grant(g)
//!       ◄──────────────────────────────── waiter.send(g)
//! ```
//!
//! Local time is milliseconds since the epoch; federation time carries the
//! same magnitude as `f64`.

use crate::config::TimeConfig;
use crate::federation::FederateStatus;
use fedbridge_env::{LocalSimulation, RtiAmbassador, RtiRequest};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Receives the granted federation time of the TAR a caller waits on.
pub type GrantWaiter = oneshot::Receiver<f64>;

/// Converts local simulated time to federation time.
pub fn to_federation_time(local: i64) -> f64 {
    local as f64
}

/// Converts federation time to local simulated time (truncating).
pub fn to_local_time(federation: f64) -> i64 {
    federation as i64
}

/// Result of a time advance request.
#[derive(Debug)]
pub enum AdvanceOutcome {
    /// Time management has not been initialized (not joined yet)
    Inactive,

    /// Target is behind federation time beyond the lookahead tolerance
    Rejected,

    /// A new TAR was sent; the waiter resolves on its grant
    Issued(GrantWaiter),

    /// A TAR was already in flight; the target was coalesced into the
    /// follow-up request and the waiter resolves on the follow-up grant
    Queued(GrantWaiter),
}

impl AdvanceOutcome {
    /// Returns the grant waiter, if the request is outstanding.
    pub fn into_waiter(self) -> Option<GrantWaiter> {
        match self {
            AdvanceOutcome::Issued(waiter) | AdvanceOutcome::Queued(waiter) => Some(waiter),
            AdvanceOutcome::Inactive | AdvanceOutcome::Rejected => None,
        }
    }
}

/// Time synchronization state machine.
pub struct TimeSyncEngine {
    federate_name: String,
    config: TimeConfig,
    rti: Arc<dyn RtiAmbassador>,
    simulation: Arc<dyn LocalSimulation>,

    initialized: bool,
    constrained: bool,
    regulating: bool,
    lookahead_ms: i64,

    /// Last federation time confirmed by the RTI
    federation_time: f64,

    /// Last local time requested by the simulation
    simulation_time: i64,

    last_tar: f64,
    last_tag: f64,

    tar_in_progress: bool,
    queued_tar: Option<i64>,

    /// Callers released by the grant of the in-flight TAR
    in_flight_waiters: Vec<oneshot::Sender<f64>>,

    /// Callers released by the grant of the queued follow-up TAR
    queued_waiters: Vec<oneshot::Sender<f64>>,
}

impl TimeSyncEngine {
    /// Creates an engine; nothing is sent before `initialize`.
    pub fn new(
        federate_name: impl Into<String>,
        config: TimeConfig,
        rti: Arc<dyn RtiAmbassador>,
        simulation: Arc<dyn LocalSimulation>,
    ) -> Self {
        Self {
            federate_name: federate_name.into(),
            config,
            rti,
            simulation,
            initialized: false,
            constrained: false,
            regulating: false,
            lookahead_ms: 0,
            federation_time: 0.0,
            simulation_time: 0,
            last_tar: 0.0,
            last_tag: 0.0,
            tar_in_progress: false,
            queued_tar: None,
            in_flight_waiters: Vec::new(),
            queued_waiters: Vec::new(),
        }
    }

    // ========================================================================
    // INITIALIZATION
    // ========================================================================

    /// Declares time management mode to the RTI. Runs once.
    pub fn initialize(&mut self) {
        if self.initialized {
            debug!("Time management already initialized");
            return;
        }
        self.initialized = true;

        let start_time = self.config.effective_start_time();
        self.federation_time = to_federation_time(start_time);
        self.last_tag = self.federation_time;

        if self.config.time_constrained {
            self.send(RtiRequest::EnableTimeConstrained);
        }

        if self.config.time_regulating {
            self.lookahead_ms = self.config.lookahead_ms();
            self.simulation.set_lookahead(self.lookahead_ms);
            self.send(RtiRequest::EnableTimeRegulation {
                federate_time: to_federation_time(start_time),
                lookahead: self.lookahead_ms as f64,
            });
        }

        info!(
            "Time management initialized: constrained={} regulating={} start={} lookahead={}ms",
            self.config.time_constrained,
            self.config.time_regulating,
            start_time,
            self.lookahead_ms
        );
    }

    /// Releases the local engine when the start time is auto-detected.
    ///
    /// A constrained federate with auto-detected start time grants itself
    /// the current federation time so it is not held before the first TAG.
    pub fn start(&mut self) {
        if self.config.auto_detect_time() && self.constrained {
            debug!("Auto-detected start time, self-granting {}", self.federation_time);
            let granted = self.federation_time;
            self.on_time_advance_grant(granted);
        }
    }

    // ========================================================================
    // TIME ADVANCE
    // ========================================================================

    /// Requests that federation time advance to `target` (local time).
    pub fn request_time_advance(&mut self, target: i64) -> AdvanceOutcome {
        if !self.initialized {
            debug!("Time advance to {} ignored, time management inactive", target);
            return AdvanceOutcome::Inactive;
        }

        let federation_local = to_local_time(self.federation_time);
        if target < federation_local - self.lookahead_ms / 2 {
            debug!(
                "Time advance to {} rejected, federation time is {}",
                target, federation_local
            );
            return AdvanceOutcome::Rejected;
        }
        self.simulation_time = target;

        let (tx, rx) = oneshot::channel();

        if self.tar_in_progress {
            let queued = self.queued_tar.map_or(target, |q| q.max(target));
            debug!("TAR in flight, queueing {}", queued);
            self.queued_tar = Some(queued);
            self.queued_waiters.push(tx);
            return AdvanceOutcome::Queued(rx);
        }

        self.issue(target);
        self.in_flight_waiters.push(tx);
        AdvanceOutcome::Issued(rx)
    }

    fn issue(&mut self, target: i64) {
        let lookahead = self.lookahead_ms as f64;
        self.tar_in_progress = true;
        self.queued_tar = None;
        self.last_tar = to_federation_time(target);
        let request_time = (self.last_tar + lookahead).max(self.last_tag + lookahead);

        debug!("Sending TAR for {} (local target {})", request_time, target);
        // A failed send leaves the TAR in flight: without a grant the
        // federate must not advance.
        self.send(RtiRequest::TimeAdvanceRequest { time: request_time });
    }

    /// Handles a Time Advance Grant.
    pub fn on_time_advance_grant(&mut self, granted: f64) {
        debug!("Time advance granted: {}", granted);
        self.tar_in_progress = false;
        self.federation_time = granted;
        self.last_tag = granted;

        for waiter in self.in_flight_waiters.drain(..) {
            let _ = waiter.send(granted);
        }

        let Some(queued) = self.queued_tar.take() else {
            return;
        };
        let waiters = std::mem::take(&mut self.queued_waiters);

        if queued < to_local_time(granted) - self.lookahead_ms / 2 {
            debug!("Queued TAR {} already covered by grant {}", queued, granted);
            for waiter in waiters {
                let _ = waiter.send(granted);
            }
            return;
        }

        self.simulation_time = queued;
        self.issue(queued);
        self.in_flight_waiters.extend(waiters);
    }

    // ========================================================================
    // MODE CHANGES
    // ========================================================================

    pub fn on_regulation_enabled(&mut self, time: f64) {
        self.federation_time = time;
        self.update_regulating(true);
    }

    pub fn on_regulation_disabled(&mut self) {
        self.update_regulating(false);
    }

    pub fn on_constrained_enabled(&mut self, time: f64) {
        self.federation_time = time;
        self.update_constrained(true);
    }

    pub fn on_constrained_disabled(&mut self) {
        self.update_constrained(false);
    }

    fn update_constrained(&mut self, constrained: bool) {
        if self.constrained == constrained {
            return;
        }
        self.constrained = constrained;
        if constrained {
            debug!("Time constrained, attaching time gate");
            self.simulation.attach_time_gate(&self.federate_name);
        } else {
            debug!("No longer time constrained, detaching time gate");
            self.simulation.detach_time_gate(&self.federate_name);
        }
    }

    fn update_regulating(&mut self, regulating: bool) {
        if self.regulating == regulating {
            return;
        }
        self.regulating = regulating;
        debug!("Time regulating: {}", regulating);
    }

    /// Reacts to federate status notifications.
    pub fn on_federate_status_changed(&mut self, status: FederateStatus) {
        match status {
            FederateStatus::PostJoin => self.initialize(),
            FederateStatus::PreResign => {
                self.update_constrained(false);
                self.update_regulating(false);
            }
            FederateStatus::PostResign => {}
        }
    }

    fn send(&self, request: RtiRequest) {
        let name = request.name();
        if let Err(e) = self.rti.submit(request) {
            warn!("Failed to send {}: {}", name, e);
        }
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn federation_time(&self) -> f64 {
        self.federation_time
    }

    pub fn simulation_time(&self) -> i64 {
        self.simulation_time
    }

    pub fn lookahead_ms(&self) -> i64 {
        self.lookahead_ms
    }

    pub fn last_tar(&self) -> f64 {
        self.last_tar
    }

    pub fn last_tag(&self) -> f64 {
        self.last_tag
    }

    pub fn queued_tar(&self) -> Option<i64> {
        self.queued_tar
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_constrained(&self) -> bool {
        self.constrained
    }

    pub fn is_regulating(&self) -> bool {
        self.regulating
    }

    pub fn is_tar_in_progress(&self) -> bool {
        self.tar_in_progress
    }
}

// ============================================================================
// SHARED HANDLE
// ============================================================================

/// Shared handle to the time engine.
///
/// The dispatch thread feeds callbacks through `lock()`; the simulation
/// thread blocks in `advance_to`.
#[derive(Clone)]
pub struct TimeSyncHandle {
    inner: Arc<Mutex<TimeSyncEngine>>,
}

impl TimeSyncHandle {
    pub fn new(engine: TimeSyncEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Locks the engine.
    pub fn lock(&self) -> MutexGuard<'_, TimeSyncEngine> {
        self.inner.lock()
    }

    /// Requests an advance to `target` and blocks until it is granted.
    ///
    /// # Returns
    /// * `Some(granted)` - The federation time granted
    /// * `None` - The request was rejected, time management is inactive,
    ///   or the engine was dropped
    ///
    /// # Blocking
    /// Waits without timeout. Must not be called from inside an async
    /// runtime or from the thread that delivers grants.
    pub fn advance_to(&self, target: i64) -> Option<f64> {
        let waiter = self.inner.lock().request_time_advance(target).into_waiter()?;
        waiter.blocking_recv().ok()
    }

    /// Async variant of `advance_to`.
    pub async fn advance_to_async(&self, target: i64) -> Option<f64> {
        let waiter = self.inner.lock().request_time_advance(target).into_waiter()?;
        waiter.await.ok()
    }

    pub fn federation_time(&self) -> f64 {
        self.inner.lock().federation_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingAmbassador, StubSimulation};

    fn engine_with(config: TimeConfig) -> (TimeSyncEngine, Arc<RecordingAmbassador>, Arc<StubSimulation>) {
        let rti = Arc::new(RecordingAmbassador::new());
        let sim = Arc::new(StubSimulation::new());
        let engine = TimeSyncEngine::new("fed-a", config, rti.clone(), sim.clone());
        (engine, rti, sim)
    }

    fn regulating_config(lookahead_hours: f64) -> TimeConfig {
        TimeConfig {
            time_constrained: true,
            time_regulating: true,
            start_time: 0,
            lookahead_hours,
        }
    }

    fn tar_times(rti: &RecordingAmbassador) -> Vec<f64> {
        rti.requests()
            .into_iter()
            .filter_map(|r| match r {
                RtiRequest::TimeAdvanceRequest { time } => Some(time),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_initialize_declares_modes_once() {
        let (mut engine, rti, sim) = engine_with(regulating_config(0.5));
        engine.initialize();
        engine.initialize();

        let requests = rti.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], RtiRequest::EnableTimeConstrained);
        assert_eq!(
            requests[1],
            RtiRequest::EnableTimeRegulation {
                federate_time: 0.0,
                lookahead: 1_800_000.0
            }
        );
        assert_eq!(sim.lookahead(), Some(1_800_000));
        assert_eq!(engine.lookahead_ms(), 1_800_000);
    }

    #[test]
    fn test_unconstrained_unregulated_sends_nothing() {
        let (mut engine, rti, _) = engine_with(TimeConfig::default());
        engine.initialize();
        assert!(rti.requests().is_empty());
        assert!(engine.is_initialized());
    }

    #[test]
    fn test_inactive_before_initialize() {
        let (mut engine, rti, _) = engine_with(regulating_config(0.0));
        assert!(matches!(engine.request_time_advance(10), AdvanceOutcome::Inactive));
        assert!(rti.requests().is_empty());
    }

    #[test]
    fn test_coalesces_requests_while_in_flight() {
        let (mut engine, rti, _) = engine_with(regulating_config(0.0));
        engine.initialize();

        assert!(matches!(engine.request_time_advance(100), AdvanceOutcome::Issued(_)));
        assert!(matches!(engine.request_time_advance(100), AdvanceOutcome::Queued(_)));
        assert!(matches!(engine.request_time_advance(150), AdvanceOutcome::Queued(_)));
        assert_eq!(engine.queued_tar(), Some(150));
        assert_eq!(tar_times(&rti), vec![100.0]);

        engine.on_time_advance_grant(100.0);
        assert_eq!(tar_times(&rti), vec![100.0, 150.0]);
        assert!(engine.is_tar_in_progress());
        assert_eq!(engine.queued_tar(), None);

        engine.on_time_advance_grant(150.0);
        assert_eq!(tar_times(&rti).len(), 2);
        assert!(!engine.is_tar_in_progress());
        assert_eq!(engine.federation_time(), 150.0);
    }

    #[test]
    fn test_queue_keeps_maximum() {
        let (mut engine, _, _) = engine_with(regulating_config(0.0));
        engine.initialize();
        engine.request_time_advance(100);
        engine.request_time_advance(300);
        engine.request_time_advance(200);
        assert_eq!(engine.queued_tar(), Some(300));
    }

    #[test]
    fn test_rejects_stale_request() {
        // 0.001 h = 3600 ms lookahead, tolerance 1800 ms
        let (mut engine, rti, _) = engine_with(regulating_config(0.001));
        engine.initialize();
        engine.on_time_advance_grant(10_000.0);

        assert!(matches!(engine.request_time_advance(8_000), AdvanceOutcome::Rejected));
        assert!(tar_times(&rti).is_empty());
        assert_eq!(engine.simulation_time(), 0);
        assert!(!engine.is_tar_in_progress());

        // Within the tolerance still goes out
        assert!(matches!(engine.request_time_advance(9_000), AdvanceOutcome::Issued(_)));
    }

    #[test]
    fn test_tar_includes_lookahead() {
        let (mut engine, rti, _) = engine_with(regulating_config(0.001));
        engine.initialize();
        engine.request_time_advance(1_000);
        assert_eq!(tar_times(&rti), vec![4_600.0]);
        assert_eq!(engine.last_tar(), 1_000.0);
    }

    #[test]
    fn test_grant_resolves_waiters() {
        let (mut engine, _, _) = engine_with(regulating_config(0.0));
        engine.initialize();

        let first = engine.request_time_advance(100).into_waiter().unwrap();
        let second = engine.request_time_advance(200).into_waiter().unwrap();

        engine.on_time_advance_grant(100.0);
        assert_eq!(first.blocking_recv(), Ok(100.0));

        engine.on_time_advance_grant(200.0);
        assert_eq!(second.blocking_recv(), Ok(200.0));
    }

    #[test]
    fn test_stale_queued_request_resolved_by_grant() {
        let (mut engine, rti, _) = engine_with(regulating_config(0.0));
        engine.initialize();
        engine.request_time_advance(100);
        let queued = engine.request_time_advance(120).into_waiter().unwrap();

        // RTI grants further than both requests
        engine.on_time_advance_grant(500.0);
        assert_eq!(queued.blocking_recv(), Ok(500.0));
        assert_eq!(tar_times(&rti), vec![100.0]);
        assert!(!engine.is_tar_in_progress());
    }

    #[test]
    fn test_failed_send_keeps_request_in_flight() {
        let (mut engine, rti, _) = engine_with(regulating_config(0.0));
        engine.initialize();
        rti.fail_next(1);
        assert!(matches!(engine.request_time_advance(10), AdvanceOutcome::Issued(_)));
        assert!(engine.is_tar_in_progress());
    }

    #[test]
    fn test_mode_toggles_drive_time_gate() {
        let (mut engine, _, sim) = engine_with(regulating_config(0.0));

        engine.on_constrained_enabled(42.0);
        assert!(engine.is_constrained());
        assert_eq!(engine.federation_time(), 42.0);
        assert_eq!(sim.gate_attachments(), 1);

        // Re-enabling is a no-op
        engine.on_constrained_enabled(42.0);
        assert_eq!(sim.gate_attachments(), 1);

        engine.on_regulation_enabled(50.0);
        assert!(engine.is_regulating());

        engine.on_federate_status_changed(FederateStatus::PreResign);
        assert!(!engine.is_constrained());
        assert!(!engine.is_regulating());
        assert_eq!(sim.gate_detachments(), 1);
    }

    #[test]
    fn test_pre_resign_only_clears_local_flags() {
        let (mut engine, rti, sim) = engine_with(regulating_config(0.001));
        engine.on_federate_status_changed(FederateStatus::PostJoin);
        engine.on_constrained_enabled(0.0);
        engine.on_regulation_enabled(0.0);
        rti.clear();

        engine.on_federate_status_changed(FederateStatus::PreResign);
        assert!(!engine.is_constrained());
        assert!(!engine.is_regulating());
        assert_eq!(sim.gate_detachments(), 1);
        // The RTI drops time management with the resign itself
        assert!(rti.requests().is_empty());
    }

    #[test]
    fn test_post_join_initializes() {
        let (mut engine, rti, _) = engine_with(regulating_config(0.0));
        engine.on_federate_status_changed(FederateStatus::PostJoin);
        assert!(engine.is_initialized());
        assert_eq!(rti.requests().len(), 2);
    }

    #[test]
    fn test_start_self_grants_when_auto_detecting() {
        let config = TimeConfig {
            time_constrained: true,
            start_time: -1,
            ..TimeConfig::default()
        };
        let (mut engine, _, _) = engine_with(config);
        engine.initialize();
        engine.on_constrained_enabled(7_000.0);
        engine.start();
        assert_eq!(engine.last_tag(), 7_000.0);
        assert!(!engine.is_tar_in_progress());
    }

    #[test]
    fn test_handle_blocks_until_grant() {
        let rti = Arc::new(RecordingAmbassador::new());
        let sim = Arc::new(StubSimulation::new());
        let mut engine = TimeSyncEngine::new("fed-a", regulating_config(0.0), rti.clone(), sim);
        engine.initialize();
        let handle = TimeSyncHandle::new(engine);

        let sim_side = handle.clone();
        let worker = std::thread::spawn(move || sim_side.advance_to(250));

        // Grant from "dispatch" once the TAR is out
        while !handle.lock().is_tar_in_progress() {
            std::thread::yield_now();
        }
        handle.lock().on_time_advance_grant(250.0);

        assert_eq!(worker.join().unwrap(), Some(250.0));
        assert_eq!(handle.federation_time(), 250.0);
    }

    #[tokio::test]
    async fn test_handle_async_advance() {
        let rti = Arc::new(RecordingAmbassador::new());
        let sim = Arc::new(StubSimulation::new());
        let mut engine = TimeSyncEngine::new("fed-a", regulating_config(0.0), rti, sim);
        engine.initialize();
        let handle = TimeSyncHandle::new(engine);

        let sim_side = handle.clone();
        let pending = tokio::spawn(async move { sim_side.advance_to_async(80).await });
        while !handle.lock().is_tar_in_progress() {
            tokio::task::yield_now().await;
        }
        handle.lock().on_time_advance_grant(80.0);
        assert_eq!(pending.await.unwrap(), Some(80.0));
    }
}
