//! FedBridge Deterministic Simulation Harness
//!
//! Runs several federates against one in-process RTI so that lifecycle,
//! time management, checkpointing and object translation can be tested
//! end to end without an external RTI.
//!
//! # Core Principle: Single Dispatch Thread
//!
//! Every callback and local event is handed to its federate by
//! `SimWorld::pump`, one at a time, until the federation is quiescent:
//! - **RTI**: requests are processed synchronously; callbacks wait in per-port inboxes
//! - **Local simulation**: model changes queue `LocalEvent`s until pumped
//! - **Randomness**: every random choice is derived from the scenario seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimRti (federation, handles, objects, time, saves)   │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │ SimRtiPort             │ SimRtiPort                 │
//! │  ┌────▼─────┐             ┌────▼─────┐                      │
//! │  │ Federate │             │ Federate │     ...              │
//! │  │  alpha   │             │  bravo   │                      │
//! │  └────┬─────┘             └────┬─────┘                      │
//! │       │                        │                            │
//! │  ┌────▼─────┐             ┌────▼─────┐                      │
//! │  │ SimModel │             │ SimModel │  + SimCheckpoints    │
//! │  └──────────┘             └──────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fedbridge_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::SaveRestore);
//! assert!(result.passed);
//! ```

mod checkpoints;
pub mod fom;
mod model;
mod rti;
mod runner;
pub mod scenarios;
mod world;

pub use checkpoints::SimCheckpoints;
pub use fom::{FomMappings, InteractionClassMapping};
pub use model::{LocalObject, SimModel};
pub use rti::{PortId, RtiStats, SimRti, SimRtiPort};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use world::{FederateSpec, SimConfig, SimFederate, SimWorld};

use fedbridge_core::{CheckpointError, ConfigError, LifecycleError};
use fedbridge_env::EnvError;
use thiserror::Error;

/// Harness errors
#[derive(Debug, Error)]
pub enum SimError {
    #[error("FOM mapping error: {0}")]
    Fom(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Federation stalled: {0}")]
    Stalled(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),
}
