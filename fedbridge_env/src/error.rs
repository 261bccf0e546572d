//! Error types for the FedBridge environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// The RTI link refused or could not carry a request
    #[error("RTI error: {0}")]
    RtiError(String),

    /// A name could not be resolved to a federation handle (or back)
    #[error("Handle not found: {0}")]
    HandleNotFound(String),

    /// Checkpoint storage failed
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// The local simulation rejected an operation
    #[error("Simulation error: {0}")]
    SimulationError(String),

    /// A local object id is not (or no longer) known to the local model
    #[error("Unknown local object: {0}")]
    UnknownObject(u64),

    /// A configured name is not part of a closed name table
    #[error("Unknown name: {0}")]
    UnknownName(String),
}

impl EnvError {
    /// Creates an RTI error.
    pub fn rti(msg: impl Into<String>) -> Self {
        Self::RtiError(msg.into())
    }

    /// Creates a handle resolution error.
    pub fn handle(name: impl std::fmt::Display) -> Self {
        Self::HandleNotFound(name.to_string())
    }

    /// Creates a checkpoint storage error.
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::CheckpointError(msg.into())
    }

    /// Creates a local simulation error.
    pub fn simulation(msg: impl Into<String>) -> Self {
        Self::SimulationError(msg.into())
    }
}
