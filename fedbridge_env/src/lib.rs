//! FedBridge Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary that lets the FedBridge
//! engines run against a **Production** RTI client (tokio channel) or a
//! **Simulation** RTI that lives in-process.
//!
//! # Core Concept: Collaborators Behind Traits
//!
//! Every side effect of a federate goes through one of these traits:
//! - RTI requests (`RtiAmbassador::submit`)
//! - Name/handle resolution (`HandleResolver`)
//! - Local simulation clock and time gate (`LocalSimulation`)
//! - Local object model (`LocalModel`)
//! - Checkpoint storage (`CheckpointStore`)
//! - Publish/subscribe decisions (`PubSubPolicy`)
//!
//! Inbound traffic arrives as plain `RtiCallback` values, so the engines
//! can be driven deterministically from tests.
//!
//! # Example
//!
//! ```ignore
//! use fedbridge_env::{ChannelRtiAmbassador, RtiAmbassador, RtiRequest};
//!
//! let (ambassador, mut requests) = ChannelRtiAmbassador::shared();
//! let id = ambassador.submit(RtiRequest::EnableTimeConstrained)?;
//! // RTI client task: while let Some((id, req)) = requests.recv().await { ... }
//! ```

mod ambassador;
mod error;
mod rti;
mod simulation;
mod tokio_impl;
mod types;
mod value;

pub use ambassador::{HandleResolver, RtiAmbassador};
pub use error::EnvError;
pub use rti::{
    AttributeValues, ParameterValues, ReturnValue, RtiCallback, RtiException, RtiRequest,
    RtiReturn,
};
pub use simulation::{
    CheckpointRecord, CheckpointStore, LocalInteraction, LocalModel, LocalSimulation,
    PubSubPolicy,
};
pub use tokio_impl::{ChannelRtiAmbassador, TaggedRequest};
pub use types::{
    AttributeHandle, FederateHandle, InteractionClassHandle, LinkStatus, LocalObjectId,
    ObjectClassHandle, ObjectHandle, ParameterHandle, RequestId, ResignAction, SimulationState,
};
pub use value::{DateTimeGroup, EntityTypeId, ScalarKind, Value};
