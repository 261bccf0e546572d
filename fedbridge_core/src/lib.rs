//! FedBridge Core - HLA Federate Interoperability Engines
//!
//! Keeps a local simulation synchronized with an HLA federation:
//! 1. **Time**: constrained/regulating time management with blocking advance
//! 2. **Lifecycle**: create/join/resign and the save/restore handshakes
//! 3. **Translation**: discovery, reflection and registration of objects,
//!    attribute encoding, interactions
//!
//! `Federate` owns the three engines and dispatches RTI callbacks and local
//! events to them; every side effect goes through the `fedbridge_env` traits.

pub mod catalogue;
pub mod checkpoint;
pub mod codec;
pub mod config;
pub mod converter;
pub mod federate;
pub mod federation;
pub mod liveness;
pub mod pipeline;
pub mod time_sync;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use catalogue::{
    CatalogueSnapshot, ObjectCatalogue, ObjectState, PendingParameters, SharedCatalogue,
    TagGenerator,
};
pub use checkpoint::{CheckpointError, RestoreRequest, SledCheckpointStore};
pub use codec::{decode_value, encode_value, AttributeCodec, CodecError, XdrCodec};
pub use config::{ConfigError, FederateConfig, LivenessConfig, PubSub, PubSubMatrix, TimeConfig};
pub use converter::{
    percent_of_capacity, AttributeMapping, ConversionError, InteractionConverter,
    MappedInteractionConverter, MappedObjectConverter, Materialized, ObjectConverter,
    ParameterMapping,
};
pub use federate::{Federate, FederateServices, LocalEvent};
pub use federation::{
    FederateStatus, FederationCoordinator, FederationState, LifecycleError, LifecycleEvent,
    PipelineGate,
};
pub use liveness::LivenessMonitor;
pub use pipeline::{PipelineContext, TranslationPipeline};
pub use time_sync::{AdvanceOutcome, GrantWaiter, TimeSyncEngine, TimeSyncHandle};
