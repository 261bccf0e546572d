//! RTI ambassador and handle resolution abstractions.

use crate::error::EnvError;
use crate::rti::RtiRequest;
use crate::types::{
    AttributeHandle, InteractionClassHandle, ObjectClassHandle, ParameterHandle, RequestId,
};

/// Narrow outbound interface to the RTI client.
///
/// # Implementations
///
/// - **Production**: `ChannelRtiAmbassador` - forwards to an RTI client task
/// - **Simulation**: an in-process RTI shared by several federates
///
/// # Request Flow
///
/// ```text
/// Federate                 Ambassador                    RTI
///   |-- submit(req) ---------->|                          |
///   |<-- Ok(RequestId) --------|-- req ------------------>|
///   |                          |                          |
///   |<======== RtiCallback::RequestReturn(id, outcome) ===|
/// ```
pub trait RtiAmbassador: Send + Sync {
    /// Submits a request to the RTI.
    ///
    /// # Returns
    /// * `Ok(RequestId)` - Request accepted; exactly one return follows
    /// * `Err(EnvError::RtiError)` - Immediate refusal, no return follows
    fn submit(&self, request: RtiRequest) -> Result<RequestId, EnvError>;
}

/// Maps FOM names to federation-assigned handles and back.
///
/// Handles are stable for the lifetime of one federation execution.
pub trait HandleResolver: Send + Sync {
    /// Resolves an object class name.
    fn object_class_handle(&self, class: &str) -> Result<ObjectClassHandle, EnvError>;

    /// Resolves an attribute name within an object class.
    fn attribute_handle(
        &self,
        class: ObjectClassHandle,
        attribute: &str,
    ) -> Result<AttributeHandle, EnvError>;

    /// Reverse lookup of an attribute handle.
    fn attribute_name(
        &self,
        class: ObjectClassHandle,
        attribute: AttributeHandle,
    ) -> Result<String, EnvError>;

    /// Resolves an interaction class name.
    fn interaction_class_handle(&self, class: &str) -> Result<InteractionClassHandle, EnvError>;

    /// Resolves a parameter name within an interaction class.
    fn parameter_handle(
        &self,
        class: InteractionClassHandle,
        parameter: &str,
    ) -> Result<ParameterHandle, EnvError>;

    /// Reverse lookup of a parameter handle.
    fn parameter_name(
        &self,
        class: InteractionClassHandle,
        parameter: ParameterHandle,
    ) -> Result<String, EnvError>;
}
