//! RTI message vocabulary: outbound requests, inbound callbacks, returns.
//!
//! ```text
//! Federate                      RTI client
//!   |-- submit(RtiRequest) -------->|   (RequestId assigned)
//!   |                               |
//!   |<-- RequestReturn(RtiReturn) --|   (exactly one per request)
//!   |<-- RtiCallback::* ------------|   (discover, reflect, TAG, save...)
//! ```

use crate::types::{
    AttributeHandle, FederateHandle, InteractionClassHandle, ObjectClassHandle, ObjectHandle,
    ParameterHandle, RequestId, ResignAction,
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Encoded attribute values keyed by attribute handle.
pub type AttributeValues = BTreeMap<AttributeHandle, Vec<u8>>;

/// Encoded interaction parameters keyed by parameter handle.
pub type ParameterValues = BTreeMap<ParameterHandle, Vec<u8>>;

/// Requests a federate sends to the RTI.
#[derive(Debug, Clone, PartialEq)]
pub enum RtiRequest {
    CreateFederationExecution { federation: String, fom_path: String },
    DestroyFederationExecution { federation: String },
    JoinFederationExecution { federation: String, federate_name: String },
    ResignFederationExecution { action: ResignAction },

    EnableTimeConstrained,
    EnableTimeRegulation { federate_time: f64, lookahead: f64 },
    TimeAdvanceRequest { time: f64 },

    PublishObjectClass { class: ObjectClassHandle, attributes: BTreeSet<AttributeHandle> },
    SubscribeObjectClassAttributes { class: ObjectClassHandle, attributes: BTreeSet<AttributeHandle> },
    PublishInteractionClass { class: InteractionClassHandle },
    SubscribeInteractionClass { class: InteractionClassHandle },

    RegisterObjectInstance { class: ObjectClassHandle, name: String },
    UpdateAttributeValues { object: ObjectHandle, attributes: AttributeValues, tag: Vec<u8> },
    DeleteObjectInstance { object: ObjectHandle, tag: Vec<u8> },
    SendInteraction { class: InteractionClassHandle, parameters: ParameterValues, tag: Vec<u8> },

    FederateSaveBegun,
    FederateSaveComplete,
    FederateSaveNotComplete,
    FederateRestoreComplete,
    FederateRestoreNotComplete,
}

impl RtiRequest {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            RtiRequest::CreateFederationExecution { .. } => "CreateFederationExecution",
            RtiRequest::DestroyFederationExecution { .. } => "DestroyFederationExecution",
            RtiRequest::JoinFederationExecution { .. } => "JoinFederationExecution",
            RtiRequest::ResignFederationExecution { .. } => "ResignFederationExecution",
            RtiRequest::EnableTimeConstrained => "EnableTimeConstrained",
            RtiRequest::EnableTimeRegulation { .. } => "EnableTimeRegulation",
            RtiRequest::TimeAdvanceRequest { .. } => "TimeAdvanceRequest",
            RtiRequest::PublishObjectClass { .. } => "PublishObjectClass",
            RtiRequest::SubscribeObjectClassAttributes { .. } => "SubscribeObjectClassAttributes",
            RtiRequest::PublishInteractionClass { .. } => "PublishInteractionClass",
            RtiRequest::SubscribeInteractionClass { .. } => "SubscribeInteractionClass",
            RtiRequest::RegisterObjectInstance { .. } => "RegisterObjectInstance",
            RtiRequest::UpdateAttributeValues { .. } => "UpdateAttributeValues",
            RtiRequest::DeleteObjectInstance { .. } => "DeleteObjectInstance",
            RtiRequest::SendInteraction { .. } => "SendInteraction",
            RtiRequest::FederateSaveBegun => "FederateSaveBegun",
            RtiRequest::FederateSaveComplete => "FederateSaveComplete",
            RtiRequest::FederateSaveNotComplete => "FederateSaveNotComplete",
            RtiRequest::FederateRestoreComplete => "FederateRestoreComplete",
            RtiRequest::FederateRestoreNotComplete => "FederateRestoreNotComplete",
        }
    }
}

/// Exceptions the RTI reports in a request's return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtiException {
    #[error("federation execution already exists")]
    FederationExecutionAlreadyExists,

    #[error("federation execution does not exist")]
    FederationExecutionDoesNotExist,

    #[error("federate already execution member")]
    FederateAlreadyExecutionMember,

    #[error("federate not execution member")]
    FederateNotExecutionMember,

    #[error("federates currently joined")]
    FederatesCurrentlyJoined,

    #[error("object class not published")]
    ObjectClassNotPublished,

    #[error("object not known")]
    ObjectNotKnown,

    #[error("time advance already in progress")]
    TimeAdvanceAlreadyInProgress,

    #[error("save not initiated")]
    SaveNotInitiated,

    #[error("restore not requested")]
    RestoreNotRequested,

    #[error("RTI internal error: {0}")]
    Internal(String),
}

/// Successful payload of a request return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValue {
    Empty,
    Federate(FederateHandle),
    Object(ObjectHandle),
}

/// The single asynchronous result of an outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct RtiReturn {
    /// Request this return answers
    pub request: RequestId,

    /// Payload or RTI exception
    pub outcome: Result<ReturnValue, RtiException>,
}

impl RtiReturn {
    /// A successful return without payload.
    pub fn ok(request: RequestId) -> Self {
        Self { request, outcome: Ok(ReturnValue::Empty) }
    }

    /// A failed return.
    pub fn failed(request: RequestId, exception: RtiException) -> Self {
        Self { request, outcome: Err(exception) }
    }
}

/// Callbacks the RTI delivers to a federate.
#[derive(Debug, Clone, PartialEq)]
pub enum RtiCallback {
    DiscoverObjectInstance { object: ObjectHandle, class: ObjectClassHandle, name: String },
    ReflectAttributeValues { object: ObjectHandle, attributes: AttributeValues, tag: Vec<u8> },
    RemoveObjectInstance { object: ObjectHandle, tag: Vec<u8> },
    ProvideAttributeValueUpdate { object: ObjectHandle, attributes: BTreeSet<AttributeHandle> },
    ReceiveInteraction { class: InteractionClassHandle, parameters: ParameterValues, tag: Vec<u8> },

    TimeAdvanceGrant { time: f64 },
    TimeRegulationEnabled { time: f64 },
    TimeRegulationDisabled,
    TimeConstrainedEnabled { time: f64 },
    TimeConstrainedDisabled,

    InitiateFederateSave { label: String },
    FederationSaved,
    FederationNotSaved,
    FederationRestoreBegun,
    InitiateFederateRestore { label: String, federate: FederateHandle },
    FederationRestored,
    FederationNotRestored,

    RequestReturn(RtiReturn),
}

impl RtiCallback {
    /// True for callbacks processed by the translation pipeline.
    pub fn is_object_traffic(&self) -> bool {
        matches!(
            self,
            RtiCallback::DiscoverObjectInstance { .. }
                | RtiCallback::ReflectAttributeValues { .. }
                | RtiCallback::RemoveObjectInstance { .. }
                | RtiCallback::ProvideAttributeValueUpdate { .. }
                | RtiCallback::ReceiveInteraction { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_traffic_classification() {
        let reflect = RtiCallback::ReflectAttributeValues {
            object: ObjectHandle(1),
            attributes: AttributeValues::new(),
            tag: Vec::new(),
        };
        assert!(reflect.is_object_traffic());
        assert!(!RtiCallback::TimeAdvanceGrant { time: 1.0 }.is_object_traffic());
        assert!(!RtiCallback::RequestReturn(RtiReturn::ok(RequestId(1))).is_object_traffic());
    }

    #[test]
    fn test_request_names() {
        assert_eq!(RtiRequest::FederateSaveBegun.name(), "FederateSaveBegun");
        assert_eq!(
            RtiRequest::TimeAdvanceRequest { time: 3.0 }.name(),
            "TimeAdvanceRequest"
        );
    }
}
