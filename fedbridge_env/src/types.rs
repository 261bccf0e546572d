//! Common types for the FedBridge environment abstraction.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident($inner:ty), $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl $name {
            /// Returns the raw handle value.
            pub fn raw(&self) -> $inner {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle_type!(
    /// Federation-assigned identity of a joined federate.
    FederateHandle(u32), "federate"
);
handle_type!(
    /// Federation-assigned handle of an object class.
    ObjectClassHandle(u32), "class"
);
handle_type!(
    /// Federation-assigned handle of an attribute within an object class.
    AttributeHandle(u32), "attr"
);
handle_type!(
    /// Federation-assigned handle of an object instance.
    ObjectHandle(u32), "object"
);
handle_type!(
    /// Federation-assigned handle of an interaction class.
    InteractionClassHandle(u32), "interaction"
);
handle_type!(
    /// Federation-assigned handle of an interaction parameter.
    ParameterHandle(u32), "param"
);
handle_type!(
    /// Correlates an outbound RTI request with its single asynchronous return.
    RequestId(u64), "request"
);
handle_type!(
    /// Identity of an object owned by the local simulation.
    ///
    /// The federate side only ever holds this id, never the object itself.
    LocalObjectId(u64), "local"
);

/// Lifecycle state reported by the local simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationState {
    Uninitialized,
    Loaded,
    Initialized,
    Running,
    Paused,
    Restoring,
    Restored,
    Stopped,
}

impl SimulationState {
    /// True once the local object model can be observed.
    pub fn is_model_available(&self) -> bool {
        matches!(
            self,
            SimulationState::Loaded
                | SimulationState::Initialized
                | SimulationState::Running
                | SimulationState::Restored
        )
    }
}

/// Whether a local object is bound to a remote object it did not create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkStatus {
    Unlinked,
    Linked,
}

/// What the RTI does with owned objects when a federate resigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResignAction {
    DeleteObjects,
    ReleaseAttributes,
    DeleteObjectsAndReleaseAttributes,
    NoAction,
}

/// The closed name table for resign actions.
const RESIGN_ACTIONS: &[(&str, ResignAction)] = &[
    ("DELETE_OBJECTS", ResignAction::DeleteObjects),
    ("RELEASE_ATTRIBUTES", ResignAction::ReleaseAttributes),
    (
        "DELETE_OBJECTS_AND_RELEASE_ATTRIBUTES",
        ResignAction::DeleteObjectsAndReleaseAttributes,
    ),
    ("NO_ACTION", ResignAction::NoAction),
];

impl ResignAction {
    /// Looks up a resign action by its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        RESIGN_ACTIONS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
            .map(|(_, action)| *action)
    }

    /// Returns the configuration name.
    pub fn name(&self) -> &'static str {
        RESIGN_ACTIONS
            .iter()
            .find(|(_, action)| action == self)
            .map(|(n, _)| *n)
            .unwrap_or("DELETE_OBJECTS_AND_RELEASE_ATTRIBUTES")
    }
}

impl Default for ResignAction {
    fn default() -> Self {
        ResignAction::DeleteObjectsAndReleaseAttributes
    }
}

impl std::fmt::Display for ResignAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ResignAction {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(ResignAction::default());
        }
        Self::from_name(s).ok_or_else(|| EnvError::UnknownName(format!("resign action '{}'", s)))
    }
}

impl TryFrom<String> for ResignAction {
    type Error = EnvError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResignAction> for String {
    fn from(action: ResignAction) -> Self {
        action.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resign_action_table() {
        assert_eq!(
            "DELETE_OBJECTS".parse::<ResignAction>().unwrap(),
            ResignAction::DeleteObjects
        );
        assert_eq!(
            "no_action".parse::<ResignAction>().unwrap(),
            ResignAction::NoAction
        );
        for (name, action) in RESIGN_ACTIONS {
            assert_eq!(action.name(), *name);
        }
    }

    #[test]
    fn test_resign_action_default_and_unknown() {
        assert_eq!(
            "".parse::<ResignAction>().unwrap(),
            ResignAction::DeleteObjectsAndReleaseAttributes
        );
        assert!(matches!(
            "DIVEST".parse::<ResignAction>(),
            Err(EnvError::UnknownName(_))
        ));
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(ObjectHandle(7).to_string(), "object#7");
        assert_eq!(RequestId(3).raw(), 3);
    }

    #[test]
    fn test_model_available_states() {
        assert!(SimulationState::Running.is_model_available());
        assert!(SimulationState::Restored.is_model_available());
        assert!(!SimulationState::Uninitialized.is_model_available());
        assert!(!SimulationState::Restoring.is_model_available());
    }
}
