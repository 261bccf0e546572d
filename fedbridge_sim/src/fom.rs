//! FOM mappings used by the simulated federates.
//!
//! Mappings are plain data (`serde`), so a federate's translation setup can
//! be read from JSON; `FomMappings::standard()` is the table the scenarios
//! share.

use crate::SimError;
use fedbridge_core::{
    Federate, MappedInteractionConverter, MappedObjectConverter, ParameterMapping, PubSub,
    PubSubMatrix,
};
use fedbridge_core::converter::ObjectClassMapping;
use serde::{Deserialize, Serialize};

pub const PLATFORM: &str = "BaseEntity.PhysicalEntity.Platform";
pub const WEAPON_FIRE: &str = "WeaponFire";
pub const VEHICLE: &str = "Vehicle";
pub const FIRE: &str = "Fire";

const STANDARD_FOM: &str = r#"{
    "objects": [
        {
            "fom_class": "BaseEntity.PhysicalEntity.Platform",
            "odm_class": "Vehicle",
            "attributes": [
                { "attribute": "Marking", "property": "callsign", "kind": "text", "required": true },
                { "attribute": "Speed", "property": "speed", "kind": "float64" },
                { "attribute": "Position", "property": "position", "kind": "vector3", "optional": true },
                {
                    "attribute": "FuelLevel",
                    "property": "fuel",
                    "kind": "float64",
                    "direction": "publish_only",
                    "source": { "percent_of": { "capacity": "fuel_capacity" } }
                }
            ]
        }
    ],
    "interactions": [
        {
            "fom_class": "WeaponFire",
            "odm_class": "Fire",
            "parameters": [
                { "parameter": "FiringObject", "local_name": "shooter", "kind": "text" },
                { "parameter": "TargetObject", "local_name": "target", "kind": "text", "optional": true },
                { "parameter": "Quantity", "local_name": "rounds", "kind": "int32" }
            ]
        }
    ]
}"#;

const FUEL_MONITOR_FOM: &str = r#"{
    "objects": [
        {
            "fom_class": "BaseEntity.PhysicalEntity.Platform",
            "odm_class": "Vehicle",
            "attributes": [
                {
                    "attribute": "Marking",
                    "property": "callsign",
                    "kind": "text",
                    "required": true,
                    "direction": "subscribe_only"
                },
                {
                    "attribute": "FuelLevel",
                    "property": "fuel_percent",
                    "kind": "float64",
                    "direction": "subscribe_only"
                }
            ]
        }
    ]
}"#;

/// Serializable description of a mapped interaction class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionClassMapping {
    pub fom_class: String,
    pub odm_class: String,
    pub parameters: Vec<ParameterMapping>,
}

impl InteractionClassMapping {
    pub fn converter(&self) -> MappedInteractionConverter {
        self.parameters.iter().cloned().fold(
            MappedInteractionConverter::new(self.fom_class.clone(), self.odm_class.clone()),
            MappedInteractionConverter::map,
        )
    }
}

/// The object and interaction classes one federate translates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FomMappings {
    pub objects: Vec<ObjectClassMapping>,
    #[serde(default)]
    pub interactions: Vec<InteractionClassMapping>,
}

impl FomMappings {
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        serde_json::from_str(json).map_err(|e| SimError::Fom(e.to_string()))
    }

    pub fn standard() -> Result<Self, SimError> {
        Self::from_json_str(STANDARD_FOM)
    }

    /// Platforms seen only through their marking and fuel level.
    pub fn fuel_monitor() -> Result<Self, SimError> {
        Self::from_json_str(FUEL_MONITOR_FOM)
    }

    /// Same flags for every mapped class.
    pub fn pubsub(&self, flags: PubSub) -> PubSubMatrix {
        let matrix = self
            .objects
            .iter()
            .fold(PubSubMatrix::default(), |m, o| m.with_object(o.fom_class.clone(), flags));
        self.interactions
            .iter()
            .fold(matrix, |m, i| m.with_interaction(i.fom_class.clone(), flags))
    }

    /// Registers one converter per mapped class.
    pub fn register(&self, federate: &mut Federate) {
        for mapping in &self.objects {
            federate.register_object_converter(Box::new(MappedObjectConverter::from_mapping(
                mapping.clone(),
            )));
        }
        for mapping in &self.interactions {
            federate.register_interaction_converter(Box::new(mapping.converter()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedbridge_core::converter::{AttributeSource, Direction};
    use fedbridge_core::InteractionConverter;
    use fedbridge_env::{PubSubPolicy, ScalarKind};

    #[test]
    fn test_standard_fom_parses() {
        let fom = FomMappings::standard().unwrap();
        assert_eq!(fom.objects.len(), 1);
        let platform = &fom.objects[0];
        assert_eq!(platform.fom_class, PLATFORM);
        assert_eq!(platform.odm_class, VEHICLE);

        let fuel = platform
            .attributes
            .iter()
            .find(|a| a.attribute == "FuelLevel")
            .unwrap();
        assert_eq!(fuel.direction, Direction::PublishOnly);
        assert_eq!(
            fuel.source,
            AttributeSource::PercentOf {
                capacity: "fuel_capacity".into()
            }
        );
        let marking = &platform.attributes[0];
        assert!(marking.required);
        assert_eq!(marking.kind, ScalarKind::Text);
    }

    #[test]
    fn test_interaction_converter_built_from_table() {
        let fom = FomMappings::standard().unwrap();
        let converter = fom.interactions[0].converter();
        assert_eq!(converter.fom_class(), WEAPON_FIRE);
        assert_eq!(converter.odm_class(), FIRE);
        assert_eq!(converter.parameters().len(), 3);
    }

    #[test]
    fn test_pubsub_covers_every_class() {
        let fom = FomMappings::standard().unwrap();
        let matrix = fom.pubsub(PubSub {
            publish: false,
            subscribe: true,
        });
        assert!(!matrix.is_object_published(PLATFORM));
        assert!(matrix.is_object_subscribed(PLATFORM));
        assert!(matrix.is_interaction_subscribed(WEAPON_FIRE));
    }

    #[test]
    fn test_fuel_monitor_only_subscribes() {
        let fom = FomMappings::fuel_monitor().unwrap();
        assert!(fom.interactions.is_empty());
        assert!(fom.objects[0]
            .attributes
            .iter()
            .all(|a| a.direction == Direction::SubscribeOnly));
    }

    #[test]
    fn test_bad_json_is_a_fom_error() {
        assert!(matches!(
            FomMappings::from_json_str("{\"objects\": 3}"),
            Err(SimError::Fom(_))
        ));
    }
}
