//! Converters - translation between local model objects and FOM classes.
//!
//! A converter is a capability, not a class hierarchy: anything that can
//! name its classes, list its attributes and encode/decode them can be
//! registered with the pipeline. `MappedObjectConverter` and
//! `MappedInteractionConverter` cover the common case where each FOM
//! attribute maps onto one local property through the attribute codec.

use crate::catalogue::PendingParameters;
use crate::codec::{AttributeCodec, CodecError, XdrCodec};
use fedbridge_env::{
    EnvError, LinkStatus, LocalInteraction, LocalModel, LocalObjectId, ScalarKind, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// Encoded values keyed by FOM attribute or parameter name.
pub type EncodedAttributes = BTreeMap<String, Vec<u8>>;

/// Conversion errors
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Property {name} is {actual:?}, expected {expected:?}")]
    TypeMismatch {
        name: String,
        expected: ScalarKind,
        actual: ScalarKind,
    },
}

/// How a remote object got its local representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    /// A new ghost was created
    Created(LocalObjectId),
    /// An existing local object was bound to the remote one
    Linked(LocalObjectId),
}

/// Share of `capacity` that `quantity` represents, in percent.
///
/// A zero or negative capacity yields 0%.
pub fn percent_of_capacity(quantity: f64, capacity: f64) -> f64 {
    if !capacity.is_finite() || capacity <= 0.0 {
        return 0.0;
    }
    (quantity / capacity) * 100.0
}

// ============================================================================
// CAPABILITY TRAITS
// ============================================================================

/// Translates one local object class to and from one FOM object class.
pub trait ObjectConverter: Send {
    /// FOM object class name.
    fn fom_class(&self) -> &str;

    /// Local model class name.
    fn odm_class(&self) -> &str;

    /// Attributes this converter can publish.
    fn publish_attributes(&self) -> BTreeSet<String>;

    /// Attributes this converter wants reflected.
    fn subscribe_attributes(&self) -> BTreeSet<String>;

    /// Attributes needed before a remote object can be materialized.
    fn required_attributes(&self) -> BTreeSet<String>;

    /// FOM attributes affected by a change of a local property.
    fn attributes_for_property(&self, property: &str) -> Vec<String>;

    /// Encodes one attribute from the current local state.
    ///
    /// `Ok(None)` means the local object has no value for it.
    fn encode_attribute(
        &self,
        model: &dyn LocalModel,
        object: LocalObjectId,
        attribute: &str,
    ) -> Result<Option<Vec<u8>>, ConversionError>;

    /// Applies one reflected attribute to a local object.
    fn decode_attribute(
        &mut self,
        model: &dyn LocalModel,
        object: LocalObjectId,
        attribute: &str,
        bytes: &[u8],
    ) -> Result<(), ConversionError>;

    /// Builds the local representation of a remote object.
    fn materialize(
        &mut self,
        model: &dyn LocalModel,
        instance_name: &str,
        pending: &PendingParameters,
    ) -> Result<Materialized, ConversionError>;

    /// Hook after a batch of property changes was encoded.
    fn finished_property_changes(
        &mut self,
        _model: &dyn LocalModel,
        _object: LocalObjectId,
        _encoded: &mut EncodedAttributes,
    ) {
    }

    /// Veto on sending an encoded update.
    fn should_send_update(&self, _object: LocalObjectId, _encoded: &EncodedAttributes) -> bool {
        true
    }
}

/// Translates one local interaction class to and from one FOM interaction class.
pub trait InteractionConverter: Send {
    fn fom_class(&self) -> &str;

    fn odm_class(&self) -> &str;

    /// FOM parameter names.
    fn parameters(&self) -> BTreeSet<String>;

    fn encode(&self, interaction: &LocalInteraction) -> Result<EncodedAttributes, ConversionError>;

    fn decode(&self, parameters: &EncodedAttributes) -> Result<LocalInteraction, ConversionError>;
}

// ============================================================================
// MAPPINGS
// ============================================================================

/// Which way an attribute flows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Both,
    PublishOnly,
    SubscribeOnly,
}

/// Where an attribute's value comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeSource {
    /// The mapped property itself
    #[default]
    Property,
    /// `property` as a percentage of the `capacity` property (publish only)
    PercentOf { capacity: String },
}

/// One FOM attribute mapped to one local property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeMapping {
    pub attribute: String,
    pub property: String,
    pub kind: ScalarKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub source: AttributeSource,
}

impl AttributeMapping {
    pub fn new(attribute: impl Into<String>, property: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            attribute: attribute.into(),
            property: property.into(),
            kind,
            optional: false,
            required: false,
            direction: Direction::Both,
            source: AttributeSource::Property,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn percent_of(mut self, capacity: impl Into<String>) -> Self {
        self.source = AttributeSource::PercentOf {
            capacity: capacity.into(),
        };
        self.direction = Direction::PublishOnly;
        self
    }

    fn publishes(&self) -> bool {
        self.direction != Direction::SubscribeOnly
    }

    fn subscribes(&self) -> bool {
        self.direction != Direction::PublishOnly && self.source == AttributeSource::Property
    }
}

/// Serializable description of a mapped object class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectClassMapping {
    pub fom_class: String,
    pub odm_class: String,
    /// Bind remote objects to existing local objects of the same name
    #[serde(default)]
    pub link_existing: bool,
    pub attributes: Vec<AttributeMapping>,
}

fn numeric_as(kind: ScalarKind, v: f64) -> Value {
    match kind {
        ScalarKind::Float32 => Value::Float32(v as f32),
        ScalarKind::Int32 => Value::Int32(v.round() as i32),
        ScalarKind::Int16 => Value::Int16(v.round() as i16),
        ScalarKind::Int64 => Value::Int64(v.round() as i64),
        _ => Value::Float64(v),
    }
}

// ============================================================================
// MAPPED OBJECT CONVERTER
// ============================================================================

/// Table-driven object converter.
pub struct MappedObjectConverter {
    mapping: ObjectClassMapping,
    codec: Arc<dyn AttributeCodec>,
}

impl MappedObjectConverter {
    pub fn new(fom_class: impl Into<String>, odm_class: impl Into<String>) -> Self {
        Self::from_mapping(ObjectClassMapping {
            fom_class: fom_class.into(),
            odm_class: odm_class.into(),
            link_existing: false,
            attributes: Vec::new(),
        })
    }

    pub fn from_mapping(mapping: ObjectClassMapping) -> Self {
        Self {
            mapping,
            codec: Arc::new(XdrCodec),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn AttributeCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn map(mut self, attribute: AttributeMapping) -> Self {
        self.mapping.attributes.push(attribute);
        self
    }

    pub fn link_existing(mut self, link: bool) -> Self {
        self.mapping.link_existing = link;
        self
    }

    fn find(&self, attribute: &str) -> Result<&AttributeMapping, ConversionError> {
        self.mapping
            .attributes
            .iter()
            .find(|m| m.attribute == attribute)
            .ok_or_else(|| ConversionError::UnknownAttribute(attribute.to_string()))
    }

    fn read_number(model: &dyn LocalModel, object: LocalObjectId, property: &str) -> Option<f64> {
        model.property(object, property).and_then(|v| v.as_f64())
    }
}

impl ObjectConverter for MappedObjectConverter {
    fn fom_class(&self) -> &str {
        &self.mapping.fom_class
    }

    fn odm_class(&self) -> &str {
        &self.mapping.odm_class
    }

    fn publish_attributes(&self) -> BTreeSet<String> {
        self.mapping
            .attributes
            .iter()
            .filter(|m| m.publishes())
            .map(|m| m.attribute.clone())
            .collect()
    }

    fn subscribe_attributes(&self) -> BTreeSet<String> {
        self.mapping
            .attributes
            .iter()
            .filter(|m| m.subscribes())
            .map(|m| m.attribute.clone())
            .collect()
    }

    fn required_attributes(&self) -> BTreeSet<String> {
        self.mapping
            .attributes
            .iter()
            .filter(|m| m.required)
            .map(|m| m.attribute.clone())
            .collect()
    }

    fn attributes_for_property(&self, property: &str) -> Vec<String> {
        self.mapping
            .attributes
            .iter()
            .filter(|m| m.publishes())
            .filter(|m| {
                m.property == property
                    || matches!(&m.source, AttributeSource::PercentOf { capacity } if capacity == property)
            })
            .map(|m| m.attribute.clone())
            .collect()
    }

    fn encode_attribute(
        &self,
        model: &dyn LocalModel,
        object: LocalObjectId,
        attribute: &str,
    ) -> Result<Option<Vec<u8>>, ConversionError> {
        let mapping = self.find(attribute)?;
        let value = match &mapping.source {
            AttributeSource::Property => match model.property(object, &mapping.property) {
                Some(value) => value,
                None => return Ok(None),
            },
            AttributeSource::PercentOf { capacity } => {
                let quantity = Self::read_number(model, object, &mapping.property);
                let capacity = Self::read_number(model, object, capacity);
                match (quantity, capacity) {
                    (Some(q), Some(c)) => numeric_as(mapping.kind, percent_of_capacity(q, c)),
                    _ => return Ok(None),
                }
            }
        };
        if value.kind() != mapping.kind {
            return Err(ConversionError::TypeMismatch {
                name: mapping.property.clone(),
                expected: mapping.kind,
                actual: value.kind(),
            });
        }
        Ok(Some(self.codec.encode(&value, mapping.optional)))
    }

    fn decode_attribute(
        &mut self,
        model: &dyn LocalModel,
        object: LocalObjectId,
        attribute: &str,
        bytes: &[u8],
    ) -> Result<(), ConversionError> {
        let mapping = self.find(attribute)?;
        if !mapping.subscribes() {
            return Err(ConversionError::UnknownAttribute(attribute.to_string()));
        }
        if let Some(value) = self.codec.decode(mapping.kind, bytes, mapping.optional)? {
            model.set_property(object, &mapping.property, value)?;
        }
        Ok(())
    }

    fn materialize(
        &mut self,
        model: &dyn LocalModel,
        instance_name: &str,
        _pending: &PendingParameters,
    ) -> Result<Materialized, ConversionError> {
        if self.mapping.link_existing {
            if let Some(existing) = model.find_by_name(&self.mapping.odm_class, instance_name) {
                model.set_link_status(existing, LinkStatus::Linked)?;
                return Ok(Materialized::Linked(existing));
            }
        }
        let ghost = model.create_ghost(&self.mapping.odm_class, instance_name)?;
        Ok(Materialized::Created(ghost))
    }
}

// ============================================================================
// MAPPED INTERACTION CONVERTER
// ============================================================================

/// One FOM interaction parameter mapped to one local parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMapping {
    pub parameter: String,
    pub local_name: String,
    pub kind: ScalarKind,
    #[serde(default)]
    pub optional: bool,
}

impl ParameterMapping {
    pub fn new(parameter: impl Into<String>, local_name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            parameter: parameter.into(),
            local_name: local_name.into(),
            kind,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Table-driven interaction converter.
pub struct MappedInteractionConverter {
    fom_class: String,
    odm_class: String,
    parameters: Vec<ParameterMapping>,
    codec: Arc<dyn AttributeCodec>,
}

impl MappedInteractionConverter {
    pub fn new(fom_class: impl Into<String>, odm_class: impl Into<String>) -> Self {
        Self {
            fom_class: fom_class.into(),
            odm_class: odm_class.into(),
            parameters: Vec::new(),
            codec: Arc::new(XdrCodec),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn AttributeCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn map(mut self, parameter: ParameterMapping) -> Self {
        self.parameters.push(parameter);
        self
    }
}

impl InteractionConverter for MappedInteractionConverter {
    fn fom_class(&self) -> &str {
        &self.fom_class
    }

    fn odm_class(&self) -> &str {
        &self.odm_class
    }

    fn parameters(&self) -> BTreeSet<String> {
        self.parameters.iter().map(|p| p.parameter.clone()).collect()
    }

    fn encode(&self, interaction: &LocalInteraction) -> Result<EncodedAttributes, ConversionError> {
        let mut encoded = EncodedAttributes::new();
        for mapping in &self.parameters {
            let Some(value) = interaction.parameters.get(&mapping.local_name) else {
                continue;
            };
            if value.kind() != mapping.kind {
                return Err(ConversionError::TypeMismatch {
                    name: mapping.local_name.clone(),
                    expected: mapping.kind,
                    actual: value.kind(),
                });
            }
            encoded.insert(mapping.parameter.clone(), self.codec.encode(value, mapping.optional));
        }
        Ok(encoded)
    }

    fn decode(&self, parameters: &EncodedAttributes) -> Result<LocalInteraction, ConversionError> {
        let mut interaction = LocalInteraction::new(self.odm_class.clone());
        for mapping in &self.parameters {
            let Some(bytes) = parameters.get(&mapping.parameter) else {
                continue;
            };
            if let Some(value) = self.codec.decode(mapping.kind, bytes, mapping.optional)? {
                interaction.parameters.insert(mapping.local_name.clone(), value);
            }
        }
        Ok(interaction)
    }
}
