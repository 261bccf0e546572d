//! Federate configuration.
//!
//! Loaded once at startup from JSON. Every section has defaults, so a file
//! only needs the keys it changes:
//!
//! ```json
//! {
//!   "federation_name": "Exercise",
//!   "federate_name": "Bridge-1",
//!   "resign_action": "DELETE_OBJECTS",
//!   "time": { "time_constrained": true, "lookahead_hours": 0.0001 },
//!   "pubsub": { "objects": { "BaseEntity.Platform": { "publish": true, "subscribe": true } } }
//! }
//! ```

use fedbridge_env::{PubSubPolicy, ResignAction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Milliseconds per configured lookahead hour.
pub const MS_PER_HOUR: f64 = 3_600_000.0;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// TIME
// ============================================================================

/// Time management settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// Wait for federation grants before advancing (default: false)
    pub time_constrained: bool,

    /// Bound other federates' advance by our own (default: false)
    pub time_regulating: bool,

    /// Federation start time in ms; negative means auto-detect (default: -1)
    pub start_time: i64,

    /// Lookahead in hours (default: 0.0)
    pub lookahead_hours: f64,
}

impl TimeConfig {
    /// Lookahead converted to simulation milliseconds.
    pub fn lookahead_ms(&self) -> i64 {
        (self.lookahead_hours * MS_PER_HOUR).round() as i64
    }

    /// True when the start time is taken from the federation.
    pub fn auto_detect_time(&self) -> bool {
        self.start_time < 0
    }

    /// Start time used for time regulation.
    pub fn effective_start_time(&self) -> i64 {
        self.start_time.max(0)
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            time_constrained: false,
            time_regulating: false,
            start_time: -1,
            lookahead_hours: 0.0,
        }
    }
}

// ============================================================================
// LIVENESS
// ============================================================================

/// Heartbeat and timeout settings for object liveness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Re-send interval for tracked local objects; `None` disables heartbeats
    pub heartbeat_interval_ms: Option<i64>,

    /// Silence after which a remote object is dropped; `None` disables timeouts
    pub timeout_ms: Option<i64>,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: Some(5_000),
            timeout_ms: Some(12_000),
        }
    }
}

// ============================================================================
// PUB/SUB MATRIX
// ============================================================================

/// Publish/subscribe flags of one FOM class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSub {
    pub publish: bool,
    pub subscribe: bool,
}

impl PubSub {
    pub fn both() -> Self {
        Self {
            publish: true,
            subscribe: true,
        }
    }
}

/// Per-class publish/subscribe decisions keyed by FOM class name.
///
/// Classes missing from the matrix are neither published nor subscribed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubMatrix {
    pub objects: BTreeMap<String, PubSub>,
    pub interactions: BTreeMap<String, PubSub>,
}

impl PubSubMatrix {
    /// Sets the flags of an object class.
    pub fn with_object(mut self, class: impl Into<String>, flags: PubSub) -> Self {
        self.objects.insert(class.into(), flags);
        self
    }

    /// Sets the flags of an interaction class.
    pub fn with_interaction(mut self, class: impl Into<String>, flags: PubSub) -> Self {
        self.interactions.insert(class.into(), flags);
        self
    }

    fn lookup(map: &BTreeMap<String, PubSub>, class: &str) -> PubSub {
        map.get(class).copied().unwrap_or_default()
    }
}

impl PubSubPolicy for PubSubMatrix {
    fn is_object_published(&self, fom_class: &str) -> bool {
        Self::lookup(&self.objects, fom_class).publish
    }

    fn is_object_subscribed(&self, fom_class: &str) -> bool {
        Self::lookup(&self.objects, fom_class).subscribe
    }

    fn is_interaction_published(&self, fom_class: &str) -> bool {
        Self::lookup(&self.interactions, fom_class).publish
    }

    fn is_interaction_subscribed(&self, fom_class: &str) -> bool {
        Self::lookup(&self.interactions, fom_class).subscribe
    }
}

// ============================================================================
// FEDERATE
// ============================================================================

/// Top-level federate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederateConfig {
    /// Federation execution to create/join
    pub federation_name: String,

    /// This federate's name; also the tag on attribute updates
    pub federate_name: String,

    /// FOM document handed to CreateFederationExecution
    pub fom_path: String,

    /// Action requested when resigning
    pub resign_action: ResignAction,

    pub time: TimeConfig,

    pub liveness: LivenessConfig,

    pub pubsub: PubSubMatrix,
}

impl Default for FederateConfig {
    fn default() -> Self {
        Self {
            federation_name: "FedBridge".to_string(),
            federate_name: "fedbridge".to_string(),
            fom_path: "fom.fed".to_string(),
            resign_action: ResignAction::default(),
            time: TimeConfig::default(),
            liveness: LivenessConfig::default(),
            pubsub: PubSubMatrix::default(),
        }
    }
}

impl FederateConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: FederateConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Checks values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.federation_name.trim().is_empty() {
            return Err(ConfigError::Invalid("federation_name is empty".into()));
        }
        if self.federate_name.trim().is_empty() {
            return Err(ConfigError::Invalid("federate_name is empty".into()));
        }
        if !self.time.lookahead_hours.is_finite() || self.time.lookahead_hours < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "lookahead_hours must be a non-negative number, got {}",
                self.time.lookahead_hours
            )));
        }
        for (name, value) in [
            ("heartbeat_interval_ms", self.liveness.heartbeat_interval_ms),
            ("timeout_ms", self.liveness.timeout_ms),
        ] {
            if matches!(value, Some(v) if v <= 0) {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}
