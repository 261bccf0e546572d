//! Federation scenarios for DST.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// FED-001: Two regulating federates advancing in lockstep
    LockstepAdvance,

    /// FED-002: Objects and interactions exchanged both ways
    Interop,

    /// FED-003: Federation save, change, restore
    SaveRestore,

    /// FED-004: Saves refused by a paused or failing federate
    SaveRefused,

    /// FED-005: Random create/update/delete churn
    DiscoveryChurn,

    /// FED-006: Heartbeats, then an owner crash and a timeout
    Liveness,

    /// FED-007: Federate joining after objects exist
    LateJoiner,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::LockstepAdvance,
            ScenarioId::Interop,
            ScenarioId::SaveRestore,
            ScenarioId::SaveRefused,
            ScenarioId::DiscoveryChurn,
            ScenarioId::Liveness,
            ScenarioId::LateJoiner,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::LockstepAdvance => "lockstep_advance",
            ScenarioId::Interop => "interop",
            ScenarioId::SaveRestore => "save_restore",
            ScenarioId::SaveRefused => "save_refused",
            ScenarioId::DiscoveryChurn => "discovery_churn",
            ScenarioId::Liveness => "liveness",
            ScenarioId::LateJoiner => "late_joiner",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::LockstepAdvance => {
                "2 constrained+regulating federates, blocking TARs from sim threads"
            }
            ScenarioId::Interop => "3 federates, object updates, interactions, percent attributes",
            ScenarioId::SaveRestore => "Save CP1, change state, restore, verify rollback seen remotely",
            ScenarioId::SaveRefused => "Paused federate and failing store both refuse a save",
            ScenarioId::DiscoveryChurn => "Seeded create/update/delete churn, catalogues converge",
            ScenarioId::Liveness => "Heartbeats keep ghosts alive until the owner goes silent",
            ScenarioId::LateJoiner => "Existing objects discovered and provided to a late joiner",
        }
    }

    /// Returns true if the scenario runs simulation threads.
    pub fn is_threaded(&self) -> bool {
        matches!(self, ScenarioId::LockstepAdvance)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lockstep_advance" | "lockstep" | "fed-001" => Ok(ScenarioId::LockstepAdvance),
            "interop" | "fed-002" => Ok(ScenarioId::Interop),
            "save_restore" | "saverestore" | "fed-003" => Ok(ScenarioId::SaveRestore),
            "save_refused" | "saverefused" | "fed-004" => Ok(ScenarioId::SaveRefused),
            "discovery_churn" | "churn" | "fed-005" => Ok(ScenarioId::DiscoveryChurn),
            "liveness" | "fed-006" => Ok(ScenarioId::Liveness),
            "late_joiner" | "latejoiner" | "fed-007" => Ok(ScenarioId::LateJoiner),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!("FED-005".parse::<ScenarioId>(), Ok(ScenarioId::DiscoveryChurn));
        assert_eq!("Lockstep".parse::<ScenarioId>(), Ok(ScenarioId::LockstepAdvance));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
