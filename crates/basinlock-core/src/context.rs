//! Per-invocation execution context supplied by the upstream estimator.

use serde::{Deserialize, Serialize};

use crate::distribution::DomainError;

/// Coarse topology classification of the upstream procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyClass {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for TopologyClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Immutable snapshot of the conditions under which one invocation runs.
///
/// Supplied fresh per call by the context provider collaborator; has no
/// lifecycle of its own. The unitless fields are probabilities in `[0, 1]`;
/// `circuit_depth` is a raw gate-layer count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineContext {
    /// Estimated effective noise level.
    pub noise_estimate: f64,
    /// Estimated outcome variance.
    pub variance_estimate: f64,
    /// Depth of the upstream circuit or procedure.
    pub circuit_depth: u32,
    /// Phase dispersion estimate.
    pub phase_dispersion: f64,
    /// Procedural disorder measure over the invocation history.
    pub procedural_disorder: f64,
    /// Topology classification.
    pub topology_class: TopologyClass,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self {
            noise_estimate: 0.0,
            variance_estimate: 0.0,
            circuit_depth: 0,
            phase_dispersion: 0.0,
            procedural_disorder: 0.0,
            topology_class: TopologyClass::Low,
        }
    }
}

impl EngineContext {
    /// Check that every unitless field is finite and within `[0, 1]`.
    ///
    /// A malformed context is a fault of the providing collaborator; the
    /// orchestrator records it and refuses the invocation.
    pub fn validate(&self) -> Result<(), DomainError> {
        let fields = [
            ("noise_estimate", self.noise_estimate),
            ("variance_estimate", self.variance_estimate),
            ("phase_dispersion", self.phase_dispersion),
            ("procedural_disorder", self.procedural_disorder),
        ];
        for (field, value) in fields {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(DomainError::ContextRange { field, value });
            }
        }
        Ok(())
    }
}
