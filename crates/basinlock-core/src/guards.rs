//! Admissibility guards evaluated before any transformation is attempted.
//!
//! Each guard is a pure predicate over the invocation context, the requested
//! mode, and the request parameters. Guards run in a fixed order and stop at
//! the first refusal; [`evaluate_all`] is the collect-everything variant for
//! audit tooling. Every refusal reason names the configured limit and the
//! observed value so verdicts stay debuggable after the fact.
//!
//! Thresholds come exclusively from [`EngineConfig`] — request parameters
//! cannot widen policy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::context::{EngineContext, TopologyClass};
use crate::modes::{Mode, ModeParams};

/// The guard that produced a refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    /// Standard noise ceiling.
    Noise,
    /// Standard variance ceiling.
    Variance,
    /// Circuit depth ceiling.
    Complexity,
    /// Scalar-mode opt-in and limits.
    Scalar,
    /// Composite admissibility surface for scalar contraction.
    ScalarAdmissibility,
}

impl std::fmt::Display for GuardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Noise => write!(f, "noise_guard"),
            Self::Variance => write!(f, "variance_guard"),
            Self::Complexity => write!(f, "complexity_guard"),
            Self::Scalar => write!(f, "scalar_guard"),
            Self::ScalarAdmissibility => write!(f, "scalar_admissibility"),
        }
    }
}

/// An explicit, expected refusal. Not an exceptional outcome: refusals are
/// first-class verdicts and always reach the history ledger.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("refused by {guard}: {reason}")]
pub struct GuardRefusal {
    pub guard: GuardKind,
    pub reason: String,
}

impl GuardRefusal {
    fn new(guard: GuardKind, reason: String) -> Self {
        Self { guard, reason }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Run the guard set in fixed order, stopping at the first refusal.
pub fn evaluate(
    config: &EngineConfig,
    context: &EngineContext,
    mode: Mode,
    params: &ModeParams,
) -> Result<(), GuardRefusal> {
    if let Some(r) = noise_check(config, context) {
        return Err(r);
    }
    if let Some(r) = variance_check(config, context) {
        return Err(r);
    }
    if let Some(r) = complexity_check(config, context) {
        return Err(r);
    }
    if mode == Mode::ScalarGuarded {
        if let Some(r) = scalar_check(config, context, params) {
            return Err(r);
        }
        if let Some(r) = admissibility_check(config, context) {
            return Err(r);
        }
    }
    Ok(())
}

/// Run every applicable guard and collect all refusals instead of stopping at
/// the first. The orchestrator uses [`evaluate`]; this variant exists for
/// audit tooling that wants the complete picture.
pub fn evaluate_all(
    config: &EngineConfig,
    context: &EngineContext,
    mode: Mode,
    params: &ModeParams,
) -> Vec<GuardRefusal> {
    let mut refusals = Vec::new();
    refusals.extend(noise_check(config, context));
    refusals.extend(variance_check(config, context));
    refusals.extend(complexity_check(config, context));
    if mode == Mode::ScalarGuarded {
        refusals.extend(scalar_check(config, context, params));
        refusals.extend(admissibility_check(config, context));
    }
    refusals
}

// ---------------------------------------------------------------------------
// Individual checks
// ---------------------------------------------------------------------------

fn noise_check(config: &EngineConfig, context: &EngineContext) -> Option<GuardRefusal> {
    if context.noise_estimate > config.noise_threshold {
        return Some(GuardRefusal::new(
            GuardKind::Noise,
            format!(
                "noise estimate {:.3} exceeds threshold {:.3}",
                context.noise_estimate, config.noise_threshold
            ),
        ));
    }
    None
}

fn variance_check(config: &EngineConfig, context: &EngineContext) -> Option<GuardRefusal> {
    if context.variance_estimate > config.variance_limit {
        return Some(GuardRefusal::new(
            GuardKind::Variance,
            format!(
                "variance estimate {:.3} exceeds limit {:.3}",
                context.variance_estimate, config.variance_limit
            ),
        ));
    }
    None
}

fn complexity_check(config: &EngineConfig, context: &EngineContext) -> Option<GuardRefusal> {
    if context.circuit_depth > config.max_depth {
        return Some(GuardRefusal::new(
            GuardKind::Complexity,
            format!(
                "circuit depth {} exceeds maximum {}",
                context.circuit_depth, config.max_depth
            ),
        ));
    }
    None
}

/// Scalar mode requires explicit opt-in and tighter noise/variance/temperature
/// limits than the standard guards. The first failing condition is cited.
fn scalar_check(
    config: &EngineConfig,
    context: &EngineContext,
    params: &ModeParams,
) -> Option<GuardRefusal> {
    if context.noise_estimate > config.scalar_noise_limit {
        return Some(GuardRefusal::new(
            GuardKind::Scalar,
            format!(
                "noise estimate {:.4} exceeds scalar limit {:.4}",
                context.noise_estimate, config.scalar_noise_limit
            ),
        ));
    }
    if context.variance_estimate > config.scalar_variance_limit {
        return Some(GuardRefusal::new(
            GuardKind::Scalar,
            format!(
                "variance estimate {:.4} exceeds scalar limit {:.4}",
                context.variance_estimate, config.scalar_variance_limit
            ),
        ));
    }
    if params.temperature > config.scalar_temperature_limit {
        return Some(GuardRefusal::new(
            GuardKind::Scalar,
            format!(
                "temperature {:.2} exceeds scalar limit {:.2}",
                params.temperature, config.scalar_temperature_limit
            ),
        ));
    }
    if !params.scalar_mode_confirmed {
        return Some(GuardRefusal::new(
            GuardKind::Scalar,
            "scalar mode requires explicit confirmation (scalar_mode_confirmed is false)"
                .to_string(),
        ));
    }
    None
}

/// Stricter composite admissibility surface used by the history-preserving
/// validator variant of scalar mode. All conditions must hold.
fn admissibility_check(config: &EngineConfig, context: &EngineContext) -> Option<GuardRefusal> {
    if context.noise_estimate > config.admissible_noise_limit {
        return Some(GuardRefusal::new(
            GuardKind::ScalarAdmissibility,
            format!(
                "noise estimate {:.4} exceeds admissible ceiling {:.4}",
                context.noise_estimate, config.admissible_noise_limit
            ),
        ));
    }
    if context.phase_dispersion > config.admissible_phase_limit {
        return Some(GuardRefusal::new(
            GuardKind::ScalarAdmissibility,
            format!(
                "phase dispersion {:.3} exceeds admissible ceiling {:.3}",
                context.phase_dispersion, config.admissible_phase_limit
            ),
        ));
    }
    if context.procedural_disorder > config.admissible_disorder_limit {
        return Some(GuardRefusal::new(
            GuardKind::ScalarAdmissibility,
            format!(
                "procedural disorder {:.3} exceeds admissible ceiling {:.3}",
                context.procedural_disorder, config.admissible_disorder_limit
            ),
        ));
    }
    if context.topology_class == TopologyClass::High {
        return Some(GuardRefusal::new(
            GuardKind::ScalarAdmissibility,
            "topology class 'high' is not admissible for scalar contraction".to_string(),
        ));
    }
    None
}
