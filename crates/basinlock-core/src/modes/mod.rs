//! Mode strategies: one bounded, deterministic transform per operating mode.
//!
//! The mode is a fixed input per invocation — there are no transitions
//! between modes inside one call, and dispatch is a single exhaustive match
//! over the closed [`Mode`] enum. Each strategy consumes a distribution, an
//! identity string, and the invocation context, and produces a transformed
//! distribution together with a mode-specific report.
//!
//! Shared failure semantics: any internal fault surfaces as a typed
//! [`ModeError`], is treated identically to a guard refusal (no
//! transformation applied, input untouched), and is recorded in history with
//! the mode name and detail.

mod fidelity;
mod scalar_guarded;
mod watermark;
mod witness_phase;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::distribution::Distribution;

/// Operating mode for one invocation. Selection is explicit per request,
/// never inferred or auto-escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Fidelity,
    WitnessPhase,
    Watermark,
    ScalarGuarded,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fidelity => write!(f, "fidelity"),
            Self::WitnessPhase => write!(f, "witness_phase"),
            Self::Watermark => write!(f, "watermark"),
            Self::ScalarGuarded => write!(f, "scalar_guarded"),
        }
    }
}

/// Request-level parameters. Carries no thresholds: policy limits live in
/// [`EngineConfig`] and cannot be widened per request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeParams {
    /// Effective temperature of the upstream procedure.
    pub temperature: f64,
    /// Explicit opt-in for scalar-guarded mode. Never defaulted to true.
    pub scalar_mode_confirmed: bool,
}

impl Default for ModeParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            scalar_mode_confirmed: false,
        }
    }
}

/// Internal fault during an accepted mode's transform. Terminal for the
/// invocation; the original distribution is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModeError {
    /// Watermark mode was requested without an identity string.
    #[error("watermark mode requires a non-empty identity string")]
    MissingIdentity,
    /// Witness-phase coherence could not be preserved above the floor.
    #[error("phase coherence {achieved:.4} fell below configured floor {floor:.4}")]
    CoherenceFloor { floor: f64, achieved: f64 },
    /// The distribution carries no states with non-zero probability.
    #[error("distribution support is empty")]
    EmptySupport,
    /// Catch-all for inputs a strategy cannot process.
    #[error("malformed input: {0}")]
    Malformed(String),
}

/// Mode-specific metrics subset attached to an accepted verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeReport {
    Fidelity {
        tv_from_input: f64,
        variance_before: f64,
        variance_after: f64,
    },
    WitnessPhase {
        tv_from_input: f64,
        coherence_before: f64,
        coherence_after: f64,
    },
    Watermark {
        /// First 16 hex chars of SHA-256(identity).
        fingerprint: String,
        max_relative_shift: f64,
        tv_from_input: f64,
    },
    ScalarGuarded {
        contraction: f64,
        variance_before: f64,
        variance_after: f64,
    },
}

/// Transformed distribution plus the strategy's report.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeOutcome {
    pub distribution: Distribution,
    pub report: ModeReport,
}

/// Dispatch one invocation to its strategy. Exhaustive over [`Mode`]; adding
/// a variant without a handler is a compile error.
pub fn apply(
    mode: Mode,
    input: &Distribution,
    identity: &str,
    context: &EngineContext,
    config: &EngineConfig,
) -> Result<ModeOutcome, ModeError> {
    match mode {
        Mode::Fidelity => fidelity::apply(input, config),
        Mode::WitnessPhase => witness_phase::apply(input, context, config),
        Mode::Watermark => watermark::apply(input, identity, config),
        Mode::ScalarGuarded => scalar_guarded::apply(input, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_display_names() {
        assert_eq!(Mode::Fidelity.to_string(), "fidelity");
        assert_eq!(Mode::WitnessPhase.to_string(), "witness_phase");
        assert_eq!(Mode::Watermark.to_string(), "watermark");
        assert_eq!(Mode::ScalarGuarded.to_string(), "scalar_guarded");
    }

    #[test]
    fn mode_serde_round_trip() {
        for mode in [
            Mode::Fidelity,
            Mode::WitnessPhase,
            Mode::Watermark,
            Mode::ScalarGuarded,
        ] {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{mode}\""));
            let back: Mode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, mode);
        }
    }

    #[test]
    fn default_params_do_not_opt_into_scalar() {
        let params = ModeParams::default();
        assert_eq!(params.temperature, 1.0);
        assert!(!params.scalar_mode_confirmed);
    }
}
