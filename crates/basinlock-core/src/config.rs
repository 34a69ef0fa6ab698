//! Engine policy constants, injected at construction time.
//!
//! Every threshold the guards and transforms consult lives here, so the
//! active policy of a running engine is inspectable and auditable in one
//! place. Request-level callers cannot override these values: [`EngineConfig`]
//! is fixed when the engine is built, and the per-request parameter surface
//! (`ModeParams`) carries no thresholds.

use serde::{Deserialize, Serialize};

/// Tunable policy constants for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Noise ceiling for the standard noise guard.
    pub noise_threshold: f64,
    /// Variance ceiling for the standard variance guard.
    pub variance_limit: f64,
    /// Maximum admissible circuit depth.
    pub max_depth: u32,
    /// Noise ceiling for scalar-guarded mode.
    pub scalar_noise_limit: f64,
    /// Variance ceiling for scalar-guarded mode.
    pub scalar_variance_limit: f64,
    /// Temperature ceiling for scalar-guarded mode.
    pub scalar_temperature_limit: f64,
    /// Composite admissibility: noise ceiling.
    pub admissible_noise_limit: f64,
    /// Composite admissibility: phase dispersion ceiling.
    pub admissible_phase_limit: f64,
    /// Composite admissibility: procedural disorder ceiling.
    pub admissible_disorder_limit: f64,
    /// Total-variation cap on the fidelity pull.
    pub fidelity_tv_cap: f64,
    /// Minimum post-transform phase coherence for witness-phase mode.
    pub coherence_floor: f64,
    /// Relative per-state magnitude of the watermark reweighting.
    pub watermark_magnitude: f64,
    /// Contraction factor applied by scalar-guarded mode.
    pub scalar_contraction: f64,
    /// Number of top states summed for the top-k mass metric.
    pub top_k: usize,
    /// Number of octave bins for the rank-binned mass profile.
    pub octave_bins: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            noise_threshold: 0.15,
            variance_limit: 0.25,
            max_depth: 1000,
            scalar_noise_limit: 0.075,
            scalar_variance_limit: 0.125,
            scalar_temperature_limit: 1.5,
            admissible_noise_limit: 0.003,
            admissible_phase_limit: 0.2,
            admissible_disorder_limit: 0.4,
            fidelity_tv_cap: 0.05,
            coherence_floor: 0.25,
            watermark_magnitude: 1e-6,
            scalar_contraction: 0.01,
            top_k: 4,
            octave_bins: 8,
        }
    }
}
