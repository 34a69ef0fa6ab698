//! Scalar-guarded mode: the tightest transform of the four.
//!
//! Applies a strictly bounded scalar contraction toward the uniform fixed
//! point over the input's support. Only reachable when both the scalar guard
//! and the composite admissibility surface have passed — the orchestrator
//! never dispatches here otherwise.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::distribution::Distribution;
use crate::metrics::probability_variance;

use super::{ModeError, ModeOutcome, ModeReport};

pub(super) fn apply(
    input: &Distribution,
    config: &EngineConfig,
) -> Result<ModeOutcome, ModeError> {
    let support = input.support_len();
    if support == 0 {
        return Err(ModeError::EmptySupport);
    }
    let gamma = config.scalar_contraction;
    let uniform = 1.0 / support as f64;

    let variance_before = probability_variance(input);

    // result = (1 − γ)·p + γ·u over the support; zero mass stays zero.
    let probs: BTreeMap<String, f64> = input
        .iter()
        .map(|(label, p)| {
            let target = if p > 0.0 { uniform } else { 0.0 };
            (label.to_string(), (1.0 - gamma) * p + gamma * target)
        })
        .collect();

    let contracted =
        Distribution::from_probs(probs).map_err(|e| ModeError::Malformed(e.to_string()))?;
    let variance_after = probability_variance(&contracted);

    Ok(ModeOutcome {
        distribution: contracted,
        report: ModeReport::ScalarGuarded {
            contraction: gamma,
            variance_before,
            variance_after,
        },
    })
}
