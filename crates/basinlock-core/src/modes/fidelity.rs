//! Fidelity mode: bounded pull toward the basin's flat interior.
//!
//! Redistributes probability mass within the existing support only, moving
//! the vector toward uniform-over-support by a mixing factor chosen so that
//! the total variation distance from the input never exceeds the configured
//! cap. Variance of the probability vector strictly decreases (unless the
//! input is already uniform); entropy preservation is explicitly sacrificed
//! to that priority. Always admissible once the guard set passes.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::distribution::Distribution;
use crate::metrics::{probability_variance, total_variation_distance};

use super::{ModeError, ModeOutcome, ModeReport};

pub(super) fn apply(
    input: &Distribution,
    config: &EngineConfig,
) -> Result<ModeOutcome, ModeError> {
    let variance_before = probability_variance(input);
    let (pulled, tv_from_input) = bounded_uniform_pull(input, config.fidelity_tv_cap)?;
    let variance_after = probability_variance(&pulled);

    Ok(ModeOutcome {
        distribution: pulled,
        report: ModeReport::Fidelity {
            tv_from_input,
            variance_before,
            variance_after,
        },
    })
}

/// Mix the input toward uniform-over-support, capped in total variation.
///
/// With `u` the uniform vector over the input's support and
/// `λ = min(1, cap / tv(input, u))`, the result is
/// `p_i + λ·(u_i − p_i)`, which satisfies `tv(input, result) = λ·tv(input, u)
/// ≤ cap` exactly. Labels with zero probability stay at zero — the support
/// set never grows. Returns the transformed distribution and its measured
/// distance from the input.
pub(super) fn bounded_uniform_pull(
    input: &Distribution,
    cap: f64,
) -> Result<(Distribution, f64), ModeError> {
    let support = input.support_len();
    if support == 0 {
        return Err(ModeError::EmptySupport);
    }
    let uniform = 1.0 / support as f64;

    let tv_to_uniform: f64 = 0.5
        * input
            .iter()
            .map(|(_, p)| {
                let target = if p > 0.0 { uniform } else { 0.0 };
                (p - target).abs()
            })
            .sum::<f64>();

    let lambda = if tv_to_uniform > 0.0 {
        (cap / tv_to_uniform).min(1.0)
    } else {
        0.0
    };

    let probs: BTreeMap<String, f64> = input
        .iter()
        .map(|(label, p)| {
            let target = if p > 0.0 { uniform } else { 0.0 };
            (label.to_string(), p + lambda * (target - p))
        })
        .collect();

    let pulled =
        Distribution::from_probs(probs).map_err(|e| ModeError::Malformed(e.to_string()))?;
    let tv = total_variation_distance(input, &pulled);
    Ok((pulled, tv))
}
