//! Watermark mode: deterministic identity-locking of a distribution.
//!
//! Derives a per-state reweighting vector from the SHA-256 digest of the
//! identity string, modulated by a golden-ratio phase map, and applies it as
//! a relative perturbation bounded by the configured magnitude. The support
//! set is exactly unchanged — no states added or removed — and the same
//! identity over the same input yields a byte-identical output. The final
//! renormalization is an explicit, documented step of the algorithm.

use std::collections::BTreeMap;
use std::f64::consts::TAU;

use sha2::{Digest, Sha256};

use crate::config::EngineConfig;
use crate::distribution::Distribution;
use crate::history::identity_fingerprint;
use crate::metrics::total_variation_distance;

use super::{ModeError, ModeOutcome, ModeReport};

/// Golden ratio, the irrational base of the phase map.
const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;

pub(super) fn apply(
    input: &Distribution,
    identity: &str,
    config: &EngineConfig,
) -> Result<ModeOutcome, ModeError> {
    if identity.is_empty() {
        return Err(ModeError::MissingIdentity);
    }
    if input.support_len() == 0 {
        return Err(ModeError::EmptySupport);
    }

    let digest = Sha256::digest(identity.as_bytes());
    let weights = reweighting_vector(&digest, input.len());

    // Relative perturbation: each state moves by at most
    // `watermark_magnitude` of its own probability. Zero stays zero.
    let mut perturbed: BTreeMap<String, f64> = BTreeMap::new();
    let mut total = 0.0;
    for ((label, p), w) in input.iter().zip(weights.iter()) {
        let shifted = p + config.watermark_magnitude * w * p;
        total += shifted;
        perturbed.insert(label.to_string(), shifted);
    }

    // Explicit renormalization back onto the simplex.
    for value in perturbed.values_mut() {
        *value /= total;
    }

    let output =
        Distribution::from_probs(perturbed).map_err(|e| ModeError::Malformed(e.to_string()))?;

    let max_relative_shift = input
        .iter()
        .filter(|(_, p)| *p > 0.0)
        .map(|(label, p)| (output.prob(label) - p).abs() / p)
        .fold(0.0, f64::max);

    let tv_from_input = total_variation_distance(input, &output);

    Ok(ModeOutcome {
        distribution: output,
        report: ModeReport::Watermark {
            fingerprint: identity_fingerprint(identity),
            max_relative_shift,
            tv_from_input,
        },
    })
}

/// Expand a 32-byte digest into one weight per state, in `[-1, 1]`.
///
/// Digest bytes are cycled to the required length, mapped onto `[-1, 1]`,
/// and modulated by `cos(2π·i·φ)` with φ the golden ratio — an equidistributed
/// phase sequence, so nearby states never receive correlated shifts.
fn reweighting_vector(digest: &[u8], len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let byte = digest[i % digest.len()] as f64;
            let centered = byte / 255.0 * 2.0 - 1.0;
            centered * (TAU * i as f64 * GOLDEN_RATIO).cos()
        })
        .collect()
}
