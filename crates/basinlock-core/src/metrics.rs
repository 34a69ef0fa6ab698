//! Statistical distance and concentration metrics over outcome distributions.
//!
//! All functions here are pure and side-effect-free. Two-distribution metrics
//! take `p` as the reference/baseline and `q` as the candidate; missing labels
//! are treated as probability zero. Input validity is guaranteed by the
//! [`Distribution`](crate::Distribution) construction gate, so none of these
//! functions can observe a negative or unnormalized vector.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::distribution::Distribution;

/// Floor substituted for zero candidate probabilities in KL divergence.
///
/// Where `q` assigns zero to a label inside `p`'s support the true divergence
/// is infinite; clamping to this floor keeps the metric finite. This is a
/// documented approximation, not a silent error.
pub const KL_EPSILON: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Two-distribution distances
// ---------------------------------------------------------------------------

/// Total variation distance: `0.5 · Σ|p_i − q_i|` over the union of supports.
/// Symmetric, in `[0, 1]`.
pub fn total_variation_distance(p: &Distribution, q: &Distribution) -> f64 {
    let labels = union_labels(p, q);
    0.5 * labels
        .iter()
        .map(|l| (p.prob(l) - q.prob(l)).abs())
        .sum::<f64>()
}

/// Kullback–Leibler divergence `Σ p_i · ln(p_i / q_i)` over `p`'s support.
///
/// Zero candidate probabilities are clamped to [`KL_EPSILON`] rather than
/// producing infinity. Not symmetric.
pub fn kl_divergence(p: &Distribution, q: &Distribution) -> f64 {
    p.iter()
        .filter(|(_, pi)| *pi > 0.0)
        .map(|(label, pi)| {
            let qi = q.prob(label).max(KL_EPSILON);
            pi * (pi / qi).ln()
        })
        .sum()
}

/// Hellinger distance: `sqrt(0.5 · Σ(√p_i − √q_i)²)` over the union of
/// supports. Symmetric, in `[0, 1]`.
pub fn hellinger_distance(p: &Distribution, q: &Distribution) -> f64 {
    let labels = union_labels(p, q);
    let sum: f64 = labels
        .iter()
        .map(|l| {
            let diff = p.prob(l).sqrt() - q.prob(l).sqrt();
            diff * diff
        })
        .sum();
    (0.5 * sum).sqrt()
}

fn union_labels<'a>(p: &'a Distribution, q: &'a Distribution) -> BTreeSet<&'a str> {
    let mut labels: BTreeSet<&str> = p.iter().map(|(l, _)| l).collect();
    labels.extend(q.iter().map(|(l, _)| l));
    labels
}

// ---------------------------------------------------------------------------
// Single-distribution measures
// ---------------------------------------------------------------------------

/// Shannon entropy in bits: `−Σ p_i · log2(p_i)`. Zero terms contribute zero.
pub fn shannon_entropy(p: &Distribution) -> f64 {
    -p.iter()
        .filter(|(_, pi)| *pi > 0.0)
        .map(|(_, pi)| pi * pi.log2())
        .sum::<f64>()
}

/// Entropy normalized by the maximum for the support size, in `[0, 1]`.
/// Zero for a point mass.
pub fn normalized_entropy(p: &Distribution) -> f64 {
    let support = p.support_len();
    if support <= 1 {
        return 0.0;
    }
    shannon_entropy(p) / (support as f64).log2()
}

/// Effective support via the inverse participation ratio `1 / Σ p_i²`.
/// 1.0 for a point mass, `|support|` for a uniform distribution.
pub fn effective_support(p: &Distribution) -> f64 {
    let ipr: f64 = p.iter().map(|(_, pi)| pi * pi).sum();
    1.0 / ipr
}

/// Population variance of the probability vector (explicit zeros included).
pub fn probability_variance(p: &Distribution) -> f64 {
    let n = p.len() as f64;
    let mean = p.sum() / n;
    p.iter().map(|(_, pi)| (pi - mean) * (pi - mean)).sum::<f64>() / n
}

/// Gini coefficient of the probability vector, in `[0, 1]`.
/// 0.0 for a uniform vector, approaching 1.0 for extreme concentration.
pub fn gini_coefficient(p: &Distribution) -> f64 {
    let mut values: Vec<f64> = p.iter().map(|(_, pi)| pi).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len() as f64;
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as f64 + 1.0) * v)
        .sum();
    (2.0 * weighted) / (n * total) - (n + 1.0) / n
}

/// Sum of the `k` largest probabilities.
pub fn top_k_mass(p: &Distribution, k: usize) -> f64 {
    let mut values: Vec<f64> = p.iter().map(|(_, pi)| pi).collect();
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    values.iter().take(k).sum()
}

/// Mass per octave bin of the rank-ordered probability vector.
///
/// States ranked by descending probability land in bin `floor(log2(rank+1))`
/// (rank 0-based): bin 0 holds rank 0, bin 1 holds ranks 1–2, bin 2 holds
/// ranks 3–6, and so on. Ranks past `num_octaves` bins fold into the last
/// bin. Returns exactly `num_octaves` values.
pub fn octave_binned_mass(p: &Distribution, num_octaves: usize) -> Vec<f64> {
    if num_octaves == 0 {
        return Vec::new();
    }
    let mut values: Vec<f64> = p.iter().map(|(_, pi)| pi).collect();
    values.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut bins = vec![0.0; num_octaves];
    for (rank, v) in values.into_iter().enumerate() {
        let bin = ((rank + 1) as f64).log2().floor() as usize;
        bins[bin.min(num_octaves - 1)] += v;
    }
    bins
}

/// Phase-coherence scalar derived from context dispersion and concentration:
/// `(1 − phase_dispersion) · (1 − normalized_entropy)`, clamped to `[0, 1]`.
///
/// A fully uniform distribution has zero coherence regardless of dispersion;
/// a point mass under zero dispersion has coherence 1.0.
pub fn phase_coherence(context: &EngineContext, p: &Distribution) -> f64 {
    let dispersion = context.phase_dispersion.clamp(0.0, 1.0);
    ((1.0 - dispersion) * (1.0 - normalized_entropy(p))).clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Computed metrics snapshot for one accepted invocation.
///
/// Produced fresh per invocation, never mutated after creation. Distances
/// compare the input (reference) against the transformed candidate; the
/// concentration measures describe the candidate alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub coherence: f64,
    pub entropy: f64,
    pub variance: f64,
    pub bias_retention: f64,
    pub total_variation_distance: f64,
    pub kl_divergence: f64,
    pub hellinger_distance: f64,
    pub effective_support: f64,
    pub gini_coefficient: f64,
    pub top_k_mass: f64,
    pub octave_binned_mass: Vec<f64>,
}

impl EngineMetrics {
    /// Compute the full battery for `candidate` against `reference`.
    ///
    /// `bias_retention` is the fraction of the reference's top-1 mass still
    /// held by the candidate's top state, clamped to `[0, 1]`.
    pub fn compare(
        reference: &Distribution,
        candidate: &Distribution,
        context: &EngineContext,
        config: &EngineConfig,
    ) -> Self {
        let reference_top = top_k_mass(reference, 1);
        let bias_retention = if reference_top > 0.0 {
            (top_k_mass(candidate, 1) / reference_top).clamp(0.0, 1.0)
        } else {
            1.0
        };

        Self {
            coherence: phase_coherence(context, candidate),
            entropy: shannon_entropy(candidate),
            variance: probability_variance(candidate),
            bias_retention,
            total_variation_distance: total_variation_distance(reference, candidate),
            kl_divergence: kl_divergence(reference, candidate),
            hellinger_distance: hellinger_distance(reference, candidate),
            effective_support: effective_support(candidate),
            gini_coefficient: gini_coefficient(candidate),
            top_k_mass: top_k_mass(candidate, config.top_k),
            octave_binned_mass: octave_binned_mass(candidate, config.octave_bins),
        }
    }
}
