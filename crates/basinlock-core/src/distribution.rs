//! Outcome distribution type and input validation.
//!
//! A [`Distribution`] maps outcome labels (fixed-width bitstrings or opaque
//! state ids) to probabilities. Construction is the single validation
//! gateway: once a value exists, every downstream consumer — metrics, guards,
//! mode transforms — can rely on non-negative, finite probabilities summing
//! to 1.0 within [`NORMALIZATION_TOLERANCE`]. Nothing in this crate
//! renormalizes silently; the only normalization paths are the explicit ones
//! documented on [`Distribution::from_counts`] and the watermark transform.
//!
//! Labels are stored in a `BTreeMap`, so iteration order is deterministic.
//! Every transform in this crate depends on that ordering for bit-identical
//! reproducibility.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

/// Allowed deviation of the probability sum from 1.0.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// Malformed distribution or context input. Fatal to the call, never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// The distribution has no outcomes at all.
    #[error("distribution has no outcomes")]
    Empty,
    /// A probability value is NaN or infinite.
    #[error("probability for '{label}' is not finite: {value}")]
    NonFinite { label: String, value: f64 },
    /// A probability value is negative.
    #[error("probability for '{label}' is negative: {value}")]
    NegativeProbability { label: String, value: f64 },
    /// The probability values do not sum to 1.0 within tolerance.
    #[error("probabilities sum to {sum}, outside 1.0 ± {NORMALIZATION_TOLERANCE}")]
    NotNormalized { sum: f64 },
    /// A context field is NaN, infinite, or outside its documented range.
    #[error("context field '{field}' is out of range: {value}")]
    ContextRange { field: &'static str, value: f64 },
}

/// A validated probability distribution over outcome labels.
///
/// Immutable after construction. Transforms produce new values; the input is
/// never touched. Serializes as a plain label → probability map. Deliberately
/// not `Deserialize`: a decoded map must re-enter through
/// [`Distribution::from_probs`] so the validation gate cannot be bypassed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Distribution {
    probs: BTreeMap<String, f64>,
}

impl Distribution {
    /// Validate a label → probability map into a `Distribution`.
    ///
    /// Rejects empty maps, non-finite or negative values, and sums outside
    /// `1.0 ± NORMALIZATION_TOLERANCE`. Never renormalizes.
    pub fn from_probs(probs: BTreeMap<String, f64>) -> Result<Self, DomainError> {
        if probs.is_empty() {
            return Err(DomainError::Empty);
        }
        for (label, &value) in &probs {
            if !value.is_finite() {
                return Err(DomainError::NonFinite {
                    label: label.clone(),
                    value,
                });
            }
            if value < 0.0 {
                return Err(DomainError::NegativeProbability {
                    label: label.clone(),
                    value,
                });
            }
        }
        let sum: f64 = probs.values().sum();
        if (sum - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(DomainError::NotNormalized { sum });
        }
        Ok(Self { probs })
    }

    /// Normalize raw outcome counts into a `Distribution`.
    ///
    /// This is the one explicit normalization entry point, provided for
    /// upstream collaborators that deliver hardware-style count maps. Rejects
    /// empty input and all-zero counts.
    pub fn from_counts(counts: BTreeMap<String, u64>) -> Result<Self, DomainError> {
        if counts.is_empty() {
            return Err(DomainError::Empty);
        }
        let total: u64 = counts.values().sum();
        if total == 0 {
            return Err(DomainError::NotNormalized { sum: 0.0 });
        }
        let probs = counts
            .into_iter()
            .map(|(label, c)| (label, c as f64 / total as f64))
            .collect();
        Self::from_probs(probs)
    }

    /// Probability for a label, 0.0 if absent.
    pub fn prob(&self, label: &str) -> f64 {
        self.probs.get(label).copied().unwrap_or(0.0)
    }

    /// Labels carrying non-zero probability, in deterministic order.
    pub fn support(&self) -> impl Iterator<Item = &str> {
        self.probs
            .iter()
            .filter(|&(_, &p)| p > 0.0)
            .map(|(l, _)| l.as_str())
    }

    /// Number of labels with non-zero probability.
    pub fn support_len(&self) -> usize {
        self.probs.values().filter(|&&p| p > 0.0).count()
    }

    /// Total number of stored labels, including explicit zeros.
    pub fn len(&self) -> usize {
        self.probs.len()
    }

    /// True if the distribution stores no labels. Unreachable for validated
    /// values; present for API completeness.
    pub fn is_empty(&self) -> bool {
        self.probs.is_empty()
    }

    /// Iterate over `(label, probability)` pairs in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.probs.iter().map(|(l, &p)| (l.as_str(), p))
    }

    /// Sum of all probability values. Within tolerance of 1.0 by construction.
    pub fn sum(&self) -> f64 {
        self.probs.values().sum()
    }
}
