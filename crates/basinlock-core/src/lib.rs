//! # basinlock-core
//!
//! **Every transformation is either admissible and bounded, or explicitly
//! refused — and either way it is on the record.**
//!
//! `basinlock-core` is a deterministic stabilization control layer for
//! outcome distributions. Given a normalized distribution from an upstream
//! process (a circuit execution, a stochastic simulation, any repeated
//! procedure), it evaluates a fixed guard set against the invocation context,
//! applies one of four bounded transformations when admissible, computes a
//! battery of statistical distance and concentration metrics, and appends
//! every verdict to an append-only provenance ledger.
//!
//! ## Quick Start
//!
//! ```
//! use std::collections::BTreeMap;
//! use basinlock_core::{
//!     Distribution, EngineConfig, EngineContext, Mode, ModeParams,
//!     StabilizationEngine, TopologyClass, Verdict,
//! };
//!
//! let mut probs = BTreeMap::new();
//! probs.insert("00".to_string(), 0.5);
//! probs.insert("11".to_string(), 0.5);
//! let input = Distribution::from_probs(probs).unwrap();
//!
//! let context = EngineContext {
//!     noise_estimate: 0.02,
//!     variance_estimate: 0.04,
//!     circuit_depth: 12,
//!     phase_dispersion: 0.1,
//!     procedural_disorder: 0.05,
//!     topology_class: TopologyClass::Low,
//! };
//!
//! let engine = StabilizationEngine::new(EngineConfig::default());
//! let outcome = engine.process(&input, &context, "alice", Mode::Watermark, &ModeParams::default());
//!
//! assert!(matches!(outcome.verdict, Verdict::Accepted { .. }));
//! assert_eq!(engine.ledger().len(), 1);
//! ```
//!
//! ## Architecture
//!
//! Request → Guards (fail-fast) → Mode transform → Metrics → Ledger
//!
//! - Guards, metrics, and transforms are pure; the ledger is the only shared
//!   mutable state and serializes its own appends.
//! - Identical `(distribution, context, identity, mode, params)` always yield
//!   an identical verdict — no hidden randomness anywhere in the core.
//! - A refused or failed invocation never carries a transformed distribution,
//!   and the input is never mutated in place.
//! - The ledger has no delete or edit surface. Provenance is preserved, not
//!   averaged away.
//!
//! Distribution production and context estimation are collaborator concerns;
//! this crate consumes a validated [`Distribution`], an [`EngineContext`],
//! and an identity string, and produces a [`Verdict`].

pub mod config;
pub mod context;
pub mod distribution;
pub mod engine;
pub mod guards;
pub mod history;
pub mod metrics;
pub mod modes;

pub use config::EngineConfig;
pub use context::{EngineContext, TopologyClass};
pub use distribution::{DomainError, Distribution, NORMALIZATION_TOLERANCE};
pub use engine::{EngineStats, ProcessOutcome, StabilizationEngine, Verdict};
pub use guards::{GuardKind, GuardRefusal, evaluate as evaluate_guards, evaluate_all};
pub use history::{
    ExportFormat, HistoryEntry, HistoryFilter, HistoryLedger, LedgerCounts, LedgerSnapshot,
    VerdictKind, VerdictSnapshot,
};
pub use metrics::{
    EngineMetrics, KL_EPSILON, effective_support, gini_coefficient, hellinger_distance,
    kl_divergence, normalized_entropy, octave_binned_mass, phase_coherence, probability_variance,
    shannon_entropy, top_k_mass, total_variation_distance,
};
pub use modes::{Mode, ModeError, ModeOutcome, ModeParams, ModeReport};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
