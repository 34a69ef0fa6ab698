//! Orchestrator: the single public entry point of the core.
//!
//! [`StabilizationEngine::process`] runs the guard set, dispatches to the
//! requested mode strategy on pass, computes the metrics battery, and appends
//! exactly one ledger entry per call — including refusals and failures. The
//! input distribution is never mutated; a refused or failed invocation
//! carries no transformed distribution at all.
//!
//! Thread-safe: guards, metrics, and transforms are pure, counters are
//! atomic, and the ledger serializes its own appends. Concurrent `process`
//! calls only contend on the append lock.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::distribution::Distribution;
use crate::guards;
use crate::guards::GuardKind;
use crate::history::{HistoryLedger, VerdictSnapshot};
use crate::metrics::EngineMetrics;
use crate::modes::{self, Mode, ModeParams, ModeReport};

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Outcome of one invocation. Returned once; a summary is stored in the
/// ledger. A non-accepted verdict structurally cannot carry a transformed
/// distribution.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Guards passed and the transform succeeded.
    Accepted {
        /// The transformed distribution. The input is untouched.
        distribution: Distribution,
        /// Fresh metrics battery comparing input and output.
        metrics: EngineMetrics,
        /// Mode-specific metrics subset.
        report: ModeReport,
    },
    /// A guard refused the request before any transformation was attempted.
    Refused { guard: GuardKind, reason: String },
    /// Guards passed but the mode transform faulted (or the context was
    /// malformed). Treated identically to a refusal: nothing was applied.
    Failed { mode: Mode, error: String },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// Ledger summary of this verdict.
    pub fn snapshot(&self) -> VerdictSnapshot {
        match self {
            Self::Accepted {
                distribution,
                metrics,
                report,
            } => VerdictSnapshot::Accepted {
                metrics: metrics.clone(),
                support_len: distribution.support_len(),
                report: report.clone(),
            },
            Self::Refused { guard, reason } => VerdictSnapshot::Refused {
                guard: *guard,
                reason: reason.clone(),
            },
            Self::Failed { mode, error } => VerdictSnapshot::Failed {
                mode: *mode,
                error: error.clone(),
            },
        }
    }
}

/// Unified result of [`StabilizationEngine::process`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    /// Sequence number of the ledger entry recorded for this call.
    pub sequence: u64,
    pub verdict: Verdict,
}

/// Processing counters for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStats {
    pub processed: u64,
    pub accepted: u64,
    pub refused: u64,
    pub failed: u64,
    /// accepted / processed, 0.0 before the first call.
    pub acceptance_rate: f64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The stabilization orchestrator.
pub struct StabilizationEngine {
    config: EngineConfig,
    ledger: HistoryLedger,
    accepted: AtomicU64,
    refused: AtomicU64,
    failed: AtomicU64,
}

impl StabilizationEngine {
    /// Build an engine with its own fresh ledger.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_ledger(config, HistoryLedger::new())
    }

    /// Build an engine around an explicitly provided ledger, e.g. one shared
    /// with audit tooling. The engine takes ownership; there is no ambient
    /// process-wide history.
    pub fn with_ledger(config: EngineConfig, ledger: HistoryLedger) -> Self {
        Self {
            config,
            ledger,
            accepted: AtomicU64::new(0),
            refused: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Active policy constants.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The engine's provenance ledger, for queries and export.
    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// Evaluate one stabilization request.
    ///
    /// Guards run in fixed order and fail fast; on pass the mode strategy is
    /// dispatched and the metrics battery computed. Every call appends
    /// exactly one ledger entry, whatever the verdict. Deterministic:
    /// identical `(distribution, context, identity, mode, params)` yield an
    /// identical verdict.
    pub fn process(
        &self,
        distribution: &Distribution,
        context: &EngineContext,
        identity: &str,
        mode: Mode,
        params: &ModeParams,
    ) -> ProcessOutcome {
        let verdict = self.evaluate(distribution, context, identity, mode, params);

        match &verdict {
            Verdict::Accepted { .. } => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                log::debug!("accepted {mode} for '{identity}'");
            }
            Verdict::Refused { guard, reason } => {
                self.refused.fetch_add(1, Ordering::Relaxed);
                log::info!("refused {mode} for '{identity}' by {guard}: {reason}");
            }
            Verdict::Failed { mode, error } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("mode {mode} failed for '{identity}': {error}");
            }
        }

        let sequence = self
            .ledger
            .append(identity, mode, context, verdict.snapshot());
        ProcessOutcome { sequence, verdict }
    }

    fn evaluate(
        &self,
        distribution: &Distribution,
        context: &EngineContext,
        identity: &str,
        mode: Mode,
        params: &ModeParams,
    ) -> Verdict {
        if let Err(err) = context.validate() {
            return Verdict::Failed {
                mode,
                error: format!("malformed context: {err}"),
            };
        }

        if let Err(refusal) = guards::evaluate(&self.config, context, mode, params) {
            return Verdict::Refused {
                guard: refusal.guard,
                reason: refusal.reason,
            };
        }

        match modes::apply(mode, distribution, identity, context, &self.config) {
            Err(err) => Verdict::Failed {
                mode,
                error: err.to_string(),
            },
            Ok(outcome) => {
                let metrics =
                    EngineMetrics::compare(distribution, &outcome.distribution, context, &self.config);
                Verdict::Accepted {
                    distribution: outcome.distribution,
                    metrics,
                    report: outcome.report,
                }
            }
        }
    }

    /// Processing counters since construction.
    pub fn stats(&self) -> EngineStats {
        let accepted = self.accepted.load(Ordering::Relaxed);
        let refused = self.refused.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let processed = accepted + refused + failed;
        EngineStats {
            processed,
            accepted,
            refused,
            failed,
            acceptance_rate: if processed > 0 {
                accepted as f64 / processed as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TopologyClass;
    use crate::history::{HistoryFilter, VerdictKind};
    use crate::metrics::total_variation_distance;
    use std::collections::BTreeMap;

    fn dist(pairs: &[(&str, f64)]) -> Distribution {
        let map: BTreeMap<String, f64> =
            pairs.iter().map(|(l, p)| (l.to_string(), *p)).collect();
        Distribution::from_probs(map).unwrap()
    }

    fn bell_pair() -> Distribution {
        dist(&[("00", 0.5), ("11", 0.5)])
    }

    fn calm_context() -> EngineContext {
        EngineContext {
            noise_estimate: 0.02,
            variance_estimate: 0.04,
            circuit_depth: 12,
            phase_dispersion: 0.1,
            procedural_disorder: 0.05,
            topology_class: TopologyClass::Low,
        }
    }

    fn engine() -> StabilizationEngine {
        StabilizationEngine::new(EngineConfig::default())
    }

    // -----------------------------------------------------------------------
    // Refusal path
    // -----------------------------------------------------------------------

    #[test]
    fn noisy_context_is_refused_in_every_mode() {
        let engine = engine();
        let input = bell_pair();
        let ctx = EngineContext {
            noise_estimate: 0.30,
            ..calm_context()
        };
        for mode in [
            Mode::Fidelity,
            Mode::WitnessPhase,
            Mode::Watermark,
            Mode::ScalarGuarded,
        ] {
            let before = input.clone();
            let outcome = engine.process(&input, &ctx, "alice", mode, &ModeParams::default());
            match &outcome.verdict {
                Verdict::Refused { guard, reason } => {
                    assert_eq!(*guard, GuardKind::Noise);
                    assert!(reason.contains("noise"));
                }
                other => panic!("expected refusal, got {other:?}"),
            }
            // Input untouched.
            assert_eq!(input, before);
        }
        assert_eq!(engine.ledger().len(), 4);
        assert_eq!(engine.stats().refused, 4);
    }

    #[test]
    fn refusals_are_recorded_with_refused_verdict() {
        let engine = engine();
        let ctx = EngineContext {
            noise_estimate: 0.30,
            ..calm_context()
        };
        engine.process(
            &bell_pair(),
            &ctx,
            "alice",
            Mode::Fidelity,
            &ModeParams::default(),
        );
        let entry = engine.ledger().last().unwrap();
        assert_eq!(entry.verdict.kind(), VerdictKind::Refused);
        assert_eq!(entry.sequence, 1);
    }

    #[test]
    fn scalar_without_confirmation_is_refused_regardless_of_conditions() {
        let engine = engine();
        // Even a perfectly quiet context cannot opt into scalar implicitly.
        let ctx = EngineContext {
            noise_estimate: 0.001,
            variance_estimate: 0.01,
            ..calm_context()
        };
        let outcome = engine.process(
            &bell_pair(),
            &ctx,
            "alice",
            Mode::ScalarGuarded,
            &ModeParams::default(),
        );
        match outcome.verdict {
            Verdict::Refused { guard, .. } => assert_eq!(guard, GuardKind::Scalar),
            other => panic!("expected scalar refusal, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Accepted path
    // -----------------------------------------------------------------------

    #[test]
    fn watermark_accepts_and_preserves_support() {
        let engine = engine();
        let input = bell_pair();
        let outcome = engine.process(
            &input,
            &calm_context(),
            "alice",
            Mode::Watermark,
            &ModeParams::default(),
        );
        match &outcome.verdict {
            Verdict::Accepted {
                distribution,
                metrics,
                report,
            } => {
                let labels: Vec<&str> = distribution.support().collect();
                assert_eq!(labels, vec!["00", "11"]);
                assert!(total_variation_distance(&input, distribution) <= 1e-5);
                assert!(metrics.total_variation_distance <= 1e-5);
                assert!(matches!(report, ModeReport::Watermark { .. }));
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
        assert_eq!(outcome.sequence, 1);
        assert_eq!(engine.ledger().counts().accepted, 1);
    }

    #[test]
    fn identical_requests_yield_identical_verdicts() {
        let engine = engine();
        let input = dist(&[("00", 0.6), ("01", 0.3), ("11", 0.1)]);
        let ctx = calm_context();
        let params = ModeParams::default();
        let a = engine.process(&input, &ctx, "alice", Mode::Watermark, &params);
        let b = engine.process(&input, &ctx, "alice", Mode::Watermark, &params);
        assert_eq!(a.verdict, b.verdict);
        // Ledger still advanced: one entry per call.
        assert_ne!(a.sequence, b.sequence);
    }

    #[test]
    fn fidelity_accepts_within_cap() {
        let engine = engine();
        let input = dist(&[("00", 0.8), ("11", 0.2)]);
        let outcome = engine.process(
            &input,
            &calm_context(),
            "",
            Mode::Fidelity,
            &ModeParams::default(),
        );
        match &outcome.verdict {
            Verdict::Accepted { distribution, .. } => {
                let tv = total_variation_distance(&input, distribution);
                assert!(tv <= engine.config().fidelity_tv_cap + 1e-12);
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn scalar_guarded_accepts_under_full_admissibility() {
        let engine = engine();
        let ctx = EngineContext {
            noise_estimate: 0.002,
            variance_estimate: 0.05,
            circuit_depth: 5,
            phase_dispersion: 0.1,
            procedural_disorder: 0.2,
            topology_class: TopologyClass::Low,
        };
        let params = ModeParams {
            scalar_mode_confirmed: true,
            ..Default::default()
        };
        let input = dist(&[("00", 0.7), ("11", 0.3)]);
        let outcome = engine.process(&input, &ctx, "alice", Mode::ScalarGuarded, &params);
        assert!(outcome.verdict.is_accepted());
    }

    // -----------------------------------------------------------------------
    // Failure path
    // -----------------------------------------------------------------------

    #[test]
    fn watermark_without_identity_fails_and_is_recorded() {
        let engine = engine();
        let outcome = engine.process(
            &bell_pair(),
            &calm_context(),
            "",
            Mode::Watermark,
            &ModeParams::default(),
        );
        match &outcome.verdict {
            Verdict::Failed { mode, error } => {
                assert_eq!(*mode, Mode::Watermark);
                assert!(error.contains("identity"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        let entry = engine.ledger().last().unwrap();
        assert_eq!(entry.verdict.kind(), VerdictKind::Failed);
        assert_eq!(engine.stats().failed, 1);
    }

    #[test]
    fn malformed_context_fails_without_reaching_guards() {
        let engine = engine();
        let ctx = EngineContext {
            noise_estimate: f64::NAN,
            ..calm_context()
        };
        let outcome = engine.process(
            &bell_pair(),
            &ctx,
            "alice",
            Mode::Fidelity,
            &ModeParams::default(),
        );
        match &outcome.verdict {
            Verdict::Failed { error, .. } => assert!(error.contains("malformed context")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn witness_phase_coherence_failure_is_terminal() {
        let engine = engine();
        // Uniform input has zero coherence; witness-phase must reject it.
        let outcome = engine.process(
            &bell_pair(),
            &calm_context(),
            "alice",
            Mode::WitnessPhase,
            &ModeParams::default(),
        );
        match &outcome.verdict {
            Verdict::Failed { error, .. } => assert!(error.contains("coherence")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Ledger and stats integration
    // -----------------------------------------------------------------------

    #[test]
    fn one_ledger_entry_per_call_and_stats_line_up() {
        let engine = engine();
        let input = dist(&[("00", 0.9), ("11", 0.1)]);
        let noisy = EngineContext {
            noise_estimate: 0.30,
            ..calm_context()
        };

        engine.process(&input, &calm_context(), "alice", Mode::Fidelity, &ModeParams::default());
        engine.process(&input, &noisy, "alice", Mode::Fidelity, &ModeParams::default());
        engine.process(&input, &calm_context(), "", Mode::Watermark, &ModeParams::default());

        let stats = engine.stats();
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.refused, 1);
        assert_eq!(stats.failed, 1);
        assert!((stats.acceptance_rate - 1.0 / 3.0).abs() < 1e-12);

        let counts = engine.ledger().counts();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.accepted, stats.accepted as usize);
        assert_eq!(counts.refused, stats.refused as usize);
        assert_eq!(counts.failed, stats.failed as usize);
    }

    #[test]
    fn concurrent_processing_keeps_sequences_monotonic() {
        let engine = engine();
        let input = dist(&[("00", 0.9), ("11", 0.1)]);
        let ctx = calm_context();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..25 {
                        engine.process(&input, &ctx, "worker", Mode::Fidelity, &ModeParams::default());
                    }
                });
            }
        });
        let entries = engine.ledger().entries();
        assert_eq!(entries.len(), 100);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence, i as u64 + 1);
        }
        assert_eq!(engine.stats().processed, 100);
    }

    #[test]
    fn ledger_queries_see_engine_writes() {
        let engine = engine();
        engine.process(
            &bell_pair(),
            &calm_context(),
            "alice",
            Mode::Watermark,
            &ModeParams::default(),
        );
        let accepted = engine.ledger().query(&HistoryFilter {
            identity: Some("alice".to_string()),
            verdict: Some(VerdictKind::Accepted),
            ..Default::default()
        });
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].mode, Mode::Watermark);
    }
}
