//! Append-only provenance ledger.
//!
//! Every invocation — accepted, refused, or failed — lands here exactly once.
//! `append` is the sole write path: no API deletes, edits, or reorders an
//! entry, and no mutable reference to stored entries ever escapes. Reads
//! return owned snapshots, so the never-erase guarantee is structural rather
//! than conventional.
//!
//! # Export Formats
//!
//! - `JsonLines` — one serialized entry per line, sequence-ordered. The
//!   canonical append-friendly interchange format.
//! - `Json` — a pretty snapshot object with ledger metadata and tallies.
//! - `Csv` — one summary row per entry for spreadsheet-style inspection.
//!
//! The ledger itself performs no disk or network I/O; exports are returned
//! as strings for the caller to persist.

use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::metrics::EngineMetrics;
use crate::modes::{Mode, ModeReport};

use crate::guards::GuardKind;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Verdict discriminator used in filters and tallies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictKind {
    Accepted,
    Refused,
    Failed,
}

impl std::fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Refused => write!(f, "refused"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Serializable summary of a verdict, stored in the ledger.
///
/// Accepted entries carry the metrics snapshot and the size of the
/// transformed support — never the full distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerdictSnapshot {
    Accepted {
        metrics: EngineMetrics,
        support_len: usize,
        report: ModeReport,
    },
    Refused {
        guard: GuardKind,
        reason: String,
    },
    Failed {
        mode: Mode,
        error: String,
    },
}

impl VerdictSnapshot {
    pub fn kind(&self) -> VerdictKind {
        match self {
            Self::Accepted { .. } => VerdictKind::Accepted,
            Self::Refused { .. } => VerdictKind::Refused,
            Self::Failed { .. } => VerdictKind::Failed,
        }
    }

    /// One-line detail for CSV export and log lines.
    fn detail(&self) -> String {
        match self {
            Self::Accepted { support_len, .. } => format!("support_len={support_len}"),
            Self::Refused { guard, reason } => format!("{guard}: {reason}"),
            Self::Failed { mode, error } => format!("{mode}: {error}"),
        }
    }
}

/// One immutable ledger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Strictly monotonic, assigned by the ledger starting at 1.
    pub sequence: u64,
    /// Wall-clock append time, unix milliseconds.
    pub timestamp_unix_ms: u64,
    /// Identity string as supplied with the request.
    pub identity: String,
    /// First 16 hex chars of SHA-256(identity), for log-safe correlation.
    pub identity_fingerprint: String,
    /// Requested mode.
    pub mode: Mode,
    /// Context the invocation ran under.
    pub context: EngineContext,
    /// Outcome summary.
    pub verdict: VerdictSnapshot,
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Query filter; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub identity: Option<String>,
    pub mode: Option<Mode>,
    pub verdict: Option<VerdictKind>,
    pub since_unix_ms: Option<u64>,
    pub until_unix_ms: Option<u64>,
}

impl HistoryFilter {
    fn matches(&self, entry: &HistoryEntry) -> bool {
        if self.identity.as_deref().is_some_and(|i| entry.identity != i) {
            return false;
        }
        if self.mode.is_some_and(|m| entry.mode != m) {
            return false;
        }
        if self.verdict.is_some_and(|k| entry.verdict.kind() != k) {
            return false;
        }
        if self
            .since_unix_ms
            .is_some_and(|since| entry.timestamp_unix_ms < since)
        {
            return false;
        }
        if self
            .until_unix_ms
            .is_some_and(|until| entry.timestamp_unix_ms > until)
        {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Serialization format for [`HistoryLedger::export`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// One JSON entry per line, sequence-ordered.
    JsonLines,
    /// Pretty JSON snapshot with ledger metadata.
    Json,
    /// One summary row per entry.
    Csv,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::JsonLines => write!(f, "jsonl"),
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

/// Snapshot wrapper written by the `Json` export format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub ledger_id: String,
    pub exported_unix_ms: u64,
    pub total_entries: usize,
    pub accepted: usize,
    pub refused: usize,
    pub failed: usize,
    pub entries: Vec<HistoryEntry>,
}

/// Per-kind tallies over the whole ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounts {
    pub total: usize,
    pub accepted: usize,
    pub refused: usize,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

struct LedgerInner {
    entries: Vec<HistoryEntry>,
    next_sequence: u64,
}

/// Append-only, time-ordered store of every invocation's verdict.
///
/// Thread-safe: appends serialize on an internal lock so sequence numbers
/// stay strictly monotonic and entries never interleave mid-write.
pub struct HistoryLedger {
    ledger_id: String,
    inner: Mutex<LedgerInner>,
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryLedger {
    pub fn new() -> Self {
        Self {
            ledger_id: Uuid::new_v4().to_string(),
            inner: Mutex::new(LedgerInner {
                entries: Vec::new(),
                next_sequence: 1,
            }),
        }
    }

    /// Unique id of this ledger instance, stamped into `Json` exports.
    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    /// Append one entry. The sole mutator: sequence number and timestamp are
    /// assigned here, so callers cannot forge either.
    pub fn append(
        &self,
        identity: &str,
        mode: Mode,
        context: &EngineContext,
        verdict: VerdictSnapshot,
    ) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.entries.push(HistoryEntry {
            sequence,
            timestamp_unix_ms: unix_ms_now(),
            identity: identity.to_string(),
            identity_fingerprint: identity_fingerprint(identity),
            mode,
            context: context.clone(),
            verdict,
        });
        sequence
    }

    /// Number of entries recorded so far.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent entry, cloned.
    pub fn last(&self) -> Option<HistoryEntry> {
        self.inner.lock().unwrap().entries.last().cloned()
    }

    /// All entries, cloned, in append order.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.lock().unwrap().entries.clone()
    }

    /// Entries matching the filter, cloned, in append order. The returned
    /// vector is an independent snapshot; re-query to restart.
    pub fn query(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Per-kind tallies.
    pub fn counts(&self) -> LedgerCounts {
        let inner = self.inner.lock().unwrap();
        let mut counts = LedgerCounts {
            total: inner.entries.len(),
            accepted: 0,
            refused: 0,
            failed: 0,
        };
        for entry in &inner.entries {
            match entry.verdict.kind() {
                VerdictKind::Accepted => counts.accepted += 1,
                VerdictKind::Refused => counts.refused += 1,
                VerdictKind::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Serialize the full ledger. Read-only; stored state is unaffected.
    pub fn export(&self, format: ExportFormat) -> Result<String, serde_json::Error> {
        let entries = self.entries();
        match format {
            ExportFormat::JsonLines => {
                let mut out = String::new();
                for entry in &entries {
                    out.push_str(&serde_json::to_string(entry)?);
                    out.push('\n');
                }
                Ok(out)
            }
            ExportFormat::Json => {
                let counts = self.counts();
                let snapshot = LedgerSnapshot {
                    ledger_id: self.ledger_id.clone(),
                    exported_unix_ms: unix_ms_now(),
                    total_entries: counts.total,
                    accepted: counts.accepted,
                    refused: counts.refused,
                    failed: counts.failed,
                    entries,
                };
                serde_json::to_string_pretty(&snapshot)
            }
            ExportFormat::Csv => {
                let mut out = String::from(
                    "sequence,timestamp_unix_ms,identity_fingerprint,mode,verdict,detail\n",
                );
                for entry in &entries {
                    // Reasons are single-line and comma-free by construction.
                    let _ = writeln!(
                        out,
                        "{},{},{},{},{},{}",
                        entry.sequence,
                        entry.timestamp_unix_ms,
                        entry.identity_fingerprint,
                        entry.mode,
                        entry.verdict.kind(),
                        entry.verdict.detail()
                    );
                }
                Ok(out)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// First 16 hex chars of SHA-256(identity).
pub(crate) fn identity_fingerprint(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    let mut s = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        let _ = write!(s, "{byte:02x}");
    }
    s
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineContext;

    fn refusal_snapshot() -> VerdictSnapshot {
        VerdictSnapshot::Refused {
            guard: GuardKind::Noise,
            reason: "noise estimate 0.300 exceeds threshold 0.150".to_string(),
        }
    }

    fn failed_snapshot() -> VerdictSnapshot {
        VerdictSnapshot::Failed {
            mode: Mode::Watermark,
            error: "watermark mode requires a non-empty identity string".to_string(),
        }
    }

    // -----------------------------------------------------------------------
    // Append and sequencing
    // -----------------------------------------------------------------------

    #[test]
    fn sequences_start_at_one_and_increase() {
        let ledger = HistoryLedger::new();
        let ctx = EngineContext::default();
        let s1 = ledger.append("alice", Mode::Fidelity, &ctx, refusal_snapshot());
        let s2 = ledger.append("bob", Mode::Watermark, &ctx, refusal_snapshot());
        let s3 = ledger.append("alice", Mode::Fidelity, &ctx, failed_snapshot());
        assert_eq!((s1, s2, s3), (1, 2, 3));

        let entries = ledger.entries();
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn entries_carry_identity_fingerprint() {
        let ledger = HistoryLedger::new();
        ledger.append(
            "alice",
            Mode::Fidelity,
            &EngineContext::default(),
            refusal_snapshot(),
        );
        let entry = ledger.last().unwrap();
        assert_eq!(entry.identity, "alice");
        assert_eq!(entry.identity_fingerprint, identity_fingerprint("alice"));
        assert_eq!(entry.identity_fingerprint.len(), 16);
    }

    #[test]
    fn concurrent_appends_stay_monotonic_and_gap_free() {
        let ledger = HistoryLedger::new();
        let ctx = EngineContext::default();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..50 {
                        ledger.append("worker", Mode::Fidelity, &ctx, refusal_snapshot());
                    }
                });
            }
        });
        let entries = ledger.entries();
        assert_eq!(entries.len(), 400);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence, i as u64 + 1);
        }
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    #[test]
    fn query_filters_by_identity_mode_and_kind() {
        let ledger = HistoryLedger::new();
        let ctx = EngineContext::default();
        ledger.append("alice", Mode::Fidelity, &ctx, refusal_snapshot());
        ledger.append("bob", Mode::Watermark, &ctx, refusal_snapshot());
        ledger.append("alice", Mode::Watermark, &ctx, failed_snapshot());

        let alice = ledger.query(&HistoryFilter {
            identity: Some("alice".to_string()),
            ..Default::default()
        });
        assert_eq!(alice.len(), 2);

        let watermark_failed = ledger.query(&HistoryFilter {
            mode: Some(Mode::Watermark),
            verdict: Some(VerdictKind::Failed),
            ..Default::default()
        });
        assert_eq!(watermark_failed.len(), 1);
        assert_eq!(watermark_failed[0].sequence, 3);
    }

    #[test]
    fn query_is_restartable() {
        let ledger = HistoryLedger::new();
        let ctx = EngineContext::default();
        ledger.append("alice", Mode::Fidelity, &ctx, refusal_snapshot());
        let filter = HistoryFilter::default();
        let first = ledger.query(&filter);
        let second = ledger.query(&filter);
        assert_eq!(first, second);
    }

    #[test]
    fn time_range_filter() {
        let ledger = HistoryLedger::new();
        let ctx = EngineContext::default();
        ledger.append("alice", Mode::Fidelity, &ctx, refusal_snapshot());
        let stamp = ledger.last().unwrap().timestamp_unix_ms;

        let hit = ledger.query(&HistoryFilter {
            since_unix_ms: Some(stamp),
            until_unix_ms: Some(stamp),
            ..Default::default()
        });
        assert_eq!(hit.len(), 1);

        let miss = ledger.query(&HistoryFilter {
            since_unix_ms: Some(stamp + 1),
            ..Default::default()
        });
        assert!(miss.is_empty());
    }

    // -----------------------------------------------------------------------
    // Export
    // -----------------------------------------------------------------------

    #[test]
    fn jsonl_export_round_trips_line_by_line() {
        let ledger = HistoryLedger::new();
        let ctx = EngineContext::default();
        ledger.append("alice", Mode::Fidelity, &ctx, refusal_snapshot());
        ledger.append("bob", Mode::Watermark, &ctx, failed_snapshot());

        let jsonl = ledger.export(ExportFormat::JsonLines).unwrap();
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);
        for (i, line) in lines.iter().enumerate() {
            let entry: HistoryEntry = serde_json::from_str(line).unwrap();
            assert_eq!(entry.sequence, i as u64 + 1);
        }
    }

    #[test]
    fn jsonl_export_written_to_disk_reads_back() {
        let ledger = HistoryLedger::new();
        let ctx = EngineContext::default();
        ledger.append("alice", Mode::Fidelity, &ctx, refusal_snapshot());

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.jsonl");
        std::fs::write(&path, ledger.export(ExportFormat::JsonLines).unwrap()).unwrap();

        let read_back = std::fs::read_to_string(&path).unwrap();
        let entry: HistoryEntry = serde_json::from_str(read_back.lines().next().unwrap()).unwrap();
        assert_eq!(entry.identity, "alice");
    }

    #[test]
    fn json_export_carries_ledger_metadata() {
        let ledger = HistoryLedger::new();
        let ctx = EngineContext::default();
        ledger.append("alice", Mode::Fidelity, &ctx, refusal_snapshot());
        ledger.append("bob", Mode::Watermark, &ctx, failed_snapshot());

        let json = ledger.export(ExportFormat::Json).unwrap();
        let snapshot: LedgerSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot.ledger_id, ledger.ledger_id());
        assert_eq!(snapshot.total_entries, 2);
        assert_eq!(snapshot.refused, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.entries.len(), 2);
    }

    #[test]
    fn csv_export_has_header_and_rows() {
        let ledger = HistoryLedger::new();
        let ctx = EngineContext::default();
        ledger.append("alice", Mode::Fidelity, &ctx, refusal_snapshot());

        let csv = ledger.export(ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "sequence,timestamp_unix_ms,identity_fingerprint,mode,verdict,detail"
        );
        assert!(lines[1].starts_with("1,"));
        assert!(lines[1].contains("fidelity"));
        assert!(lines[1].contains("refused"));
    }

    #[test]
    fn export_does_not_mutate_state() {
        let ledger = HistoryLedger::new();
        let ctx = EngineContext::default();
        ledger.append("alice", Mode::Fidelity, &ctx, refusal_snapshot());
        let before = ledger.entries();
        let _ = ledger.export(ExportFormat::Json).unwrap();
        let _ = ledger.export(ExportFormat::Csv).unwrap();
        assert_eq!(ledger.entries(), before);
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(identity_fingerprint("alice"), identity_fingerprint("alice"));
        assert_ne!(identity_fingerprint("alice"), identity_fingerprint("bob"));
    }
}
