//! Scan statistics tracking.
//!
//! Loader tasks and detectors report into a shared [`StatisticsTracker`];
//! the report carries a [`ScanStatistics`] snapshot of it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use crate::types::FindingKind;

/// Statistics for one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatistics {
    /// Entity types the scan asked for.
    #[serde(default)]
    pub entities_requested: u64,
    /// Entity types fetched successfully.
    #[serde(default)]
    pub entities_loaded: u64,
    /// Entity types whose fetch failed or was not deployed.
    #[serde(default)]
    pub entities_failed: u64,
    /// Records fetched across all entity types.
    #[serde(default)]
    pub records_loaded: u64,
    /// Relationship rules evaluated.
    #[serde(default)]
    pub rules_evaluated: u64,
    /// Relationship rules skipped because their data was incomplete.
    #[serde(default)]
    pub rules_skipped: u64,
    /// Findings broken down by kind.
    #[serde(default)]
    pub findings_by_kind: BTreeMap<FindingKind, u64>,
    /// Wall-clock duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

impl ScanStatistics {
    /// Findings of one kind.
    #[must_use]
    pub fn finding_count(&self, kind: FindingKind) -> u64 {
        self.findings_by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Findings of every kind.
    #[must_use]
    pub fn total_findings(&self) -> u64 {
        self.findings_by_kind.values().sum()
    }
}

/// Thread-safe tracker for accumulating statistics during a scan.
pub struct StatisticsTracker {
    entities_requested: AtomicU64,
    entities_loaded: AtomicU64,
    entities_failed: AtomicU64,
    records_loaded: AtomicU64,
    rules_evaluated: AtomicU64,
    rules_skipped: AtomicU64,
    findings_by_kind: RwLock<BTreeMap<FindingKind, u64>>,
    start_time: Instant,
}

impl StatisticsTracker {
    /// Create a new tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities_requested: AtomicU64::new(0),
            entities_loaded: AtomicU64::new(0),
            entities_failed: AtomicU64::new(0),
            records_loaded: AtomicU64::new(0),
            rules_evaluated: AtomicU64::new(0),
            rules_skipped: AtomicU64::new(0),
            findings_by_kind: RwLock::new(BTreeMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn set_entities_requested(&self, count: u64) {
        self.entities_requested.store(count, Ordering::SeqCst);
    }

    /// Record a successful entity fetch.
    pub fn record_entity_loaded(&self, records: u64) {
        self.entities_loaded.fetch_add(1, Ordering::SeqCst);
        self.records_loaded.fetch_add(records, Ordering::SeqCst);
    }

    /// Record a failed or missing entity fetch.
    pub fn record_entity_failed(&self) {
        self.entities_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_rule_evaluated(&self) {
        self.rules_evaluated.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_rule_skipped(&self) {
        self.rules_skipped.fetch_add(1, Ordering::SeqCst);
    }

    /// Record findings of one kind.
    pub fn record_findings(&self, kind: FindingKind, count: u64) {
        if count == 0 {
            return;
        }
        if let Ok(mut map) = self.findings_by_kind.write() {
            *map.entry(kind).or_insert(0) += count;
        }
    }

    /// Records loaded so far.
    pub fn records_loaded(&self) -> u64 {
        self.records_loaded.load(Ordering::SeqCst)
    }

    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Snapshot current statistics.
    pub fn snapshot(&self) -> ScanStatistics {
        let findings_by_kind = self
            .findings_by_kind
            .read()
            .map(|map| map.clone())
            .unwrap_or_default();

        ScanStatistics {
            entities_requested: self.entities_requested.load(Ordering::SeqCst),
            entities_loaded: self.entities_loaded.load(Ordering::SeqCst),
            entities_failed: self.entities_failed.load(Ordering::SeqCst),
            records_loaded: self.records_loaded.load(Ordering::SeqCst),
            rules_evaluated: self.rules_evaluated.load(Ordering::SeqCst),
            rules_skipped: self.rules_skipped.load(Ordering::SeqCst),
            findings_by_kind,
            duration_ms: self.elapsed_ms(),
        }
    }
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StatisticsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsTracker")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
