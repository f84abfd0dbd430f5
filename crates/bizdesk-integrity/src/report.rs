//! Scan and convergence reports.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use bizdesk_core::{ScanRunId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::findings::{Findings, FindingsSummary, SkippedCheck};
use crate::plan::{PlannedAction, RepairPlan};
use crate::snapshot::FetchFailure;
use crate::statistics::ScanStatistics;
use crate::types::{FindingKind, ScanStatus};

/// Complete result of one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub run_id: ScanRunId,
    pub tenant: TenantId,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Entities counted as empty because their fetch failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fetch_failures: Vec<FetchFailure>,
    /// Checks that did not run because their data was incomplete.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_checks: Vec<SkippedCheck>,
    pub summary: FindingsSummary,
    pub findings: Findings,
    pub statistics: ScanStatistics,
}

impl ScanReport {
    /// Status for a scan with the given failures.
    #[must_use]
    pub fn status_for(fetch_failures: &[FetchFailure], timed_out: bool) -> ScanStatus {
        if timed_out {
            ScanStatus::TimedOut
        } else if fetch_failures.is_empty() {
            ScanStatus::Completed
        } else {
            ScanStatus::Partial
        }
    }

    /// Whether the scan saw everything and found nothing.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.status.is_complete() && self.summary.is_clean()
    }
}

/// Report generator for findings exports.
pub struct ReportGenerator;

impl ReportGenerator {
    /// One row per offending record.
    #[must_use]
    pub fn csv_rows(findings: &Findings) -> Vec<FindingCsvRow> {
        let mut rows = Vec::new();
        for finding in &findings.orphans {
            rows.extend(finding.records.iter().map(|record| FindingCsvRow {
                finding_id: finding.id.clone(),
                kind: FindingKind::Orphan,
                entity: finding.entity.clone(),
                field: finding.parent_field.clone(),
                record_id: record.id.clone(),
                reference: Some(record.foreign_key.clone()),
                label: record.label.clone(),
                detail: format!("{} not found", finding.parent_entity),
            }));
        }
        for mismatch in &findings.stock_mismatches {
            rows.push(FindingCsvRow {
                finding_id: mismatch.id.clone(),
                kind: FindingKind::StockMismatch,
                entity: "Product".to_string(),
                field: "stock_quantity".to_string(),
                record_id: Some(mismatch.product_id.clone()),
                reference: None,
                label: mismatch.product_label.clone(),
                detail: format!(
                    "recorded {} calculated {} delta {}",
                    mismatch.recorded_quantity, mismatch.calculated_quantity, mismatch.delta
                ),
            });
        }
        for group in &findings.duplicates {
            rows.extend(group.duplicates.iter().map(|row| FindingCsvRow {
                finding_id: group.id.clone(),
                kind: FindingKind::Duplicate,
                entity: "StockLevel".to_string(),
                field: "product_id+warehouse_id".to_string(),
                record_id: row.id.clone(),
                reference: Some(group.composite_key.clone()),
                label: None,
                detail: format!(
                    "duplicate of {}",
                    group.survivor.id.as_deref().unwrap_or("unidentified row")
                ),
            }));
        }
        rows
    }

    /// Generate a CSV export of findings.
    #[must_use]
    pub fn generate_csv(rows: &[FindingCsvRow]) -> String {
        let mut csv = String::new();

        csv.push_str("finding_id,kind,entity,field,record_id,reference,label,detail\n");

        for row in rows {
            let kind = row.kind.to_string();
            let fields = [
                csv_field(&row.finding_id),
                csv_field(&kind),
                csv_field(&row.entity),
                csv_field(&row.field),
                csv_field(row.record_id.as_deref().unwrap_or("")),
                csv_field(row.reference.as_deref().unwrap_or("")),
                csv_field(row.label.as_deref().unwrap_or("")),
                csv_field(&row.detail),
            ];
            csv.push_str(&fields.join(","));
            csv.push('\n');
        }

        csv
    }
}

/// Row for CSV export.
#[derive(Debug, Clone, PartialEq)]
pub struct FindingCsvRow {
    pub finding_id: String,
    pub kind: FindingKind,
    pub entity: String,
    pub field: String,
    pub record_id: Option<String>,
    pub reference: Option<String>,
    pub label: Option<String>,
    pub detail: String,
}

/// Quote a field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

/// How one targeted finding looks after repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceItem {
    pub finding_id: String,
    /// Actions the plan took against this finding.
    pub targeted: usize,
    /// Targeted records still flagged by the re-scan.
    pub remaining: usize,
}

/// Comparison of a plan's targets with a fresh scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub before_run: ScanRunId,
    pub after_run: ScanRunId,
    pub items: Vec<ConvergenceItem>,
    /// Findings in the re-scan that the first scan did not have, such as
    /// orphans created by concurrent writes. Informational only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_findings: Vec<String>,
}

impl ConvergenceReport {
    /// Compare what `plan` targeted in `before` with what `after` still flags.
    #[must_use]
    pub fn compare(plan: &RepairPlan, before: &ScanReport, after: &ScanReport) -> Self {
        let still_flagged: HashSet<String> = after
            .findings
            .suggested_actions()
            .iter()
            .map(PlannedAction::key)
            .collect();

        let mut by_finding: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for item in plan.items() {
            let Some(finding_id) = item.finding_id.as_deref() else {
                continue;
            };
            let entry = by_finding.entry(finding_id).or_insert((0, 0));
            entry.0 += 1;
            if still_flagged.contains(&item.key()) {
                entry.1 += 1;
            }
        }

        let known: BTreeSet<&str> = before.findings.finding_ids().into_iter().collect();
        let new_findings = after
            .findings
            .finding_ids()
            .into_iter()
            .filter(|id| !known.contains(id))
            .map(ToString::to_string)
            .collect();

        Self {
            before_run: before.run_id,
            after_run: after.run_id,
            items: by_finding
                .into_iter()
                .map(|(finding_id, (targeted, remaining))| ConvergenceItem {
                    finding_id: finding_id.to_string(),
                    targeted,
                    remaining,
                })
                .collect(),
            new_findings,
        }
    }

    /// Whether every targeted record is gone from the re-scan.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.items.iter().all(|item| item.remaining == 0)
    }

    /// Targeted records still flagged.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.items.iter().map(|item| item.remaining).sum()
    }
}
