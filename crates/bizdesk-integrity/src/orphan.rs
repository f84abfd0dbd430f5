//! Orphan detection.
//!
//! For each relationship rule, every child record whose foreign key is set
//! but absent from the parent's ID set is an orphan. Unset keys (null, blank,
//! missing) are valid: a sale with no customer is not broken.

use std::sync::Arc;

use bizdesk_store::Record;

use crate::findings::{OrphanFinding, OrphanRecord, SkippedCheck};
use crate::registry::{RelationshipRegistry, RelationshipRule};
use crate::snapshot::EntitySnapshot;
use crate::statistics::StatisticsTracker;
use crate::types::FindingKind;

/// Result of one orphan detection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrphanScan {
    /// One finding per rule with at least one orphan, in registry order.
    pub findings: Vec<OrphanFinding>,
    pub skipped: Vec<SkippedCheck>,
}

/// Cross-references child records against parent ID sets.
#[derive(Debug, Clone, Default)]
pub struct OrphanDetector {
    label_fields: Vec<String>,
    tracker: Option<Arc<StatisticsTracker>>,
}

impl OrphanDetector {
    pub fn new(label_fields: Vec<String>) -> Self {
        Self {
            label_fields,
            tracker: None,
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<StatisticsTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Evaluate every rule of `registry` against `snapshot`.
    pub fn detect(&self, registry: &RelationshipRegistry, snapshot: &EntitySnapshot) -> OrphanScan {
        let mut scan = OrphanScan::default();

        for rule in registry.rules() {
            match self.evaluate(rule, snapshot) {
                Ok(Some(finding)) => {
                    self.track(|t| t.record_rule_evaluated());
                    tracing::debug!(
                        entity = %rule.child_entity,
                        field = %rule.parent_field,
                        orphans = finding.records.len(),
                        "Orphans found"
                    );
                    scan.findings.push(finding);
                }
                Ok(None) => self.track(|t| t.record_rule_evaluated()),
                Err(reason) => {
                    self.track(|t| t.record_rule_skipped());
                    scan.skipped.push(SkippedCheck {
                        check: rule.qualified_field(),
                        reason,
                    });
                }
            }
        }

        let orphan_count = scan.findings.iter().map(|f| f.records.len()).sum::<usize>();
        self.track(|t| {
            t.record_findings(
                FindingKind::Orphan,
                u64::try_from(orphan_count).unwrap_or(u64::MAX),
            );
        });
        scan
    }

    /// `Ok(None)` when the rule has no orphans, `Err(reason)` when it cannot
    /// be evaluated.
    fn evaluate(
        &self,
        rule: &RelationshipRule,
        snapshot: &EntitySnapshot,
    ) -> Result<Option<OrphanFinding>, String> {
        let parent_entity = rule.parent.entity_name();
        if snapshot.is_incomplete(&rule.child_entity) {
            return Err(format!("{} not loaded before deadline", rule.child_entity));
        }
        if snapshot.is_incomplete(parent_entity) {
            return Err(format!("{parent_entity} not loaded before deadline"));
        }
        let parent_ids = snapshot
            .parent_ids(rule.parent)
            .ok_or_else(|| format!("{parent_entity} IDs not in snapshot"))?;

        let records = snapshot.records(&rule.child_entity);
        let orphans: Vec<OrphanRecord> = records
            .iter()
            .filter_map(|record| {
                let foreign_key = record.reference(&rule.parent_field)?;
                (!parent_ids.contains(&foreign_key)).then(|| self.orphan_record(record, foreign_key))
            })
            .collect();

        if orphans.is_empty() {
            return Ok(None);
        }

        Ok(Some(OrphanFinding {
            id: OrphanFinding::id_for(rule),
            entity: rule.child_entity.clone(),
            parent_field: rule.parent_field.clone(),
            parent_entity: rule.parent,
            variant_tag: rule.variant_tag.clone(),
            records: orphans,
            total_records_in_entity: records.len(),
        }))
    }

    fn orphan_record(&self, record: &Record, foreign_key: String) -> OrphanRecord {
        OrphanRecord {
            id: record.id(),
            foreign_key,
            label: record.label(&self.label_fields),
            created_date: record.created_date().map(ToString::to_string),
        }
    }

    fn track(&self, f: impl FnOnce(&StatisticsTracker)) {
        if let Some(tracker) = &self.tracker {
            f(tracker);
        }
    }
}
