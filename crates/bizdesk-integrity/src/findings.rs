//! Finding types and the aggregated findings of one scan.
//!
//! Findings are derived, never stored. Every finding group carries a stable
//! ID so an operator can select it for repair; see [`crate::plan`].

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

use crate::plan::{PlannedAction, RepairAction};
use crate::registry::{ParentKind, RelationshipRule};
use crate::types::{FindingKind, PRODUCT_ENTITY, STOCK_LEVEL_ENTITY};

/// A child record whose foreign key points at a missing parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanRecord {
    /// Record ID; records without one are reported but cannot be repaired.
    pub id: Option<String>,
    /// The dangling foreign-key value. Never empty.
    pub foreign_key: String,
    /// Human-readable label for operator review.
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
}

/// All orphans of one `(entity, parent_field)` rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrphanFinding {
    pub id: String,
    pub entity: String,
    pub parent_field: String,
    pub parent_entity: ParentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_tag: Option<String>,
    pub records: Vec<OrphanRecord>,
    /// Records of `entity` examined, orphaned or not.
    pub total_records_in_entity: usize,
}

impl OrphanFinding {
    /// Finding ID for a rule: `orphan:{entity}.{field}`.
    #[must_use]
    pub fn id_for(rule: &RelationshipRule) -> String {
        format!("orphan:{}", rule.qualified_field())
    }
}

/// `Product.stock_quantity` disagreeing with its stock level rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMismatch {
    pub id: String,
    pub product_id: String,
    pub product_label: Option<String>,
    pub recorded_quantity: f64,
    pub calculated_quantity: f64,
    /// `calculated_quantity - recorded_quantity`.
    pub delta: f64,
    /// Stock level rows summed into `calculated_quantity`.
    pub stock_level_count: usize,
    /// The summed rows, so a plan that deletes some of them can correct the
    /// total it writes back.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stock_levels: Vec<StockShare>,
}

/// One `StockLevel` row's contribution to a product total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockShare {
    pub id: Option<String>,
    pub quantity: f64,
}

impl StockMismatch {
    #[must_use]
    pub fn id_for(product_id: &str) -> String {
        format!("stock:{product_id}")
    }
}

/// One `StockLevel` row in a duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateRow {
    pub id: Option<String>,
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
}

/// `StockLevel` rows sharing one product+warehouse key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: String,
    pub composite_key: String,
    pub product_id: String,
    pub warehouse_id: String,
    /// First row seen; kept.
    pub survivor: DuplicateRow,
    /// Every later row; candidates for deletion.
    pub duplicates: Vec<DuplicateRow>,
}

impl DuplicateGroup {
    /// Composite key: `{product_id}-{warehouse_id}`.
    #[must_use]
    pub fn composite_key(product_id: &str, warehouse_id: &str) -> String {
        format!("{product_id}-{warehouse_id}")
    }

    #[must_use]
    pub fn id_for(composite_key: &str) -> String {
        format!("duplicate:{composite_key}")
    }
}

/// A check that did not run because its data was incomplete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCheck {
    /// `Entity.field` for relationship rules, or the detector name.
    pub check: String,
    pub reason: String,
}

/// Orphan counts for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityOrphanSummary {
    pub total: usize,
    pub by_field: BTreeMap<String, usize>,
}

/// Findings summary grouped for display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingsSummary {
    pub orphan_groups: usize,
    pub orphan_records: usize,
    pub orphans_by_entity: BTreeMap<String, EntityOrphanSummary>,
    pub stock_mismatches: usize,
    pub duplicate_groups: usize,
    pub duplicate_rows: usize,
    /// Repair actions the findings suggest.
    pub suggested_actions: usize,
}

impl FindingsSummary {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.orphan_records == 0 && self.stock_mismatches == 0 && self.duplicate_rows == 0
    }
}

/// Everything one scan found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Findings {
    pub orphans: Vec<OrphanFinding>,
    pub stock_mismatches: Vec<StockMismatch>,
    pub duplicates: Vec<DuplicateGroup>,
}

impl Findings {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty() && self.stock_mismatches.is_empty() && self.duplicates.is_empty()
    }

    /// Number of finding groups of one kind.
    #[must_use]
    pub fn count(&self, kind: FindingKind) -> usize {
        match kind {
            FindingKind::Orphan => self.orphans.len(),
            FindingKind::StockMismatch => self.stock_mismatches.len(),
            FindingKind::Duplicate => self.duplicates.len(),
        }
    }

    /// IDs of every finding group, orphans first.
    #[must_use]
    pub fn finding_ids(&self) -> Vec<&str> {
        self.orphans
            .iter()
            .map(|f| f.id.as_str())
            .chain(self.stock_mismatches.iter().map(|m| m.id.as_str()))
            .chain(self.duplicates.iter().map(|d| d.id.as_str()))
            .collect()
    }

    /// Orphan finding by entity and field.
    #[must_use]
    pub fn orphan(&self, entity: &str, parent_field: &str) -> Option<&OrphanFinding> {
        self.orphans
            .iter()
            .find(|f| f.entity == entity && f.parent_field == parent_field)
    }

    /// Summary grouped by entity.
    #[must_use]
    pub fn summary(&self) -> FindingsSummary {
        let mut summary = FindingsSummary {
            orphan_groups: self.orphans.len(),
            stock_mismatches: self.stock_mismatches.len(),
            duplicate_groups: self.duplicates.len(),
            ..FindingsSummary::default()
        };

        for finding in &self.orphans {
            let count = finding.records.len();
            summary.orphan_records += count;
            let entry = summary
                .orphans_by_entity
                .entry(finding.entity.clone())
                .or_default();
            entry.total += count;
            *entry.by_field.entry(finding.parent_field.clone()).or_insert(0) += count;
        }
        summary.duplicate_rows = self.duplicates.iter().map(|d| d.duplicates.len()).sum();
        summary.suggested_actions = self.suggested_actions().len();
        summary
    }

    /// Repair actions for one finding group, or `None` if no such finding.
    #[must_use]
    pub fn actions_for_finding(&self, finding_id: &str) -> Option<Vec<PlannedAction>> {
        if let Some(finding) = self.orphans.iter().find(|f| f.id == finding_id) {
            return Some(orphan_actions(finding));
        }
        if let Some(mismatch) = self.stock_mismatches.iter().find(|m| m.id == finding_id) {
            return Some(vec![resync_action(mismatch)]);
        }
        self.duplicates
            .iter()
            .find(|d| d.id == finding_id)
            .map(merge_actions)
    }

    /// Every repair action the findings suggest. Resyncs come last so they
    /// run after the deletes and merges that change stock totals.
    #[must_use]
    pub fn suggested_actions(&self) -> Vec<PlannedAction> {
        let mut actions: Vec<PlannedAction> = self.orphans.iter().flat_map(orphan_actions).collect();
        actions.extend(self.duplicates.iter().flat_map(merge_actions));
        actions.extend(self.stock_mismatches.iter().map(resync_action));
        actions
    }

    /// Mismatch finding for a product.
    #[must_use]
    pub fn stock_mismatch(&self, product_id: &str) -> Option<&StockMismatch> {
        self.stock_mismatches
            .iter()
            .find(|m| m.product_id == product_id)
    }
}

fn orphan_actions(finding: &OrphanFinding) -> Vec<PlannedAction> {
    finding
        .records
        .iter()
        .filter_map(|record| {
            let id = record.id.clone()?;
            let mut before = json!({
                "entity": finding.entity,
                "id": id,
                "label": record.label,
            });
            before[finding.parent_field.as_str()] = json!(record.foreign_key);
            Some(PlannedAction {
                finding_id: Some(finding.id.clone()),
                action: RepairAction::DeleteRecord {
                    entity: finding.entity.clone(),
                    id,
                },
                before_state: Some(before),
            })
        })
        .collect()
}

fn resync_action(mismatch: &StockMismatch) -> PlannedAction {
    PlannedAction {
        finding_id: Some(mismatch.id.clone()),
        action: RepairAction::ResyncAggregate {
            product_id: mismatch.product_id.clone(),
            new_quantity: mismatch.calculated_quantity,
        },
        before_state: Some(json!({
            "entity": PRODUCT_ENTITY,
            "id": mismatch.product_id,
            "stock_quantity": mismatch.recorded_quantity,
        })),
    }
}

/// Losers that share the survivor's ID get no action: a delete by that ID
/// could remove the survivor instead.
fn merge_actions(group: &DuplicateGroup) -> Vec<PlannedAction> {
    group
        .duplicates
        .iter()
        .filter(|row| row.id != group.survivor.id)
        .filter_map(|row| {
            let loser_id = row.id.clone()?;
            Some(PlannedAction {
                finding_id: Some(group.id.clone()),
                action: RepairAction::MergeDuplicate {
                    loser_id: loser_id.clone(),
                },
                before_state: Some(json!({
                    "entity": STOCK_LEVEL_ENTITY,
                    "id": loser_id,
                    "product_id": group.product_id,
                    "warehouse_id": group.warehouse_id,
                    "quantity": row.quantity,
                    "survivor_id": group.survivor.id,
                })),
            })
        })
        .collect()
}
