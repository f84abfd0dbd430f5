//! Duplicate stock level detection.
//!
//! `StockLevel` rows are unique per product+warehouse, but the store does
//! not enforce it. Rows sharing a key are grouped; the first row in snapshot
//! order survives and the rest are deletion candidates. Quantities are never
//! summed.

use std::collections::HashMap;
use std::sync::Arc;

use bizdesk_store::Record;

use crate::findings::{DuplicateGroup, DuplicateRow, SkippedCheck};
use crate::snapshot::EntitySnapshot;
use crate::statistics::StatisticsTracker;
use crate::stock::{PRODUCT_ID_FIELD, QUANTITY_FIELD};
use crate::types::{FindingKind, STOCK_LEVEL_ENTITY};

/// Warehouse reference on `StockLevel`.
pub const WAREHOUSE_ID_FIELD: &str = "warehouse_id";

const CHECK_NAME: &str = "duplicate_stock_levels";

/// Groups stock level rows by composite key.
#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    tracker: Option<Arc<StatisticsTracker>>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracker(mut self, tracker: Arc<StatisticsTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Find every product+warehouse key with more than one row.
    ///
    /// Rows missing either half of the key are ignored. Groups come out in
    /// order of their first row.
    pub fn detect(&self, snapshot: &EntitySnapshot) -> Result<Vec<DuplicateGroup>, SkippedCheck> {
        if snapshot.is_incomplete(STOCK_LEVEL_ENTITY) {
            if let Some(tracker) = &self.tracker {
                tracker.record_rule_skipped();
            }
            return Err(SkippedCheck {
                check: CHECK_NAME.to_string(),
                reason: format!("{STOCK_LEVEL_ENTITY} not loaded before deadline"),
            });
        }

        let mut order: Vec<(String, String, Vec<&Record>)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for row in snapshot.records(STOCK_LEVEL_ENTITY) {
            let (Some(product_id), Some(warehouse_id)) = (
                row.reference(PRODUCT_ID_FIELD),
                row.reference(WAREHOUSE_ID_FIELD),
            ) else {
                continue;
            };
            let key = DuplicateGroup::composite_key(&product_id, &warehouse_id);
            match index.get(&key) {
                Some(&i) => order[i].2.push(row),
                None => {
                    index.insert(key, order.len());
                    order.push((product_id, warehouse_id, vec![row]));
                }
            }
        }

        let groups: Vec<DuplicateGroup> = order
            .into_iter()
            .filter(|(_, _, rows)| rows.len() > 1)
            .filter_map(|(product_id, warehouse_id, rows)| {
                let composite_key = DuplicateGroup::composite_key(&product_id, &warehouse_id);
                let mut rows = rows.into_iter().map(duplicate_row);
                let survivor = rows.next()?;
                Some(DuplicateGroup {
                    id: DuplicateGroup::id_for(&composite_key),
                    composite_key,
                    product_id,
                    warehouse_id,
                    survivor,
                    duplicates: rows.collect(),
                })
            })
            .collect();

        for group in &groups {
            let shared = group
                .duplicates
                .iter()
                .filter(|row| row.id.is_some() && row.id == group.survivor.id)
                .count();
            if shared > 0 {
                tracing::warn!(
                    group = %group.id,
                    rows = shared,
                    "Duplicate rows share the survivor's id and cannot be merged by id"
                );
            }
        }

        if let Some(tracker) = &self.tracker {
            tracker.record_rule_evaluated();
            let rows: usize = groups.iter().map(|g| g.duplicates.len()).sum();
            tracker.record_findings(FindingKind::Duplicate, u64::try_from(rows).unwrap_or(u64::MAX));
        }
        Ok(groups)
    }
}

fn duplicate_row(record: &Record) -> DuplicateRow {
    DuplicateRow {
        id: record.id(),
        quantity: record.number(QUANTITY_FIELD),
        created_date: record.created_date().map(ToString::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_core::TenantId;

    fn level(id: &str, product: &str, warehouse: &str) -> Record {
        Record::new()
            .with("id", id)
            .with("product_id", product)
            .with("warehouse_id", warehouse)
            .with("quantity", 1)
    }

    fn detect(levels: Vec<Record>) -> Vec<DuplicateGroup> {
        let snapshot =
            EntitySnapshot::new(TenantId::new("org-1").unwrap()).with_entity("StockLevel", levels);
        DuplicateDetector::new().detect(&snapshot).unwrap()
    }

    #[test]
    fn test_pair_yields_one_group_with_one_duplicate() {
        let groups = detect(vec![level("L1", "P1", "W1"), level("L2", "P1", "W1")]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, "duplicate:P1-W1");
        assert_eq!(groups[0].survivor.id.as_deref(), Some("L1"));
        assert_eq!(groups[0].duplicates.len(), 1);
        assert_eq!(groups[0].duplicates[0].id.as_deref(), Some("L2"));
    }

    #[test]
    fn test_first_seen_survives() {
        let groups = detect(vec![
            level("L1", "P2", "W1"),
            level("L2", "P1", "W1"),
            level("L3", "P2", "W1"),
            level("L4", "P1", "W1"),
            level("L5", "P2", "W1"),
            level("L6", "P1", "W2"),
        ]);
        let keys: Vec<_> = groups.iter().map(|g| g.composite_key.as_str()).collect();
        assert_eq!(keys, vec!["P2-W1", "P1-W1"]);
        assert_eq!(groups[0].survivor.id.as_deref(), Some("L1"));
        assert_eq!(groups[0].duplicates.len(), 2);
    }

    #[test]
    fn test_incomplete_keys_are_ignored() {
        let groups = detect(vec![
            level("L1", "P1", ""),
            level("L2", "P1", ""),
            Record::new().with("id", "L3").with("product_id", "P1"),
        ]);
        assert!(groups.is_empty());
    }
}
