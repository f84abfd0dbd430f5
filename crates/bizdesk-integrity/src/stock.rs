//! Stock aggregate reconciliation.
//!
//! `Product.stock_quantity` is a denormalized total of the product's
//! `StockLevel` rows across every location. The rows are the source of truth;
//! a mismatch is reported when the two differ by more than an absolute
//! tolerance.

use std::collections::HashMap;
use std::sync::Arc;

use crate::findings::{SkippedCheck, StockMismatch, StockShare};
use crate::snapshot::EntitySnapshot;
use crate::statistics::StatisticsTracker;
use crate::types::{FindingKind, PRODUCT_ENTITY, STOCK_LEVEL_ENTITY};

/// Aggregate field on `Product`.
pub const STOCK_QUANTITY_FIELD: &str = "stock_quantity";
/// Quantity field on `StockLevel`.
pub const QUANTITY_FIELD: &str = "quantity";
/// Product reference on `StockLevel`.
pub const PRODUCT_ID_FIELD: &str = "product_id";

/// Name used for this check in skip lists.
const CHECK_NAME: &str = "stock_reconciliation";

/// Recomputes product stock totals from stock level rows.
#[derive(Debug, Clone)]
pub struct StockReconciler {
    epsilon: f64,
    label_fields: Vec<String>,
    tracker: Option<Arc<StatisticsTracker>>,
}

impl StockReconciler {
    pub fn new(epsilon: f64, label_fields: Vec<String>) -> Self {
        Self {
            epsilon,
            label_fields,
            tracker: None,
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<StatisticsTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Compare every product against its stock level rows.
    ///
    /// Missing or non-numeric quantities count as zero. Products without an
    /// ID cannot be matched to rows and are ignored.
    pub fn detect(&self, snapshot: &EntitySnapshot) -> Result<Vec<StockMismatch>, SkippedCheck> {
        for entity in [PRODUCT_ENTITY, STOCK_LEVEL_ENTITY] {
            if snapshot.is_incomplete(entity) {
                if let Some(tracker) = &self.tracker {
                    tracker.record_rule_skipped();
                }
                return Err(SkippedCheck {
                    check: CHECK_NAME.to_string(),
                    reason: format!("{entity} not loaded before deadline"),
                });
            }
        }

        let mut shares: HashMap<String, Vec<StockShare>> = HashMap::new();
        for level in snapshot.records(STOCK_LEVEL_ENTITY) {
            let Some(product_id) = level.reference(PRODUCT_ID_FIELD) else {
                continue;
            };
            shares.entry(product_id).or_default().push(StockShare {
                id: level.id(),
                quantity: level.number(QUANTITY_FIELD).unwrap_or(0.0),
            });
        }

        let mismatches: Vec<StockMismatch> = snapshot
            .records(PRODUCT_ENTITY)
            .iter()
            .filter_map(|product| {
                let product_id = product.id()?;
                let recorded = product.number(STOCK_QUANTITY_FIELD).unwrap_or(0.0);
                let levels = shares.get(&product_id).map_or(&[][..], Vec::as_slice);
                let calculated: f64 = levels.iter().map(|s| s.quantity).sum();
                let delta = calculated - recorded;
                (delta.abs() > self.epsilon).then(|| StockMismatch {
                    id: StockMismatch::id_for(&product_id),
                    product_label: product.label(&self.label_fields),
                    product_id,
                    recorded_quantity: recorded,
                    calculated_quantity: calculated,
                    delta,
                    stock_level_count: levels.len(),
                    stock_levels: levels.to_vec(),
                })
            })
            .collect();

        if let Some(tracker) = &self.tracker {
            tracker.record_rule_evaluated();
            tracker.record_findings(
                FindingKind::StockMismatch,
                u64::try_from(mismatches.len()).unwrap_or(u64::MAX),
            );
        }
        if !mismatches.is_empty() {
            tracing::debug!(count = mismatches.len(), "Stock mismatches found");
        }
        Ok(mismatches)
    }
}
