//! Repair plans.
//!
//! A [`RepairPlan`] is a frozen list of actions built from one scan's
//! findings. "Repair all" expands to every action known at construction
//! time, so records that become orphans later are never swept up by an
//! in-flight repair.
//!
//! Deletes and merges are ordered ahead of resyncs. A resync writes the
//! stock level total without the rows the same plan removes, and is dropped
//! when the plan deletes its product.

use std::collections::{BTreeSet, HashSet};

use bizdesk_core::{RepairRunId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::findings::Findings;
use crate::types::{ActionType, PRODUCT_ENTITY, STOCK_LEVEL_ENTITY};

/// A single-record remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    /// Delete one record.
    DeleteRecord { entity: String, id: String },
    /// Set `Product.stock_quantity` to the stock level total.
    ResyncAggregate { product_id: String, new_quantity: f64 },
    /// Delete a duplicate `StockLevel` row. Quantities are not carried over.
    MergeDuplicate { loser_id: String },
}

impl RepairAction {
    /// Stable key: `delete:{entity}:{id}`, `resync:{product_id}` or
    /// `merge:{loser_id}`.
    #[must_use]
    pub fn key(&self) -> String {
        let prefix = self.action_type().key_prefix();
        match self {
            Self::DeleteRecord { entity, id } => format!("{prefix}:{entity}:{id}"),
            Self::ResyncAggregate { product_id, .. } => format!("{prefix}:{product_id}"),
            Self::MergeDuplicate { loser_id } => format!("{prefix}:{loser_id}"),
        }
    }

    #[must_use]
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::DeleteRecord { .. } => ActionType::DeleteRecord,
            Self::ResyncAggregate { .. } => ActionType::ResyncAggregate,
            Self::MergeDuplicate { .. } => ActionType::MergeDuplicate,
        }
    }

    /// Entity the action mutates.
    #[must_use]
    pub fn entity(&self) -> &str {
        match self {
            Self::DeleteRecord { entity, .. } => entity,
            Self::ResyncAggregate { .. } => PRODUCT_ENTITY,
            Self::MergeDuplicate { .. } => STOCK_LEVEL_ENTITY,
        }
    }

    /// ID of the record the action mutates.
    #[must_use]
    pub fn record_id(&self) -> &str {
        match self {
            Self::DeleteRecord { id, .. } => id,
            Self::ResyncAggregate { product_id, .. } => product_id,
            Self::MergeDuplicate { loser_id } => loser_id,
        }
    }
}

/// An action with the finding it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    /// Originating finding; `None` for hand-built actions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_id: Option<String>,
    pub action: RepairAction,
    /// State observed at scan time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_state: Option<JsonValue>,
}

impl PlannedAction {
    /// Wrap a hand-built action.
    pub fn manual(action: RepairAction) -> Self {
        Self {
            finding_id: None,
            action,
            before_state: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> String {
        self.action.key()
    }
}

/// Errors building a plan from an operator selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("nothing selected for repair")]
    EmptySelection,

    #[error("unknown finding: {id}")]
    UnknownFinding { id: String },

    #[error("unknown action: {key}")]
    UnknownAction { key: String },
}

/// Operator selection: whole finding groups and/or single actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSelection {
    #[serde(default)]
    pub finding_ids: Vec<String>,
    #[serde(default)]
    pub action_keys: Vec<String>,
}

impl RepairSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_finding(mut self, id: impl Into<String>) -> Self {
        self.finding_ids.push(id.into());
        self
    }

    pub fn with_action(mut self, key: impl Into<String>) -> Self {
        self.action_keys.push(key.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.finding_ids.is_empty() && self.action_keys.is_empty()
    }
}

/// A frozen, ordered list of repair actions for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub id: RepairRunId,
    pub tenant: TenantId,
    pub created_at: DateTime<Utc>,
    items: Vec<PlannedAction>,
}

impl RepairPlan {
    /// Create an empty plan.
    pub fn new(tenant: TenantId) -> Self {
        Self {
            id: RepairRunId::new(),
            tenant,
            created_at: Utc::now(),
            items: Vec::new(),
        }
    }

    /// Every action the findings currently suggest.
    pub fn repair_all(tenant: TenantId, findings: &Findings) -> Self {
        let mut plan = Self::new(tenant);
        plan.extend(findings.suggested_actions());
        plan.settle_stock(findings);
        plan
    }

    /// Actions for the selected findings and action keys, in selection order.
    ///
    /// Fails on the first ID or key the findings do not contain.
    pub fn from_selection(
        tenant: TenantId,
        findings: &Findings,
        selection: &RepairSelection,
    ) -> Result<Self, PlanError> {
        if selection.is_empty() {
            return Err(PlanError::EmptySelection);
        }

        let mut plan = Self::new(tenant);
        for id in &selection.finding_ids {
            let actions = findings
                .actions_for_finding(id)
                .ok_or_else(|| PlanError::UnknownFinding { id: id.clone() })?;
            plan.extend(actions);
        }

        if !selection.action_keys.is_empty() {
            let suggested = findings.suggested_actions();
            for key in &selection.action_keys {
                let action = suggested
                    .iter()
                    .find(|a| &a.key() == key)
                    .ok_or_else(|| PlanError::UnknownAction { key: key.clone() })?;
                plan.push(action.clone());
            }
        }
        plan.settle_stock(findings);
        Ok(plan)
    }

    /// Plan of hand-built actions.
    pub fn from_actions<I>(tenant: TenantId, actions: I) -> Self
    where
        I: IntoIterator<Item = RepairAction>,
    {
        let mut plan = Self::new(tenant);
        plan.extend(actions.into_iter().map(PlannedAction::manual));
        plan
    }

    /// Add an action unless one with the same key is already planned.
    ///
    /// Returns `false` when the action is a duplicate or a resync for a
    /// product the plan deletes.
    pub fn push(&mut self, item: PlannedAction) -> bool {
        let key = item.key();
        if self.items.iter().any(|existing| existing.key() == key) {
            return false;
        }
        self.insert(item)
    }

    fn extend(&mut self, items: impl IntoIterator<Item = PlannedAction>) {
        let mut seen: HashSet<String> = self.items.iter().map(PlannedAction::key).collect();
        for item in items {
            if seen.insert(item.key()) {
                self.insert(item);
            }
        }
    }

    fn insert(&mut self, item: PlannedAction) -> bool {
        match &item.action {
            RepairAction::ResyncAggregate { product_id, .. } => {
                if self.deletes_product(product_id) {
                    tracing::debug!(action = %item.key(), "product deleted by plan, resync dropped");
                    return false;
                }
                self.items.push(item);
            }
            RepairAction::DeleteRecord { entity, id } if entity == PRODUCT_ENTITY => {
                let product_id = id.clone();
                self.items.retain(|existing| !is_resync_for(existing, &product_id));
                self.insert_before_resyncs(item);
            }
            _ => self.insert_before_resyncs(item),
        }
        true
    }

    fn insert_before_resyncs(&mut self, item: PlannedAction) {
        let at = self
            .items
            .iter()
            .position(|existing| existing.action.action_type() == ActionType::ResyncAggregate)
            .unwrap_or(self.items.len());
        self.items.insert(at, item);
    }

    fn deletes_product(&self, product_id: &str) -> bool {
        self.items.iter().any(|existing| {
            matches!(
                &existing.action,
                RepairAction::DeleteRecord { entity, id } if entity == PRODUCT_ENTITY && id == product_id
            )
        })
    }

    /// Take stock level rows removed by this plan out of each resync total.
    fn settle_stock(&mut self, findings: &Findings) {
        let removed: HashSet<String> = self
            .items
            .iter()
            .filter_map(|item| match &item.action {
                RepairAction::MergeDuplicate { loser_id } => Some(loser_id.clone()),
                RepairAction::DeleteRecord { entity, id } if entity == STOCK_LEVEL_ENTITY => {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect();
        if removed.is_empty() {
            return;
        }

        for item in &mut self.items {
            let RepairAction::ResyncAggregate {
                product_id,
                new_quantity,
            } = &mut item.action
            else {
                continue;
            };
            let Some(mismatch) = findings.stock_mismatch(product_id) else {
                continue;
            };
            let dropped: f64 = mismatch
                .stock_levels
                .iter()
                .filter(|share| share.id.as_ref().is_some_and(|id| removed.contains(id)))
                .map(|share| share.quantity)
                .sum();
            if dropped != 0.0 {
                *new_quantity = mismatch.calculated_quantity - dropped;
                tracing::debug!(
                    product_id = %product_id,
                    new_quantity = *new_quantity,
                    "resync adjusted for removed stock levels"
                );
            }
        }
    }

    pub fn items(&self) -> &[PlannedAction] {
        &self.items
    }

    /// Findings this plan acts on.
    #[must_use]
    pub fn targeted_findings(&self) -> BTreeSet<&str> {
        self.items
            .iter()
            .filter_map(|item| item.finding_id.as_deref())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn is_resync_for(item: &PlannedAction, product_id: &str) -> bool {
    matches!(&item.action, RepairAction::ResyncAggregate { product_id: p, .. } if p == product_id)
}
