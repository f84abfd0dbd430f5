//! Repair execution.
//!
//! Executes a [`RepairPlan`] one record mutation at a time. The store has no
//! multi-record transactions, so each action stands alone: a failed action
//! is recorded and execution moves on to the next one. Deleting a record that
//! is already gone counts as success.
//!
//! The executor does not re-verify; callers re-scan afterwards (see
//! [`crate::engine::IntegrityEngine::repair_and_verify`]).

use std::collections::BTreeMap;

use bizdesk_core::{RepairRunId, TenantId};
use bizdesk_store::{AccessorRegistry, Fields, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::instrument;

use crate::plan::{PlannedAction, RepairAction, RepairPlan};
use crate::stock::STOCK_QUANTITY_FIELD;
use crate::types::{ActionOutcome, ActionType};

/// Error code for plans built for a different tenant.
pub const TENANT_MISMATCH_CODE: &str = "TENANT_MISMATCH";

/// Result of one repair action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairResult {
    pub action_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_id: Option<String>,
    pub action: RepairAction,
    pub action_type: ActionType,
    pub outcome: ActionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_state: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_state: Option<JsonValue>,
    pub dry_run: bool,
    pub executed_at: DateTime<Utc>,
}

impl RepairResult {
    fn new(item: &PlannedAction, outcome: ActionOutcome, dry_run: bool) -> Self {
        Self {
            action_key: item.key(),
            finding_id: item.finding_id.clone(),
            action: item.action.clone(),
            action_type: item.action.action_type(),
            outcome,
            error_code: None,
            error_message: None,
            before_state: item.before_state.clone(),
            after_state: None,
            dry_run,
            executed_at: Utc::now(),
        }
    }

    /// Create a successful result.
    pub fn success(item: &PlannedAction, dry_run: bool) -> Self {
        Self::new(item, ActionOutcome::Succeeded, dry_run)
    }

    /// Create a result for a record that was already gone.
    pub fn already_absent(item: &PlannedAction) -> Self {
        Self::new(item, ActionOutcome::AlreadyAbsent, false)
    }

    /// Create a failure result.
    pub fn failure(
        item: &PlannedAction,
        error_code: impl Into<String>,
        message: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        let mut result = Self::new(item, ActionOutcome::Failed, dry_run);
        result.error_code = Some(error_code.into());
        result.error_message = Some(message.into());
        result
    }

    fn from_store_error(item: &PlannedAction, error: &StoreError, dry_run: bool) -> Self {
        Self::failure(item, error.error_code(), error.to_string(), dry_run)
    }

    /// Add after state.
    pub fn with_after_state(mut self, state: JsonValue) -> Self {
        self.after_state = Some(state);
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn is_failure(&self) -> bool {
        !self.outcome.is_success()
    }
}

/// Per-action-type counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    pub succeeded: usize,
    pub failed: usize,
}

/// Totals of a repair run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairSummary {
    pub total: usize,
    /// Successes, including already-absent records.
    pub succeeded: usize,
    pub failed: usize,
    pub already_absent: usize,
    pub by_action: BTreeMap<ActionType, ActionCounts>,
}

impl RepairSummary {
    /// Summarize results.
    pub fn from_results(results: &[RepairResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            let counts = summary.by_action.entry(result.action_type).or_default();
            if result.is_success() {
                counts.succeeded += 1;
                summary.succeeded += 1;
            } else {
                counts.failed += 1;
                summary.failed += 1;
            }
            if result.outcome == ActionOutcome::AlreadyAbsent {
                summary.already_absent += 1;
            }
        }
        summary
    }

    /// Counters for one action type.
    #[must_use]
    pub fn counts(&self, action_type: ActionType) -> ActionCounts {
        self.by_action.get(&action_type).copied().unwrap_or_default()
    }
}

/// Report of one repair run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairReport {
    pub run_id: RepairRunId,
    pub tenant: TenantId,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub results: Vec<RepairResult>,
    pub summary: RepairSummary,
}

impl RepairReport {
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0
    }

    /// Failed results only.
    pub fn failures(&self) -> impl Iterator<Item = &RepairResult> {
        self.results.iter().filter(|r| r.is_failure())
    }
}

/// Would-be effect of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewItem {
    pub action_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_id: Option<String>,
    pub action_type: ActionType,
    pub entity: String,
    pub record_id: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_state: Option<JsonValue>,
    /// `None` when the record would be deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_state: Option<JsonValue>,
}

/// Counts for a preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSummary {
    pub total: usize,
    pub by_action: BTreeMap<ActionType, usize>,
    pub by_entity: BTreeMap<String, usize>,
}

/// Dry-run description of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairPreview {
    pub plan_id: RepairRunId,
    pub tenant: TenantId,
    pub items: Vec<PreviewItem>,
    pub summary: PreviewSummary,
}

/// Applies repair plans through resolved accessors.
#[derive(Debug, Clone)]
pub struct RepairExecutor {
    tenant: TenantId,
    accessors: AccessorRegistry,
}

impl RepairExecutor {
    /// Create an executor scoped to one tenant.
    pub fn new(tenant: TenantId, accessors: AccessorRegistry) -> Self {
        Self { tenant, accessors }
    }

    /// Describe what `plan` would do without touching the store.
    pub fn preview(&self, plan: &RepairPlan) -> RepairPreview {
        let items: Vec<PreviewItem> = plan.items().iter().map(preview_item).collect();

        let mut summary = PreviewSummary {
            total: items.len(),
            ..PreviewSummary::default()
        };
        for item in &items {
            *summary.by_action.entry(item.action_type).or_insert(0) += 1;
            *summary.by_entity.entry(item.entity.clone()).or_insert(0) += 1;
        }

        RepairPreview {
            plan_id: plan.id,
            tenant: plan.tenant.clone(),
            items,
            summary,
        }
    }

    /// Execute every action in order, continuing past failures.
    pub async fn execute(&self, plan: &RepairPlan) -> RepairReport {
        self.run(plan, false).await
    }

    /// Walk the plan without mutating anything. Actions whose entity cannot
    /// be resolved fail exactly as they would for real.
    pub async fn execute_dry_run(&self, plan: &RepairPlan) -> RepairReport {
        self.run(plan, true).await
    }

    #[instrument(
        skip(self, plan),
        fields(tenant_id = %self.tenant, plan_id = %plan.id, actions = plan.len())
    )]
    async fn run(&self, plan: &RepairPlan, dry_run: bool) -> RepairReport {
        let started_at = Utc::now();
        tracing::info!(dry_run, "Executing repair plan");

        let mut results = Vec::with_capacity(plan.len());
        if plan.tenant != self.tenant {
            tracing::error!(
                plan_tenant = %plan.tenant,
                "Repair plan belongs to another tenant, refusing every action"
            );
            let message = format!(
                "plan built for tenant {} cannot run in tenant {}",
                plan.tenant, self.tenant
            );
            results.extend(plan.items().iter().map(|item| {
                RepairResult::failure(item, TENANT_MISMATCH_CODE, message.clone(), dry_run)
            }));
        } else {
            for item in plan.items() {
                results.push(self.apply(item, dry_run).await);
            }
        }

        let summary = RepairSummary::from_results(&results);
        tracing::info!(
            dry_run,
            succeeded = summary.succeeded,
            failed = summary.failed,
            already_absent = summary.already_absent,
            "Repair plan finished"
        );

        RepairReport {
            run_id: plan.id,
            tenant: self.tenant.clone(),
            dry_run,
            started_at,
            completed_at: Utc::now(),
            results,
            summary,
        }
    }

    async fn apply(&self, item: &PlannedAction, dry_run: bool) -> RepairResult {
        let action = &item.action;
        let accessor = match self.accessors.get(action.entity()) {
            Ok(accessor) => accessor,
            Err(e) => {
                tracing::warn!(action = %item.key(), error = %e, "Repair action has no accessor");
                return RepairResult::from_store_error(item, &e, dry_run);
            }
        };

        if dry_run {
            let result = RepairResult::success(item, true);
            return match after_state(action) {
                Some(state) => result.with_after_state(state),
                None => result,
            };
        }

        match action {
            RepairAction::DeleteRecord { id, .. } | RepairAction::MergeDuplicate { loser_id: id } => {
                match accessor.delete(&self.tenant, id).await {
                    Ok(()) => {
                        tracing::debug!(action = %item.key(), "Record deleted");
                        RepairResult::success(item, false)
                    }
                    Err(e) if e.is_not_found() => {
                        tracing::info!(
                            action = %item.key(),
                            "Record not found during delete - treating as success"
                        );
                        RepairResult::already_absent(item)
                    }
                    Err(e) => {
                        tracing::warn!(action = %item.key(), error = %e, "Delete failed");
                        RepairResult::from_store_error(item, &e, false)
                    }
                }
            }
            RepairAction::ResyncAggregate {
                product_id,
                new_quantity,
            } => {
                let mut fields = Fields::new();
                fields.insert(STOCK_QUANTITY_FIELD.to_string(), quantity_value(*new_quantity));
                match accessor.update(&self.tenant, product_id, fields).await {
                    Ok(updated) => {
                        tracing::debug!(action = %item.key(), "Stock aggregate resynced");
                        let state = updated
                            .get(STOCK_QUANTITY_FIELD)
                            .cloned()
                            .unwrap_or(JsonValue::Null);
                        RepairResult::success(item, false).with_after_state(stock_state(state))
                    }
                    Err(e) => {
                        tracing::warn!(action = %item.key(), error = %e, "Resync failed");
                        RepairResult::from_store_error(item, &e, false)
                    }
                }
            }
        }
    }
}

fn preview_item(item: &PlannedAction) -> PreviewItem {
    let action = &item.action;
    let description = match action {
        RepairAction::DeleteRecord { entity, id } => format!("delete {entity} {id}"),
        RepairAction::ResyncAggregate {
            product_id,
            new_quantity,
        } => format!("set Product {product_id} stock_quantity to {new_quantity}"),
        RepairAction::MergeDuplicate { loser_id } => {
            format!("delete duplicate StockLevel {loser_id}")
        }
    };
    PreviewItem {
        action_key: item.key(),
        finding_id: item.finding_id.clone(),
        action_type: action.action_type(),
        entity: action.entity().to_string(),
        record_id: action.record_id().to_string(),
        description,
        before_state: item.before_state.clone(),
        after_state: after_state(action),
    }
}

fn after_state(action: &RepairAction) -> Option<JsonValue> {
    match action {
        RepairAction::ResyncAggregate { new_quantity, .. } => {
            Some(stock_state(quantity_value(*new_quantity)))
        }
        RepairAction::DeleteRecord { .. } | RepairAction::MergeDuplicate { .. } => None,
    }
}

fn stock_state(quantity: JsonValue) -> JsonValue {
    let mut state = Fields::new();
    state.insert(STOCK_QUANTITY_FIELD.to_string(), quantity);
    JsonValue::Object(state)
}

/// Whole quantities are written as integers.
#[allow(clippy::cast_possible_truncation)]
fn quantity_value(quantity: f64) -> JsonValue {
    if quantity.fract() == 0.0 && quantity.abs() < 9.0e15 {
        json!(quantity as i64)
    } else {
        json!(quantity)
    }
}
