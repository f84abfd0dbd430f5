//! Integrity engine orchestrator.
//!
//! Main entry point: scan a tenant, preview or execute a repair plan, and
//! re-scan to verify convergence. The engine holds no state between calls;
//! everything an operator selects travels in a [`RepairPlan`].

use std::sync::Arc;

use bizdesk_core::{ScanRunId, TenantId};
use bizdesk_store::{AccessorRegistry, EntityStore};
use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::instrument;

use crate::config::{ConfigError, IntegrityConfig};
use crate::duplicate::DuplicateDetector;
use crate::findings::{Findings, SkippedCheck};
use crate::orphan::{OrphanDetector, OrphanScan};
use crate::plan::{PlanError, RepairPlan};
use crate::registry::{RegistryError, RelationshipRegistry};
use crate::remediation::{RepairExecutor, RepairPreview, RepairReport};
use crate::report::{ConvergenceReport, ScanReport};
use crate::snapshot::{SnapshotError, SnapshotLoader, SnapshotRequest};
use crate::statistics::StatisticsTracker;
use crate::stock::StockReconciler;

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Result type for engine operations.
pub type IntegrityResult<T> = Result<T, IntegrityError>;

/// A repair together with the re-scan that verified it.
#[derive(Debug, Clone)]
pub struct VerifiedRepair {
    pub repair: RepairReport,
    pub rescan: ScanReport,
    pub convergence: ConvergenceReport,
}

/// Integrity engine over an entity store.
pub struct IntegrityEngine<S> {
    store: S,
    registry: Arc<RelationshipRegistry>,
    config: IntegrityConfig,
}

impl<S: EntityStore> IntegrityEngine<S> {
    /// Create an engine. Fails if the configuration is out of range.
    pub fn new(
        store: S,
        registry: RelationshipRegistry,
        config: IntegrityConfig,
    ) -> IntegrityResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            registry: Arc::new(registry),
            config,
        })
    }

    /// Engine with the built-in relationships and default configuration.
    pub fn with_defaults(store: S) -> Self {
        Self {
            store,
            registry: Arc::new(RelationshipRegistry::builtin()),
            config: IntegrityConfig::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &RelationshipRegistry {
        &self.registry
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    /// Scan one tenant.
    ///
    /// Only an unrecoverable parent fetch fails the scan. Everything else
    /// (missing entities, child fetch errors, the deadline, a crashed
    /// detector) is recorded in the report and the scan completes.
    #[instrument(skip(self), fields(tenant_id = %tenant))]
    pub async fn scan(&self, tenant: &TenantId) -> IntegrityResult<ScanReport> {
        let run_id = ScanRunId::new();
        let started_at = Utc::now();
        let deadline = Instant::now() + self.config.scan_timeout();
        let tracker = Arc::new(StatisticsTracker::new());

        tracing::info!(
            run_id = %run_id,
            rules = self.registry.len(),
            "Starting integrity scan"
        );

        let request = SnapshotRequest::for_registry(&self.registry);
        let accessors = AccessorRegistry::resolve(&self.store, request.entities());
        let snapshot = SnapshotLoader::new(accessors, self.config.fetch_concurrency)
            .with_tracker(Arc::clone(&tracker))
            .load(tenant, &request, Some(deadline))
            .await?;
        let snapshot = Arc::new(snapshot);

        let orphans = {
            let detector = OrphanDetector::new(self.config.label_fields.clone())
                .with_tracker(Arc::clone(&tracker));
            let registry = Arc::clone(&self.registry);
            let snapshot = Arc::clone(&snapshot);
            tokio::task::spawn_blocking(move || detector.detect(&registry, &snapshot))
        };
        let stock = {
            let detector = StockReconciler::new(
                self.config.stock_epsilon,
                self.config.label_fields.clone(),
            )
            .with_tracker(Arc::clone(&tracker));
            let snapshot = Arc::clone(&snapshot);
            tokio::task::spawn_blocking(move || detector.detect(&snapshot))
        };
        let duplicates = {
            let detector = DuplicateDetector::new().with_tracker(Arc::clone(&tracker));
            let snapshot = Arc::clone(&snapshot);
            tokio::task::spawn_blocking(move || detector.detect(&snapshot))
        };
        let (orphans, stock, duplicates) = tokio::join!(orphans, stock, duplicates);

        let mut skipped_checks = Vec::new();
        let OrphanScan {
            findings: orphans,
            skipped,
        } = orphans.unwrap_or_else(|e| {
            skipped_checks.push(crashed("orphan_detection", &e));
            OrphanScan::default()
        });
        skipped_checks.extend(skipped);

        let stock_mismatches = settle(stock, "stock_reconciliation", &mut skipped_checks);
        let duplicates = settle(duplicates, "duplicate_stock_levels", &mut skipped_checks);

        let findings = Findings {
            orphans,
            stock_mismatches,
            duplicates,
        };
        let fetch_failures = snapshot.failures().to_vec();
        let status = ScanReport::status_for(&fetch_failures, !snapshot.timed_out().is_empty());
        let summary = findings.summary();

        tracing::info!(
            run_id = %run_id,
            status = %status,
            orphan_records = summary.orphan_records,
            stock_mismatches = summary.stock_mismatches,
            duplicate_rows = summary.duplicate_rows,
            skipped_checks = skipped_checks.len(),
            "Integrity scan finished"
        );

        Ok(ScanReport {
            run_id,
            tenant: tenant.clone(),
            status,
            started_at,
            completed_at: Utc::now(),
            fetch_failures,
            skipped_checks,
            summary,
            findings,
            statistics: tracker.snapshot(),
        })
    }

    /// Executor for `tenant` with accessors for every entity `plan` touches.
    pub fn executor(&self, tenant: &TenantId, plan: &RepairPlan) -> RepairExecutor {
        let accessors =
            AccessorRegistry::resolve(&self.store, plan.items().iter().map(|i| i.action.entity()));
        RepairExecutor::new(tenant.clone(), accessors)
    }

    /// Describe a plan without executing it.
    pub fn preview(&self, tenant: &TenantId, plan: &RepairPlan) -> RepairPreview {
        self.executor(tenant, plan).preview(plan)
    }

    /// Execute a plan. Never fails as a whole; see the report for failures.
    pub async fn repair(&self, tenant: &TenantId, plan: &RepairPlan) -> RepairReport {
        self.executor(tenant, plan).execute(plan).await
    }

    /// Walk a plan without mutating the store.
    pub async fn repair_dry_run(&self, tenant: &TenantId, plan: &RepairPlan) -> RepairReport {
        self.executor(tenant, plan).execute_dry_run(plan).await
    }

    /// Execute a plan, re-scan with a fresh snapshot and compare the plan's
    /// targets against what is still flagged.
    #[instrument(skip(self, plan, before), fields(tenant_id = %tenant, plan_id = %plan.id))]
    pub async fn repair_and_verify(
        &self,
        tenant: &TenantId,
        plan: &RepairPlan,
        before: &ScanReport,
    ) -> IntegrityResult<VerifiedRepair> {
        let repair = self.repair(tenant, plan).await;
        let rescan = self.scan(tenant).await?;
        let convergence = ConvergenceReport::compare(plan, before, &rescan);

        if convergence.converged() {
            tracing::info!("Repair converged");
        } else {
            tracing::warn!(
                remaining = convergence.remaining(),
                "Targeted records still flagged after repair"
            );
        }

        Ok(VerifiedRepair {
            repair,
            rescan,
            convergence,
        })
    }
}

fn settle<T>(
    joined: Result<Result<Vec<T>, SkippedCheck>, JoinError>,
    check: &str,
    skipped_checks: &mut Vec<SkippedCheck>,
) -> Vec<T> {
    match joined {
        Ok(Ok(found)) => found,
        Ok(Err(skipped)) => {
            skipped_checks.push(skipped);
            Vec::new()
        }
        Err(e) => {
            skipped_checks.push(crashed(check, &e));
            Vec::new()
        }
    }
}

fn crashed(check: &str, error: &JoinError) -> SkippedCheck {
    tracing::error!(check = %check, error = %error, "Detector task failed");
    SkippedCheck {
        check: check.to_string(),
        reason: format!("detector task failed: {error}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RuleSpec;
    use bizdesk_store::{InMemoryStore, Record};

    fn row(id: &str) -> Record {
        Record::new().with("id", id).with("organisation_id", "org-1")
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = IntegrityConfig {
            fetch_concurrency: 0,
            ..IntegrityConfig::default()
        };
        let result = IntegrityEngine::new(
            InMemoryStore::new(),
            RelationshipRegistry::builtin(),
            config,
        );
        assert!(matches!(result, Err(IntegrityError::Config(_))));
    }

    #[tokio::test]
    async fn test_scan_with_custom_registry() {
        let registry = RelationshipRegistry::from_specs([RuleSpec {
            child_entity: "Trip".to_string(),
            parent_field: "vehicle_id".to_string(),
            parent_entity: "vehicle".to_string(),
            variant_tag: None,
        }])
        .unwrap();
        let store = InMemoryStore::new()
            .with_records("Vehicle", vec![row("V1")])
            .with_records(
                "Trip",
                vec![row("T1").with("vehicle_id", "V1"), row("T2").with("vehicle_id", "V2")],
            )
            .with_entity("Product")
            .with_entity("StockLevel");
        let engine = IntegrityEngine::new(store, registry, IntegrityConfig::default()).unwrap();

        let report = engine.scan(&TenantId::new("org-1").unwrap()).await.unwrap();
        assert_eq!(report.status, crate::types::ScanStatus::Completed);
        assert_eq!(report.summary.orphan_records, 1);
        assert_eq!(report.statistics.rules_evaluated, 3);
        assert!(report.skipped_checks.is_empty());
    }
}
