//! # Data Integrity Engine
//!
//! Cross-entity referential scanning and safe batch repair for the
//! multi-tenant business console.
//!
//! ## Overview
//!
//! The engine provides:
//! - Orphan detection across every `child.field -> parent.id` relationship
//!   declared in the [`RelationshipRegistry`]
//! - Stock reconciliation between `Product.stock_quantity` and the sum of its
//!   `StockLevel` rows
//! - Duplicate detection for `StockLevel` rows sharing a product+warehouse key
//! - Repair plans built from an explicit selection (or "repair all"), with a
//!   preview step before any mutation
//! - Sequential, continue-on-error repair with per-action outcomes
//! - Re-scan verification of what a repair fixed
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        IntegrityEngine                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  ┌───────────────┐    ┌───────────────┐    ┌───────────────┐        │
//! │  │  Relationship │───►│   Snapshot    │───►│    Orphan     │        │
//! │  │   Registry    │    │    Loader     │ ┌─►│   Detector    │        │
//! │  └───────────────┘    └───────────────┘ │  └───────────────┘        │
//! │                               │         │  ┌───────────────┐        │
//! │                               └─────────┼─►│     Stock     │        │
//! │                                         │  │  Reconciler   │        │
//! │                                         │  └───────────────┘        │
//! │                                         │  ┌───────────────┐        │
//! │                                         └─►│   Duplicate   │        │
//! │                                            │   Detector    │        │
//! │                                            └───────────────┘        │
//! │                                                    │                │
//! │                                                    ▼                │
//! │  ┌───────────────┐    ┌───────────────┐    ┌───────────────┐        │
//! │  │    Repair     │◄───│  RepairPlan   │◄───│   Findings    │        │
//! │  │   Executor    │    │  (selection)  │    │   + Report    │        │
//! │  └───────────────┘    └───────────────┘    └───────────────┘        │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use bizdesk_integrity::{IntegrityEngine, RepairPlan, RepairSelection};
//!
//! let engine = IntegrityEngine::with_defaults(store);
//!
//! // Scan one tenant
//! let report = engine.scan(&tenant).await?;
//!
//! // Build a frozen plan from the operator's selection
//! let selection = RepairSelection::new().with_finding("orphan:Attendance.employee_id");
//! let plan = RepairPlan::from_selection(tenant.clone(), &report.findings, &selection)?;
//!
//! // Preview, then execute and verify
//! let preview = engine.preview(&tenant, &plan);
//! let verified = engine.repair_and_verify(&tenant, &plan, &report).await?;
//! ```

pub mod config;
pub mod duplicate;
pub mod engine;
pub mod findings;
pub mod orphan;
pub mod plan;
pub mod registry;
pub mod remediation;
pub mod report;
pub mod snapshot;
pub mod statistics;
pub mod stock;
pub mod types;

// Re-export main types
pub use config::{ConfigError, IntegrityConfig};
pub use duplicate::DuplicateDetector;
pub use engine::{IntegrityEngine, IntegrityError, IntegrityResult, VerifiedRepair};
pub use findings::{
    DuplicateGroup, DuplicateRow, EntityOrphanSummary, Findings, FindingsSummary, OrphanFinding,
    OrphanRecord, SkippedCheck, StockMismatch, StockShare,
};
pub use orphan::{OrphanDetector, OrphanScan};
pub use plan::{PlanError, PlannedAction, RepairAction, RepairPlan, RepairSelection};
pub use registry::{ParentKind, RegistryError, RelationshipRegistry, RelationshipRule, RuleSpec};
pub use remediation::{
    ActionCounts, PreviewItem, PreviewSummary, RepairExecutor, RepairPreview, RepairReport,
    RepairResult, RepairSummary,
};
pub use report::{ConvergenceItem, ConvergenceReport, FindingCsvRow, ReportGenerator, ScanReport};
pub use snapshot::{
    EntitySnapshot, FetchFailure, SnapshotError, SnapshotLoader, SnapshotRequest, SnapshotResult,
};
pub use statistics::{ScanStatistics, StatisticsTracker};
pub use stock::StockReconciler;
pub use types::{ActionOutcome, ActionType, FindingKind, ScanStatus};
