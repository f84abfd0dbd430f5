//! Integrity Scan Tests
//!
//! End-to-end scans through `IntegrityEngine` covering:
//! - Orphan detection against the built-in relationships
//! - Stock reconciliation and duplicate detection
//! - Partial availability: missing entities, failing fetches, the deadline
//! - Bounded fetch concurrency

mod common;

use std::time::Duration;

use bizdesk_integrity::{
    FindingKind, IntegrityConfig, IntegrityEngine, IntegrityError, RelationshipRegistry,
    ScanStatus, SnapshotError,
};
use bizdesk_store::InMemoryStore;
use common::{attendance_dataset, row, stock_dataset, tenant, MockFailure, MockStore};
use serde_json::Value;

fn engine(store: MockStore) -> IntegrityEngine<MockStore> {
    IntegrityEngine::with_defaults(store)
}

fn engine_with(store: MockStore, config: IntegrityConfig) -> IntegrityEngine<MockStore> {
    IntegrityEngine::new(store, RelationshipRegistry::builtin(), config).unwrap()
}

// =============================================================================
// Orphans
// =============================================================================

#[tokio::test]
async fn test_single_attendance_orphan() {
    common::init_test_logging();
    let report = engine(MockStore::new(attendance_dataset()))
        .scan(&tenant())
        .await
        .unwrap();

    assert_eq!(report.findings.orphans.len(), 1);
    let finding = report
        .findings
        .orphan("Attendance", "employee_id")
        .expect("attendance finding");
    assert_eq!(finding.id, "orphan:Attendance.employee_id");
    assert_eq!(finding.total_records_in_entity, 2);
    assert_eq!(finding.records.len(), 1);
    assert_eq!(finding.records[0].id.as_deref(), Some("A2"));
    assert_eq!(finding.records[0].foreign_key, "E2");
    assert_eq!(finding.records[0].label.as_deref(), Some("Monday"));

    assert_eq!(report.summary.orphan_records, 1);
    assert_eq!(report.statistics.finding_count(FindingKind::Orphan), 1);
}

#[tokio::test]
async fn test_unset_foreign_keys_are_not_orphans() {
    let store = InMemoryStore::new()
        .with_records("Customer", vec![row("C1")])
        .with_records(
            "Sale",
            vec![
                row("S1").with("customer_id", Value::Null),
                row("S2").with("customer_id", ""),
                row("S3"),
                row("S4").with("customer_id", "C1"),
            ],
        );
    let report = engine(MockStore::new(store)).scan(&tenant()).await.unwrap();

    assert!(report.findings.orphan("Sale", "customer_id").is_none());
    assert!(report.findings.orphans.is_empty());
}

#[tokio::test]
async fn test_secondary_rules_on_parent_entities() {
    let store = InMemoryStore::new()
        .with_records("Warehouse", vec![row("W1")])
        .with_records(
            "Vehicle",
            vec![
                row("V1").with("parent_warehouse_id", "W1"),
                row("V2").with("parent_warehouse_id", "W9"),
            ],
        )
        .with_records("Trip", vec![row("T1").with("vehicle_id", "V2")]);
    let report = engine(MockStore::new(store)).scan(&tenant()).await.unwrap();

    let finding = report
        .findings
        .orphan("Vehicle", "parent_warehouse_id")
        .unwrap();
    assert_eq!(finding.variant_tag.as_deref(), Some("secondary"));
    assert_eq!(finding.records[0].id.as_deref(), Some("V2"));
    // V2 is itself a valid parent for trips.
    assert!(report.findings.orphan("Trip", "vehicle_id").is_none());
}

#[tokio::test]
async fn test_scan_is_idempotent() {
    let engine = engine(MockStore::new(attendance_dataset()));
    let first = engine.scan(&tenant()).await.unwrap();
    let second = engine.scan(&tenant()).await.unwrap();

    assert_eq!(first.findings, second.findings);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_other_tenants_are_invisible() {
    let store = attendance_dataset();
    store.insert(
        "Employee",
        bizdesk_store::Record::new()
            .with("id", "E2")
            .with("organisation_id", "org-2"),
    );
    let report = engine(MockStore::new(store)).scan(&tenant()).await.unwrap();

    // E2 exists, but in another tenant.
    assert!(report.findings.orphan("Attendance", "employee_id").is_some());
}

// =============================================================================
// Stock
// =============================================================================

#[tokio::test]
async fn test_stock_mismatch_detected() {
    let report = engine(MockStore::new(stock_dataset()))
        .scan(&tenant())
        .await
        .unwrap();

    assert_eq!(report.findings.stock_mismatches.len(), 1);
    let mismatch = &report.findings.stock_mismatches[0];
    assert_eq!(mismatch.id, "stock:P1");
    assert!((mismatch.recorded_quantity - 9.0).abs() < f64::EPSILON);
    assert!((mismatch.calculated_quantity - 10.0).abs() < f64::EPSILON);
    assert!((mismatch.delta - 1.0).abs() < f64::EPSILON);
    assert!(report.findings.duplicates.is_empty());
}

#[tokio::test]
async fn test_duplicate_pair_yields_one_candidate() {
    let store = InMemoryStore::new()
        .with_records("Product", vec![row("P1").with("stock_quantity", 2)])
        .with_records("Warehouse", vec![row("W1")])
        .with_records(
            "StockLevel",
            vec![
                row("L1").with("product_id", "P1").with("warehouse_id", "W1").with("quantity", 1),
                row("L2").with("product_id", "P1").with("warehouse_id", "W1").with("quantity", 1),
            ],
        );
    let report = engine(MockStore::new(store)).scan(&tenant()).await.unwrap();

    assert_eq!(report.findings.duplicates.len(), 1);
    let group = &report.findings.duplicates[0];
    assert_eq!(group.composite_key, "P1-W1");
    assert_eq!(group.survivor.id.as_deref(), Some("L1"));
    assert_eq!(group.duplicates.len(), 1);
    assert_eq!(group.duplicates[0].id.as_deref(), Some("L2"));
}

// =============================================================================
// Partial availability
// =============================================================================

#[tokio::test]
async fn test_undeployed_entities_make_scan_partial() {
    let report = engine(MockStore::new(attendance_dataset()))
        .scan(&tenant())
        .await
        .unwrap();

    assert_eq!(report.status, ScanStatus::Partial);
    assert!(report
        .fetch_failures
        .iter()
        .any(|f| f.entity == "Payroll" && f.error_code == "UNKNOWN_ENTITY"));
    assert!(report.statistics.entities_failed > 0);
}

#[tokio::test]
async fn test_child_fetch_failure_does_not_abort() {
    let store = attendance_dataset().with_records(
        "Sale",
        vec![row("S1").with("employee_id", "E7")],
    );
    let store = MockStore::new(store).with_list_error("Attendance", MockFailure::Unavailable);
    let report = engine(store).scan(&tenant()).await.unwrap();

    assert_eq!(report.status, ScanStatus::Partial);
    let failure = report
        .fetch_failures
        .iter()
        .find(|f| f.entity == "Attendance")
        .unwrap();
    assert_eq!(failure.error_code, "STORE_UNAVAILABLE");
    assert!(report.findings.orphan("Attendance", "employee_id").is_none());
    assert!(report.findings.orphan("Sale", "employee_id").is_some());
}

#[tokio::test]
async fn test_parent_fetch_failure_fails_scan() {
    let store =
        MockStore::new(attendance_dataset()).with_list_error("Employee", MockFailure::Unavailable);
    let err = engine(store).scan(&tenant()).await.unwrap_err();

    match err {
        IntegrityError::Snapshot(SnapshotError::DependencyUnavailable { entity, source }) => {
            assert_eq!(entity, "Employee");
            assert!(source.is_transient());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_deadline_returns_partial_findings() {
    let store = attendance_dataset()
        .with_records("Vehicle", vec![row("V1")])
        .with_records("Trip", vec![row("T1").with("vehicle_id", "V404")]);
    let store = MockStore::new(store).with_delay("Trip", Duration::from_secs(30));
    let config = IntegrityConfig {
        scan_timeout_secs: 1,
        ..IntegrityConfig::default()
    };

    let report = engine_with(store, config).scan(&tenant()).await.unwrap();

    assert_eq!(report.status, ScanStatus::TimedOut);
    assert!(report.findings.orphan("Attendance", "employee_id").is_some());
    assert!(report.findings.orphan("Trip", "vehicle_id").is_none());

    let skipped: Vec<_> = report
        .skipped_checks
        .iter()
        .map(|s| s.check.as_str())
        .collect();
    assert!(skipped.contains(&"Trip.vehicle_id"));
    assert!(skipped.contains(&"Trip.driver_id"));
    assert!(report
        .fetch_failures
        .iter()
        .any(|f| f.entity == "Trip" && f.error_code == "SCAN_TIMEOUT"));
}

#[tokio::test]
async fn test_fetch_concurrency_is_bounded() {
    let store = MockStore::new(attendance_dataset().with_records("Customer", vec![row("C1")]))
        .with_delay("Employee", Duration::from_millis(20))
        .with_delay("Attendance", Duration::from_millis(20))
        .with_delay("Customer", Duration::from_millis(20));
    let config = IntegrityConfig {
        fetch_concurrency: 2,
        ..IntegrityConfig::default()
    };

    let engine = engine_with(store.clone(), config);
    engine.scan(&tenant()).await.unwrap();

    assert_eq!(store.list_calls(), 3);
    assert_eq!(store.max_in_flight(), 2);
}
