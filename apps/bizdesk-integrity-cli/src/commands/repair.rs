//! Repair selected findings and verify the result

use bizdesk_core::TenantId;
use bizdesk_integrity::{
    ActionType, ConvergenceReport, IntegrityEngine, RepairPlan, RepairReport, ScanReport,
    ScanStatus,
};
use bizdesk_store::EntityStore;
use clap::Args;
use dialoguer::Confirm;
use serde::Serialize;

use super::preview::render_preview;
use super::scan::print_scan_warnings;
use super::{open_engine, DatasetArgs, SelectionArgs};
use crate::error::{CliError, CliResult};
use crate::output::{
    outcome_tag, print_info, print_section, print_success, print_warning, render_table,
    OutputFormat,
};

/// Repair selected findings and re-scan to verify
#[derive(Args, Debug)]
pub struct RepairArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Walk the plan without changing the dataset
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Output format (csv is treated as table)
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Machine-readable result of a repair run.
#[derive(Debug, Serialize)]
struct RepairOutput<'a> {
    repair: &'a RepairReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    rescan_status: Option<ScanStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    convergence: Option<&'a ConvergenceReport>,
}

/// Execute the repair command
pub async fn execute(args: RepairArgs) -> CliResult<()> {
    let json = args.format == OutputFormat::Json;
    let (engine, tenant) = open_engine(&args.dataset)?;

    let report = engine.scan(&tenant).await?;
    let plan = args.selection.plan(&tenant, &report)?;

    if plan.is_empty() {
        if json {
            println!("{}", serde_json::json!({ "actions": 0 }));
        } else {
            print_info("Nothing to repair.");
        }
        return Ok(());
    }

    if !json {
        print_scan_warnings(&report);
        print_section(if args.dry_run {
            "Repair Plan (dry run)"
        } else {
            "Repair Plan"
        });
        print!("{}", render_preview(&engine.preview(&tenant, &plan)));
        println!();
    }

    if args.dry_run {
        let repair = engine.repair_dry_run(&tenant, &plan).await;
        emit(json, &repair, None, None)?;
        return finish(&repair);
    }

    // Confirm before applying (unless --yes is passed)
    if !args.yes {
        if !atty::is(atty::Stream::Stdin) {
            return Err(CliError::Validation(
                "Cannot confirm in non-interactive mode. Use --yes to skip confirmation."
                    .to_string(),
            ));
        }

        let confirm = Confirm::new()
            .with_prompt(format!(
                "Apply {} repair action(s) to tenant {}?",
                plan.len(),
                tenant
            ))
            .default(false)
            .interact()
            .map_err(|e| CliError::Io(e.to_string()))?;

        if !confirm {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let (repair, verified) =
        apply(&engine, &tenant, &plan, &report, |store| Ok(store.save()?)).await;

    match verified {
        Ok((rescan, convergence)) => {
            emit(json, &repair, Some(rescan.status), Some(&convergence))?;
            finish(&repair)
        }
        Err(e) => {
            emit(json, &repair, None, None)?;
            Err(e)
        }
    }
}

/// Execute the plan, persist the store, then re-scan and compare.
///
/// Persisting happens before the re-scan so a failed verification never
/// discards applied repairs. The repair report is returned either way.
async fn apply<S, F>(
    engine: &IntegrityEngine<S>,
    tenant: &TenantId,
    plan: &RepairPlan,
    before: &ScanReport,
    persist: F,
) -> (RepairReport, CliResult<(ScanReport, ConvergenceReport)>)
where
    S: EntityStore,
    F: FnOnce(&S) -> CliResult<()>,
{
    let repair = engine.repair(tenant, plan).await;

    if let Err(e) = persist(engine.store()) {
        tracing::error!(error = %e, "Failed to persist repaired dataset");
        return (repair, Err(e));
    }

    let verified = match engine.scan(tenant).await {
        Ok(rescan) => {
            let convergence = ConvergenceReport::compare(plan, before, &rescan);
            Ok((rescan, convergence))
        }
        Err(e) => Err(CliError::from(e)),
    };
    (repair, verified)
}

fn emit(
    json: bool,
    repair: &RepairReport,
    rescan_status: Option<ScanStatus>,
    convergence: Option<&ConvergenceReport>,
) -> CliResult<()> {
    if json {
        let output = RepairOutput {
            repair,
            rescan_status,
            convergence,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print!("{}", render_results(repair));
    if let Some(convergence) = convergence {
        println!();
        print_convergence(convergence, rescan_status);
    }
    Ok(())
}

fn finish(repair: &RepairReport) -> CliResult<()> {
    if repair.has_failures() {
        return Err(CliError::RepairFailed {
            failed: repair.summary.failed,
        });
    }
    Ok(())
}

/// Per-action counts followed by every failure.
pub fn render_results(repair: &RepairReport) -> String {
    let rows: Vec<Vec<String>> = [
        ActionType::DeleteRecord,
        ActionType::ResyncAggregate,
        ActionType::MergeDuplicate,
    ]
    .into_iter()
    .filter(|action| repair.summary.by_action.contains_key(action))
    .map(|action| {
        let counts = repair.summary.counts(action);
        vec![
            action.to_string(),
            counts.succeeded.to_string(),
            counts.failed.to_string(),
        ]
    })
    .collect();

    let mut out = render_table(&["ACTION", "SUCCEEDED", "FAILED"], &rows);
    out.push_str(&format!(
        "\n{} succeeded ({} already absent), {} failed{}\n",
        repair.summary.succeeded,
        repair.summary.already_absent,
        repair.summary.failed,
        if repair.dry_run { " [dry run]" } else { "" }
    ));

    for failure in repair.failures() {
        out.push_str(&format!(
            "  {} {}: {} ({})\n",
            outcome_tag(failure.outcome, false),
            failure.action_key,
            failure.error_message.as_deref().unwrap_or("unknown error"),
            failure.error_code.as_deref().unwrap_or("-")
        ));
    }
    out
}

fn print_convergence(convergence: &ConvergenceReport, rescan_status: Option<ScanStatus>) {
    if let Some(status) = rescan_status.filter(|s| !s.is_complete()) {
        print_warning(&format!("Verification scan was {status}; results may be incomplete."));
    }

    if convergence.converged() {
        print_success(&format!(
            "Verified: {} finding(s) no longer flagged.",
            convergence.items.len()
        ));
    } else {
        print_warning(&format!(
            "{} targeted record(s) are still flagged after repair.",
            convergence.remaining()
        ));
        for item in convergence.items.iter().filter(|i| i.remaining > 0) {
            println!(
                "  {}: {} of {} still flagged",
                item.finding_id, item.remaining, item.targeted
            );
        }
    }

    if !convergence.new_findings.is_empty() {
        print_info(&format!(
            "New findings since the first scan: {}",
            convergence.new_findings.join(", ")
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_integrity::{RepairAction, RepairSelection};
    use bizdesk_store::{InMemoryStore, Record};
    use serde_json::json;

    fn delete(id: &str) -> RepairAction {
        RepairAction::DeleteRecord {
            entity: "Attendance".to_string(),
            id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_render_results_lists_failures() {
        let tenant = TenantId::new("org-1").unwrap();
        let store = InMemoryStore::new().with_records(
            "Attendance",
            vec![Record::from_json(json!({"id": "A2", "organisation_id": "org-1"})).unwrap()],
        );
        let engine = IntegrityEngine::with_defaults(store);
        let plan = RepairPlan::from_actions(
            tenant.clone(),
            [
                delete("A2"),
                delete("A9"),
                RepairAction::MergeDuplicate {
                    loser_id: "L2".to_string(),
                },
            ],
        );

        let repair = engine.repair(&tenant, &plan).await;
        let rendered = render_results(&repair);

        assert!(rendered.contains("delete_record"));
        assert!(rendered.contains("2 succeeded (1 already absent), 1 failed"));
        assert!(rendered.contains("FAILED merge:L2"));
        assert!(matches!(
            finish(&repair),
            Err(CliError::RepairFailed { failed: 1 })
        ));
    }

    #[tokio::test]
    async fn test_finish_ok_without_failures() {
        let tenant = TenantId::new("org-1").unwrap();
        let engine = IntegrityEngine::with_defaults(InMemoryStore::new().with_entity("Attendance"));
        let plan = RepairPlan::from_actions(tenant.clone(), [delete("A1")]);

        let repair = engine.repair_dry_run(&tenant, &plan).await;
        assert!(repair.dry_run);
        assert!(finish(&repair).is_ok());
        assert!(render_results(&repair).contains("[dry run]"));
    }

    fn record(value: serde_json::Value) -> Record {
        Record::from_json(value).unwrap()
    }

    fn orphaned_attendance() -> InMemoryStore {
        InMemoryStore::new()
            .with_records(
                "Employee",
                vec![record(json!({"id": "E1", "organisation_id": "org-1"}))],
            )
            .with_records(
                "Attendance",
                vec![
                    record(json!({"id": "A1", "organisation_id": "org-1", "employee_id": "E1"})),
                    record(json!({"id": "A2", "organisation_id": "org-1", "employee_id": "E9"})),
                ],
            )
    }

    #[tokio::test]
    async fn test_apply_persists_before_verifying() {
        let tenant = TenantId::new("org-1").unwrap();
        let engine = IntegrityEngine::with_defaults(orphaned_attendance());
        let before = engine.scan(&tenant).await.unwrap();
        let plan = RepairPlan::from_selection(
            tenant.clone(),
            &before.findings,
            &RepairSelection::new().with_finding("orphan:Attendance.employee_id"),
        )
        .unwrap();

        let mut persisted = Vec::new();
        let (repair, verified) = apply(&engine, &tenant, &plan, &before, |store| {
            persisted = store.records("Attendance");
            Ok(())
        })
        .await;

        assert_eq!(repair.summary.succeeded, 1);
        assert_eq!(persisted.len(), 1);
        let (rescan, convergence) = verified.unwrap();
        assert!(rescan.findings.orphans.is_empty());
        assert!(convergence.converged());
    }

    #[tokio::test]
    async fn test_apply_keeps_repair_report_when_persist_fails() {
        let tenant = TenantId::new("org-1").unwrap();
        let engine = IntegrityEngine::with_defaults(orphaned_attendance());
        let before = engine.scan(&tenant).await.unwrap();
        let plan = RepairPlan::repair_all(tenant.clone(), &before.findings);

        let (repair, verified) = apply(&engine, &tenant, &plan, &before, |_| {
            Err(CliError::Io("disk full".to_string()))
        })
        .await;

        assert_eq!(repair.summary.succeeded, 1);
        assert!(matches!(verified, Err(CliError::Io(_))));
    }
}
