//! Preview the repairs for selected findings

use bizdesk_integrity::RepairPreview;
use clap::Args;

use super::scan::print_scan_warnings;
use super::{open_engine, DatasetArgs, SelectionArgs};
use crate::error::CliResult;
use crate::output::{print_info, print_section, render_table, truncate, OutputFormat};

/// Show what a repair would change without touching the data
#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Output format (csv is treated as table)
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Execute the preview command
pub async fn execute(args: PreviewArgs) -> CliResult<()> {
    let (engine, tenant) = open_engine(&args.dataset)?;
    let report = engine.scan(&tenant).await?;
    let plan = args.selection.plan(&tenant, &report)?;
    let preview = engine.preview(&tenant, &plan);

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
        return Ok(());
    }

    print_scan_warnings(&report);
    if preview.items.is_empty() {
        print_info("Nothing to repair.");
        return Ok(());
    }

    print_section("Repair Preview");
    print!("{}", render_preview(&preview));
    Ok(())
}

/// Preview as a table followed by per-action totals.
pub fn render_preview(preview: &RepairPreview) -> String {
    let rows: Vec<Vec<String>> = preview
        .items
        .iter()
        .map(|item| {
            vec![
                item.action_key.clone(),
                item.finding_id.clone().unwrap_or_else(|| "-".to_string()),
                truncate(&item.description, 60),
            ]
        })
        .collect();

    let mut out = render_table(&["ACTION", "FINDING", "CHANGE"], &rows);
    out.push('\n');

    let totals: Vec<String> = preview
        .summary
        .by_action
        .iter()
        .map(|(action, count)| format!("{count} {action}"))
        .collect();
    out.push_str(&format!(
        "{} action(s): {}\n",
        preview.summary.total,
        totals.join(", ")
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdesk_core::TenantId;
    use bizdesk_integrity::{IntegrityEngine, RepairAction, RepairPlan};
    use bizdesk_store::{InMemoryStore, Record};
    use serde_json::json;

    #[test]
    fn test_render_preview_lists_actions_and_totals() {
        let tenant = TenantId::new("org-1").unwrap();
        let store = InMemoryStore::new().with_records(
            "Attendance",
            vec![Record::from_json(json!({"id": "A2", "organisation_id": "org-1"})).unwrap()],
        );
        let engine = IntegrityEngine::with_defaults(store);
        let plan = RepairPlan::from_actions(
            tenant.clone(),
            [
                RepairAction::DeleteRecord {
                    entity: "Attendance".to_string(),
                    id: "A2".to_string(),
                },
                RepairAction::DeleteRecord {
                    entity: "Attendance".to_string(),
                    id: "A3".to_string(),
                },
            ],
        );

        let rendered = render_preview(&engine.preview(&tenant, &plan));
        assert!(rendered.contains("delete:Attendance:A2"));
        assert!(rendered.contains("delete:Attendance:A3"));
        assert!(rendered.contains("2 action(s): 2 delete_record"));
    }
}
