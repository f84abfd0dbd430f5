//! Scan a tenant for integrity findings

use bizdesk_integrity::{ReportGenerator, ScanReport, ScanStatus};
use clap::Args;

use super::{open_engine, DatasetArgs};
use crate::error::CliResult;
use crate::output::{
    format_quantity, print_field, print_info, print_section, print_status, print_success, print_warning,
    render_table, truncate, OutputFormat,
};

/// Fetch failure code for entity types the store does not have.
const UNDEPLOYED_CODE: &str = "UNKNOWN_ENTITY";

/// Scan a tenant for integrity findings
#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Execute the scan command
pub async fn execute(args: ScanArgs) -> CliResult<()> {
    let (engine, tenant) = open_engine(&args.dataset)?;
    let report = engine.scan(&tenant).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Csv => {
            print!(
                "{}",
                ReportGenerator::generate_csv(&ReportGenerator::csv_rows(&report.findings))
            );
        }
        OutputFormat::Table => print_scan(&report),
    }
    Ok(())
}

/// Print a scan report for humans.
pub fn print_scan(report: &ScanReport) {
    print_section("Integrity Scan");
    print_field("Tenant", report.tenant.as_str());
    print_field("Run", &report.run_id.to_string());
    print_status(report.status);
    print_field(
        "Records loaded",
        &report.statistics.records_loaded.to_string(),
    );
    print_field("Duration", &format!("{} ms", report.statistics.duration_ms));
    println!();

    print_scan_warnings(report);

    if report.summary.is_clean() {
        if report.status.is_complete() {
            print_success("No integrity issues found.");
        } else {
            print_warning("No issues found in the data that loaded; the scan was incomplete.");
        }
        return;
    }

    print!("{}", render_findings(report));
    println!();
    print_info(&format!(
        "{} repair action(s) suggested. Run 'bizdesk-integrity preview --all' to review them.",
        report.summary.suggested_actions
    ));
}

/// Warn about anything the scan could not see.
pub fn print_scan_warnings(report: &ScanReport) {
    match report.status {
        ScanStatus::Completed => {}
        ScanStatus::Partial => print_warning("Scan is partial; some entities could not be read."),
        ScanStatus::TimedOut => {
            print_warning("Scan hit its deadline; results cover only what loaded in time.")
        }
    }
    let (undeployed, failed): (Vec<_>, Vec<_>) = report
        .fetch_failures
        .iter()
        .partition(|f| f.error_code == UNDEPLOYED_CODE);
    if !undeployed.is_empty() {
        let names: Vec<&str> = undeployed.iter().map(|f| f.entity.as_str()).collect();
        print_warning(&format!(
            "Not present in this dataset (counted as empty): {}",
            names.join(", ")
        ));
    }
    for failure in failed {
        print_warning(&format!(
            "{}: {} ({})",
            failure.entity, failure.message, failure.error_code
        ));
    }
    for skipped in &report.skipped_checks {
        print_warning(&format!("Skipped {}: {}", skipped.check, skipped.reason));
    }
}

/// Findings as tables, one per kind that has anything to show.
pub fn render_findings(report: &ScanReport) -> String {
    let findings = &report.findings;
    let mut out = String::new();

    if !findings.orphans.is_empty() {
        let rows: Vec<Vec<String>> = findings
            .orphans
            .iter()
            .map(|f| {
                vec![
                    f.id.clone(),
                    f.parent_entity.to_string(),
                    f.records.len().to_string(),
                    f.total_records_in_entity.to_string(),
                    truncate(
                        &f.records
                            .iter()
                            .filter_map(|r| r.label.as_deref().or(r.id.as_deref()))
                            .collect::<Vec<_>>()
                            .join(", "),
                        40,
                    ),
                ]
            })
            .collect();
        out.push_str(&format!("Orphaned records ({}):\n", report.summary.orphan_records));
        out.push_str(&render_table(
            &["FINDING", "PARENT", "ORPHANS", "OF", "RECORDS"],
            &rows,
        ));
        out.push('\n');
    }

    if !findings.stock_mismatches.is_empty() {
        let rows: Vec<Vec<String>> = findings
            .stock_mismatches
            .iter()
            .map(|m| {
                vec![
                    m.id.clone(),
                    truncate(m.product_label.as_deref().unwrap_or(&m.product_id), 30),
                    format_quantity(m.recorded_quantity),
                    format_quantity(m.calculated_quantity),
                    format_delta(m.delta),
                ]
            })
            .collect();
        out.push_str(&format!(
            "Stock mismatches ({}):\n",
            report.summary.stock_mismatches
        ));
        out.push_str(&render_table(
            &["FINDING", "PRODUCT", "RECORDED", "CALCULATED", "DELTA"],
            &rows,
        ));
        out.push('\n');
    }

    if !findings.duplicates.is_empty() {
        let rows: Vec<Vec<String>> = findings
            .duplicates
            .iter()
            .map(|g| {
                vec![
                    g.id.clone(),
                    g.survivor.id.clone().unwrap_or_else(|| "-".to_string()),
                    g.duplicates
                        .iter()
                        .filter_map(|d| d.id.as_deref())
                        .collect::<Vec<_>>()
                        .join(", "),
                ]
            })
            .collect();
        out.push_str(&format!(
            "Duplicate stock levels ({}):\n",
            report.summary.duplicate_rows
        ));
        out.push_str(&render_table(&["FINDING", "KEEP", "REMOVE"], &rows));
        out.push('\n');
    }

    out
}

fn format_delta(delta: f64) -> String {
    if delta >= 0.0 {
        format!("+{}", format_quantity(delta))
    } else {
        format_quantity(delta)
    }
}
