//! CLI command implementations

pub mod preview;
pub mod repair;
pub mod rules;
pub mod scan;

use std::fs;
use std::path::{Path, PathBuf};

use bizdesk_core::TenantId;
use bizdesk_integrity::{
    IntegrityConfig, IntegrityEngine, RelationshipRegistry, RepairPlan, RepairSelection, RuleSpec,
    ScanReport,
};
use bizdesk_store::JsonFileStore;
use clap::Args;
use serde::Deserialize;

use crate::error::{CliError, CliResult};
use crate::output::print_warning;

/// Dataset and tenant shared by every data command.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Path to the JSON dataset
    #[arg(long, env = "BIZDESK_DATA")]
    pub data: PathBuf,

    /// Tenant (organisation) to operate on
    #[arg(long, env = "BIZDESK_TENANT")]
    pub tenant: String,

    /// YAML file replacing the built-in relationship rules
    #[arg(long, env = "BIZDESK_RULES")]
    pub rules: Option<PathBuf>,
}

/// Which findings or actions a repair targets.
#[derive(Args, Debug, Clone, Default)]
#[group(required = true, multiple = true)]
pub struct SelectionArgs {
    /// Repair every finding of the scan
    #[arg(long, conflicts_with_all = ["finding", "action"])]
    pub all: bool,

    /// Finding ID to repair (repeatable)
    #[arg(long = "finding", value_name = "ID")]
    pub finding: Vec<String>,

    /// Individual action key to repair (repeatable)
    #[arg(long = "action", value_name = "KEY")]
    pub action: Vec<String>,
}

impl SelectionArgs {
    /// Freeze the selected actions into a plan against `report`.
    pub fn plan(&self, tenant: &TenantId, report: &ScanReport) -> CliResult<RepairPlan> {
        if self.all {
            return Ok(RepairPlan::repair_all(tenant.clone(), &report.findings));
        }

        let mut selection = RepairSelection::new();
        for id in &self.finding {
            selection = selection.with_finding(id);
        }
        for key in &self.action {
            selection = selection.with_action(key);
        }
        Ok(RepairPlan::from_selection(
            tenant.clone(),
            &report.findings,
            &selection,
        )?)
    }
}

/// On-disk rules file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesFile {
    rules: Vec<RuleSpec>,
}

/// Built-in rules, or the rules in `path` when given.
pub fn load_registry(path: Option<&Path>) -> CliResult<RelationshipRegistry> {
    let Some(path) = path else {
        return Ok(RelationshipRegistry::builtin());
    };

    let raw = fs::read_to_string(path).map_err(|e| {
        CliError::Config(format!("Cannot read rules file {}: {e}", path.display()))
    })?;
    let file: RulesFile = serde_yaml::from_str(&raw)?;
    let registry = RelationshipRegistry::from_specs(file.rules)?;

    if registry.coalesced() > 0 {
        print_warning(&format!(
            "{} duplicate rule(s) in {} were ignored",
            registry.coalesced(),
            path.display()
        ));
    }
    tracing::debug!(path = %path.display(), rules = registry.len(), "Loaded rules file");
    Ok(registry)
}

/// Open the dataset and build an engine over it.
pub fn open_engine(args: &DatasetArgs) -> CliResult<(IntegrityEngine<JsonFileStore>, TenantId)> {
    let tenant: TenantId = args.tenant.parse()?;
    let registry = load_registry(args.rules.as_deref())?;
    let config = IntegrityConfig::from_env()?;
    let store = JsonFileStore::load(&args.data)?;
    let engine = IntegrityEngine::new(store, registry, config)?;
    Ok((engine, tenant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_registry_defaults_to_builtin() {
        let registry = load_registry(None).unwrap();
        assert_eq!(registry, RelationshipRegistry::builtin());
    }

    #[test]
    fn test_load_registry_from_yaml() {
        let file = write_temp(
            r#"
rules:
  - child_entity: Attendance
    parent_field: employee_id
    parent_entity: Employee
  - child_entity: LeaveRequest
    parent_field: approved_by
    parent_entity: employee
    variant_tag: approver
"#,
        );

        let registry = load_registry(Some(file.path())).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.rules()[1].variant_tag.as_deref(), Some("approver"));
    }

    #[test]
    fn test_load_registry_rejects_unknown_parent() {
        let file = write_temp(
            r#"
rules:
  - child_entity: Attendance
    parent_field: employee_id
    parent_entity: Contractor
"#,
        );

        let err = load_registry(Some(file.path())).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("Contractor"));
    }

    #[test]
    fn test_load_registry_missing_file() {
        let err = load_registry(Some(Path::new("/nonexistent/rules.yaml"))).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_open_engine_rejects_blank_tenant() {
        let file = write_temp("{}");
        let args = DatasetArgs {
            data: file.path().to_path_buf(),
            tenant: "  ".to_string(),
            rules: None,
        };
        let err = open_engine(&args).err().unwrap();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_open_engine_missing_dataset_is_store_error() {
        let args = DatasetArgs {
            data: PathBuf::from("/nonexistent/data.json"),
            tenant: "org-1".to_string(),
            rules: None,
        };
        let err = open_engine(&args).err().unwrap();
        assert_eq!(err.exit_code(), 3);
    }
}
