//! List relationship rules

use std::path::PathBuf;

use bizdesk_integrity::{RelationshipRegistry, RelationshipRule};
use clap::Args;

use super::load_registry;
use crate::error::{CliError, CliResult};
use crate::output::{render_table, OutputFormat};

/// List the relationship rules a scan evaluates
#[derive(Args, Debug)]
pub struct RulesArgs {
    /// YAML file replacing the built-in relationship rules
    #[arg(long, env = "BIZDESK_RULES")]
    pub rules: Option<PathBuf>,

    /// Only show rules for this child entity
    #[arg(long)]
    pub entity: Option<String>,

    /// Output format (csv is treated as table)
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Execute the rules command
pub fn execute(args: RulesArgs) -> CliResult<()> {
    let registry = load_registry(args.rules.as_deref())?;
    let rules = select(&registry, args.entity.as_deref())?;

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
    } else {
        print!("{}", render_rules(&rules));
        println!("\n{} rule(s)", rules.len());
    }
    Ok(())
}

fn select<'a>(
    registry: &'a RelationshipRegistry,
    entity: Option<&str>,
) -> CliResult<Vec<&'a RelationshipRule>> {
    let Some(entity) = entity else {
        return Ok(registry.rules().iter().collect());
    };

    let rules: Vec<_> = registry.rules_for(entity).collect();
    if rules.is_empty() {
        return Err(CliError::Validation(format!(
            "No relationship rules for entity '{entity}'"
        )));
    }
    Ok(rules)
}

fn render_rules(rules: &[&RelationshipRule]) -> String {
    let rows: Vec<Vec<String>> = rules
        .iter()
        .map(|rule| {
            vec![
                rule.child_entity.clone(),
                rule.parent_field.clone(),
                rule.parent.to_string(),
                rule.variant_tag.clone().unwrap_or_default(),
            ]
        })
        .collect();
    render_table(&["ENTITY", "FIELD", "PARENT", "VARIANT"], &rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_entity() {
        let registry = RelationshipRegistry::builtin();
        let rules = select(&registry, Some("Trip")).unwrap();
        let fields: Vec<&str> = rules.iter().map(|r| r.parent_field.as_str()).collect();
        assert_eq!(fields, vec!["driver_id", "vehicle_id", "route_id"]);
    }

    #[test]
    fn test_select_unknown_entity_fails() {
        let registry = RelationshipRegistry::builtin();
        let err = select(&registry, Some("Spaceship")).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_render_rules_shows_variant() {
        let registry = RelationshipRegistry::builtin();
        let rules = select(&registry, Some("StockTransfer")).unwrap();
        let rendered = render_rules(&rules);
        assert!(rendered.contains("from_warehouse_id"));
        assert!(rendered.contains("source"));
        assert!(rendered.contains("destination"));
    }
}
