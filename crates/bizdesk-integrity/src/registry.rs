//! Relationship registry.
//!
//! The declarative schema of what a valid reference is: a table of
//! `child_entity.parent_field -> parent.id` rules. Detectors are generic over
//! this table, so adding a relationship never requires detector changes.
//!
//! Rules are keyed by `(child_entity, parent_field)`. Registering the same key
//! twice keeps the first rule and drops the rest, so one foreign key is never
//! counted twice in summary totals.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Entity types whose IDs other records reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParentKind {
    Employee,
    Product,
    Warehouse,
    Vehicle,
    Supplier,
    Customer,
    Route,
}

impl ParentKind {
    /// All parent kinds.
    pub const ALL: [ParentKind; 7] = [
        ParentKind::Employee,
        ParentKind::Product,
        ParentKind::Warehouse,
        ParentKind::Vehicle,
        ParentKind::Supplier,
        ParentKind::Customer,
        ParentKind::Route,
    ];

    /// Entity type name in the store.
    #[must_use]
    pub fn entity_name(&self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::Product => "Product",
            Self::Warehouse => "Warehouse",
            Self::Vehicle => "Vehicle",
            Self::Supplier => "Supplier",
            Self::Customer => "Customer",
            Self::Route => "Route",
        }
    }

    /// Parent kind stored under an entity type name, if any.
    #[must_use]
    pub fn from_entity_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.entity_name() == name)
    }
}

impl fmt::Display for ParentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entity_name())
    }
}

impl FromStr for ParentKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.entity_name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| RegistryError::UnknownParentKind {
                value: trimmed.to_string(),
            })
    }
}

/// Registry construction errors.
///
/// These are configuration mistakes and are raised when the registry is
/// built, never during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A rule names a parent entity that is not a known parent kind.
    #[error("unknown parent entity '{value}' (expected one of Employee, Product, Warehouse, Vehicle, Supplier, Customer, Route)")]
    UnknownParentKind { value: String },

    /// A rule has a blank child entity or field name.
    #[error("rule #{index} is missing its {what}")]
    IncompleteRule { index: usize, what: &'static str },
}

/// One foreign-key relationship: `child_entity.parent_field -> parent.id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRule {
    /// Entity holding the foreign key.
    pub child_entity: String,
    /// Foreign-key field on the child.
    pub parent_field: String,
    /// Entity the key points at.
    pub parent: ParentKind,
    /// Marks a secondary check: an alternate role of the same parent
    /// (e.g. transfer source vs destination) or a reference held by an
    /// entity that is itself a parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_tag: Option<String>,
}

impl RelationshipRule {
    /// Create a primary rule.
    pub fn new(
        child_entity: impl Into<String>,
        parent_field: impl Into<String>,
        parent: ParentKind,
    ) -> Self {
        Self {
            child_entity: child_entity.into(),
            parent_field: parent_field.into(),
            parent,
            variant_tag: None,
        }
    }

    /// Tag the rule as a secondary check.
    pub fn with_variant(mut self, tag: impl Into<String>) -> Self {
        self.variant_tag = Some(tag.into());
        self
    }

    /// Dedup key.
    #[must_use]
    pub fn key(&self) -> (&str, &str) {
        (&self.child_entity, &self.parent_field)
    }

    /// Whether this is a secondary check.
    #[must_use]
    pub fn is_secondary(&self) -> bool {
        self.variant_tag.is_some()
    }

    /// `Entity.field` label used in finding IDs and logs.
    #[must_use]
    pub fn qualified_field(&self) -> String {
        format!("{}.{}", self.child_entity, self.parent_field)
    }
}

/// Untyped rule as read from a rules file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub child_entity: String,
    pub parent_field: String,
    pub parent_entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_tag: Option<String>,
}

impl RuleSpec {
    fn into_rule(self, index: usize) -> Result<RelationshipRule, RegistryError> {
        if self.child_entity.trim().is_empty() {
            return Err(RegistryError::IncompleteRule {
                index,
                what: "child_entity",
            });
        }
        if self.parent_field.trim().is_empty() {
            return Err(RegistryError::IncompleteRule {
                index,
                what: "parent_field",
            });
        }
        let parent = self.parent_entity.parse()?;
        Ok(RelationshipRule {
            child_entity: self.child_entity.trim().to_string(),
            parent_field: self.parent_field.trim().to_string(),
            parent,
            variant_tag: self.variant_tag.filter(|t| !t.trim().is_empty()),
        })
    }
}

/// Built-in relationships of the business console.
const BUILTIN_RULES: &[(&str, &str, ParentKind, Option<&str>)] = &[
    // HR
    ("Attendance", "employee_id", ParentKind::Employee, None),
    ("LeaveRequest", "employee_id", ParentKind::Employee, None),
    ("LeaveRequest", "approved_by", ParentKind::Employee, Some("approver")),
    ("Payroll", "employee_id", ParentKind::Employee, None),
    ("Payslip", "employee_id", ParentKind::Employee, None),
    ("Shift", "employee_id", ParentKind::Employee, None),
    ("PerformanceReview", "employee_id", ParentKind::Employee, None),
    ("PerformanceReview", "reviewer_id", ParentKind::Employee, Some("reviewer")),
    ("EmployeeDocument", "employee_id", ParentKind::Employee, None),
    ("Expense", "employee_id", ParentKind::Employee, None),
    ("Employee", "warehouse_id", ParentKind::Warehouse, Some("secondary")),
    // Sales
    ("Sale", "employee_id", ParentKind::Employee, None),
    ("Sale", "customer_id", ParentKind::Customer, None),
    ("SaleItem", "product_id", ParentKind::Product, None),
    ("Commission", "employee_id", ParentKind::Employee, None),
    ("Invoice", "customer_id", ParentKind::Customer, None),
    ("CustomerPayment", "customer_id", ParentKind::Customer, None),
    // Inventory
    ("StockMovement", "product_id", ParentKind::Product, None),
    ("StockMovement", "warehouse_id", ParentKind::Warehouse, None),
    ("StockLevel", "product_id", ParentKind::Product, None),
    ("StockLevel", "warehouse_id", ParentKind::Warehouse, None),
    ("StockTransfer", "product_id", ParentKind::Product, None),
    ("StockTransfer", "from_warehouse_id", ParentKind::Warehouse, Some("source")),
    ("StockTransfer", "to_warehouse_id", ParentKind::Warehouse, Some("destination")),
    ("InventoryAudit", "product_id", ParentKind::Product, None),
    ("InventoryAudit", "warehouse_id", ParentKind::Warehouse, None),
    ("PriceHistory", "product_id", ParentKind::Product, None),
    ("Warehouse", "manager_id", ParentKind::Employee, Some("secondary")),
    ("Product", "supplier_id", ParentKind::Supplier, Some("secondary")),
    // Purchasing
    ("PurchaseOrder", "supplier_id", ParentKind::Supplier, None),
    ("PurchaseOrder", "warehouse_id", ParentKind::Warehouse, None),
    ("PurchaseOrderItem", "product_id", ParentKind::Product, None),
    ("SupplierPayment", "supplier_id", ParentKind::Supplier, None),
    // Transport
    ("Trip", "driver_id", ParentKind::Employee, None),
    ("Trip", "vehicle_id", ParentKind::Vehicle, None),
    ("Trip", "route_id", ParentKind::Route, None),
    ("FuelLog", "vehicle_id", ParentKind::Vehicle, None),
    ("VehicleMaintenance", "vehicle_id", ParentKind::Vehicle, None),
    ("VehicleInspection", "vehicle_id", ParentKind::Vehicle, None),
    ("Vehicle", "parent_warehouse_id", ParentKind::Warehouse, Some("secondary")),
    ("Vehicle", "assigned_driver_id", ParentKind::Employee, Some("secondary")),
    ("Delivery", "customer_id", ParentKind::Customer, None),
    ("Delivery", "route_id", ParentKind::Route, None),
    ("RouteStop", "route_id", ParentKind::Route, None),
];

/// Read-only table of relationship rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipRegistry {
    rules: Vec<RelationshipRule>,
    by_child: BTreeMap<String, Vec<usize>>,
    coalesced: usize,
}

impl RelationshipRegistry {
    /// The built-in relationships.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_rules(BUILTIN_RULES.iter().map(|(child, field, parent, tag)| {
            let rule = RelationshipRule::new(*child, *field, *parent);
            match tag {
                Some(tag) => rule.with_variant(*tag),
                None => rule,
            }
        }))
    }

    /// Build from typed rules, coalescing duplicate keys.
    pub fn from_rules<I>(rules: I) -> Self
    where
        I: IntoIterator<Item = RelationshipRule>,
    {
        let mut registry = Self::default();
        for rule in rules {
            registry.insert(rule);
        }
        if registry.coalesced > 0 {
            tracing::debug!(
                coalesced = registry.coalesced,
                "Coalesced duplicate relationship rules"
            );
        }
        registry
    }

    /// Build from untyped specs, failing on the first invalid rule.
    pub fn from_specs<I>(specs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = RuleSpec>,
    {
        let rules = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| spec.into_rule(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_rules(rules))
    }

    fn insert(&mut self, rule: RelationshipRule) {
        let slot = self.by_child.entry(rule.child_entity.clone()).or_default();
        if slot
            .iter()
            .any(|&i| self.rules[i].parent_field == rule.parent_field)
        {
            self.coalesced += 1;
            return;
        }
        slot.push(self.rules.len());
        self.rules.push(rule);
    }

    /// All rules, in registration order.
    #[must_use]
    pub fn rules(&self) -> &[RelationshipRule] {
        &self.rules
    }

    /// Rules whose child is `entity`.
    pub fn rules_for<'a>(
        &'a self,
        entity: &str,
    ) -> impl Iterator<Item = &'a RelationshipRule> + 'a {
        self.by_child
            .get(entity)
            .into_iter()
            .flatten()
            .map(|&i| &self.rules[i])
    }

    /// Distinct child entity names.
    #[must_use]
    pub fn child_entities(&self) -> BTreeSet<&str> {
        self.by_child.keys().map(String::as_str).collect()
    }

    /// Distinct parent kinds referenced by any rule.
    #[must_use]
    pub fn parent_kinds(&self) -> BTreeSet<ParentKind> {
        self.rules.iter().map(|r| r.parent).collect()
    }

    /// Number of rules dropped as duplicates during construction.
    #[must_use]
    pub fn coalesced(&self) -> usize {
        self.coalesced
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the registry has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(child: &str, field: &str, parent: &str) -> RuleSpec {
        RuleSpec {
            child_entity: child.to_string(),
            parent_field: field.to_string(),
            parent_entity: parent.to_string(),
            variant_tag: None,
        }
    }

    #[test]
    fn test_builtin_has_unique_keys() {
        let registry = RelationshipRegistry::builtin();
        assert_eq!(registry.coalesced(), 0);
        assert_eq!(registry.len(), BUILTIN_RULES.len());

        let keys: BTreeSet<_> = registry.rules().iter().map(RelationshipRule::key).collect();
        assert_eq!(keys.len(), registry.len());
    }

    #[test]
    fn test_builtin_covers_every_parent_kind() {
        let registry = RelationshipRegistry::builtin();
        assert_eq!(registry.parent_kinds().len(), ParentKind::ALL.len());
    }

    #[test]
    fn test_rules_for_returns_all_fields_of_entity() {
        let registry = RelationshipRegistry::builtin();
        let fields: Vec<_> = registry
            .rules_for("Trip")
            .map(|r| r.parent_field.as_str())
            .collect();
        assert_eq!(fields, vec!["driver_id", "vehicle_id", "route_id"]);
        assert_eq!(registry.rules_for("Nope").count(), 0);
    }

    #[test]
    fn test_duplicate_keys_are_coalesced() {
        let registry = RelationshipRegistry::from_rules([
            RelationshipRule::new("Sale", "customer_id", ParentKind::Customer),
            RelationshipRule::new("Sale", "customer_id", ParentKind::Customer),
            RelationshipRule::new("Sale", "employee_id", ParentKind::Employee),
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.coalesced(), 1);
    }

    #[test]
    fn test_from_specs_fails_fast_on_unknown_parent() {
        let err = RelationshipRegistry::from_specs([
            spec("Sale", "customer_id", "Customer"),
            spec("Sale", "store_id", "Store"),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownParentKind {
                value: "Store".to_string()
            }
        );
    }

    #[test]
    fn test_from_specs_rejects_blank_field() {
        let err = RelationshipRegistry::from_specs([spec("Sale", " ", "Customer")]).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::IncompleteRule {
                index: 0,
                what: "parent_field"
            }
        ));
    }

    #[test]
    fn test_parent_kind_parse_is_case_insensitive() {
        assert_eq!("warehouse".parse::<ParentKind>().unwrap(), ParentKind::Warehouse);
        assert_eq!(ParentKind::from_entity_name("Route"), Some(ParentKind::Route));
        assert_eq!(ParentKind::from_entity_name("route"), None);
    }

    #[test]
    fn test_secondary_rules_are_tagged() {
        let registry = RelationshipRegistry::builtin();
        let rule = registry
            .rules_for("Vehicle")
            .find(|r| r.parent_field == "parent_warehouse_id")
            .unwrap();
        assert!(rule.is_secondary());
        assert_eq!(rule.qualified_field(), "Vehicle.parent_warehouse_id");
    }
}
