//! In-memory entity store.
//!
//! Holds records for any number of tenants, partitioned by the tenant field.
//! Entity types must be declared (explicitly or by inserting a record) before
//! they resolve; undeclared types behave like entities that are not deployed.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bizdesk_core::TenantId;

use crate::error::{StoreError, StoreResult};
use crate::record::{Fields, Record};
use crate::traits::{EntityAccessor, EntityStore};

type Tables = BTreeMap<String, Vec<Record>>;

/// Entity store kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Create an empty store with no entity types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from existing tables.
    pub fn from_tables(tables: BTreeMap<String, Vec<Record>>) -> Self {
        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }

    /// Declare an entity type using builder pattern.
    pub fn with_entity(self, entity: &str) -> Self {
        self.declare(entity);
        self
    }

    /// Add records to an entity type using builder pattern.
    pub fn with_records(self, entity: &str, records: Vec<Record>) -> Self {
        self.declare(entity);
        for record in records {
            self.insert(entity, record);
        }
        self
    }

    /// Declare an entity type with no records.
    pub fn declare(&self, entity: &str) {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(entity.to_string()).or_default();
        }
    }

    /// Insert a record, declaring the entity type if needed.
    pub fn insert(&self, entity: &str, record: Record) {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(entity.to_string()).or_default().push(record);
        }
    }

    /// All records of an entity type across every tenant, in insertion order.
    pub fn records(&self, entity: &str) -> Vec<Record> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(entity).cloned())
            .unwrap_or_default()
    }

    /// Copy of every table.
    pub fn tables(&self) -> StoreResult<Tables> {
        self.tables
            .read()
            .map(|tables| tables.clone())
            .map_err(|_| StoreError::backend("in-memory store lock poisoned"))
    }

    /// Declared entity type names.
    pub fn entity_names(&self) -> Vec<String> {
        self.tables
            .read()
            .map(|tables| tables.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl EntityStore for InMemoryStore {
    fn accessor(&self, entity: &str) -> Option<Arc<dyn EntityAccessor>> {
        let declared = self
            .tables
            .read()
            .map(|tables| tables.contains_key(entity))
            .unwrap_or(false);

        declared.then(|| {
            Arc::new(MemoryAccessor {
                entity: entity.to_string(),
                tables: Arc::clone(&self.tables),
            }) as Arc<dyn EntityAccessor>
        })
    }
}

/// Accessor over one table of an [`InMemoryStore`].
struct MemoryAccessor {
    entity: String,
    tables: Arc<RwLock<Tables>>,
}

impl MemoryAccessor {
    fn poisoned() -> StoreError {
        StoreError::backend("in-memory store lock poisoned")
    }

    fn belongs(record: &Record, tenant: &TenantId) -> bool {
        record.tenant().as_deref() == Some(tenant.as_str())
    }

    fn matches(record: &Record, tenant: &TenantId, id: &str) -> bool {
        Self::belongs(record, tenant) && record.id().as_deref() == Some(id)
    }
}

#[async_trait]
impl EntityAccessor for MemoryAccessor {
    fn entity(&self) -> &str {
        &self.entity
    }

    async fn list(&self, tenant: &TenantId) -> StoreResult<Vec<Record>> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        let rows = tables
            .get(&self.entity)
            .ok_or_else(|| StoreError::UnknownEntity {
                entity: self.entity.clone(),
            })?;

        Ok(rows
            .iter()
            .filter(|r| Self::belongs(r, tenant))
            .cloned()
            .collect())
    }

    async fn update(&self, tenant: &TenantId, id: &str, fields: Fields) -> StoreResult<Record> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        let rows = tables
            .get_mut(&self.entity)
            .ok_or_else(|| StoreError::UnknownEntity {
                entity: self.entity.clone(),
            })?;

        let record = rows
            .iter_mut()
            .find(|r| Self::matches(r, tenant, id))
            .ok_or_else(|| StoreError::not_found(&self.entity, id))?;

        record.merge(&fields);
        Ok(record.clone())
    }

    async fn delete(&self, tenant: &TenantId, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        let rows = tables
            .get_mut(&self.entity)
            .ok_or_else(|| StoreError::UnknownEntity {
                entity: self.entity.clone(),
            })?;

        let position = rows
            .iter()
            .position(|r| Self::matches(r, tenant, id))
            .ok_or_else(|| StoreError::not_found(&self.entity, id))?;

        rows.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id).unwrap()
    }

    fn employee(id: &str, org: &str) -> Record {
        Record::from_json(json!({"id": id, "organisation_id": org, "name": id})).unwrap()
    }

    #[tokio::test]
    async fn test_list_is_tenant_scoped() {
        let store = InMemoryStore::new();
        store.insert("Employee", employee("E1", "org-a"));
        store.insert("Employee", employee("E2", "org-b"));

        let accessor = store.accessor("Employee").unwrap();
        let rows = accessor.list(&tenant("org-a")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id(), Some("E1".to_string()));
    }

    #[tokio::test]
    async fn test_undeclared_entity_has_no_accessor() {
        let store = InMemoryStore::new();
        assert!(store.accessor("Route").is_none());
    }

    #[tokio::test]
    async fn test_delete_twice_reports_not_found() {
        let store = InMemoryStore::new();
        store.insert("Employee", employee("E1", "org-a"));
        let accessor = store.accessor("Employee").unwrap();

        accessor.delete(&tenant("org-a"), "E1").await.unwrap();
        let err = accessor.delete(&tenant("org-a"), "E1").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(store.records("Employee").is_empty());
    }

    #[tokio::test]
    async fn test_delete_cannot_cross_tenants() {
        let store = InMemoryStore::new();
        store.insert("Employee", employee("E1", "org-a"));
        let accessor = store.accessor("Employee").unwrap();

        let err = accessor.delete(&tenant("org-b"), "E1").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.records("Employee").len(), 1);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = InMemoryStore::new();
        store.insert(
            "Product",
            Record::from_json(json!({"id": "P1", "organisation_id": "org-a", "stock_quantity": 9}))
                .unwrap(),
        );
        let accessor = store.accessor("Product").unwrap();

        let mut patch = Fields::new();
        patch.insert("stock_quantity".to_string(), json!(10.0));
        let updated = accessor.update(&tenant("org-a"), "P1", patch).await.unwrap();

        assert_eq!(updated.number("stock_quantity"), Some(10.0));
        assert_eq!(store.records("Product")[0].number("stock_quantity"), Some(10.0));
    }
}
