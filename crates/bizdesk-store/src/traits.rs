//! Entity store traits
//!
//! Capability boundary between the integrity engine and whatever persists
//! entities (a remote document store, a file, memory).

use std::sync::Arc;

use async_trait::async_trait;
use bizdesk_core::TenantId;

use crate::error::StoreResult;
use crate::record::{Fields, Record};

/// Access to one entity type.
///
/// Every call is scoped to a single tenant; an implementation must never
/// return or touch records belonging to another tenant.
#[async_trait]
pub trait EntityAccessor: Send + Sync {
    /// Name of the entity type this accessor serves (e.g. `"StockLevel"`).
    fn entity(&self) -> &str;

    /// List every record of this entity type in the tenant.
    async fn list(&self, tenant: &TenantId) -> StoreResult<Vec<Record>>;

    /// Apply a partial update to one record and return the updated record.
    ///
    /// Fails with `StoreError::NotFound` if the record does not exist.
    async fn update(&self, tenant: &TenantId, id: &str, fields: Fields) -> StoreResult<Record>;

    /// Delete one record.
    ///
    /// Fails with `StoreError::NotFound` if the record does not exist.
    async fn delete(&self, tenant: &TenantId, id: &str) -> StoreResult<()>;
}

/// Resolves entity type names to accessors.
pub trait EntityStore: Send + Sync {
    /// Get the accessor for an entity type, or `None` if the type is not
    /// deployed in this store.
    fn accessor(&self, entity: &str) -> Option<Arc<dyn EntityAccessor>>;
}

impl<S: EntityStore + ?Sized> EntityStore for Arc<S> {
    fn accessor(&self, entity: &str) -> Option<Arc<dyn EntityAccessor>> {
        (**self).accessor(entity)
    }
}
