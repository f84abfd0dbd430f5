//! Accessor resolution.
//!
//! Entity names are resolved to accessors once, before a scan or repair
//! starts. Everything downstream works with the resolved table.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::traits::{EntityAccessor, EntityStore};

/// Accessors resolved for a fixed set of entity names.
#[derive(Clone, Default)]
pub struct AccessorRegistry {
    accessors: BTreeMap<String, Arc<dyn EntityAccessor>>,
    missing: BTreeSet<String>,
}

impl AccessorRegistry {
    /// Resolve every named entity against the store.
    ///
    /// Names the store does not know are remembered as missing rather than
    /// failing the resolution.
    pub fn resolve<S, I, N>(store: &S, entities: I) -> Self
    where
        S: EntityStore + ?Sized,
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let mut registry = Self::default();
        for name in entities {
            let name = name.as_ref();
            if registry.accessors.contains_key(name) || registry.missing.contains(name) {
                continue;
            }
            match store.accessor(name) {
                Some(accessor) => {
                    registry.accessors.insert(name.to_string(), accessor);
                }
                None => {
                    tracing::warn!(entity = %name, "Entity type not available in store");
                    registry.missing.insert(name.to_string());
                }
            }
        }
        registry
    }

    /// Get the accessor for an entity.
    pub fn get(&self, entity: &str) -> StoreResult<Arc<dyn EntityAccessor>> {
        self.accessors
            .get(entity)
            .cloned()
            .ok_or_else(|| StoreError::UnknownEntity {
                entity: entity.to_string(),
            })
    }

    /// Entity names that resolved.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    /// Entity names the store did not know.
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.missing.iter().map(String::as_str)
    }

    /// Whether an entity resolved.
    pub fn contains(&self, entity: &str) -> bool {
        self.accessors.contains_key(entity)
    }
}

impl std::fmt::Debug for AccessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessorRegistry")
            .field("entities", &self.accessors.keys().collect::<Vec<_>>())
            .field("missing", &self.missing)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[test]
    fn test_resolve_splits_known_and_missing() {
        let store = InMemoryStore::new().with_entity("Employee").with_entity("Sale");
        let registry = AccessorRegistry::resolve(&store, ["Employee", "Sale", "Route", "Sale"]);

        assert_eq!(registry.entities().collect::<Vec<_>>(), vec!["Employee", "Sale"]);
        assert_eq!(registry.missing().collect::<Vec<_>>(), vec!["Route"]);
        assert!(registry.contains("Sale"));
    }

    #[test]
    fn test_get_missing_is_unknown_entity() {
        let store = InMemoryStore::new();
        let registry = AccessorRegistry::resolve(&store, ["Route"]);
        let err = registry.get("Route").err().unwrap();
        assert!(err.is_empty_equivalent());
    }
}
