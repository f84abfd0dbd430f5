//! # Entity Store Boundary
//!
//! The integrity engine never talks to storage directly. It consumes the
//! generic entity-store contract defined here:
//!
//! - [`EntityAccessor`]: list / update / delete for one entity type, scoped
//!   to a tenant.
//! - [`EntityStore`]: resolves an entity type name to its accessor.
//! - [`AccessorRegistry`]: the accessors a scan needs, resolved once up front
//!   instead of being looked up by name on every call.
//!
//! Two implementations ship with the crate: [`InMemoryStore`] for tests and
//! embedding, and [`JsonFileStore`] which persists a tenant-partitioned JSON
//! dataset on disk.
//!
//! ## Example
//!
//! ```
//! use bizdesk_store::{AccessorRegistry, InMemoryStore, Record};
//! use serde_json::json;
//!
//! let store = InMemoryStore::new();
//! store.insert("Employee", Record::from_json(json!({
//!     "id": "E1", "organisation_id": "org-1", "name": "Ada"
//! })).unwrap());
//!
//! let accessors = AccessorRegistry::resolve(&store, ["Employee", "Payroll"]);
//! assert!(accessors.get("Employee").is_ok());
//! assert_eq!(accessors.missing().collect::<Vec<_>>(), vec!["Payroll"]);
//! ```

pub mod accessor;
pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod traits;

pub use accessor::AccessorRegistry;
pub use error::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use memory::InMemoryStore;
pub use record::{Fields, Record, CREATED_DATE_FIELD, ID_FIELD, TENANT_FIELD};
pub use traits::{EntityAccessor, EntityStore};
