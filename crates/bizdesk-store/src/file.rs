//! JSON file backed entity store.
//!
//! The dataset is a single JSON object mapping entity type names to arrays of
//! records:
//!
//! ```json
//! {
//!   "Employee":   [{ "id": "E1", "organisation_id": "org-1", "name": "Ada" }],
//!   "Attendance": [{ "id": "A1", "organisation_id": "org-1", "employee_id": "E1" }]
//! }
//! ```
//!
//! Mutations happen in memory; [`JsonFileStore::save`] writes them back.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryStore;
use crate::record::Record;
use crate::traits::{EntityAccessor, EntityStore};

/// Entity store persisted as a JSON document on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: InMemoryStore,
}

impl JsonFileStore {
    /// Load a dataset from disk.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let raw = std::fs::read_to_string(&path)?;
        let inner = Self::parse(&raw)?;

        tracing::debug!(
            path = %path.display(),
            entities = inner.entity_names().len(),
            "Loaded JSON dataset"
        );

        Ok(Self { path, inner })
    }

    fn parse(raw: &str) -> StoreResult<InMemoryStore> {
        let document: BTreeMap<String, Vec<Value>> = serde_json::from_str(raw)?;
        let mut tables = BTreeMap::new();
        for (entity, rows) in document {
            let records = rows
                .into_iter()
                .map(Record::from_json)
                .collect::<StoreResult<Vec<_>>>()
                .map_err(|e| StoreError::InvalidData {
                    message: format!("{entity}: {e}"),
                })?;
            tables.insert(entity, records);
        }
        Ok(InMemoryStore::from_tables(tables))
    }

    /// Write the current state back to the file it was loaded from.
    ///
    /// The document is written to a sibling temporary file first and renamed
    /// into place.
    pub fn save(&self) -> StoreResult<()> {
        let tables = self.inner.tables()?;
        let json = serde_json::to_string_pretty(&tables)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::debug!(path = %self.path.display(), "Saved JSON dataset");
        Ok(())
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The in-memory view of the dataset.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }
}

impl EntityStore for JsonFileStore {
    fn accessor(&self, entity: &str) -> Option<Arc<dyn EntityAccessor>> {
        self.inner.accessor(entity)
    }
}
