//! Snapshot loading.
//!
//! A snapshot is an immutable, single-tenant capture of everything the
//! detectors read: one ID set per parent kind and the full record list of
//! every child entity. It is rebuilt on every scan.
//!
//! Each entity type is fetched once, concurrently, through a bounded pool.
//! An entity that is both a parent and a child (e.g. `Vehicle`) contributes
//! its IDs and its records from the same fetch.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use bizdesk_core::TenantId;
use bizdesk_store::{AccessorRegistry, Record, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::instrument;

use crate::registry::{ParentKind, RelationshipRegistry};
use crate::statistics::StatisticsTracker;
use crate::types::{PRODUCT_ENTITY, STOCK_LEVEL_ENTITY};

/// Error code recorded for entities cut off by the scan deadline.
pub const TIMED_OUT_CODE: &str = "SCAN_TIMEOUT";

/// Error code recorded for fetch tasks that died without a result.
pub const TASK_FAILED_CODE: &str = "TASK_FAILED";

/// Unrecoverable snapshot failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A parent entity could not be listed, so its ID set cannot be built.
    #[error("parent entity {entity} could not be loaded: {source}")]
    DependencyUnavailable {
        entity: String,
        #[source]
        source: StoreError,
    },

    /// A parent entity's fetch task failed without returning.
    #[error("fetch task for {entity} failed: {message}")]
    TaskFailed { entity: String, message: String },
}

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// What a snapshot must contain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotRequest {
    parents: BTreeSet<ParentKind>,
    records: BTreeSet<String>,
}

impl SnapshotRequest {
    /// Everything the detectors need for `registry`: the parent ID sets, every
    /// child entity, plus `Product` and `StockLevel` for the stock checks.
    #[must_use]
    pub fn for_registry(registry: &RelationshipRegistry) -> Self {
        let mut request = Self {
            parents: registry.parent_kinds(),
            records: registry
                .child_entities()
                .into_iter()
                .map(ToString::to_string)
                .collect(),
        };
        request.records.insert(PRODUCT_ENTITY.to_string());
        request.records.insert(STOCK_LEVEL_ENTITY.to_string());
        request
    }

    /// Request an ID set for a parent kind.
    pub fn with_parent(mut self, kind: ParentKind) -> Self {
        self.parents.insert(kind);
        self
    }

    /// Request the full record list of an entity.
    pub fn with_records(mut self, entity: impl Into<String>) -> Self {
        self.records.insert(entity.into());
        self
    }

    /// Distinct entity names to fetch.
    #[must_use]
    pub fn entities(&self) -> BTreeSet<String> {
        self.parents
            .iter()
            .map(|kind| kind.entity_name().to_string())
            .chain(self.records.iter().cloned())
            .collect()
    }

    pub fn parents(&self) -> &BTreeSet<ParentKind> {
        &self.parents
    }

    fn wants_records(&self, entity: &str) -> bool {
        self.records.contains(entity)
    }
}

/// An entity type that could not be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub entity: String,
    pub error_code: String,
    pub message: String,
}

impl FetchFailure {
    fn from_store_error(entity: &str, error: &StoreError) -> Self {
        Self {
            entity: entity.to_string(),
            error_code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Immutable per-scan capture of one tenant's data.
#[derive(Debug, Clone)]
pub struct EntitySnapshot {
    tenant: TenantId,
    taken_at: DateTime<Utc>,
    parent_ids: BTreeMap<ParentKind, HashSet<String>>,
    records: BTreeMap<String, Vec<Record>>,
    failures: Vec<FetchFailure>,
    timed_out: BTreeSet<String>,
}

impl EntitySnapshot {
    /// Create an empty snapshot.
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            taken_at: Utc::now(),
            parent_ids: BTreeMap::new(),
            records: BTreeMap::new(),
            failures: Vec::new(),
            timed_out: BTreeSet::new(),
        }
    }

    /// Add an entity's records. If the entity is a parent kind its ID set is
    /// derived from the same records.
    pub fn with_entity(mut self, entity: impl Into<String>, records: Vec<Record>) -> Self {
        let entity = entity.into();
        if let Some(kind) = ParentKind::from_entity_name(&entity) {
            self.set_parent_ids(kind, &records);
        }
        self.records.insert(entity, records);
        self
    }

    /// Mark an entity as cut off by the deadline.
    pub fn with_timed_out(mut self, entity: impl Into<String>) -> Self {
        self.timed_out.insert(entity.into());
        self
    }

    fn set_parent_ids(&mut self, kind: ParentKind, records: &[Record]) {
        let ids = records.iter().filter_map(Record::id).collect();
        self.parent_ids.insert(kind, ids);
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Valid IDs of a parent kind, or `None` if the kind was not loaded.
    pub fn parent_ids(&self, kind: ParentKind) -> Option<&HashSet<String>> {
        self.parent_ids.get(&kind)
    }

    /// Records of an entity. Entities that failed or were never loaded have
    /// zero records.
    pub fn records(&self, entity: &str) -> &[Record] {
        self.records.get(entity).map_or(&[], Vec::as_slice)
    }

    /// Entities whose fetch failed and were counted as empty.
    pub fn failures(&self) -> &[FetchFailure] {
        &self.failures
    }

    /// Entities cut off by the scan deadline.
    pub fn timed_out(&self) -> &BTreeSet<String> {
        &self.timed_out
    }

    /// Whether an entity's data is missing because of the deadline.
    pub fn is_incomplete(&self, entity: &str) -> bool {
        self.timed_out.contains(entity)
    }

    /// Total records held.
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

/// Fetches snapshots through a resolved accessor table.
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    accessors: AccessorRegistry,
    concurrency: usize,
    tracker: Arc<StatisticsTracker>,
}

impl SnapshotLoader {
    /// Create a loader with at most `concurrency` fetches in flight.
    pub fn new(accessors: AccessorRegistry, concurrency: usize) -> Self {
        Self {
            accessors,
            concurrency: concurrency.max(1),
            tracker: Arc::new(StatisticsTracker::new()),
        }
    }

    /// Report into an existing tracker.
    pub fn with_tracker(mut self, tracker: Arc<StatisticsTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Load a snapshot for one tenant.
    ///
    /// Child fetch failures and undeployed entities become zero records plus
    /// a [`FetchFailure`]. A parent fetch failing with anything other than
    /// "not deployed" fails the whole snapshot. When `deadline` passes, the
    /// remaining fetches are cancelled and their entities marked timed out.
    #[instrument(skip(self, request), fields(tenant_id = %tenant))]
    pub async fn load(
        &self,
        tenant: &TenantId,
        request: &SnapshotRequest,
        deadline: Option<Instant>,
    ) -> SnapshotResult<EntitySnapshot> {
        let entities = request.entities();
        self.tracker
            .set_entities_requested(u64::try_from(entities.len()).unwrap_or(u64::MAX));

        let parent_of: HashMap<String, ParentKind> = request
            .parents()
            .iter()
            .map(|kind| (kind.entity_name().to_string(), *kind))
            .collect();

        let mut snapshot = EntitySnapshot::new(tenant.clone());
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set = JoinSet::new();
        let mut pending: BTreeSet<String> = BTreeSet::new();

        for entity in entities {
            let accessor = match self.accessors.get(&entity) {
                Ok(accessor) => accessor,
                Err(e) => {
                    self.absorb_failure(&mut snapshot, &parent_of, request, &entity, &e);
                    continue;
                }
            };
            let semaphore = Arc::clone(&semaphore);
            let tenant = tenant.clone();
            pending.insert(entity.clone());
            join_set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => accessor.list(&tenant).await,
                    Err(_) => Err(StoreError::backend("snapshot loader pool closed")),
                };
                (entity, result)
            });
        }

        loop {
            let next = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            join_set.abort_all();
                            for entity in &pending {
                                tracing::warn!(entity = %entity, "Entity fetch cut off by scan deadline");
                                self.tracker.record_entity_failed();
                                snapshot.failures.push(FetchFailure {
                                    entity: entity.clone(),
                                    error_code: TIMED_OUT_CODE.to_string(),
                                    message: "scan deadline reached before fetch completed"
                                        .to_string(),
                                });
                            }
                            snapshot.timed_out = std::mem::take(&mut pending);
                            break;
                        }
                    }
                }
                None => join_set.join_next().await,
            };

            let Some(joined) = next else {
                break;
            };

            match joined {
                Ok((entity, Ok(records))) => {
                    pending.remove(&entity);
                    tracing::debug!(entity = %entity, count = records.len(), "Loaded entity");
                    self.tracker
                        .record_entity_loaded(u64::try_from(records.len()).unwrap_or(u64::MAX));
                    if let Some(kind) = parent_of.get(&entity) {
                        snapshot.set_parent_ids(*kind, &records);
                    }
                    if request.wants_records(&entity) {
                        snapshot.records.insert(entity, records);
                    }
                }
                Ok((entity, Err(e))) => {
                    pending.remove(&entity);
                    if parent_of.contains_key(&entity) && !e.is_empty_equivalent() {
                        tracing::error!(
                            entity = %entity,
                            error = %e,
                            "Parent entity fetch failed, aborting snapshot"
                        );
                        join_set.abort_all();
                        return Err(SnapshotError::DependencyUnavailable { entity, source: e });
                    }
                    self.absorb_failure(&mut snapshot, &parent_of, request, &entity, &e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Entity fetch task failed");
                }
            }
        }

        // Anything still pending after a clean drain died in its task.
        for entity in std::mem::take(&mut pending) {
            if parent_of.contains_key(&entity) {
                return Err(SnapshotError::TaskFailed {
                    entity,
                    message: "fetch task ended without a result".to_string(),
                });
            }
            self.tracker.record_entity_failed();
            snapshot.failures.push(FetchFailure {
                entity: entity.clone(),
                error_code: TASK_FAILED_CODE.to_string(),
                message: "fetch task ended without a result".to_string(),
            });
            snapshot.records.insert(entity, Vec::new());
        }

        tracing::info!(
            records = snapshot.record_count(),
            failures = snapshot.failures.len(),
            timed_out = snapshot.timed_out.len(),
            "Snapshot loaded"
        );
        Ok(snapshot)
    }

    fn absorb_failure(
        &self,
        snapshot: &mut EntitySnapshot,
        parent_of: &HashMap<String, ParentKind>,
        request: &SnapshotRequest,
        entity: &str,
        error: &StoreError,
    ) {
        tracing::warn!(
            entity = %entity,
            error = %error,
            "Entity fetch failed, treating as zero records"
        );
        self.tracker.record_entity_failed();
        snapshot
            .failures
            .push(FetchFailure::from_store_error(entity, error));
        if let Some(kind) = parent_of.get(entity) {
            snapshot.parent_ids.insert(*kind, HashSet::new());
        }
        if request.wants_records(entity) {
            snapshot.records.insert(entity.to_string(), Vec::new());
        }
    }
}
