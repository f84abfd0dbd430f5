//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bizdesk_core::TenantId;
use bizdesk_store::{
    EntityAccessor, EntityStore, Fields, InMemoryStore, Record, StoreError, StoreResult,
};

pub const ORG: &str = "org-1";

pub fn tenant() -> TenantId {
    TenantId::new(ORG).unwrap()
}

/// Record in the test tenant.
pub fn row(id: &str) -> Record {
    Record::new().with("id", id).with("organisation_id", ORG)
}

/// Initialize logging for tests.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

// =============================================================================
// Manual Mock Store
// =============================================================================

/// How a mocked call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unavailable,
    PermissionDenied,
    NotFound,
}

impl MockFailure {
    fn to_error(self, entity: &str, id: &str, operation: &str) -> StoreError {
        match self {
            MockFailure::Unavailable => StoreError::Unavailable {
                message: "connection reset".to_string(),
            },
            MockFailure::PermissionDenied => StoreError::PermissionDenied {
                entity: entity.to_string(),
                operation: operation.to_string(),
            },
            MockFailure::NotFound => StoreError::not_found(entity, id),
        }
    }
}

#[derive(Default)]
struct Behavior {
    list_errors: HashMap<String, MockFailure>,
    delete_errors: HashMap<(String, String), MockFailure>,
    update_errors: HashSet<(String, String)>,
    delays: HashMap<String, Duration>,
}

/// Entity store wrapping an [`InMemoryStore`] with failure injection and
/// call counters.
#[derive(Clone)]
pub struct MockStore {
    inner: InMemoryStore,
    behavior: Arc<RwLock<Behavior>>,
    list_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockStore {
    #[must_use]
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            behavior: Arc::new(RwLock::new(Behavior::default())),
            list_calls: Arc::new(AtomicUsize::new(0)),
            update_calls: Arc::new(AtomicUsize::new(0)),
            delete_calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_list_error(self, entity: &str, failure: MockFailure) -> Self {
        self.behavior
            .write()
            .unwrap()
            .list_errors
            .insert(entity.to_string(), failure);
        self
    }

    pub fn with_delete_error(self, entity: &str, id: &str, failure: MockFailure) -> Self {
        self.behavior
            .write()
            .unwrap()
            .delete_errors
            .insert((entity.to_string(), id.to_string()), failure);
        self
    }

    pub fn with_delete_not_found(self, entity: &str, id: &str) -> Self {
        self.with_delete_error(entity, id, MockFailure::NotFound)
    }

    pub fn with_update_error(self, entity: &str, id: &str) -> Self {
        self.behavior
            .write()
            .unwrap()
            .update_errors
            .insert((entity.to_string(), id.to_string()));
        self
    }

    pub fn with_delay(self, entity: &str, delay: Duration) -> Self {
        self.behavior
            .write()
            .unwrap()
            .delays
            .insert(entity.to_string(), delay);
        self
    }

    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl EntityStore for MockStore {
    fn accessor(&self, entity: &str) -> Option<Arc<dyn EntityAccessor>> {
        let inner = self.inner.accessor(entity)?;
        Some(Arc::new(MockAccessor {
            inner,
            store: self.clone(),
        }))
    }
}

struct MockAccessor {
    inner: Arc<dyn EntityAccessor>,
    store: MockStore,
}

#[async_trait]
impl EntityAccessor for MockAccessor {
    fn entity(&self) -> &str {
        self.inner.entity()
    }

    async fn list(&self, tenant: &TenantId) -> StoreResult<Vec<Record>> {
        self.store.list_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.store.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.store.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let (delay, failure) = {
            let behavior = self.store.behavior.read().unwrap();
            (
                behavior.delays.get(self.entity()).copied(),
                behavior.list_errors.get(self.entity()).copied(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.store.in_flight.fetch_sub(1, Ordering::SeqCst);

        match failure {
            Some(failure) => Err(failure.to_error(self.entity(), "", "list")),
            None => self.inner.list(tenant).await,
        }
    }

    async fn update(&self, tenant: &TenantId, id: &str, fields: Fields) -> StoreResult<Record> {
        self.store.update_calls.fetch_add(1, Ordering::SeqCst);
        let fails = self
            .store
            .behavior
            .read()
            .unwrap()
            .update_errors
            .contains(&(self.entity().to_string(), id.to_string()));
        if fails {
            return Err(MockFailure::Unavailable.to_error(self.entity(), id, "update"));
        }
        self.inner.update(tenant, id, fields).await
    }

    async fn delete(&self, tenant: &TenantId, id: &str) -> StoreResult<()> {
        self.store.delete_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self
            .store
            .behavior
            .read()
            .unwrap()
            .delete_errors
            .get(&(self.entity().to_string(), id.to_string()))
            .copied();
        match failure {
            Some(failure) => Err(failure.to_error(self.entity(), id, "delete")),
            None => self.inner.delete(tenant, id).await,
        }
    }
}

// =============================================================================
// Datasets
// =============================================================================

/// Employees `{E1}` and attendance rows pointing at `E1` and `E2`.
pub fn attendance_dataset() -> InMemoryStore {
    InMemoryStore::new()
        .with_records("Employee", vec![row("E1").with("name", "Ada")])
        .with_records(
            "Attendance",
            vec![
                row("A1").with("employee_id", "E1"),
                row("A2").with("employee_id", "E2").with("description", "Monday"),
            ],
        )
}

/// Product `P1` recorded at 9 with stock levels `[5, 3, 2]`.
pub fn stock_dataset() -> InMemoryStore {
    InMemoryStore::new()
        .with_records(
            "Product",
            vec![row("P1").with("name", "Widget").with("stock_quantity", 9)],
        )
        .with_records("Warehouse", vec![row("W1"), row("W2"), row("W3")])
        .with_records(
            "StockLevel",
            vec![
                row("L1").with("product_id", "P1").with("warehouse_id", "W1").with("quantity", 5),
                row("L2").with("product_id", "P1").with("warehouse_id", "W2").with("quantity", 3),
                row("L3").with("product_id", "P1").with("warehouse_id", "W3").with("quantity", 2),
            ],
        )
}
