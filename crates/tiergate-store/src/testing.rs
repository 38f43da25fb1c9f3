//! Store test doubles.

use async_trait::async_trait;
use parking_lot::Mutex;

use tiergate_core::{
    AuditEntry, AuditFilter, CatalogEntry, EntityKind, EntityRef, Grant, HierarchySnapshot, Tier,
};

use crate::{PermissionStore, StoreError};

/// A store that fails every call, for simulating outages.
///
/// The error returned is cloned from a configurable template so tests can
/// exercise each classification path.
pub struct FailingStore {
    error: Mutex<StoreError>,
}

impl FailingStore {
    #[must_use]
    pub fn new(error: StoreError) -> Self {
        Self {
            error: Mutex::new(error),
        }
    }

    /// Total outage: every call fails with a network error.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::new(StoreError::network("store unreachable"))
    }

    /// Swap the error template mid-test.
    pub fn set_error(&self, error: StoreError) {
        *self.error.lock() = error;
    }

    fn fail<T>(&self) -> Result<T, StoreError> {
        Err(self.error.lock().clone())
    }
}

#[async_trait]
impl PermissionStore for FailingStore {
    async fn get_grant(
        &self,
        _entity: &EntityRef,
        _tier: Tier,
    ) -> Result<Option<Grant>, StoreError> {
        self.fail()
    }

    async fn upsert_grant(&self, _grant: Grant) -> Result<Grant, StoreError> {
        self.fail()
    }

    async fn get_catalog_entry(
        &self,
        _entity: &EntityRef,
    ) -> Result<Option<CatalogEntry>, StoreError> {
        self.fail()
    }

    async fn find_entity_by_name(
        &self,
        _kind: EntityKind,
        _name: &str,
    ) -> Result<Option<CatalogEntry>, StoreError> {
        self.fail()
    }

    async fn list_tree(&self) -> Result<HierarchySnapshot, StoreError> {
        self.fail()
    }

    async fn append_audit(&self, _entry: AuditEntry) -> Result<(), StoreError> {
        self.fail()
    }

    async fn audit_log(&self, _filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        self.fail()
    }
}
