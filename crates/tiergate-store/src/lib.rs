//! Tiergate Store - durable grant and catalog storage.
//!
//! The store is the source of truth for grants and entity metadata. It is
//! fronted by the cache layer and guarded by the resilience layer; on I/O
//! failure it only classifies the cause and propagates a typed error, it
//! never falls back on its own.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod memory;
mod testing;

pub use error::*;
pub use memory::*;
pub use testing::*;

use async_trait::async_trait;

use tiergate_core::{
    AuditEntry, AuditFilter, CatalogEntry, EntityKind, EntityRef, Grant, HierarchySnapshot, Tier,
};

/// Abstract read/write interface over the relational source.
///
/// The engine is agnostic to the concrete database behind this trait.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Fetch the grant for an (entity, tier) pair, if any.
    ///
    /// # Errors
    /// Returns a typed `StoreError` on any I/O failure.
    async fn get_grant(&self, entity: &EntityRef, tier: Tier)
        -> Result<Option<Grant>, StoreError>;

    /// Insert or replace a grant. Last writer wins; the write timestamp is
    /// recorded on the stored row.
    ///
    /// # Errors
    /// Returns a typed `StoreError` on any I/O failure.
    async fn upsert_grant(&self, grant: Grant) -> Result<Grant, StoreError>;

    /// Fetch catalog metadata for an entity with ancestor risk flags folded
    /// in. Inactive or orphaned entities resolve to `None`.
    ///
    /// # Errors
    /// Returns a typed `StoreError` on any I/O failure.
    async fn get_catalog_entry(
        &self,
        entity: &EntityRef,
    ) -> Result<Option<CatalogEntry>, StoreError>;

    /// Look up an active entity by its catalog name.
    ///
    /// # Errors
    /// Returns a typed `StoreError` on any I/O failure.
    async fn find_entity_by_name(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Option<CatalogEntry>, StoreError>;

    /// Full hierarchy with counts and grant counts per tier.
    ///
    /// # Errors
    /// Returns a typed `StoreError` on any I/O failure.
    async fn list_tree(&self) -> Result<HierarchySnapshot, StoreError>;

    /// Append an audit entry. Audit rows are immutable once written.
    ///
    /// # Errors
    /// Returns a typed `StoreError` on any I/O failure.
    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// Query the audit log, newest first.
    ///
    /// # Errors
    /// Returns a typed `StoreError` on any I/O failure.
    async fn audit_log(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError>;
}
