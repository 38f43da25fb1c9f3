//! In-memory permission store.
//!
//! Suitable for testing and single-process deployments; also the reference
//! semantics for orphan exclusion and last-writer-wins upserts.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use tiergate_core::{
    AuditEntry, AuditFilter, CapabilitySet, CatalogEntry, EntityKind, EntityRef, Grant,
    HierarchySnapshot, FieldNode, PageNode, Permission, RiskFlags, SectionNode, Tier,
};

use crate::{PermissionStore, StoreError};

#[derive(Default)]
struct Inner {
    catalog: HashMap<EntityRef, CatalogEntry>,
    grants: HashMap<(EntityRef, Tier), Grant>,
    audit: Vec<AuditEntry>,
}

/// In-memory store backed by `parking_lot::RwLock` maps.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page in the catalog.
    pub fn add_page(&self, id: &str, name: &str, flags: RiskFlags) {
        let entry = CatalogEntry::new(EntityRef::page(id), name).with_flags(flags);
        self.inner.write().catalog.insert(entry.entity.clone(), entry);
    }

    /// Register a section under a page.
    pub fn add_section(&self, id: &str, name: &str, page_id: &str, flags: RiskFlags) {
        let entry = CatalogEntry::new(EntityRef::section(id), name)
            .with_parent(EntityRef::page(page_id))
            .with_flags(flags);
        self.inner.write().catalog.insert(entry.entity.clone(), entry);
    }

    /// Register a field under a section.
    pub fn add_field(&self, id: &str, name: &str, section_id: &str, flags: RiskFlags) {
        let entry = CatalogEntry::new(EntityRef::field(id), name)
            .with_parent(EntityRef::section(section_id))
            .with_flags(flags);
        self.inner.write().catalog.insert(entry.entity.clone(), entry);
    }

    /// Mark an entity inactive; it then resolves as not found, as do its
    /// descendants.
    pub fn deactivate(&self, entity: &EntityRef) {
        if let Some(entry) = self.inner.write().catalog.get_mut(entity) {
            entry.active = false;
        }
    }

    /// Install the default grant table for a new page: master full, senior
    /// full without delete, hr_finance and mid read-only, external none.
    pub fn seed_default_grants(&self, page_id: &str, actor: &str) {
        let entity = EntityRef::page(page_id);
        let rows = [
            (Tier::Master, Permission::Full, None),
            (Tier::Senior, Permission::Full, Some(false)),
            (Tier::HrFinance, Permission::ReadOnly, None),
            (Tier::Mid, Permission::ReadOnly, None),
            (Tier::External, Permission::None, None),
        ];
        let mut inner = self.inner.write();
        for (tier, permission, delete_override) in rows {
            let mut grant = Grant::with_defaults(entity.clone(), tier, permission, actor);
            if let Some(delete) = delete_override {
                grant.capabilities = CapabilitySet {
                    delete,
                    ..grant.capabilities
                };
            }
            inner.grants.insert((entity.clone(), tier), grant);
        }
    }

    /// Resolve an entry with ancestor flags folded in, excluding inactive
    /// and orphaned entities. A field is orphaned when its section (or the
    /// section's page) is missing or inactive.
    fn resolve_entry(inner: &Inner, entity: &EntityRef) -> Option<CatalogEntry> {
        let entry = inner.catalog.get(entity)?;
        if !entry.active {
            return None;
        }

        let mut flags = entry.flags;
        let mut parent = entry.parent.clone();
        while let Some(parent_ref) = parent {
            let ancestor = inner.catalog.get(&parent_ref)?;
            if !ancestor.active {
                return None;
            }
            flags = flags.merged_with(ancestor.flags);
            parent = ancestor.parent.clone();
        }

        Some(CatalogEntry {
            flags,
            ..entry.clone()
        })
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_grant(
        &self,
        entity: &EntityRef,
        tier: Tier,
    ) -> Result<Option<Grant>, StoreError> {
        let inner = self.inner.read();
        Ok(inner.grants.get(&(entity.clone(), tier)).cloned())
    }

    async fn upsert_grant(&self, mut grant: Grant) -> Result<Grant, StoreError> {
        grant.granted_at = Utc::now();
        let key = (grant.entity.clone(), grant.tier);
        debug!(entity = %grant.entity, tier = %grant.tier, permission = %grant.permission, "upserting grant");
        self.inner.write().grants.insert(key, grant.clone());
        Ok(grant)
    }

    async fn get_catalog_entry(
        &self,
        entity: &EntityRef,
    ) -> Result<Option<CatalogEntry>, StoreError> {
        let inner = self.inner.read();
        Ok(Self::resolve_entry(&inner, entity))
    }

    async fn find_entity_by_name(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> Result<Option<CatalogEntry>, StoreError> {
        let inner = self.inner.read();
        let found = inner
            .catalog
            .values()
            .find(|entry| entry.entity.kind == kind && entry.name == name)
            .map(|entry| entry.entity.clone());
        Ok(found.and_then(|entity| Self::resolve_entry(&inner, &entity)))
    }

    async fn list_tree(&self) -> Result<HierarchySnapshot, StoreError> {
        let inner = self.inner.read();

        let mut pages: Vec<PageNode> = inner
            .catalog
            .values()
            .filter(|entry| entry.entity.kind == EntityKind::Page && entry.active)
            .map(|entry| PageNode {
                entry: entry.clone(),
                sections: Vec::new(),
            })
            .collect();
        pages.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));

        for page in &mut pages {
            let mut sections: Vec<SectionNode> = inner
                .catalog
                .values()
                .filter(|entry| {
                    entry.entity.kind == EntityKind::Section
                        && entry.active
                        && entry.parent.as_ref() == Some(&page.entry.entity)
                })
                .map(|entry| SectionNode {
                    entry: entry.clone(),
                    fields: Vec::new(),
                })
                .collect();
            sections.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));

            for section in &mut sections {
                let mut fields: Vec<FieldNode> = inner
                    .catalog
                    .values()
                    .filter(|entry| {
                        entry.entity.kind == EntityKind::Field
                            && entry.active
                            && entry.parent.as_ref() == Some(&section.entry.entity)
                    })
                    .map(|entry| FieldNode {
                        entry: entry.clone(),
                    })
                    .collect();
                fields.sort_by(|a, b| a.entry.name.cmp(&b.entry.name));
                section.fields = fields;
            }
            page.sections = sections;
        }

        let mut grant_counts: HashMap<Tier, usize> = HashMap::new();
        for (_, tier) in inner.grants.keys() {
            *grant_counts.entry(*tier).or_insert(0) += 1;
        }

        let mut snapshot = HierarchySnapshot {
            pages,
            grant_counts,
            ..HierarchySnapshot::default()
        };
        snapshot.recount();
        Ok(snapshot)
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.inner.write().audit.push(entry);
        Ok(())
    }

    async fn audit_log(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let inner = self.inner.read();
        let mut entries: Vec<AuditEntry> = inner
            .audit
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.at.cmp(&a.at));
        if let Some(limit) = filter.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_page("p1", "projects-roi", RiskFlags {
            critical: true,
            financial: true,
            sensitive: false,
        });
        store.add_section("s1", "financial-summary", "p1", RiskFlags {
            financial: true,
            ..RiskFlags::NONE
        });
        store.add_field("f1", "total_revenue", "s1", RiskFlags {
            sensitive: true,
            ..RiskFlags::NONE
        });
        store
    }

    #[tokio::test]
    async fn field_inherits_ancestor_flags() {
        let store = seeded();
        let entry = store
            .get_catalog_entry(&EntityRef::field("f1"))
            .await
            .unwrap()
            .unwrap();
        assert!(entry.flags.sensitive);
        assert!(entry.flags.financial);
        assert!(entry.flags.critical);
    }

    #[tokio::test]
    async fn deactivated_page_orphans_its_fields() {
        let store = seeded();
        store.deactivate(&EntityRef::page("p1"));

        assert!(store
            .get_catalog_entry(&EntityRef::field("f1"))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_catalog_entry(&EntityRef::section("s1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn upsert_is_last_writer_wins() {
        let store = seeded();
        let entity = EntityRef::page("p1");
        let first = Grant::with_defaults(entity.clone(), Tier::Mid, Permission::None, "a");
        let second = Grant::with_defaults(entity.clone(), Tier::Mid, Permission::ReadOnly, "b");

        store.upsert_grant(first).await.unwrap();
        let stored = store.upsert_grant(second).await.unwrap();

        let current = store.get_grant(&entity, Tier::Mid).await.unwrap().unwrap();
        assert_eq!(current.permission, Permission::ReadOnly);
        assert_eq!(current.granted_by, "b");
        assert!(current.granted_at <= Utc::now());
        assert_eq!(stored.permission, Permission::ReadOnly);
    }

    #[tokio::test]
    async fn default_grant_seeding_matches_the_tier_table() {
        let store = seeded();
        store.seed_default_grants("p1", "setup");
        let entity = EntityRef::page("p1");

        let master = store.get_grant(&entity, Tier::Master).await.unwrap().unwrap();
        assert_eq!(master.permission, Permission::Full);
        assert!(master.capabilities.delete);

        let senior = store.get_grant(&entity, Tier::Senior).await.unwrap().unwrap();
        assert_eq!(senior.permission, Permission::Full);
        assert!(!senior.capabilities.delete);

        let external = store.get_grant(&entity, Tier::External).await.unwrap().unwrap();
        assert_eq!(external.permission, Permission::None);
    }

    #[tokio::test]
    async fn tree_counts_and_name_lookup() {
        let store = seeded();
        store.seed_default_grants("p1", "setup");

        let tree = store.list_tree().await.unwrap();
        assert_eq!(tree.total_pages, 1);
        assert_eq!(tree.total_sections, 1);
        assert_eq!(tree.total_fields, 1);
        assert_eq!(tree.grant_counts.get(&Tier::Master), Some(&1));

        let by_name = store
            .find_entity_by_name(EntityKind::Page, "projects-roi")
            .await
            .unwrap();
        assert!(by_name.is_some());
        assert!(store
            .find_entity_by_name(EntityKind::Page, "missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn audit_log_filters_and_orders_newest_first() {
        let store = seeded();
        let g1 = Grant::with_defaults(EntityRef::page("p1"), Tier::Mid, Permission::ReadOnly, "a");
        let g2 = Grant::with_defaults(EntityRef::page("p1"), Tier::Mid, Permission::Full, "b");
        store
            .append_audit(AuditEntry::for_change(None, g1.clone(), "a"))
            .await
            .unwrap();
        store
            .append_audit(AuditEntry::for_change(Some(g1), g2, "b"))
            .await
            .unwrap();

        let all = store.audit_log(&AuditFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].at >= all[1].at);

        let filtered = store
            .audit_log(&AuditFilter {
                actor: Some("a".into()),
                ..AuditFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }
}
