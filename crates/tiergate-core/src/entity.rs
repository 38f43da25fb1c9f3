//! Protected entities: pages, sections, and fields.
//!
//! Entities form a three-level containment hierarchy. Risk flags on a field
//! are combined with the flags of its ancestors at resolution time; they are
//! not stored redundantly on the field row.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Tier;

/// Kind of protected entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Page,
    Section,
    Field,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Section => "section",
            Self::Field => "field",
        }
    }

    /// Approve capability is only meaningful for pages and sections.
    #[must_use]
    pub const fn supports_approve(self) -> bool {
        matches!(self, Self::Page | Self::Section)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a protected entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    #[must_use]
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn page(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Page, id)
    }

    #[must_use]
    pub fn section(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Section, id)
    }

    #[must_use]
    pub fn field(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Field, id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Risk flags attached to catalog entries.
///
/// For resolution, a field inherits `financial` from its section and
/// `critical` from its page; the store folds ancestors in when serving a
/// catalog read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFlags {
    pub critical: bool,
    pub financial: bool,
    pub sensitive: bool,
}

impl RiskFlags {
    pub const NONE: Self = Self {
        critical: false,
        financial: false,
        sensitive: false,
    };

    /// Union with ancestor flags.
    #[must_use]
    pub const fn merged_with(self, ancestor: Self) -> Self {
        Self {
            critical: self.critical || ancestor.critical,
            financial: self.financial || ancestor.financial,
            sensitive: self.sensitive || ancestor.sensitive,
        }
    }
}

/// Catalog metadata for one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub entity: EntityRef,
    /// Human-facing lookup name (e.g. `projects-roi`, `total_revenue`).
    pub name: String,
    /// Parent section for a field, parent page for a section, none for a page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntityRef>,
    pub flags: RiskFlags,
    pub active: bool,
}

impl CatalogEntry {
    #[must_use]
    pub fn new(entity: EntityRef, name: impl Into<String>) -> Self {
        Self {
            entity,
            name: name.into(),
            parent: None,
            flags: RiskFlags::NONE,
            active: true,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: EntityRef) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub const fn with_flags(mut self, flags: RiskFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// One field row in the hierarchy snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldNode {
    pub entry: CatalogEntry,
}

/// One section with its fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionNode {
    pub entry: CatalogEntry,
    pub fields: Vec<FieldNode>,
}

/// One page with its sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageNode {
    pub entry: CatalogEntry,
    pub sections: Vec<SectionNode>,
}

/// Full entity tree with counts, as served by `list_tree`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HierarchySnapshot {
    pub pages: Vec<PageNode>,
    pub total_pages: usize,
    pub total_sections: usize,
    pub total_fields: usize,
    /// Grant counts per tier across all entities.
    pub grant_counts: HashMap<Tier, usize>,
}

impl HierarchySnapshot {
    /// Recompute the counters from the tree itself.
    pub fn recount(&mut self) {
        self.total_pages = self.pages.len();
        self.total_sections = self.pages.iter().map(|p| p.sections.len()).sum();
        self.total_fields = self
            .pages
            .iter()
            .flat_map(|p| &p.sections)
            .map(|s| s.fields.len())
            .sum();
    }
}
