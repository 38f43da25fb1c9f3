//! Append-only audit records for permission mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EntityKind, EntityRef, Grant, Tier};

/// What a mutation did to the grant row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// First grant for the (entity, tier) pair.
    Grant,
    /// Replacement of an existing grant.
    Modify,
}

/// Immutable record of one permission mutation.
///
/// Created on every successful mutation (and on rejected attempts via the
/// monitoring feed), never updated, retained per the configured window.
/// Purging is an external operational concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity: EntityRef,
    pub tier: Tier,
    pub action: AuditAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_grant: Option<Grant>,
    pub new_grant: Grant,
    pub actor: String,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEntry {
    /// Build an entry for a mutation; the action is derived from whether an
    /// old grant existed.
    #[must_use]
    pub fn for_change(old_grant: Option<Grant>, new_grant: Grant, actor: impl Into<String>) -> Self {
        let action = if old_grant.is_some() {
            AuditAction::Modify
        } else {
            AuditAction::Grant
        };
        Self {
            id: Uuid::new_v4(),
            entity: new_grant.entity.clone(),
            tier: new_grant.tier,
            action,
            old_grant,
            reason: new_grant.reason.clone(),
            new_grant,
            actor: actor.into(),
            at: Utc::now(),
        }
    }
}

/// Filter for audit log queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Cap on returned entries, newest first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl AuditFilter {
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(kind) = self.kind {
            if entry.entity.kind != kind {
                return false;
            }
        }
        if let Some(id) = &self.entity_id {
            if &entry.entity.id != id {
                return false;
            }
        }
        if let Some(actor) = &self.actor {
            if &entry.actor != actor {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.at < since {
                return false;
            }
        }
        true
    }
}
