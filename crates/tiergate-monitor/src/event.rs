//! Recorded monitoring events.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiergate_core::{DateTime, EntityRef, Tier, Utc, Uuid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PermissionCheck,
    PermissionChange,
    BulkOperation,
    Validation,
    AuthFailure,
}

/// One recorded occurrence. Fields that do not apply to a given kind stay
/// `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityRef>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl MonitorEvent {
    #[must_use]
    pub fn new(kind: EventKind, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            at: Utc::now(),
            actor: None,
            tier: None,
            entity: None,
            success,
            duration: None,
            detail: None,
        }
    }

    #[must_use]
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    #[must_use]
    pub const fn tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    #[must_use]
    pub fn entity(mut self, entity: EntityRef) -> Self {
        self.entity = Some(entity);
        self
    }

    #[must_use]
    pub const fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
