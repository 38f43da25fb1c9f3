//! Permission grants and capability flag sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntityRef, Permission, Tier};

/// Boolean capability flags carried by a grant.
///
/// `approve` is only meaningful for pages and sections and is absent for
/// fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub create: bool,
    pub read: bool,
    pub update: bool,
    pub delete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approve: Option<bool>,
}

impl CapabilitySet {
    /// Default capability table by permission type, used when a store record
    /// omits explicit flags.
    #[must_use]
    pub const fn defaults_for(permission: Permission, include_approve: bool) -> Self {
        match permission {
            Permission::None => Self {
                create: false,
                read: false,
                update: false,
                delete: false,
                approve: if include_approve { Some(false) } else { None },
            },
            Permission::ReadOnly => Self {
                create: false,
                read: true,
                update: false,
                delete: false,
                approve: if include_approve { Some(false) } else { None },
            },
            Permission::OwnOnly | Permission::AssignedOnly => Self {
                create: false,
                read: true,
                update: true,
                delete: false,
                approve: if include_approve { Some(false) } else { None },
            },
            Permission::Full => Self {
                create: true,
                read: true,
                update: true,
                delete: true,
                approve: if include_approve { Some(true) } else { None },
            },
        }
    }

    /// A flag set is monotone w.r.t. the permission type when no capability
    /// exceeds what the type implies. The security validator rejects grants
    /// that violate this.
    #[must_use]
    pub fn is_consistent_with(&self, permission: Permission) -> bool {
        let ceiling = Self::defaults_for(permission, true);
        let within = |have: bool, allowed: bool| allowed || !have;
        within(self.create, ceiling.create)
            && within(self.update, ceiling.update)
            && within(self.delete, ceiling.delete)
            && within(
                self.approve.unwrap_or(false),
                ceiling.approve.unwrap_or(false),
            )
    }
}

/// Stored permission record for one (entity, tier) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub entity: EntityRef,
    pub tier: Tier,
    pub permission: Permission,
    pub capabilities: CapabilitySet,
    pub granted_by: String,
    pub granted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Grant {
    /// Build a grant with the default capability flags for its permission.
    #[must_use]
    pub fn with_defaults(
        entity: EntityRef,
        tier: Tier,
        permission: Permission,
        granted_by: impl Into<String>,
    ) -> Self {
        let include_approve = entity.kind.supports_approve();
        Self {
            capabilities: CapabilitySet::defaults_for(permission, include_approve),
            entity,
            tier,
            permission,
            granted_by: granted_by.into(),
            granted_at: Utc::now(),
            reason: None,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A single item in a change or bulk-change request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub entity: EntityRef,
    pub target_tier: Tier,
    pub permission: Permission,
    /// Explicit capability flags; defaults for the permission type apply
    /// when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<CapabilitySet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChangeRequest {
    #[must_use]
    pub const fn new(entity: EntityRef, target_tier: Tier, permission: Permission) -> Self {
        Self {
            entity,
            target_tier,
            permission,
            capabilities: None,
            reason: None,
        }
    }

    /// Attach a free-text justification. Large permission jumps are only
    /// accepted when one is present.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Resolve explicit or default capabilities for this request.
    #[must_use]
    pub fn effective_capabilities(&self) -> CapabilitySet {
        self.capabilities.unwrap_or_else(|| {
            CapabilitySet::defaults_for(self.permission, self.entity.kind.supports_approve())
        })
    }
}
