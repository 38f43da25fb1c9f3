//! Result shapes returned by the engine façade.

use serde::{Deserialize, Serialize};

use crate::{gate_capabilities, CapabilitySet, EntityKind, Permission};

/// Uniform access result returned to every query caller.
///
/// `can_approve` is `None` for fields. `fallback` marks decisions produced
/// by the resilience layer instead of the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub permission: Permission,
    pub can_read: bool,
    pub can_create: bool,
    pub can_update: bool,
    pub can_delete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_approve: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub fallback: bool,
}

impl AccessDecision {
    /// Build a decision from stored capabilities gated through the effective
    /// permission.
    #[must_use]
    pub fn from_grant(
        effective: Permission,
        capabilities: CapabilitySet,
        kind: EntityKind,
    ) -> Self {
        let gated = gate_capabilities(capabilities, effective, kind);
        Self {
            permission: effective,
            can_read: gated.read,
            can_create: gated.create,
            can_update: gated.update,
            can_delete: gated.delete,
            can_approve: gated.approve,
            reason: None,
            fallback: false,
        }
    }

    /// A decision derived purely from an effective permission, using the
    /// default capability table. This is what the fallback path returns
    /// when no stored flags are available.
    #[must_use]
    pub fn from_permission(effective: Permission, kind: EntityKind) -> Self {
        let defaults = CapabilitySet::defaults_for(effective, kind.supports_approve());
        Self::from_grant(effective, defaults, kind)
    }

    /// Deny-everything decision with a reason.
    #[must_use]
    pub fn no_access(kind: EntityKind, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::from_permission(Permission::None, kind)
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub const fn as_fallback(mut self) -> Self {
        self.fallback = true;
        self
    }
}

/// Outcome of the security validator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Errors block the mutation; warnings do not.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Per-item result of a bulk mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkItemFailure {
    pub index: usize,
    pub entity: crate::EntityRef,
    pub errors: Vec<String>,
}

/// Outcome of a bulk mutation: per-item isolation, one failure does not
/// abort the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: Vec<BulkItemFailure>,
}

impl BulkOutcome {
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_access_denies_everything() {
        let decision = AccessDecision::no_access(EntityKind::Page, "no grant");
        assert_eq!(decision.permission, Permission::None);
        assert!(!decision.can_read && !decision.can_create);
        assert_eq!(decision.can_approve, Some(false));
        assert_eq!(decision.reason.as_deref(), Some("no grant"));
    }

    #[test]
    fn from_permission_uses_the_default_table() {
        let decision = AccessDecision::from_permission(Permission::ReadOnly, EntityKind::Field);
        assert!(decision.can_read);
        assert!(!decision.can_update);
        assert_eq!(decision.can_approve, None);
        assert!(!decision.fallback);
        assert!(decision.as_fallback().fallback);
    }

    #[test]
    fn report_validity_tracks_errors_only() {
        let mut report = ValidationReport::default();
        report.warning("broad grant");
        assert!(report.is_valid());
        report.error("rate limited");
        assert!(!report.is_valid());
    }
}
