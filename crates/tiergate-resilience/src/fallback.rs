//! Fallback decisions for when the store cannot answer.
//!
//! The engine consults the cache first; this policy only runs when no
//! cached decision exists. Critical failures deny outright. Entities whose
//! ids look administrative or financial get the emergency map, which keeps
//! the top tiers operational and shuts everyone else out. Everything else
//! degrades to read-only.

use serde::{Deserialize, Serialize};
use tiergate_core::{AccessDecision, EngineError, EntityRef, Permission, Severity, Tier};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    /// Id substrings that mark an entity as critical for fallback purposes.
    pub critical_entity_patterns: Vec<String>,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            critical_entity_patterns: vec![
                "roi".into(),
                "financial".into(),
                "admin".into(),
                "user-management".into(),
                "system".into(),
                "audit".into(),
            ],
        }
    }
}

impl FallbackPolicy {
    #[must_use]
    pub fn is_critical_entity(&self, entity: &EntityRef) -> bool {
        self.critical_entity_patterns
            .iter()
            .any(|pattern| entity.id.contains(pattern.as_str()))
    }

    /// Decide access without the store.
    #[must_use]
    pub fn decide(&self, entity: &EntityRef, tier: Tier, error: &EngineError) -> AccessDecision {
        warn!(
            entity = %entity,
            tier = %tier,
            error = %error,
            "serving fallback permission decision"
        );

        if error.severity() == Severity::Critical {
            return AccessDecision::no_access(
                entity.kind,
                "Access denied: the permission service is unavailable.",
            )
            .as_fallback();
        }

        let permission = if self.is_critical_entity(entity) {
            Self::emergency_permission(tier)
        } else {
            Self::read_only_permission(tier)
        };

        AccessDecision::from_permission(permission, entity.kind)
            .with_reason("Degraded mode: decision served without the authoritative store.")
            .as_fallback()
    }

    /// Emergency map for critical entities.
    const fn emergency_permission(tier: Tier) -> Permission {
        match tier {
            Tier::Master => Permission::Full,
            Tier::Senior => Permission::ReadOnly,
            Tier::HrFinance | Tier::Mid | Tier::External => Permission::None,
        }
    }

    /// Conservative map for ordinary entities.
    const fn read_only_permission(tier: Tier) -> Permission {
        match tier {
            Tier::External => Permission::None,
            _ => Permission::ReadOnly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FallbackPolicy {
        FallbackPolicy::default()
    }

    #[test]
    fn critical_errors_deny_everyone() {
        let decision = policy().decide(
            &EntityRef::page("dashboard"),
            Tier::Master,
            &EngineError::store("all replicas down"),
        );
        assert_eq!(decision.permission, Permission::None);
        assert!(decision.fallback);
        assert!(!decision.can_read);
    }

    #[test]
    fn critical_entities_use_the_emergency_map() {
        let p = policy();
        let entity = EntityRef::page("financial-reports");
        let err = EngineError::network("connection refused");

        let master = p.decide(&entity, Tier::Master, &err);
        assert_eq!(master.permission, Permission::Full);
        assert!(master.fallback);

        let senior = p.decide(&entity, Tier::Senior, &err);
        assert_eq!(senior.permission, Permission::ReadOnly);

        for tier in [Tier::HrFinance, Tier::Mid, Tier::External] {
            assert_eq!(p.decide(&entity, tier, &err).permission, Permission::None);
        }
    }

    #[test]
    fn ordinary_entities_degrade_to_read_only() {
        let p = policy();
        let entity = EntityRef::section("weekly-notes");
        let err = EngineError::timeout("slow");

        let mid = p.decide(&entity, Tier::Mid, &err);
        assert_eq!(mid.permission, Permission::ReadOnly);
        assert!(mid.can_read);
        assert!(!mid.can_update);

        let external = p.decide(&entity, Tier::External, &err);
        assert_eq!(external.permission, Permission::None);
    }

    #[test]
    fn critical_entity_matching_is_substring_based() {
        let p = policy();
        assert!(p.is_critical_entity(&EntityRef::page("roi-overview")));
        assert!(p.is_critical_entity(&EntityRef::field("audit_trail")));
        assert!(!p.is_critical_entity(&EntityRef::section("team-updates")));
    }
}
