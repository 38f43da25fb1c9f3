//! Effective-permission resolution.
//!
//! Pure, deterministic computation of the effective permission from a raw
//! grant plus the entity's risk flags and the resolving tier. This is the
//! unit under test for every inheritance and cap rule; it performs no I/O.

use serde::{Deserialize, Serialize};

use crate::{CapabilitySet, EntityKind, Permission, RiskFlags, Tier};

/// Policy knobs for the resolver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResolvePolicy {
    /// Minimum tier that escapes the critical-entity cap. Tiers ranked below
    /// this are capped at `read_only` on critical entities.
    pub critical_min_tier: Tier,
    /// Explicit sensitive-data approval: when set, a `full` grant on a
    /// sensitive field survives for the two lowest tiers instead of being
    /// capped at `none`.
    pub sensitive_override: bool,
}

impl Default for ResolvePolicy {
    fn default() -> Self {
        Self {
            critical_min_tier: Tier::Senior,
            sensitive_override: false,
        }
    }
}

/// Compute the effective permission for a grant.
///
/// Caps apply most-restrictive-first:
/// 1. a `none` grant stays `none` regardless of flags;
/// 2. financial entities are capped at `none` for the lowest tier;
/// 3. sensitive entities are capped at `none` for the two lowest tiers
///    unless the grant is explicitly `full` and the override is set;
/// 4. critical entities cap tiers below the configured minimum at
///    `read_only`.
#[must_use]
pub fn resolve_permission(
    granted: Permission,
    tier: Tier,
    flags: RiskFlags,
    policy: &ResolvePolicy,
) -> Permission {
    if granted == Permission::None {
        return Permission::None;
    }

    if flags.financial && tier == Tier::External {
        return Permission::None;
    }

    if flags.sensitive && tier.is_low_tier() {
        let overridden = granted == Permission::Full && policy.sensitive_override;
        if !overridden {
            return Permission::None;
        }
    }

    if flags.critical && tier.rank() < policy.critical_min_tier.rank() {
        return granted.min(Permission::ReadOnly);
    }

    granted
}

/// Gate stored capability flags through an effective permission.
///
/// A flag only survives when the effective permission level still implies
/// it: read requires any access, create/update require more than read-only,
/// delete requires `full`, approve requires `full` or `read_only` (review
/// without edit rights is legitimate).
#[must_use]
pub fn gate_capabilities(
    capabilities: CapabilitySet,
    effective: Permission,
    kind: EntityKind,
) -> CapabilitySet {
    let any_access = effective != Permission::None;
    let writable = any_access && effective != Permission::ReadOnly;
    let approve = if kind.supports_approve() {
        let allowed = matches!(effective, Permission::Full | Permission::ReadOnly);
        Some(capabilities.approve.unwrap_or(false) && allowed)
    } else {
        None
    };

    CapabilitySet {
        create: capabilities.create && writable,
        read: capabilities.read && any_access,
        update: capabilities.update && writable,
        delete: capabilities.delete && effective == Permission::Full,
        approve,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(critical: bool, financial: bool, sensitive: bool) -> RiskFlags {
        RiskFlags {
            critical,
            financial,
            sensitive,
        }
    }

    #[test]
    fn none_grant_is_none_regardless_of_flags() {
        let policy = ResolvePolicy::default();
        for tier in Tier::ALL {
            assert_eq!(
                resolve_permission(Permission::None, tier, flags(true, true, true), &policy),
                Permission::None
            );
        }
    }

    #[test]
    fn critical_caps_low_tiers_at_read_only() {
        let policy = ResolvePolicy::default();
        assert_eq!(
            resolve_permission(Permission::Full, Tier::Mid, flags(true, false, false), &policy),
            Permission::ReadOnly
        );
        assert_eq!(
            resolve_permission(
                Permission::Full,
                Tier::HrFinance,
                flags(true, false, false),
                &policy
            ),
            Permission::ReadOnly
        );
        // senior and above pass through
        assert_eq!(
            resolve_permission(Permission::Full, Tier::Senior, flags(true, false, false), &policy),
            Permission::Full
        );
    }

    #[test]
    fn critical_never_yields_full_below_minimum() {
        let policy = ResolvePolicy::default();
        for tier in [Tier::HrFinance, Tier::Mid, Tier::External] {
            for granted in [
                Permission::OwnOnly,
                Permission::AssignedOnly,
                Permission::ReadOnly,
                Permission::Full,
            ] {
                let effective =
                    resolve_permission(granted, tier, flags(true, false, false), &policy);
                assert_ne!(effective, Permission::Full, "{tier} {granted}");
            }
        }
    }

    #[test]
    fn sensitive_caps_low_tiers_unless_overridden() {
        let policy = ResolvePolicy::default();
        assert_eq!(
            resolve_permission(Permission::Full, Tier::Mid, flags(false, false, true), &policy),
            Permission::None
        );
        assert_eq!(
            resolve_permission(
                Permission::ReadOnly,
                Tier::External,
                flags(false, false, true),
                &policy
            ),
            Permission::None
        );

        let overriding = ResolvePolicy {
            sensitive_override: true,
            ..ResolvePolicy::default()
        };
        assert_eq!(
            resolve_permission(Permission::Full, Tier::Mid, flags(false, false, true), &overriding),
            Permission::Full
        );
        // the override only rescues explicit full grants
        assert_eq!(
            resolve_permission(
                Permission::ReadOnly,
                Tier::Mid,
                flags(false, false, true),
                &overriding
            ),
            Permission::None
        );
    }

    #[test]
    fn financial_caps_lowest_tier_at_none() {
        let policy = ResolvePolicy::default();
        assert_eq!(
            resolve_permission(
                Permission::ReadOnly,
                Tier::External,
                flags(false, true, false),
                &policy
            ),
            Permission::None
        );
        assert_eq!(
            resolve_permission(Permission::ReadOnly, Tier::Mid, flags(false, true, false), &policy),
            Permission::ReadOnly
        );
    }

    #[test]
    fn unflagged_grants_pass_through() {
        let policy = ResolvePolicy::default();
        for granted in [
            Permission::OwnOnly,
            Permission::AssignedOnly,
            Permission::ReadOnly,
            Permission::Full,
        ] {
            for tier in Tier::ALL {
                assert_eq!(
                    resolve_permission(granted, tier, RiskFlags::NONE, &policy),
                    granted
                );
            }
        }
    }

    #[test]
    fn full_is_never_less_permissive_than_read_only() {
        // Monotonicity over every flag/tier combination.
        let policy = ResolvePolicy::default();
        for tier in Tier::ALL {
            for critical in [false, true] {
                for financial in [false, true] {
                    for sensitive in [false, true] {
                        let f = flags(critical, financial, sensitive);
                        let with_full = resolve_permission(Permission::Full, tier, f, &policy);
                        let with_read = resolve_permission(Permission::ReadOnly, tier, f, &policy);
                        assert!(
                            with_full.level() >= with_read.level(),
                            "tier={tier} flags={f:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn gating_strips_capabilities_beyond_the_effective_level() {
        let caps = CapabilitySet::defaults_for(Permission::Full, true);
        let gated = gate_capabilities(caps, Permission::ReadOnly, EntityKind::Page);
        assert!(gated.read);
        assert!(!gated.create && !gated.update && !gated.delete);
        assert_eq!(gated.approve, Some(true));

        let gated = gate_capabilities(caps, Permission::None, EntityKind::Page);
        assert!(!gated.read);
        assert_eq!(gated.approve, Some(false));

        let field_caps = CapabilitySet::defaults_for(Permission::Full, false);
        let gated = gate_capabilities(field_caps, Permission::Full, EntityKind::Field);
        assert_eq!(gated.approve, None);
        assert!(gated.delete);
    }
}
