//! The security validator.
//!
//! Each check is independent and individually testable. Checks producing
//! errors block the mutation; business-rule and suspicious-pattern checks
//! produce warnings that flow to the caller and to monitoring.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tiergate_core::{
    CapabilitySet, EntityKind, EntityRef, Permission, RiskFlags, Tier, ValidationReport,
};

use crate::ActorRateLimiter;

/// Validator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Mutations per minute per actor.
    pub rate_limit_per_minute: u32,
    /// Upper bound on entity id length.
    pub max_entity_id_len: usize,
    /// Id substrings that mark an entity as sensitive even without a
    /// catalog flag.
    pub sensitive_name_patterns: Vec<String>,
    /// Well-known critical page names that only none-grants may target for
    /// low tiers.
    pub critical_page_names: Vec<String>,
    /// Field-name substrings that trigger a sensitive-field warning.
    pub sensitive_field_names: Vec<String>,
    /// Full grants within `high_privilege_window` before a warning fires.
    pub high_privilege_threshold: usize,
    pub high_privilege_window: Duration,
    /// External-tier grants within `external_grant_window` before a warning
    /// fires.
    pub external_grant_threshold: usize,
    pub external_grant_window: Duration,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: 50,
            max_entity_id_len: 100,
            sensitive_name_patterns: vec!["financial".into(), "roi".into()],
            critical_page_names: vec![
                "roi".into(),
                "financial-reports".into(),
                "user-management".into(),
                "system-settings".into(),
                "audit-logs".into(),
            ],
            sensitive_field_names: vec![
                "ssn".into(),
                "tax_id".into(),
                "bank_account".into(),
                "credit_card".into(),
                "personal_email".into(),
                "phone_number".into(),
            ],
            high_privilege_threshold: 5,
            high_privilege_window: Duration::from_secs(5 * 60),
            external_grant_threshold: 10,
            external_grant_window: Duration::from_secs(10 * 60),
        }
    }
}

/// Everything the validator needs to judge one mutation.
#[derive(Debug, Clone)]
pub struct ChangeContext {
    pub actor: String,
    pub actor_tier: Tier,
    pub entity: EntityRef,
    /// Catalog flags when the entity was found; `None` when the catalog
    /// could not be consulted.
    pub entity_flags: Option<RiskFlags>,
    pub target_tier: Tier,
    pub new_permission: Permission,
    pub capabilities: CapabilitySet,
    /// Current stored permission, if any.
    pub current_permission: Option<Permission>,
    /// Free-text justification supplied with the request. A large
    /// permission jump is only allowed when one is present.
    pub justification: Option<String>,
}

struct HistoryEntry {
    at: Instant,
    target_tier: Tier,
    permission: Permission,
}

const HISTORY_CAP: usize = 256;

/// The pre-mutation security gate.
pub struct SecurityValidator {
    config: SecurityConfig,
    rate_limiter: ActorRateLimiter,
    entity_id_format: Regex,
    /// Recent validated changes per actor, for pattern analysis.
    history: Mutex<HashMap<String, VecDeque<HistoryEntry>>>,
}

impl SecurityValidator {
    /// # Panics
    /// Never panics; the id pattern is a compile-time constant.
    #[must_use]
    pub fn new(config: SecurityConfig) -> Self {
        let rate_limiter = ActorRateLimiter::per_minute(config.rate_limit_per_minute);
        Self {
            config,
            rate_limiter,
            entity_id_format: Regex::new("^[A-Za-z0-9_-]+$").expect("static pattern"),
            history: Mutex::new(HashMap::new()),
        }
    }

    /// Run every check against one proposed change.
    pub fn validate_change(&self, ctx: &ChangeContext) -> ValidationReport {
        self.validate_change_at(ctx, Instant::now())
    }

    /// Time-injectable variant for window tests.
    pub fn validate_change_at(&self, ctx: &ChangeContext, now: Instant) -> ValidationReport {
        let mut report = ValidationReport::default();

        if !self.rate_limiter.try_acquire_at(&ctx.actor, now) {
            report.error("Rate limit exceeded: too many permission changes in one minute.");
        }

        self.check_input_format(ctx, &mut report);
        self.check_authorization(ctx, &mut report);
        self.check_critical_resource(ctx, &mut report);
        self.check_escalation(ctx, &mut report);
        self.check_capability_consistency(ctx, &mut report);
        self.check_business_rules(ctx, &mut report);
        self.check_suspicious_patterns(ctx, now, &mut report);

        if !report.warnings.is_empty() {
            warn!(
                actor = %ctx.actor,
                entity = %ctx.entity,
                warnings = report.warnings.len(),
                "permission change validated with warnings"
            );
        }

        self.record_history(ctx, now);
        report
    }

    /// Entity ids are restricted to an allow-listed character class and a
    /// length bound, defending against injection into downstream queries.
    fn check_input_format(&self, ctx: &ChangeContext, report: &mut ValidationReport) {
        if ctx.entity.id.is_empty()
            || ctx.entity.id.len() > self.config.max_entity_id_len
            || !self.entity_id_format.is_match(&ctx.entity.id)
        {
            report.error(format!(
                "Invalid entity id format: {:?}",
                truncate(&ctx.entity.id, 40)
            ));
        }
    }

    /// Granting `full` requires master or senior; page-level mutations
    /// require master.
    fn check_authorization(&self, ctx: &ChangeContext, report: &mut ValidationReport) {
        if ctx.new_permission == Permission::Full
            && !matches!(ctx.actor_tier, Tier::Master | Tier::Senior)
        {
            report.error("Only master or senior actors may grant full permissions.");
        }
        if ctx.entity.kind == EntityKind::Page && ctx.actor_tier != Tier::Master {
            report.error("Only master actors may modify page-level permissions.");
        }
    }

    /// Critical entities (flag or name pattern) cannot be opened to the two
    /// lowest tiers.
    fn check_critical_resource(&self, ctx: &ChangeContext, report: &mut ValidationReport) {
        if ctx.new_permission == Permission::None || !ctx.target_tier.is_low_tier() {
            return;
        }

        let flagged_critical = ctx.entity_flags.is_some_and(|flags| flags.critical);
        let named_critical = ctx.entity.kind == EntityKind::Page
            && self
                .config
                .critical_page_names
                .iter()
                .any(|name| ctx.entity.id.contains(name.as_str()));
        let named_sensitive = self
            .config
            .sensitive_name_patterns
            .iter()
            .any(|pattern| ctx.entity.id.contains(pattern.as_str()));

        if flagged_critical || named_critical {
            report.error(format!(
                "Cannot grant access to critical resource {} for tier {}.",
                ctx.entity, ctx.target_tier
            ));
        } else if named_sensitive && ctx.target_tier == Tier::External {
            report.error(format!(
                "Cannot grant access to financial resource {} for the external tier.",
                ctx.entity
            ));
        }
    }

    /// An actor cannot grant to a tier at or above their own (master
    /// excepted), and a jump of more than two permission levels in one
    /// operation requires explicit justification.
    fn check_escalation(&self, ctx: &ChangeContext, report: &mut ValidationReport) {
        if ctx.actor_tier != Tier::Master && ctx.target_tier.rank() >= ctx.actor_tier.rank() {
            report.error(format!(
                "Privilege escalation: {} actor cannot grant to tier {}.",
                ctx.actor_tier, ctx.target_tier
            ));
        }

        let current = ctx.current_permission.unwrap_or(Permission::None);
        let jump = ctx.new_permission.level().saturating_sub(current.level());
        if jump > 2 && ctx.justification.is_none() {
            report.error(format!(
                "Permission jump from {} to {} exceeds two levels and requires explicit justification.",
                current, ctx.new_permission
            ));
        }
    }

    /// Capability flags must stay within what the permission type implies.
    fn check_capability_consistency(&self, ctx: &ChangeContext, report: &mut ValidationReport) {
        if !ctx.capabilities.is_consistent_with(ctx.new_permission) {
            report.error(format!(
                "Capability flags exceed permission type {}.",
                ctx.new_permission
            ));
        }
    }

    /// Non-blocking business-rule checks.
    fn check_business_rules(&self, ctx: &ChangeContext, report: &mut ValidationReport) {
        let critical = ctx.entity_flags.is_some_and(|flags| flags.critical);
        if ctx.target_tier == Tier::Master && ctx.new_permission == Permission::None && critical {
            report.warning("Removing master access to a critical resource may impact administration.");
        }

        if ctx.target_tier == Tier::External
            && matches!(
                ctx.new_permission,
                Permission::Full | Permission::AssignedOnly
            )
        {
            report.warning("Granting broad access to the external tier may violate security policy.");
        }

        if ctx.entity.kind == EntityKind::Field
            && ctx.target_tier.is_low_tier()
            && ctx.new_permission != Permission::None
            && self
                .config
                .sensitive_field_names
                .iter()
                .any(|name| ctx.entity.id.contains(name.as_str()))
        {
            report.warning("Granting access to sensitive fields requires additional approval.");
        }
    }

    /// Non-blocking pattern detection over the actor's recent history.
    fn check_suspicious_patterns(
        &self,
        ctx: &ChangeContext,
        now: Instant,
        report: &mut ValidationReport,
    ) {
        let history = self.history.lock();
        let Some(entries) = history.get(&ctx.actor) else {
            return;
        };

        let mut recent_full = entries
            .iter()
            .filter(|e| {
                e.permission == Permission::Full
                    && now.duration_since(e.at) < self.config.high_privilege_window
            })
            .count();
        if ctx.new_permission == Permission::Full {
            recent_full += 1;
        }
        if recent_full > self.config.high_privilege_threshold {
            report.warning("Unusual pattern: multiple high-privilege grants in a short window.");
        }

        let mut recent_external = entries
            .iter()
            .filter(|e| {
                e.target_tier == Tier::External
                    && now.duration_since(e.at) < self.config.external_grant_window
            })
            .count();
        if ctx.target_tier == Tier::External {
            recent_external += 1;
        }
        if recent_external > self.config.external_grant_threshold {
            report.warning("Unusual pattern: mass permission changes targeting the external tier.");
        }
    }

    fn record_history(&self, ctx: &ChangeContext, now: Instant) {
        let mut history = self.history.lock();
        let entries = history.entry(ctx.actor.clone()).or_default();
        entries.push_back(HistoryEntry {
            at: now,
            target_tier: ctx.target_tier,
            permission: ctx.new_permission,
        });
        while entries.len() > HISTORY_CAP {
            entries.pop_front();
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        s
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SecurityValidator {
        SecurityValidator::new(SecurityConfig::default())
    }

    fn ctx(actor_tier: Tier, target_tier: Tier, permission: Permission) -> ChangeContext {
        ChangeContext {
            actor: "actor-1".into(),
            actor_tier,
            entity: EntityRef::section("s1"),
            entity_flags: Some(RiskFlags::NONE),
            target_tier,
            new_permission: permission,
            capabilities: CapabilitySet::defaults_for(permission, true),
            current_permission: Some(Permission::ReadOnly),
            justification: None,
        }
    }

    #[test]
    fn mid_actor_cannot_grant_full_to_senior() {
        let v = validator();
        let report = v.validate_change(&ctx(Tier::Mid, Tier::Senior, Permission::Full));
        assert!(!report.is_valid());
        assert!(report.errors.iter().any(|e| e.contains("escalation")));
        assert!(report.errors.iter().any(|e| e.contains("master or senior")));
    }

    #[test]
    fn master_can_grant_full_to_senior() {
        let v = validator();
        let report = v.validate_change(&ctx(Tier::Master, Tier::Senior, Permission::Full));
        assert!(report.is_valid(), "errors: {:?}", report.errors);
    }

    #[test]
    fn page_mutations_require_master() {
        let v = validator();
        let mut c = ctx(Tier::Senior, Tier::Mid, Permission::ReadOnly);
        c.entity = EntityRef::page("p1");
        let report = v.validate_change(&c);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("page-level")));
    }

    #[test]
    fn malformed_entity_id_is_a_format_error() {
        let v = validator();
        let mut c = ctx(Tier::Master, Tier::Mid, Permission::ReadOnly);
        c.entity = EntityRef::section("s1'; DROP TABLE grants;--");
        let report = v.validate_change(&c);
        assert!(report.errors.iter().any(|e| e.contains("Invalid entity id")));

        let mut c = ctx(Tier::Master, Tier::Mid, Permission::ReadOnly);
        c.entity = EntityRef::section("x".repeat(101));
        assert!(!v.validate_change(&c).is_valid());
    }

    #[test]
    fn critical_resources_are_closed_to_low_tiers() {
        let v = validator();
        let mut c = ctx(Tier::Master, Tier::Mid, Permission::ReadOnly);
        c.entity_flags = Some(RiskFlags {
            critical: true,
            ..RiskFlags::NONE
        });
        assert!(!v.validate_change(&c).is_valid());

        // name pattern triggers even without a flag
        let mut c = ctx(Tier::Master, Tier::External, Permission::ReadOnly);
        c.entity = EntityRef::section("roi-financial-summary");
        assert!(!v.validate_change(&c).is_valid());

        // none-grants to low tiers remain fine
        let mut c = ctx(Tier::Master, Tier::Mid, Permission::None);
        c.entity_flags = Some(RiskFlags {
            critical: true,
            ..RiskFlags::NONE
        });
        c.current_permission = Some(Permission::ReadOnly);
        assert!(v.validate_change(&c).is_valid());
    }

    #[test]
    fn three_level_jump_requires_justification() {
        let v = validator();
        let mut c = ctx(Tier::Master, Tier::Mid, Permission::Full);
        c.current_permission = Some(Permission::None);
        let report = v.validate_change(&c);
        assert!(report.errors.iter().any(|e| e.contains("exceeds two levels")));

        // a supplied justification waives the jump error
        let mut c = ctx(Tier::Master, Tier::Mid, Permission::Full);
        c.current_permission = Some(Permission::None);
        c.justification = Some("quarterly audit signoff".into());
        assert!(v.validate_change(&c).is_valid());

        // none to read_only is a two-level step and needs no justification
        let mut c = ctx(Tier::Master, Tier::Mid, Permission::ReadOnly);
        c.current_permission = Some(Permission::None);
        assert!(v.validate_change(&c).is_valid());
    }

    #[test]
    fn inconsistent_capabilities_are_rejected() {
        let v = validator();
        let mut c = ctx(Tier::Master, Tier::Mid, Permission::ReadOnly);
        c.capabilities = CapabilitySet {
            read: true,
            delete: true,
            ..CapabilitySet::default()
        };
        let report = v.validate_change(&c);
        assert!(report.errors.iter().any(|e| e.contains("Capability flags")));
    }

    #[test]
    fn broad_external_grant_is_a_warning_not_an_error() {
        let v = validator();
        let mut c = ctx(Tier::Master, Tier::External, Permission::AssignedOnly);
        c.current_permission = Some(Permission::OwnOnly);
        let report = v.validate_change(&c);
        assert!(report.is_valid());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("external tier")));
    }

    #[test]
    fn sensitive_field_names_warn_for_low_tiers() {
        let v = validator();
        let mut c = ctx(Tier::Master, Tier::Mid, Permission::ReadOnly);
        c.entity = EntityRef::field("bank_account_number");
        let report = v.validate_change(&c);
        assert!(report.is_valid());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("sensitive fields")));
    }

    #[test]
    fn repeated_full_grants_trigger_the_pattern_warning() {
        let v = validator();
        let now = Instant::now();
        let mut seen_warning = false;
        for i in 0..8 {
            let c = ctx(Tier::Master, Tier::Senior, Permission::Full);
            let report = v.validate_change_at(&c, now + Duration::from_secs(i));
            if report
                .warnings
                .iter()
                .any(|w| w.contains("high-privilege"))
            {
                seen_warning = true;
            }
        }
        assert!(seen_warning);
    }

    #[test]
    fn rate_limit_rejects_the_fifty_first_change() {
        let v = validator();
        let now = Instant::now();
        let c = ctx(Tier::Master, Tier::Senior, Permission::ReadOnly);
        for i in 0..50 {
            let report = v.validate_change_at(&c, now + Duration::from_millis(i));
            assert!(report.is_valid(), "attempt {i}: {:?}", report.errors);
        }
        let report = v.validate_change_at(&c, now + Duration::from_millis(50));
        assert!(report.errors.iter().any(|e| e.contains("Rate limit")));

        // the following window succeeds again
        let report = v.validate_change_at(&c, now + Duration::from_secs(61));
        assert!(report.is_valid());
    }
}
