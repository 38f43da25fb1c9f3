//! The `PermissionEngine` façade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tiergate_cache::{keys, spawn_sweeper, PermissionCache};
use tiergate_core::{
    resolve_permission, AccessDecision, AuditEntry, AuditFilter, BulkItemFailure, BulkOutcome,
    CapabilitySet, ChangeRequest, EngineError, EntityKind, EntityRef, Grant, HierarchySnapshot,
    PageNode, Permission, ResolvePolicy, Tier, Utc, Uuid,
};
use tiergate_monitor::{spawn_flusher, AlertSeverity, MonitoringStats, PermissionMonitor};
use tiergate_resilience::{classify, BreakerRegistry, BreakerState, FallbackPolicy, RetryScheduler};
use tiergate_security::{ChangeContext, SecurityValidator};
use tiergate_store::PermissionStore;

use crate::EngineConfig;

/// Per-class error counts plus breaker states, for operational dashboards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorStats {
    pub counts: HashMap<&'static str, u64>,
    pub breakers: HashMap<String, BreakerState>,
}

enum ChangeOutcome {
    Applied,
    Rejected(Vec<String>),
}

/// One engine per process, shared behind an `Arc` and injected into
/// handlers. Construction spawns the cache sweeper and monitor flusher;
/// `shutdown` stops both and flushes buffered events.
pub struct PermissionEngine {
    store: Arc<dyn PermissionStore>,
    cache: Arc<PermissionCache>,
    validator: SecurityValidator,
    breakers: BreakerRegistry,
    retries: RetryScheduler,
    fallback: FallbackPolicy,
    monitor: Arc<PermissionMonitor>,
    resolve_policy: ResolvePolicy,
    error_counts: Mutex<HashMap<&'static str, u64>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PermissionEngine {
    #[must_use]
    pub fn new(store: Arc<dyn PermissionStore>, config: EngineConfig) -> Self {
        let cache = Arc::new(PermissionCache::new(config.cache));
        let monitor = Arc::new(PermissionMonitor::new(config.monitor));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = vec![
            spawn_sweeper(Arc::clone(&cache), shutdown_rx.clone()),
            spawn_flusher(Arc::clone(&monitor), config.flush_interval, shutdown_rx),
        ];
        Self {
            store,
            cache,
            validator: SecurityValidator::new(config.security),
            breakers: BreakerRegistry::new(config.breaker),
            retries: RetryScheduler::new(config.retry),
            fallback: config.fallback,
            monitor,
            resolve_policy: config.resolve,
            error_counts: Mutex::new(HashMap::new()),
            shutdown_tx,
            tasks: Mutex::new(tasks),
        }
    }

    /// Decide what `tier` may do with `entity` on behalf of `principal`.
    /// Never errors: a store failure produces a degraded decision and
    /// schedules a background refresh.
    pub async fn check_access(
        &self,
        principal: &str,
        tier: Tier,
        entity: &EntityRef,
    ) -> AccessDecision {
        let started = Instant::now();
        let key = keys::entity_permission(entity.kind, &entity.id, tier);

        if let Some(decision) = self.cache.get::<AccessDecision>(&key) {
            self.monitor
                .record_check(principal, entity, tier, started.elapsed(), true, true);
            return decision;
        }

        let breaker = self.breakers.breaker("store_read");
        if !breaker.try_acquire() {
            let error = EngineError::unavailable("permission store circuit is open");
            self.count_error(&error);
            self.monitor
                .record_check(principal, entity, tier, started.elapsed(), false, false);
            return self.fallback.decide(entity, tier, &error);
        }

        // snapshot before the read so an invalidation that lands while the
        // store call is in flight discards this fill instead of resurrecting
        // a stale decision
        let epoch = self.cache.invalidation_epoch();
        match load_decision(self.store.as_ref(), tier, entity, self.resolve_policy).await {
            Ok(decision) => {
                breaker.record_success();
                self.cache.set_if_fresh(key.as_str(), &decision, epoch);
                self.monitor
                    .record_check(principal, entity, tier, started.elapsed(), true, false);
                decision
            }
            Err(store_error) => {
                breaker.record_failure();
                let error = classify(&store_error);
                self.count_error(&error);
                self.monitor
                    .record_check(principal, entity, tier, started.elapsed(), false, false);
                self.schedule_refresh(tier, entity.clone());
                self.fallback.decide(entity, tier, &error)
            }
        }
    }

    /// Name-based variant: resolve the catalog name first, then decide.
    /// An unknown name denies access rather than assuming anything.
    pub async fn check_access_by_name(
        &self,
        principal: &str,
        tier: Tier,
        kind: EntityKind,
        name: &str,
    ) -> AccessDecision {
        match self.store.find_entity_by_name(kind, name).await {
            Ok(Some(entry)) => self.check_access(principal, tier, &entry.entity).await,
            Ok(None) => {
                debug!(kind = ?kind, name, "access check against unknown entity name");
                AccessDecision::no_access(kind, format!("Unknown {kind:?} named {name:?}."))
            }
            Err(store_error) => {
                let error = classify(&store_error);
                self.count_error(&error);
                let placeholder = EntityRef::new(kind, name);
                self.fallback.decide(&placeholder, tier, &error)
            }
        }
    }

    /// Apply one permission change. `Ok(false)` means the validator
    /// rejected it; the rejection is still monitored and audited.
    ///
    /// # Errors
    /// Returns a classified `EngineError` when the store cannot complete
    /// the write.
    pub async fn change_permission(
        &self,
        actor: &str,
        actor_tier: Tier,
        request: ChangeRequest,
    ) -> Result<bool, EngineError> {
        match self.apply_change(actor, actor_tier, request).await? {
            ChangeOutcome::Applied => Ok(true),
            ChangeOutcome::Rejected(_) => Ok(false),
        }
    }

    /// Apply many changes with per-item isolation: one bad item does not
    /// abort the rest. Emits exactly one bulk monitoring event.
    pub async fn bulk_change_permission(
        &self,
        actor: &str,
        actor_tier: Tier,
        changes: Vec<ChangeRequest>,
    ) -> BulkOutcome {
        let count = changes.len();
        let mut outcome = BulkOutcome::default();
        for (index, request) in changes.into_iter().enumerate() {
            let entity = request.entity.clone();
            match self.apply_change(actor, actor_tier, request).await {
                Ok(ChangeOutcome::Applied) => outcome.succeeded += 1,
                Ok(ChangeOutcome::Rejected(errors)) => outcome.failed.push(BulkItemFailure {
                    index,
                    entity,
                    errors,
                }),
                Err(error) => outcome.failed.push(BulkItemFailure {
                    index,
                    entity,
                    errors: vec![error.to_string()],
                }),
            }
        }
        self.monitor
            .record_bulk(actor, count, outcome.succeeded, outcome.failed.len());
        info!(
            actor,
            count,
            succeeded = outcome.succeeded,
            failed = outcome.failed.len(),
            "bulk permission change completed"
        );
        outcome
    }

    /// Full page/section/field tree with grant counts, cached under its
    /// own key and invalidated on any grant change.
    ///
    /// # Errors
    /// Returns a classified `EngineError` when the store cannot answer.
    pub async fn hierarchy_snapshot(&self) -> Result<HierarchySnapshot, EngineError> {
        let key = keys::hierarchy_snapshot();
        if let Some(snapshot) = self.cache.get::<HierarchySnapshot>(&key) {
            return Ok(snapshot);
        }
        let epoch = self.cache.invalidation_epoch();
        let snapshot = self.store.list_tree().await.map_err(|e| {
            let error = classify(&e);
            self.count_error(&error);
            error
        })?;
        self.cache.set_if_fresh(key.as_str(), &snapshot, epoch);
        Ok(snapshot)
    }

    /// Pages the given tier can read, in catalog order.
    ///
    /// # Errors
    /// Returns a classified `EngineError` when the tree cannot be listed.
    pub async fn accessible_pages(
        &self,
        principal: &str,
        tier: Tier,
    ) -> Result<Vec<PageNode>, EngineError> {
        let snapshot = self.hierarchy_snapshot().await?;
        let mut pages = Vec::new();
        for page in snapshot.pages {
            let decision = self.check_access(principal, tier, &page.entry.entity).await;
            if decision.can_read {
                pages.push(page);
            }
        }
        Ok(pages)
    }

    /// Seed the default grant table for a freshly created page: master
    /// gets full control, senior everything but delete, the middle tiers
    /// read-only, external nothing.
    ///
    /// # Errors
    /// Returns a classified `EngineError` on the first failed write.
    pub async fn seed_page_defaults(&self, page_id: &str, actor: &str) -> Result<(), EngineError> {
        let entity = EntityRef::page(page_id);
        for tier in Tier::ALL {
            let permission = match tier {
                Tier::Master | Tier::Senior => Permission::Full,
                Tier::HrFinance | Tier::Mid => Permission::ReadOnly,
                Tier::External => Permission::None,
            };
            let mut capabilities = CapabilitySet::defaults_for(permission, true);
            if tier == Tier::Senior {
                capabilities.delete = false;
            }
            let grant = Grant {
                entity: entity.clone(),
                tier,
                permission,
                capabilities,
                granted_by: actor.to_owned(),
                granted_at: Utc::now(),
                reason: Some("default grant seeding".to_owned()),
            };
            let stored = self.guarded_upsert(grant).await?;
            let audit = AuditEntry::for_change(None, stored, actor);
            if let Err(e) = self.store.append_audit(audit).await {
                warn!(error = %e, page_id, "audit append failed during default seeding");
            }
        }
        self.cache.invalidate_entity(EntityKind::Page, page_id);
        Ok(())
    }

    #[must_use]
    pub fn monitoring_stats(&self) -> MonitoringStats {
        self.monitor.stats()
    }

    #[must_use]
    pub fn error_stats(&self) -> ErrorStats {
        ErrorStats {
            counts: self.error_counts.lock().clone(),
            breakers: self.breakers.states(),
        }
    }

    pub fn create_alert(&self, severity: AlertSeverity, message: impl Into<String>) -> Uuid {
        self.monitor.create_alert(severity, message)
    }

    pub fn resolve_alert(&self, id: Uuid) -> bool {
        self.monitor.resolve_alert(id)
    }

    #[must_use]
    pub fn active_alerts(&self) -> Vec<tiergate_monitor::Alert> {
        self.monitor.active_alerts()
    }

    /// Query the audit log, newest first.
    ///
    /// # Errors
    /// Returns a classified `EngineError` when the store cannot answer.
    pub async fn audit_log(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, EngineError> {
        self.store.audit_log(filter).await.map_err(|e| {
            let error = classify(&e);
            self.count_error(&error);
            error
        })
    }

    /// Stop the background tasks and flush buffered monitoring state.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task did not shut down cleanly");
            }
        }
        info!("permission engine shut down");
    }

    async fn apply_change(
        &self,
        actor: &str,
        actor_tier: Tier,
        request: ChangeRequest,
    ) -> Result<ChangeOutcome, EngineError> {
        let entry = self
            .store
            .get_catalog_entry(&request.entity)
            .await
            .map_err(|e| {
                let error = classify(&e);
                self.count_error(&error);
                error
            })?;
        let current = self
            .store
            .get_grant(&request.entity, request.target_tier)
            .await
            .map_err(|e| {
                let error = classify(&e);
                self.count_error(&error);
                error
            })?;

        let capabilities = request.effective_capabilities();
        let ctx = ChangeContext {
            actor: actor.to_owned(),
            actor_tier,
            entity: request.entity.clone(),
            entity_flags: entry.as_ref().map(|e| e.flags),
            target_tier: request.target_tier,
            new_permission: request.permission,
            capabilities,
            current_permission: current.as_ref().map(|g| g.permission),
            justification: request.reason.clone(),
        };
        let report = self.validator.validate_change(&ctx);
        self.monitor
            .record_validation(actor, &request.entity, &report);

        if !report.is_valid() {
            let detail = report.errors.join("; ");
            warn!(
                actor,
                entity = %request.entity,
                target_tier = %request.target_tier,
                errors = %detail,
                "permission change rejected"
            );
            self.monitor.record_auth_failure(actor, &detail);
            self.audit_rejection(actor, &request, current, &detail).await;
            return Ok(ChangeOutcome::Rejected(report.errors));
        }
        for warning in &report.warnings {
            warn!(actor, entity = %request.entity, warning = %warning, "permission change warning");
        }

        let old_permission = current.as_ref().map_or(Permission::None, |g| g.permission);
        let grant = Grant {
            entity: request.entity.clone(),
            tier: request.target_tier,
            permission: request.permission,
            capabilities,
            granted_by: actor.to_owned(),
            granted_at: Utc::now(),
            reason: request.reason.clone(),
        };
        let stored = self.guarded_upsert(grant).await?;

        // invalidate before returning so no caller can read the stale grant
        self.cache
            .invalidate_entity(request.entity.kind, &request.entity.id);

        let audit = AuditEntry::for_change(current, stored, actor);
        if let Err(e) = self.store.append_audit(audit).await {
            warn!(error = %e, entity = %request.entity, "audit append failed after grant write");
        }
        self.monitor.record_change(
            actor,
            request.target_tier,
            &request.entity,
            old_permission,
            request.permission,
        );
        Ok(ChangeOutcome::Applied)
    }

    /// Rejections leave an audit trail too, marked by their reason.
    async fn audit_rejection(
        &self,
        actor: &str,
        request: &ChangeRequest,
        current: Option<Grant>,
        detail: &str,
    ) {
        let attempted = Grant {
            entity: request.entity.clone(),
            tier: request.target_tier,
            permission: request.permission,
            capabilities: request.effective_capabilities(),
            granted_by: actor.to_owned(),
            granted_at: Utc::now(),
            reason: Some(format!("rejected: {detail}")),
        };
        let audit = AuditEntry::for_change(current, attempted, actor);
        if let Err(e) = self.store.append_audit(audit).await {
            warn!(error = %e, entity = %request.entity, "audit append failed for rejected change");
        }
    }

    fn schedule_refresh(&self, tier: Tier, entity: EntityRef) {
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let policy = self.resolve_policy;
        let key = keys::entity_permission(entity.kind, &entity.id, tier);
        let label = format!("refresh:{entity}:{tier}");
        self.retries.spawn(label, move || {
            let store = Arc::clone(&store);
            let cache = Arc::clone(&cache);
            let entity = entity.clone();
            let key = key.clone();
            async move {
                let epoch = cache.invalidation_epoch();
                let decision = load_decision(store.as_ref(), tier, &entity, policy)
                    .await
                    .map_err(|e| classify(&e))?;
                cache.set_if_fresh(key.as_str(), &decision, epoch);
                Ok(())
            }
        });
    }

    /// Grant writes go through their own breaker so a failing write path
    /// degrades without tripping the read path.
    async fn guarded_upsert(&self, grant: Grant) -> Result<Grant, EngineError> {
        let breaker = self.breakers.breaker("store_write");
        if !breaker.try_acquire() {
            let error = EngineError::unavailable("permission store write circuit is open");
            self.count_error(&error);
            return Err(error);
        }
        match self.store.upsert_grant(grant).await {
            Ok(stored) => {
                breaker.record_success();
                Ok(stored)
            }
            Err(store_error) => {
                breaker.record_failure();
                let error = classify(&store_error);
                self.count_error(&error);
                Err(error)
            }
        }
    }

    fn count_error(&self, error: &EngineError) {
        *self.error_counts.lock().entry(error.class()).or_insert(0) += 1;
    }
}

/// Authoritative decision path: catalog entry, stored grant, resolver.
async fn load_decision(
    store: &dyn PermissionStore,
    tier: Tier,
    entity: &EntityRef,
    policy: ResolvePolicy,
) -> Result<AccessDecision, tiergate_store::StoreError> {
    let Some(entry) = store.get_catalog_entry(entity).await? else {
        return Ok(AccessDecision::no_access(
            entity.kind,
            "Unknown or inactive entity.",
        ));
    };
    let grant = store.get_grant(entity, tier).await?;
    let (granted, capabilities) = grant.map_or_else(
        || {
            (
                Permission::None,
                CapabilitySet::defaults_for(Permission::None, entity.kind.supports_approve()),
            )
        },
        |g| (g.permission, g.capabilities),
    );
    let effective = resolve_permission(granted, tier, entry.flags, &policy);
    Ok(AccessDecision::from_grant(effective, capabilities, entity.kind))
}
