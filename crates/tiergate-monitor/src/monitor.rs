//! The permission monitor: event buffer, rolling metrics, alert rules.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tiergate_core::{EntityRef, Permission, Tier, Uuid, ValidationReport};
use tracing::debug;

use crate::{Alert, AlertRule, AlertSeverity, AlertSink, EventKind, MonitorEvent, TracingAlertSink};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Events and alerts older than this are pruned on flush.
    pub retention: Duration,
    /// Trailing window for the failure-rate and slow-check rules.
    pub check_window: Duration,
    /// Failure rate above this fraction raises an alert.
    pub failure_rate_threshold: f64,
    /// Checks in the window before the failure-rate rule applies.
    pub failure_rate_min_samples: usize,
    /// Average check duration above this raises an alert.
    pub slow_check_threshold: Duration,
    /// Bulk operations touching more than this many entities raise one
    /// warning.
    pub bulk_warning_threshold: usize,
    pub auth_failure_threshold: usize,
    pub auth_failure_window: Duration,
    pub escalation_threshold: usize,
    pub escalation_window: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(30 * 24 * 60 * 60),
            check_window: Duration::from_secs(5 * 60),
            failure_rate_threshold: 0.05,
            failure_rate_min_samples: 10,
            slow_check_threshold: Duration::from_secs(2),
            bulk_warning_threshold: 20,
            auth_failure_threshold: 5,
            auth_failure_window: Duration::from_secs(15 * 60),
            escalation_threshold: 5,
            escalation_window: Duration::from_secs(5 * 60),
        }
    }
}

/// Point-in-time metrics snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MonitoringStats {
    pub total_checks: u64,
    pub failed_checks: u64,
    pub cache_hits: u64,
    pub failure_rate: f64,
    pub avg_check_duration_ms: f64,
    pub cache_hit_rate: f64,
    pub events_buffered: usize,
    pub active_alerts: usize,
}

struct StoredEvent {
    event: MonitorEvent,
    at: Instant,
}

struct CheckSample {
    at: Instant,
    duration: Duration,
    success: bool,
}

#[derive(Default)]
struct MonitorInner {
    events: VecDeque<StoredEvent>,
    checks: VecDeque<CheckSample>,
    alerts: Vec<Alert>,
    /// Alerts raised since the last flush, awaiting batch dispatch.
    pending: Vec<Alert>,
    auth_failures: HashMap<String, VecDeque<Instant>>,
    escalations: HashMap<String, VecDeque<Instant>>,
    total_checks: u64,
    failed_checks: u64,
    cache_hits: u64,
}

/// Central recorder. One instance per engine, shared behind an `Arc`.
pub struct PermissionMonitor {
    config: MonitorConfig,
    sink: Arc<dyn AlertSink>,
    inner: Mutex<MonitorInner>,
}

impl PermissionMonitor {
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingAlertSink))
    }

    #[must_use]
    pub fn with_sink(config: MonitorConfig, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            config,
            sink,
            inner: Mutex::new(MonitorInner::default()),
        }
    }

    pub fn record_check(
        &self,
        actor: &str,
        entity: &EntityRef,
        tier: Tier,
        duration: Duration,
        success: bool,
        cache_hit: bool,
    ) {
        self.record_check_at(actor, entity, tier, duration, success, cache_hit, Instant::now());
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_check_at(
        &self,
        actor: &str,
        entity: &EntityRef,
        tier: Tier,
        duration: Duration,
        success: bool,
        cache_hit: bool,
        now: Instant,
    ) {
        let event = MonitorEvent::new(EventKind::PermissionCheck, success)
            .actor(actor)
            .entity(entity.clone())
            .tier(tier)
            .duration(duration);
        let mut inner = self.inner.lock();
        inner.total_checks += 1;
        if !success {
            inner.failed_checks += 1;
        }
        if cache_hit {
            inner.cache_hits += 1;
        }
        inner.checks.push_back(CheckSample {
            at: now,
            duration,
            success,
        });
        Self::drain_window(&mut inner.checks, |s| s.at, now, self.config.check_window);
        inner.events.push_back(StoredEvent { event, at: now });

        let urgent = self.evaluate_check_rules(&mut inner, now);
        drop(inner);
        self.dispatch_all(&urgent);
    }

    /// Record a permission change and classify escalation from the audit
    /// scale.
    pub fn record_change(
        &self,
        actor: &str,
        tier: Tier,
        entity: &EntityRef,
        old: Permission,
        new: Permission,
    ) {
        self.record_change_at(actor, tier, entity, old, new, Instant::now());
    }

    pub fn record_change_at(
        &self,
        actor: &str,
        tier: Tier,
        entity: &EntityRef,
        old: Permission,
        new: Permission,
        now: Instant,
    ) {
        let escalation = new.audit_level() > old.audit_level();
        let event = MonitorEvent::new(EventKind::PermissionChange, true)
            .actor(actor)
            .tier(tier)
            .entity(entity.clone())
            .detail(format!("{old} -> {new}"));
        let mut inner = self.inner.lock();
        inner.events.push_back(StoredEvent { event, at: now });

        let mut urgent = None;
        if escalation {
            let window = self.config.escalation_window;
            let threshold = self.config.escalation_threshold;
            let tripped = {
                let history = inner.escalations.entry(actor.to_owned()).or_default();
                history.push_back(now);
                Self::drain_window(history, |at| *at, now, window);
                history.len() >= threshold
            };
            if tripped {
                urgent = Self::raise(
                    &mut inner,
                    Alert::new(
                        AlertRule::RapidEscalations,
                        AlertSeverity::Critical,
                        format!("{threshold} or more privilege escalations by one actor within the window"),
                    )
                    .for_actor(actor),
                );
            }
        }
        drop(inner);
        if let Some(alert) = urgent {
            self.sink.dispatch(&alert);
        }
    }

    pub fn record_bulk(&self, actor: &str, count: usize, succeeded: usize, failed: usize) {
        let event = MonitorEvent::new(EventKind::BulkOperation, failed == 0)
            .actor(actor)
            .detail(format!("{count} requested, {succeeded} succeeded, {failed} failed"));
        let mut inner = self.inner.lock();
        inner.events.push_back(StoredEvent {
            event,
            at: Instant::now(),
        });
        let urgent = if count > self.config.bulk_warning_threshold {
            Self::raise(
                &mut inner,
                Alert::new(
                    AlertRule::LargeBulkOperation,
                    AlertSeverity::Warning,
                    format!("Bulk permission operation touched {count} entities"),
                )
                .for_actor(actor),
            )
        } else {
            None
        };
        drop(inner);
        if let Some(alert) = urgent {
            self.sink.dispatch(&alert);
        }
    }

    pub fn record_validation(&self, actor: &str, entity: &EntityRef, report: &ValidationReport) {
        let event = MonitorEvent::new(EventKind::Validation, report.is_valid())
            .actor(actor)
            .entity(entity.clone())
            .detail(format!(
                "{} errors, {} warnings",
                report.errors.len(),
                report.warnings.len()
            ));
        let mut inner = self.inner.lock();
        inner.events.push_back(StoredEvent {
            event,
            at: Instant::now(),
        });
    }

    pub fn record_auth_failure(&self, actor: &str, reason: &str) {
        self.record_auth_failure_at(actor, reason, Instant::now());
    }

    pub fn record_auth_failure_at(&self, actor: &str, reason: &str, now: Instant) {
        let event = MonitorEvent::new(EventKind::AuthFailure, false)
            .actor(actor)
            .detail(reason.to_owned());
        let mut inner = self.inner.lock();
        inner.events.push_back(StoredEvent { event, at: now });

        let window = self.config.auth_failure_window;
        let threshold = self.config.auth_failure_threshold;
        let tripped = {
            let history = inner.auth_failures.entry(actor.to_owned()).or_default();
            history.push_back(now);
            Self::drain_window(history, |at| *at, now, window);
            history.len() >= threshold
        };
        let urgent = if tripped {
            Self::raise(
                &mut inner,
                Alert::new(
                    AlertRule::RepeatedAuthFailures,
                    AlertSeverity::Critical,
                    format!("{threshold} or more authorization failures by one actor; possible brute force"),
                )
                .for_actor(actor),
            )
        } else {
            None
        };
        drop(inner);
        if let Some(alert) = urgent {
            self.sink.dispatch(&alert);
        }
    }

    /// Raise a manual alert outside the built-in rules.
    pub fn create_alert(&self, severity: AlertSeverity, message: impl Into<String>) -> Uuid {
        let alert = Alert::new(AlertRule::Manual, severity, message);
        let id = alert.id;
        let mut inner = self.inner.lock();
        let urgent = Self::raise_unconditional(&mut inner, alert);
        drop(inner);
        if let Some(alert) = urgent {
            self.sink.dispatch(&alert);
        }
        id
    }

    pub fn resolve_alert(&self, id: Uuid) -> bool {
        let mut inner = self.inner.lock();
        for alert in &mut inner.alerts {
            if alert.id == id && !alert.resolved {
                alert.resolved = true;
                debug!(alert_id = %id, "alert resolved");
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn active_alerts(&self) -> Vec<Alert> {
        let inner = self.inner.lock();
        inner
            .alerts
            .iter()
            .filter(|a| !a.resolved)
            .cloned()
            .collect()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> MonitoringStats {
        let inner = self.inner.lock();
        let total = inner.total_checks;
        let failure_rate = if total == 0 {
            0.0
        } else {
            inner.failed_checks as f64 / total as f64
        };
        let cache_hit_rate = if total == 0 {
            0.0
        } else {
            inner.cache_hits as f64 / total as f64
        };
        let avg_check_duration_ms = if inner.checks.is_empty() {
            0.0
        } else {
            let sum: Duration = inner.checks.iter().map(|s| s.duration).sum();
            sum.as_secs_f64() * 1000.0 / inner.checks.len() as f64
        };
        MonitoringStats {
            total_checks: total,
            failed_checks: inner.failed_checks,
            cache_hits: inner.cache_hits,
            failure_rate,
            avg_check_duration_ms,
            cache_hit_rate,
            events_buffered: inner.events.len(),
            active_alerts: inner.alerts.iter().filter(|a| !a.resolved).count(),
        }
    }

    /// Dispatch batched alerts and prune everything past retention.
    /// Returns the number of events pruned.
    pub fn flush(&self) -> usize {
        self.flush_at(Instant::now())
    }

    pub fn flush_at(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock();
        let batched: Vec<Alert> = inner.pending.drain(..).collect();

        let retention = self.config.retention;
        let before = inner.events.len();
        Self::drain_window(&mut inner.events, |e| e.at, now, retention);
        // resolved alerts have served their purpose once flushed
        inner.alerts.retain(|a| !a.resolved);
        let pruned = before - inner.events.len();
        drop(inner);

        // the sink runs with the monitor unlocked so it may call back in
        self.dispatch_all(&batched);
        if pruned > 0 {
            debug!(pruned, "monitor retention prune");
        }
        pruned
    }

    /// Buffered events, oldest first. Mainly for tests and diagnostics.
    #[must_use]
    pub fn events(&self) -> Vec<MonitorEvent> {
        let inner = self.inner.lock();
        inner.events.iter().map(|e| e.event.clone()).collect()
    }

    /// Evaluate the trailing-window rules, returning any alerts that must
    /// reach the sink immediately. The caller dispatches those after
    /// releasing the monitor lock.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn evaluate_check_rules(&self, inner: &mut MonitorInner, _now: Instant) -> Vec<Alert> {
        let mut urgent = Vec::new();
        let samples = inner.checks.len();
        if samples >= self.config.failure_rate_min_samples {
            let failed = inner.checks.iter().filter(|s| !s.success).count();
            let rate = failed as f64 / samples as f64;
            if rate > self.config.failure_rate_threshold {
                urgent.extend(Self::raise(
                    inner,
                    Alert::new(
                        AlertRule::HighFailureRate,
                        AlertSeverity::High,
                        format!("Permission check failure rate at {:.1}% over the trailing window", rate * 100.0),
                    ),
                ));
            }

            let sum: Duration = inner.checks.iter().map(|s| s.duration).sum();
            if sum / samples as u32 > self.config.slow_check_threshold {
                urgent.extend(Self::raise(
                    inner,
                    Alert::new(
                        AlertRule::SlowChecks,
                        AlertSeverity::Warning,
                        "Average permission check duration exceeds the slow-check threshold",
                    ),
                ));
            }
        }
        urgent
    }

    /// Raise unless an identical unresolved alert (same rule and actor) is
    /// already open. Returns the alert when it needs immediate dispatch;
    /// the sink must never run while the monitor lock is held.
    fn raise(inner: &mut MonitorInner, alert: Alert) -> Option<Alert> {
        let duplicate = inner
            .alerts
            .iter()
            .any(|a| !a.resolved && a.rule == alert.rule && a.actor == alert.actor);
        if duplicate {
            return None;
        }
        Self::raise_unconditional(inner, alert)
    }

    fn raise_unconditional(inner: &mut MonitorInner, alert: Alert) -> Option<Alert> {
        let urgent = if alert.severity >= AlertSeverity::High {
            Some(alert.clone())
        } else {
            inner.pending.push(alert.clone());
            None
        };
        inner.alerts.push(alert);
        urgent
    }

    fn dispatch_all(&self, alerts: &[Alert]) {
        for alert in alerts {
            self.sink.dispatch(alert);
        }
    }

    fn drain_window<T>(
        buffer: &mut VecDeque<T>,
        at: impl Fn(&T) -> Instant,
        now: Instant,
        window: Duration,
    ) {
        while let Some(front) = buffer.front() {
            if now.duration_since(at(front)) > window {
                buffer.pop_front();
            } else {
                break;
            }
        }
    }
}
