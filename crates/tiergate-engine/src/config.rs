//! Aggregated configuration for one engine instance.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tiergate_cache::CacheConfig;
use tiergate_core::ResolvePolicy;
use tiergate_monitor::MonitorConfig;
use tiergate_resilience::{BreakerConfig, FallbackPolicy, RetryPolicy};
use tiergate_security::SecurityConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub security: SecurityConfig,
    pub breaker: BreakerConfig,
    pub retry: RetryPolicy,
    pub fallback: FallbackPolicy,
    pub monitor: MonitorConfig,
    pub resolve: ResolvePolicy,
    /// Monitor flush cadence.
    pub flush_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            security: SecurityConfig::default(),
            breaker: BreakerConfig::default(),
            retry: RetryPolicy::default(),
            fallback: FallbackPolicy::default(),
            monitor: MonitorConfig::default(),
            resolve: ResolvePolicy::default(),
            flush_interval: Duration::from_secs(30),
        }
    }
}
