//! Cache key builders.
//!
//! Keys are namespaced by kind so pattern invalidation can clear all keys
//! for one entity across every tier without a global flush.

use tiergate_core::{EntityKind, Tier};

/// Effective permission for one (entity, tier).
#[must_use]
pub fn entity_permission(kind: EntityKind, id: &str, tier: Tier) -> String {
    format!("entity_perm:{kind}:{id}:{tier}")
}

/// The hierarchy snapshot.
#[must_use]
pub fn hierarchy_snapshot() -> String {
    "hierarchy_snapshot".to_string()
}
