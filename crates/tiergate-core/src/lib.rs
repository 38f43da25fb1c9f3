//! Tiergate Core - shared types for the hierarchical permission engine.
//!
//! This crate provides the data model (tiers, permissions, entities, grants),
//! the pure effective-permission resolver, the engine error taxonomy, and the
//! audit/validation record shapes shared by every other tiergate crate.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod audit;
mod decision;
mod entity;
mod error;
mod grant;
mod resolve;
mod tier;

pub use audit::*;
pub use decision::*;
pub use entity::*;
pub use error::*;
pub use grant::*;
pub use resolve::*;
pub use tier::*;

// Re-export commonly used external types
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
