//! Tiergate Engine - the single entry point for permission queries and
//! mutations.
//!
//! `PermissionEngine` wires the store, cache, security validator, circuit
//! breakers, retry scheduler, and monitor together behind one façade. The
//! query side never returns an error to the caller: when the store cannot
//! answer, a degraded decision is served and a background refresh is
//! scheduled. The mutation side is gated by the security validator and
//! audited end to end.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod config;
mod engine;
pub mod telemetry;

pub use config::*;
pub use engine::*;
