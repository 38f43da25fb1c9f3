//! Tiergate Monitor - what the permission system is doing, and when that
//! needs a human.
//!
//! Every check, change, bulk operation, validation outcome, and auth
//! failure is recorded as a `MonitorEvent`. Rolling windows over those
//! events drive alert rules; alerts above warning severity dispatch
//! immediately through an `AlertSink`, the rest batch on the periodic
//! flush. The flush also prunes anything past the retention window.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod alert;
mod event;
mod flush;
mod monitor;

pub use alert::*;
pub use event::*;
pub use flush::*;
pub use monitor::*;
