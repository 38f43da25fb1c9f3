//! Tiergate Security - the pre-mutation gate.
//!
//! Every permission mutation passes through `SecurityValidator` before it
//! reaches the store: rate limiting, input validation, grantor
//! authorization, critical-resource protection, privilege-escalation
//! detection, business-rule warnings, and suspicious-pattern detection.
//! Errors block the mutation; warnings are returned to the caller and fed
//! to monitoring, but do not block.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod ratelimit;
mod validator;

pub use ratelimit::*;
pub use validator::*;
