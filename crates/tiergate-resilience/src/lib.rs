//! Tiergate Resilience - degraded-mode behavior.
//!
//! When the store misbehaves this crate decides three things: whether to
//! keep calling it (circuit breakers), what to answer in the meantime
//! (fallback decisions), and how to get back to authoritative data
//! (detached background retries).

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod breaker;
mod classify;
mod fallback;
mod retry;

pub use breaker::*;
pub use classify::*;
pub use fallback::*;
pub use retry::*;
