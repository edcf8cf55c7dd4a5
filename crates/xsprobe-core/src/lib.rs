//! Core library for xsprobe, an automated content-verification worker.
//!
//! xsprobe watches user-submitted content fragments for markup that
//! would not survive sanitization, and verifies whether such fragments
//! actually execute by rendering them in a real browser while
//! impersonating a designated verifier account. The moving parts:
//!
//! - [`controller::Controller`] — the entry point: screens fragments,
//!   resolves identities, and manages the run lifecycle (debounced
//!   startup, fixed-cadence drain, drain-to-stop).
//! - [`queue::TaskQueue`] — unbounded FIFO buffer with a single-flight
//!   dequeue guard.
//! - [`pool::EnginePool`] — bounded browser-resource pool with lazy
//!   start and idle shutdown.
//! - [`chromium::ChromiumEngine`] — the production engine driver,
//!   speaking CDP to headless Chromium.
//! - [`sanitizer`], [`identity`], [`assertion`] — the external seams:
//!   the suspicion predicate, the user directory, and the forged
//!   credential the render authenticates with.

pub mod assertion;
pub mod chromium;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod identity;
pub mod logging;
pub mod pool;
pub mod queue;
pub mod sanitizer;
pub mod task;

pub use error::{Error, Result};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
