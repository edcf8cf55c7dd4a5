//! Rendering-engine seams.
//!
//! The pool manages engine lifecycle through these traits; the
//! production driver is [`crate::chromium::ChromiumEngine`], and tests
//! substitute a scripted mock so pool and controller semantics can be
//! exercised without a browser.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{EngineError, RenderError};
use crate::task::RenderTask;

/// Launches rendering-engine instances.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Launch the engine and return a handle to the running instance.
    async fn launch(&self) -> Result<Arc<dyn EngineSession>, EngineError>;
}

/// A running engine instance.
///
/// `render` executes one task in an isolated context and returns when
/// the observation window has elapsed and the context is torn down.
/// Failures are scoped to the one task.
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Render one task to completion.
    async fn render(&self, task: &RenderTask) -> Result<(), RenderError>;

    /// Shut the engine down. Idempotent.
    async fn close(&self);
}
