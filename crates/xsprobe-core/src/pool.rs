//! Bounded browser-resource pool.
//!
//! Owns at most one running rendering engine. Admitted tasks run in
//! isolated contexts, bounded by `max_concurrency`; tasks offered to a
//! pool that is not running or already at capacity are dropped —
//! load-shedding, not failure. Unbounded buffering is the task
//! queue's job, upstream of this type. After the last open context
//! closes, the engine is torn down once `idle_shutdown_delay` elapses
//! without new work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::engine::{EngineSession, RenderEngine};
use crate::error::EngineError;
use crate::task::RenderTask;

/// Engine lifecycle manager with bounded render concurrency.
pub struct EnginePool {
    config: PoolConfig,
    engine: Arc<dyn RenderEngine>,
    state: tokio::sync::Mutex<PoolState>,
    /// Mirrors of state for lock-free reads; mutated only while the
    /// state lock is held.
    open_contexts: AtomicUsize,
    active: AtomicBool,
}

#[derive(Default)]
struct PoolState {
    session: Option<Arc<dyn EngineSession>>,
    idle_timer: Option<JoinHandle<()>>,
    /// Bumped on every close; in-flight renders from an earlier
    /// session carry the old epoch and their completions are ignored.
    epoch: u64,
}

impl EnginePool {
    /// Create a pool around an engine implementation.
    #[must_use]
    pub fn new(config: PoolConfig, engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            config,
            engine,
            state: tokio::sync::Mutex::new(PoolState::default()),
            open_contexts: AtomicUsize::new(0),
            active: AtomicBool::new(false),
        }
    }

    /// Idempotently ensure the engine is running.
    ///
    /// Launch failure propagates to the caller and is not retried.
    pub async fn ensure_started(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if state.session.is_some() {
            return Ok(());
        }
        let session = self.engine.launch().await?;
        state.session = Some(session);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Admit one task and run it in a fresh rendering context.
    ///
    /// A task offered while the engine is not running, or while
    /// `max_concurrency` contexts are already open, is dropped
    /// silently; the render itself runs detached and its failures are
    /// logged, never propagated.
    pub async fn submit(self: &Arc<Self>, task: RenderTask) {
        let (session, epoch) = {
            let mut state = self.state.lock().await;
            let Some(session) = state.session.clone() else {
                debug!(
                    receiver = %task.receiver.user_id,
                    "task dropped: engine not running"
                );
                return;
            };
            if self.open_contexts.load(Ordering::SeqCst) >= self.config.max_concurrency {
                debug!(
                    receiver = %task.receiver.user_id,
                    max_concurrency = self.config.max_concurrency,
                    "task dropped: pool at capacity"
                );
                return;
            }
            // New work arrived; the engine must stay up.
            if let Some(timer) = state.idle_timer.take() {
                timer.abort();
            }
            self.open_contexts.fetch_add(1, Ordering::SeqCst);
            (session, state.epoch)
        };

        let pool = Arc::clone(self);
        tokio::spawn(async move {
            debug!(
                sender = %task.sender.user_id,
                receiver = %task.receiver.user_id,
                content_len = task.content.len(),
                "rendering task"
            );
            if let Err(err) = session.render(&task).await {
                // One task's failure never affects other renders.
                warn!(
                    error = %err,
                    receiver = %task.receiver.user_id,
                    "render failed"
                );
            }
            pool.finish_context(epoch).await;
        });
    }

    /// Close one context and arm the idle timer when the pool drains.
    ///
    /// Completions from a session that has since been closed are
    /// ignored: close already reset the counters for its epoch.
    async fn finish_context(self: &Arc<Self>, epoch: u64) {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return;
        }
        let remaining = self
            .open_contexts
            .load(Ordering::SeqCst)
            .saturating_sub(1);
        self.open_contexts.store(remaining, Ordering::SeqCst);

        if remaining == 0 && state.session.is_some() {
            // Re-arming always cancels the previous timer first.
            if let Some(timer) = state.idle_timer.take() {
                timer.abort();
            }
            let pool = Arc::clone(self);
            let delay = self.config.idle_shutdown_delay();
            state.idle_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                pool.close_if_idle().await;
            }));
        }
    }

    /// Idle-timer path: tear down only if no context opened meanwhile.
    async fn close_if_idle(&self) {
        if self.open_contexts.load(Ordering::SeqCst) > 0 {
            return;
        }
        info!("engine idle, shutting down");
        self.close().await;
    }

    /// Close the engine if it is running. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(timer) = state.idle_timer.take() {
            timer.abort();
        }
        let Some(session) = state.session.take() else {
            return;
        };
        state.epoch += 1;
        self.active.store(false, Ordering::SeqCst);
        self.open_contexts.store(0, Ordering::SeqCst);
        session.close().await;
    }

    /// Whether the engine is currently running (not whether contexts
    /// are open).
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of currently open rendering contexts.
    pub fn open_contexts(&self) -> usize {
        self.open_contexts.load(Ordering::SeqCst)
    }
}
