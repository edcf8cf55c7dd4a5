//! Verification controller.
//!
//! The controller is the only entry point the rest of the system
//! touches. It screens submitted fragments through the suspicion
//! predicate, resolves identities, buffers accepted work in the task
//! queue, and manages the engine pool's lifecycle: a debounced startup
//! so a burst of submissions launches the engine once, a fixed-cadence
//! drain loop that feeds the pool one task per tick, and drain-to-stop
//! teardown when both the queue and the pool go quiet.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ControllerConfig;
use crate::error::{EngineError, IdentityError};
use crate::identity::IdentityDirectory;
use crate::pool::EnginePool;
use crate::queue::TaskQueue;
use crate::sanitizer::ContentSanitizer;
use crate::task::RenderTask;

/// What the controller did with a submitted fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    /// The fragment survives sanitization unchanged; nothing to verify.
    NotSuspicious,
    /// The fragment was queued for rendering.
    Queued,
}

/// Orchestrates screening, queueing, and pool lifecycle.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

struct Inner {
    config: ControllerConfig,
    queue: TaskQueue,
    pool: Arc<EnginePool>,
    directory: Arc<dyn IdentityDirectory>,
    sanitizer: Arc<dyn ContentSanitizer>,
    timers: tokio::sync::Mutex<Timers>,
    /// Set when a debounced background start fails; cleared by the
    /// next successful start. Lets embedders distinguish "finished"
    /// from "never got off the ground".
    launch_failed: AtomicBool,
}

#[derive(Default)]
struct Timers {
    drain: Option<JoinHandle<()>>,
    debounce: Option<JoinHandle<()>>,
}

impl Controller {
    /// Wire a controller from its collaborators.
    #[must_use]
    pub fn new(
        config: ControllerConfig,
        pool: Arc<EnginePool>,
        directory: Arc<dyn IdentityDirectory>,
        sanitizer: Arc<dyn ContentSanitizer>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                queue: TaskQueue::new(),
                pool,
                directory,
                sanitizer,
                timers: tokio::sync::Mutex::new(Timers::default()),
                launch_failed: AtomicBool::new(false),
            }),
        }
    }

    /// Offer a submitted fragment for verification.
    ///
    /// Benign fragments are discarded without side effects. Suspicious
    /// ones are resolved against the directory, queued, and the
    /// debounced startup timer is re-armed. Identity resolution
    /// failures surface to the caller; the fragment is not queued.
    pub async fn offer(
        &self,
        receiver_id: &str,
        content: &str,
    ) -> Result<OfferOutcome, IdentityError> {
        if !self.inner.sanitizer.is_suspicious(content) {
            debug!(receiver = receiver_id, "fragment is benign, skipping");
            return Ok(OfferOutcome::NotSuspicious);
        }

        let receiver = self
            .inner
            .directory
            .find(receiver_id)
            .await?
            .ok_or_else(|| IdentityError::NotFound(receiver_id.to_string()))?;
        let sender = self
            .inner
            .directory
            .find_verifier()
            .await?
            .ok_or(IdentityError::NoVerifier)?;

        warn!(
            receiver = %receiver.user_id,
            content_len = content.len(),
            "suspicious fragment queued for verification"
        );
        self.inner
            .queue
            .push(RenderTask::new(sender, receiver, content));
        self.inner.arm_debounce().await;
        Ok(OfferOutcome::Queued)
    }

    /// Start the engine and the drain loop immediately, bypassing the
    /// debounce. Idempotent while running.
    pub async fn start(&self) -> Result<(), EngineError> {
        self.inner.start().await
    }

    /// Stop everything: debounce timer, engine, buffered tasks, drain
    /// loop. Idempotent.
    pub async fn stop(&self) {
        self.inner.stop().await;
    }

    /// Whether the engine is currently running.
    pub fn is_running(&self) -> bool {
        self.inner.pool.is_active()
    }

    /// Whether a background engine start has failed since the last
    /// successful one. The failed run's queue is already cleared.
    pub fn launch_failed(&self) -> bool {
        self.inner.launch_failed.load(Ordering::SeqCst)
    }

    /// Number of tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }
}

impl Inner {
    /// Re-arm the debounced startup timer. Each call cancels the
    /// previous timer, so a burst of offers collapses into one launch
    /// after the window of quiet.
    async fn arm_debounce(self: &Arc<Self>) {
        let mut timers = self.timers.lock().await;
        if let Some(timer) = timers.debounce.take() {
            timer.abort();
        }
        let inner = Arc::clone(self);
        let window = self.config.debounce_window();
        timers.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if inner.pool.is_active() {
                return;
            }
            if let Err(err) = inner.start().await {
                // Nothing will ever drain the queue now; drop the
                // buffered tasks and leave a flag callers can observe.
                error!(error = %err, "failed to start verification engine");
                inner.launch_failed.store(true, Ordering::SeqCst);
                inner.stop().await;
            }
        }));
    }

    async fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        let mut timers = self.timers.lock().await;
        if timers.drain.is_some() {
            return Ok(());
        }
        self.pool.ensure_started().await?;
        self.launch_failed.store(false, Ordering::SeqCst);
        info!(queued = self.queue.len(), "verification run started");

        let inner = Arc::clone(self);
        let period = self.config.drain_interval();
        timers.drain = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            loop {
                ticks.tick().await;
                if let Some(task) = inner.queue.pop_front() {
                    inner.pool.submit(task).await;
                } else if inner.queue.is_empty() && inner.pool.open_contexts() == 0 {
                    info!("queue drained and pool idle, stopping");
                    inner.stop().await;
                    break;
                }
            }
        }));
        Ok(())
    }

    async fn stop(&self) {
        let (debounce, drain) = {
            let mut timers = self.timers.lock().await;
            (timers.debounce.take(), timers.drain.take())
        };
        if let Some(timer) = debounce {
            timer.abort();
        }
        self.pool.close().await;
        self.queue.clear();
        // Aborted last, with no awaits after: the drain loop itself
        // calls stop on drain-to-stop.
        if let Some(timer) = drain {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::engine::mock::{MockEngine, MockStats};
    use crate::identity::{Identity, StaticDirectory};
    use crate::sanitizer::BasicMarkupSanitizer;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const RECEIVER: &str = "AB12CD34EF";

    fn directory() -> Arc<StaticDirectory> {
        Arc::new(StaticDirectory::new(vec![
            Identity::member(RECEIVER, "mallory"),
            Identity::verifier("SYS0000001", "auditor"),
        ]))
    }

    fn controller_with(
        max_concurrency: usize,
        render_ms: u64,
    ) -> (Controller, Arc<MockStats>) {
        let engine = MockEngine::new(Duration::from_millis(render_ms));
        let stats = Arc::clone(&engine.stats);
        let pool_config = PoolConfig {
            max_concurrency,
            idle_shutdown_ms: 10_000,
            ..PoolConfig::default()
        };
        let pool = Arc::new(EnginePool::new(pool_config, Arc::new(engine)));
        let controller = Controller::new(
            ControllerConfig::default(),
            pool,
            directory(),
            Arc::new(BasicMarkupSanitizer),
        );
        (controller, stats)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn benign_fragment_is_a_no_op() {
        let (controller, stats) = controller_with(2, 100);

        let outcome = controller.offer(RECEIVER, "<b>thanks!</b>").await.unwrap();
        assert_eq!(outcome, OfferOutcome::NotSuspicious);
        assert_eq!(controller.queued(), 0);

        // Even well past the debounce window nothing launches.
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(!controller.is_running());
        assert_eq!(stats.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_receiver_is_rejected() {
        let (controller, _) = controller_with(2, 100);
        let result = controller.offer("ZZZZZZZZZZ", "<script>x()</script>").await;
        assert!(matches!(result, Err(IdentityError::NotFound(_))));
        assert_eq!(controller.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_verifier_is_rejected() {
        let engine = MockEngine::new(Duration::ZERO);
        let pool = Arc::new(EnginePool::new(PoolConfig::default(), Arc::new(engine)));
        let controller = Controller::new(
            ControllerConfig::default(),
            pool,
            Arc::new(StaticDirectory::new(vec![Identity::member(
                RECEIVER, "mallory",
            )])),
            Arc::new(BasicMarkupSanitizer),
        );
        let result = controller.offer(RECEIVER, "<script>x()</script>").await;
        assert!(matches!(result, Err(IdentityError::NoVerifier)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_launch_surfaces_and_clears_the_queue() {
        let engine = MockEngine::failing();
        let pool = Arc::new(EnginePool::new(PoolConfig::default(), Arc::new(engine)));
        let controller = Controller::new(
            ControllerConfig::default(),
            pool,
            directory(),
            Arc::new(BasicMarkupSanitizer),
        );

        controller
            .offer(RECEIVER, "<script>x()</script>")
            .await
            .unwrap();
        assert_eq!(controller.queued(), 1);
        assert!(!controller.launch_failed());

        // The debounced start fails; the run must reach a state a
        // caller can wait out: failure flagged, queue emptied, engine
        // down.
        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;
        assert!(controller.launch_failed());
        assert!(!controller.is_running());
        assert_eq!(controller.queued(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_start_clears_the_failure_flag() {
        let (controller, _) = controller_with(2, 10_000);

        // Force the flag, then run a normal startup.
        controller
            .inner
            .launch_failed
            .store(true, Ordering::SeqCst);
        controller
            .offer(RECEIVER, "<script>a()</script>")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;

        assert!(controller.is_running());
        assert!(!controller.launch_failed());
        controller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_offers_launches_once() {
        let (controller, stats) = controller_with(5, 10);

        for i in 0..4 {
            let payload = format!("<script>steal({i})</script>");
            controller.offer(RECEIVER, &payload).await.unwrap();
        }
        assert_eq!(controller.queued(), 4);
        assert!(!controller.is_running());

        // Sleeping auto-advances the paused clock through the debounce
        // deadline.
        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;
        assert!(controller.is_running());
        assert_eq!(stats.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_offer_resets_the_debounce_window() {
        let (controller, _) = controller_with(2, 10);

        controller
            .offer(RECEIVER, "<script>a()</script>")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(125)).await;
        controller
            .offer(RECEIVER, "<script>b()</script>")
            .await
            .unwrap();

        // 255 ms after the first offer: its timer was cancelled, and
        // the re-armed window (375 ms) has not elapsed yet.
        tokio::time::sleep(Duration::from_millis(130)).await;
        settle().await;
        assert!(!controller.is_running());

        tokio::time::sleep(Duration::from_millis(130)).await;
        settle().await;
        assert!(controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn drains_queue_then_stops_itself() {
        let (controller, stats) = controller_with(5, 50);

        controller
            .offer(RECEIVER, "<script>a()</script>")
            .await
            .unwrap();
        controller
            .offer(RECEIVER, "<script>b()</script>")
            .await
            .unwrap();

        // Debounce fires, drain ticks feed both tasks, renders finish,
        // and the loop observes quiet and tears everything down well
        // before the 10 s idle timer would.
        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;

        assert_eq!(stats.finished(), 2);
        assert_eq!(controller.queued(), 0);
        assert!(!controller.is_running());
        assert!(stats.closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_task_is_shed_not_deferred() {
        // Three suspicious fragments against a two-context pool whose
        // renders outlast the drain cadence: the third is dropped at
        // admission and never retried.
        let (controller, stats) = controller_with(2, 2_000);

        for tag in ["a", "b", "c"] {
            let payload = format!("<script>{tag}()</script>");
            controller.offer(RECEIVER, &payload).await.unwrap();
        }

        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;

        assert_eq!(stats.renders_started.load(Ordering::SeqCst), 2);
        assert_eq!(stats.max_active(), 2);
        assert_eq!(stats.finished(), 2);
        assert!(!controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_clears_the_queue() {
        let (controller, _) = controller_with(2, 10_000);

        controller
            .offer(RECEIVER, "<script>a()</script>")
            .await
            .unwrap();
        controller
            .offer(RECEIVER, "<script>b()</script>")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        settle().await;
        assert!(controller.is_running());

        controller.stop().await;
        assert!(!controller.is_running());
        assert_eq!(controller.queued(), 0);

        controller.stop().await;
        assert!(!controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_start_bypasses_debounce() {
        let (controller, stats) = controller_with(2, 5_000);

        controller
            .offer(RECEIVER, "<script>a()</script>")
            .await
            .unwrap();
        // No debounce wait: start immediately.
        controller.start().await.unwrap();
        assert!(controller.is_running());
        assert_eq!(stats.launches.load(Ordering::SeqCst), 1);

        controller.start().await.unwrap();
        assert_eq!(stats.launches.load(Ordering::SeqCst), 1);

        controller.stop().await;
    }
}
