//! Rate-limited background loop
//!
//! [`RateLimitedLoop`] runs a [`Work`] item over and over on a tokio task.
//! Each cycle waits for a wake signal or the idle refresh period, then waits
//! until at least `min_interval` has passed since the previous cycle started,
//! then runs the work once. Wake signals are stored, so a wake that arrives
//! while a cycle is running is honored by the next wait. Wakes that pile up
//! before a cycle starts are folded into that cycle.
//!
//! Each invocation runs on its own spawned task: errors and panics are logged
//! and the loop carries on with the next cycle.

use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default grace period for [`RateLimitedLoop::stop`]
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(1);

/// Liveness predicate handed to each invocation
#[derive(Clone, Debug)]
pub struct Liveness(CancellationToken);

impl Liveness {
    /// False once a stop was requested
    pub fn is_alive(&self) -> bool {
        !self.0.is_cancelled()
    }
}

/// Unit of work driven by the loop
#[async_trait]
pub trait Work: Send + Sync + 'static {
    /// Run one cycle
    async fn run(&self, alive: Liveness) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Work for F
where
    F: Fn(Liveness) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, alive: Liveness) -> anyhow::Result<()> {
        (self)(alive).await
    }
}

/// Aborts the invocation when the loop task itself is aborted
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background loop with a minimum interval between invocations
pub struct RateLimitedLoop {
    work: Arc<dyn Work>,
    min_interval: Duration,
    idle_interval: Duration,
    stop_grace: Duration,
    wake: Arc<Notify>,
    cycles: Arc<AtomicU64>,
    running: Option<Running>,
}

impl RateLimitedLoop {
    /// Create a stopped loop
    ///
    /// The idle refresh period defaults to `min_interval`.
    pub fn new(min_interval: Duration, work: impl Work) -> Self {
        Self {
            work: Arc::new(work),
            min_interval,
            idle_interval: min_interval,
            stop_grace: DEFAULT_STOP_GRACE,
            wake: Arc::new(Notify::new()),
            cycles: Arc::new(AtomicU64::new(0)),
            running: None,
        }
    }

    /// Run even without wake signals at this period
    pub fn with_idle_interval(mut self, idle_interval: Duration) -> Self {
        self.idle_interval = idle_interval.max(self.min_interval);
        self
    }

    /// Grace period granted to a running invocation on stop
    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    /// Whether the background task is active
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Number of invocations started so far
    pub fn cycle_count(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    /// Handle that can wake the loop from other tasks or threads
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Request an early cycle
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Spawn the background task; does nothing when already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("Rate-limited loop already running");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            Arc::clone(&self.work),
            self.min_interval,
            self.idle_interval,
            Arc::clone(&self.wake),
            Arc::clone(&self.cycles),
            cancel.clone(),
        ));
        self.running = Some(Running { cancel, handle });
        info!(
            "Rate-limited loop started (min interval {:?}, idle refresh {:?})",
            self.min_interval, self.idle_interval
        );
    }

    /// Stop the background task
    ///
    /// Cancels the loop, waits up to the grace period for the current
    /// invocation to notice, then aborts it. The loop can be started again
    /// afterwards.
    pub async fn stop(&mut self) {
        let Some(Running { cancel, mut handle }) = self.running.take() else {
            return;
        };

        cancel.cancel();
        match timeout(self.stop_grace, &mut handle).await {
            Ok(Ok(())) => info!("Rate-limited loop stopped"),
            Ok(Err(e)) => warn!("Rate-limited loop ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "Rate-limited loop did not stop within {:?}, aborting",
                    self.stop_grace
                );
                handle.abort();
                match handle.await {
                    Err(e) if e.is_cancelled() => debug!("Rate-limited loop aborted"),
                    Err(e) => warn!("Rate-limited loop failed while aborting: {}", e),
                    Ok(()) => debug!("Rate-limited loop finished before abort"),
                }
            }
        }
    }
}

impl Drop for RateLimitedLoop {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}

async fn run_loop(
    work: Arc<dyn Work>,
    min_interval: Duration,
    idle_interval: Duration,
    wake: Arc<Notify>,
    cycles: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    let mut last_start: Option<Instant> = None;

    loop {
        if let Some(previous) = last_start {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = wake.notified() => {}
                _ = sleep_until(previous + idle_interval) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep_until(previous + min_interval) => {}
            }
        } else if cancel.is_cancelled() {
            break;
        }

        // This cycle sees every write made so far
        if wake.notified().now_or_never().is_some() {
            debug!("Folded pending wake into cycle");
        }

        last_start = Some(Instant::now());
        let cycle = cycles.fetch_add(1, Ordering::Relaxed) + 1;

        let alive = Liveness(cancel.clone());
        let invocation = Arc::clone(&work);
        let mut task = AbortOnDrop(tokio::spawn(async move { invocation.run(alive).await }));

        let outcome = tokio::select! {
            outcome = &mut task.0 => outcome,
            _ = cancel.cancelled() => {
                // The invocation gets to observe the liveness flag; stop()
                // aborts this whole loop if it takes longer than the grace.
                let outcome = (&mut task.0).await;
                debug!("Cycle {} finished after stop request", cycle);
                outcome
            }
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Cycle {} failed: {:#}", cycle, e),
            Err(e) if e.is_panic() => error!("Cycle {} panicked", cycle),
            Err(e) => error!("Cycle {} was cancelled: {}", cycle, e),
        }
    }

    debug!("Rate-limited loop exited");
}
