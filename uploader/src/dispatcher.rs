//! The background loop that performs scheduled uploads once their time has come.

use crate::config::DEFAULT_DISPATCH_INTERVAL;
use crate::executor::UploadExecutor;
use crate::queue::UploadQueue;
use jiff::Timestamp;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Source of "now" for deciding which uploads are due.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

/// What one scan of the queue did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Periodically drains due uploads from the queue and hands them to the executor.
///
/// Each due upload gets exactly one attempt. It leaves the queue before the attempt starts and
/// its staged file is deleted after the attempt ends, however it went, panics included. A failed
/// upload is logged and then forgotten.
pub struct Dispatcher<E> {
    queue: Arc<UploadQueue>,
    executor: Arc<E>,
    interval: Duration,
    clock: Clock,
}

impl<E> std::fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queue", &self.queue)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl<E: UploadExecutor> Dispatcher<E> {
    pub fn new(queue: Arc<UploadQueue>, executor: Arc<E>) -> Self {
        Self {
            queue,
            executor,
            interval: DEFAULT_DISPATCH_INTERVAL,
            clock: Arc::new(Timestamp::now),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Performs one scan: every upload due at `now` is attempted, one after the other, in the
    /// order it was queued.
    pub async fn run_once(&self, now: Timestamp) -> DispatchReport {
        let due = self.queue.drain_due(now).await;
        let mut report = DispatchReport::default();
        if due.is_empty() {
            tracing::trace!(%now, "no uploads due");
            return report;
        }

        tracing::debug!(%now, due = due.len(), "dispatching due uploads");
        for upload in due {
            report.attempted += 1;

            // each attempt runs as its own task so a panicking upload can't take the loop with it
            let executor = self.executor.clone();
            let credentials = upload.credentials().clone();
            let metadata = upload.metadata().clone();
            let file = upload.source().path().to_path_buf();
            let attempt = tokio::spawn(async move {
                executor.execute(&credentials, &metadata, &file).await
            });
            let result = match attempt.await {
                Ok(result) => result,
                Err(e) => Err(eyre::eyre!("upload task failed: {e}")),
            };

            match result {
                Ok(video) => {
                    report.succeeded += 1;
                    tracing::info!(
                        upload_id = %upload.id(),
                        title = %upload.metadata().title,
                        video_id = %video.video_id,
                        "scheduled video uploaded"
                    );
                }
                Err(e) => {
                    // there is nobody to report this to, and no second attempt
                    report.failed += 1;
                    tracing::error!(
                        upload_id = %upload.id(),
                        title = %upload.metadata().title,
                        error = %format!("{e:#}"),
                        "failed to upload scheduled video"
                    );
                }
            }

            upload.into_source().release().await;
        }
        report
    }

    /// Spawns the loop.
    ///
    /// The first scan happens right away, then one per interval. Scans never overlap: a scan
    /// that outlasts the interval delays the next one instead.
    pub fn start(self) -> DispatcherHandle {
        let (stop, mut stopped) = watch::channel(false);
        let queue = self.queue.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval = ?self.interval, "upload dispatcher started");

            loop {
                tokio::select! {
                    biased;
                    // a dropped handle counts as a stop request too
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {
                        let now = (self.clock)();
                        let report = self.run_once(now).await;
                        if report.attempted > 0 {
                            tracing::info!(
                                attempted = report.attempted,
                                succeeded = report.succeeded,
                                failed = report.failed,
                                "dispatch cycle finished"
                            );
                        }
                    }
                }
            }

            tracing::info!("upload dispatcher stopped");
        });

        DispatcherHandle { queue, stop, task }
    }
}

/// Owns a running dispatcher.
///
/// Only a running dispatcher hands out its queue, so uploads can only be scheduled where
/// something will eventually perform them.
#[derive(Debug)]
pub struct DispatcherHandle {
    queue: Arc<UploadQueue>,
    stop: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl DispatcherHandle {
    pub fn queue(&self) -> &Arc<UploadQueue> {
        &self.queue
    }

    /// Asks the loop to exit and waits for it. A scan in progress is allowed to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "upload dispatcher task failed");
        }
    }
}
