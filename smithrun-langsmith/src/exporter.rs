use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{LangSmithClient, LangSmithConfig, RunContextStore, RunEvent, TelemetrySink};

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, Default)]
pub struct FlushStats {
    pub events_flushed: usize,
    pub events_failed: usize,
    pub batches_sent: usize,
    pub dropped_events: u64,
}

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("flush timed out after {waited:?} with {pending} events pending")]
    Timeout { waited: Duration, pending: usize },
}

/// Bounded event queue drained by a background worker.
///
/// Callers enqueue without waiting on delivery. [`LangSmithExporter::flush`]
/// is the barrier: it returns once everything queued before it has been
/// delivered or has failed terminally.
#[derive(Clone)]
pub struct LangSmithExporter {
    config: LangSmithConfig,
    sink: Arc<dyn TelemetrySink>,
    store: Arc<RunContextStore>,
    queue: Arc<Mutex<VecDeque<RunEvent>>>,
    // Held across drain + send so a flush never overtakes an in-flight batch.
    send_lock: Arc<Mutex<()>>,
    notify: Arc<Notify>,
    dropped_events: Arc<AtomicU64>,
    failed_events: Arc<AtomicU64>,
    stop: CancellationToken,
}

impl LangSmithExporter {
    /// Exports to the LangSmith API. Must be called inside a tokio runtime.
    pub fn new(config: LangSmithConfig, store: Arc<RunContextStore>) -> Self {
        let sink = Arc::new(LangSmithClient::from_config(&config));
        Self::with_sink(config, sink, store)
    }

    pub fn with_sink(
        config: LangSmithConfig,
        sink: Arc<dyn TelemetrySink>,
        store: Arc<RunContextStore>,
    ) -> Self {
        let exporter = Self {
            config,
            sink,
            store,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            send_lock: Arc::new(Mutex::new(())),
            notify: Arc::new(Notify::new()),
            dropped_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
            stop: CancellationToken::new(),
        };
        exporter.spawn_flush_loop();
        exporter
    }

    pub async fn enqueue(&self, event: RunEvent) {
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.config.queue_capacity.max(1) {
            queue.pop_front();
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            warn!(
                capacity = self.config.queue_capacity,
                "langsmith queue full, dropped oldest event"
            );
        }
        queue.push_back(event);
        if queue.len() >= self.config.max_batch_size {
            self.notify.notify_one();
        }
    }

    pub async fn flush(&self, timeout: Duration) -> Result<FlushStats, FlushError> {
        let start = Instant::now();
        let deadline = start.checked_add(timeout);
        let _sending = match tokio::time::timeout(timeout, self.send_lock.lock()).await {
            Ok(guard) => guard,
            Err(_) => return Err(self.timeout_error(start).await),
        };

        let mut stats = FlushStats::default();
        loop {
            let batch = self.drain_batch().await;
            if batch.is_empty() {
                stats.dropped_events = self.dropped_events();
                debug!(
                    flushed = stats.events_flushed,
                    failed = stats.events_failed,
                    batches = stats.batches_sent,
                    "langsmith flush complete"
                );
                return Ok(stats);
            }

            let remaining = deadline
                .map(|deadline| deadline.saturating_duration_since(Instant::now()))
                .unwrap_or(timeout);
            let mut sent = 0;
            let finished = !remaining.is_zero()
                && tokio::time::timeout(remaining, self.send_batch(&batch, &mut stats, &mut sent))
                    .await
                    .is_ok();
            self.forget_finished(&batch[..sent]);

            if !finished {
                // The event in flight when the deadline hit is resent later.
                self.requeue(batch.into_iter().skip(sent).collect()).await;
                return Err(self.timeout_error(start).await);
            }
            stats.batches_sent += 1;
        }
    }

    /// Flushes, then stops the background worker.
    pub async fn shutdown(&self, timeout: Duration) -> Result<FlushStats, FlushError> {
        let result = self.flush(timeout).await;
        self.stop.cancel();
        result
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn failed_events(&self) -> u64 {
        self.failed_events.load(Ordering::Relaxed)
    }

    pub async fn pending_len(&self) -> usize {
        self.queue.lock().await.len()
    }

    fn spawn_flush_loop(&self) {
        let exporter = self.clone();
        let period = exporter.config.flush_interval.max(MIN_FLUSH_INTERVAL);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = exporter.stop.cancelled() => break,
                    _ = interval.tick() => {}
                    _ = exporter.notify.notified() => {}
                }
                if let Err(err) = exporter.flush(period).await {
                    debug!(error = %err, "background langsmith flush incomplete");
                }
            }
        });
    }

    async fn timeout_error(&self, start: Instant) -> FlushError {
        FlushError::Timeout {
            waited: start.elapsed(),
            pending: self.pending_len().await,
        }
    }

    async fn drain_batch(&self) -> Vec<RunEvent> {
        let mut queue = self.queue.lock().await;
        let take = queue.len().min(self.config.max_batch_size.max(1));
        queue.drain(..take).collect()
    }

    async fn requeue(&self, batch: Vec<RunEvent>) {
        let mut queue = self.queue.lock().await;
        for event in batch.into_iter().rev() {
            queue.push_front(event);
        }
    }

    async fn send_batch(&self, batch: &[RunEvent], stats: &mut FlushStats, sent: &mut usize) {
        for event in batch {
            match self.send_event(event).await {
                Ok(()) => stats.events_flushed += 1,
                Err(err) => {
                    stats.events_failed += 1;
                    self.failed_events.fetch_add(1, Ordering::Relaxed);
                    warn!(run_id = %event.run_id(), error = %err, "failed to submit run event");
                }
            }
            *sent += 1;
        }
    }

    /// Terminal updates that have been submitted (or failed for good) no
    /// longer need their run status. Eviction waits for the whole batch so
    /// duplicate updates inside one batch still resolve to the first.
    fn forget_finished(&self, events: &[RunEvent]) {
        for event in events {
            if let RunEvent::Update { run_id, .. } = event {
                self.store.forget(*run_id);
            }
        }
    }

    async fn send_event(&self, event: &RunEvent) -> Result<(), crate::LangSmithError> {
        match event {
            RunEvent::Start {
                run_id,
                parent_run_id,
                ..
            } => {
                self.store.record_start(*run_id, *parent_run_id);
                self.sink.submit(event).await
            }
            RunEvent::Update {
                run_id,
                end_time,
                outputs,
                error,
                duration_ms,
            } => {
                let decision = self.store.apply_update(*run_id, error.clone());
                let resolved = RunEvent::Update {
                    run_id: *run_id,
                    end_time: *end_time,
                    outputs: outputs.clone(),
                    error: decision.error,
                    duration_ms: *duration_ms,
                };
                self.sink.submit(&resolved).await
            }
        }
    }
}
