//! Batch exporter: the single background worker that owns all span I/O.
//!
//! The worker runs on its own thread with a current-thread tokio runtime, so
//! callers never need a runtime of their own and no network I/O or backoff
//! sleep happens on a caller thread. It buffers spans from the export queue and
//! delivers a batch when the buffer reaches `batch_size` or when the oldest
//! buffered span has waited `max_wait`. Flush and shutdown requests arrive on a
//! separate control channel and are acknowledged through a blocking channel.

use std::sync::mpsc::{sync_channel, RecvTimeoutError, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, warn};

use crate::config::AgentspanConfig;
use crate::error::TelemetryError;
use crate::telemetry::encoding::Span;
use crate::telemetry::export::exporter::{ExportBatch, ExportResult, SpanExporter};
use crate::telemetry::export::retry::RetryPolicy;
use crate::telemetry::processing::PipelineStats;
use crate::telemetry::types::SessionId;

const WORKER_THREAD_NAME: &str = "agentspan-export";

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_wait: Duration,
    pub retry: RetryPolicy,
    pub project_id: Option<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            max_wait: Duration::from_millis(5000),
            retry: RetryPolicy::default(),
            project_id: None,
        }
    }
}

impl BatchConfig {
    pub fn from_config(config: &AgentspanConfig) -> Self {
        Self {
            batch_size: config.exporter.batch_size.max(1),
            max_wait: config.exporter.max_wait(),
            retry: RetryPolicy::from_config(&config.exporter),
            project_id: config.project_id.clone(),
        }
    }
}

enum Control {
    Flush {
        session_id: Option<SessionId>,
        ack: SyncSender<bool>,
    },
    Shutdown {
        ack: SyncSender<bool>,
    },
}

/// Handle to the export worker.
pub struct BatchExporter {
    control: mpsc::UnboundedSender<Control>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BatchExporter {
    /// Start the worker consuming `receiver`.
    pub fn spawn(
        receiver: mpsc::Receiver<Span>,
        exporter: Arc<dyn SpanExporter>,
        config: BatchConfig,
        stats: Arc<PipelineStats>,
    ) -> Result<Self, TelemetryError> {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            receiver,
            control: control_rx,
            exporter,
            config,
            stats,
            buffer: Vec::new(),
            oldest: None,
            warned_permanent: false,
        };

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build();
                match runtime {
                    Ok(runtime) => runtime.block_on(worker.run()),
                    Err(e) => error!(error = %e, "Failed to build export worker runtime"),
                }
            })
            .map_err(|e| TelemetryError::WorkerStart(e.to_string()))?;

        Ok(Self {
            control: control_tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Export everything enqueued so far. Blocks up to `timeout`; returns whether
    /// every batch was delivered in time.
    pub fn flush(&self, session_id: Option<SessionId>, timeout: Duration) -> bool {
        let (ack, done) = sync_channel(1);
        if self.control.send(Control::Flush { session_id, ack }).is_err() {
            return false;
        }
        match done.recv_timeout(timeout) {
            Ok(delivered) => delivered,
            Err(RecvTimeoutError::Timeout) => {
                debug!(session_id = ?session_id, ?timeout, "Flush did not complete in time");
                false
            }
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Drain, stop the worker and join it. Returns whether the final drain
    /// delivered everything within `timeout`; the worker is detached otherwise.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let Some(handle) = self.worker.lock().take() else {
            return true;
        };
        let (ack, done) = sync_channel(1);
        if self.control.send(Control::Shutdown { ack }).is_err() {
            let _ = handle.join();
            return false;
        }
        match done.recv_timeout(timeout) {
            Ok(delivered) => {
                if handle.join().is_err() {
                    warn!("Export worker panicked during shutdown");
                }
                delivered
            }
            Err(_) => {
                warn!(?timeout, "Export worker did not finish before the shutdown timeout");
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

struct Worker {
    receiver: mpsc::Receiver<Span>,
    control: mpsc::UnboundedReceiver<Control>,
    exporter: Arc<dyn SpanExporter>,
    config: BatchConfig,
    stats: Arc<PipelineStats>,
    buffer: Vec<Span>,
    oldest: Option<Instant>,
    warned_permanent: bool,
}

impl Worker {
    async fn run(mut self) {
        debug!(exporter = self.exporter.name(), "Span export worker started");
        let mut data_open = true;

        loop {
            let deadline = self
                .oldest
                .map(|oldest| oldest + self.config.max_wait)
                .unwrap_or_else(|| Instant::now() + self.config.max_wait);

            tokio::select! {
                biased;

                control = self.control.recv() => match control {
                    Some(Control::Flush { session_id, ack }) => {
                        let delivered = self.drain_and_export().await;
                        debug!(session_id = ?session_id, delivered, "Flush handled");
                        let _ = ack.send(delivered);
                    }
                    Some(Control::Shutdown { ack }) => {
                        let delivered = self.drain_and_export().await;
                        self.exporter.shutdown().await;
                        let _ = ack.send(delivered);
                        break;
                    }
                    None => {
                        self.drain_and_export().await;
                        self.exporter.shutdown().await;
                        break;
                    }
                },

                span = self.receiver.recv(), if data_open => match span {
                    Some(span) => {
                        self.push(span);
                        if self.buffer.len() >= self.config.batch_size {
                            self.export_buffer().await;
                        }
                    }
                    None => data_open = false,
                },

                _ = sleep_until(deadline), if self.oldest.is_some() => {
                    self.export_buffer().await;
                }
            }
        }

        debug!("Span export worker stopped");
    }

    fn push(&mut self, span: Span) {
        if self.oldest.is_none() {
            self.oldest = Some(Instant::now());
        }
        self.buffer.push(span);
    }

    async fn drain_and_export(&mut self) -> bool {
        while let Ok(span) = self.receiver.try_recv() {
            self.push(span);
        }
        self.export_buffer().await
    }

    /// Deliver the whole buffer in `batch_size` chunks, preserving enqueue order.
    async fn export_buffer(&mut self) -> bool {
        self.oldest = None;
        if self.buffer.is_empty() {
            return true;
        }
        let mut pending = std::mem::take(&mut self.buffer);
        let mut delivered = true;
        while !pending.is_empty() {
            let rest = pending.split_off(pending.len().min(self.config.batch_size));
            delivered &= self.deliver(pending).await;
            pending = rest;
        }
        delivered
    }

    async fn deliver(&mut self, spans: Vec<Span>) -> bool {
        let count = spans.len();
        let batch = match ExportBatch::new(spans, self.config.project_id.as_deref()) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(spans = count, error = %e, "Dropping span batch that failed to serialize");
                self.stats.record_batch_dropped(count);
                return false;
            }
        };

        let retry = self.config.retry;
        let mut attempt = 1u32;
        loop {
            match self.exporter.export(&batch).await {
                ExportResult::Success => {
                    self.stats.record_batch_exported(count);
                    debug!(spans = count, attempt, "Exported span batch");
                    return true;
                }
                ExportResult::Failure { retryable, reason } => {
                    if retry.should_retry(attempt, retryable) {
                        let delay = retry.backoff(attempt);
                        self.stats.record_retry();
                        debug!(
                            spans = count,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            reason = %reason,
                            "Span export failed, retrying"
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }

                    if !retryable {
                        if !self.warned_permanent {
                            warn!(
                                exporter = self.exporter.name(),
                                spans = count,
                                reason = %reason,
                                "Span export rejected; dropping batch (further rejections logged at debug)"
                            );
                            self.warned_permanent = true;
                        } else {
                            debug!(spans = count, reason = %reason, "Span export rejected");
                        }
                    } else {
                        warn!(
                            spans = count,
                            attempts = attempt,
                            reason = %reason,
                            "Dropping span batch after exhausting retries"
                        );
                    }
                    self.stats.record_batch_dropped(count);
                    return false;
                }
            }
        }
    }
}
