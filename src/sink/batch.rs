//! Batching exporter worker
//!
//! Entries are queued on a bounded channel and handed to a sink's
//! `send_batch` from a dedicated thread, up to [`BATCH_SIZE`] at a time.

use super::{join_worker, LogEntry, Sink};
use crate::core::{Context, DeliveryMetrics, LoggerError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const BATCH_SIZE: usize = 50;
pub const BATCH_TIMEOUT: Duration = Duration::from_millis(10);
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

pub struct BatchProcessor {
    sender: Mutex<Option<Sender<LogEntry>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<DeliveryMetrics>,
    capacity: usize,
}

impl BatchProcessor {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self::with_capacity(sink, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(sink: Arc<dyn Sink>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        let metrics = Arc::new(DeliveryMetrics::new());
        let worker_metrics = Arc::clone(&metrics);

        let handle = thread::Builder::new()
            .name("log-exporter".to_string())
            .spawn(move || Self::run(receiver, sink, worker_metrics));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                eprintln!("[LOGGER ERROR] Failed to spawn exporter worker: {}", e);
                None
            }
        };

        Self {
            sender: Mutex::new(handle.as_ref().map(|_| sender)),
            handle: Mutex::new(handle),
            metrics,
            capacity,
        }
    }

    fn run(receiver: Receiver<LogEntry>, sink: Arc<dyn Sink>, metrics: Arc<DeliveryMetrics>) {
        let mut batch = Vec::with_capacity(BATCH_SIZE);

        loop {
            match receiver.recv() {
                Ok(entry) => batch.push(entry),
                Err(_) => break,
            }

            while batch.len() < BATCH_SIZE {
                match receiver.try_recv() {
                    Ok(entry) => batch.push(entry),
                    Err(_) => break,
                }
            }

            if batch.len() < BATCH_SIZE {
                // Small batch: give stragglers a moment to arrive
                thread::sleep(BATCH_TIMEOUT);
                while batch.len() < BATCH_SIZE {
                    match receiver.try_recv() {
                        Ok(entry) => batch.push(entry),
                        Err(_) => break,
                    }
                }
            }

            Self::export(sink.as_ref(), &mut batch, &metrics);
        }
    }

    fn export(sink: &dyn Sink, batch: &mut Vec<LogEntry>, metrics: &DeliveryMetrics) {
        if batch.is_empty() {
            return;
        }
        let entries = std::mem::replace(batch, Vec::with_capacity(BATCH_SIZE));
        let count = entries.len() as u64;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sink.send_batch(&Context::background(), entries)
        }));

        match result {
            Ok(Ok(())) => {
                metrics.record_sent(count);
            }
            Ok(Err(e)) => {
                eprintln!("[LOGGER ERROR] Exporter batch of {} failed: {}", count, e);
                metrics.record_failed(count);
            }
            Err(_) => {
                eprintln!("[LOGGER CRITICAL] Exporter sink panicked on a batch of {}", count);
                metrics.record_failed(count);
            }
        }
    }

    /// Queue an entry without blocking
    pub fn submit(&self, entry: LogEntry) -> Result<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            self.metrics.record_dropped();
            return Err(LoggerError::WorkerStopped);
        };

        match sender.try_send(entry) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.metrics.record_dropped();
                if dropped == 0 || (dropped + 1) % 1000 == 0 {
                    eprintln!(
                        "[LOGGER WARNING] Exporter queue full, {} entries dropped.",
                        dropped + 1
                    );
                }
                Err(LoggerError::queue_full(sender.len(), self.capacity))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.metrics.record_dropped();
                Err(LoggerError::WorkerStopped)
            }
        }
    }

    /// Close the queue and wait for the worker to drain it
    pub fn shutdown(&self, timeout: Duration) -> bool {
        drop(self.sender.lock().take());
        match self.handle.lock().take() {
            Some(handle) => join_worker(handle, timeout, "Exporter"),
            None => true,
        }
    }

    pub fn metrics(&self) -> &DeliveryMetrics {
        &self.metrics
    }
}

impl Drop for BatchProcessor {
    fn drop(&mut self) {
        self.shutdown(crate::core::DEFAULT_SHUTDOWN_TIMEOUT);
    }
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("capacity", &self.capacity)
            .field("metrics", &self.metrics)
            .finish()
    }
}
