//! OpenObserve ingestion sink
//!
//! Posts entries as JSON to `{scheme}://{host}/api/default/{stream}/_json`
//! with basic auth. Requests run on a dedicated worker thread so `send`
//! returns as soon as the entry is queued.

use super::{join_worker, LogEntry, Sink};
use crate::core::{Context, DeliveryMetrics, LoggerError, Result, DEFAULT_SHUTDOWN_TIMEOUT};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const ENV_URL: &str = "O2_URL";
pub const ENV_USERNAME: &str = "O2_USERNAME";
pub const ENV_PASSWORD: &str = "O2_PASSWORD";

pub const USER_AGENT: &str = concat!("rust_trace_logger/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct OpenObserveConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub scheme: String,
    /// Entry field that names the destination stream
    pub stream_field: String,
    pub timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub queue_capacity: usize,
}

impl OpenObserveConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            scheme: "https".to_string(),
            stream_field: "service".to_string(),
            timeout: Duration::from_secs(15),
            pool_max_idle_per_host: 50,
            pool_idle_timeout: Duration::from_secs(90),
            queue_capacity: 1024,
        }
    }

    /// Read host and credentials from `O2_URL`, `O2_USERNAME`, `O2_PASSWORD`
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| {
                LoggerError::config("openobserve", format!("environment variable {} is not set", name))
            })
        };
        Ok(Self::new(var(ENV_URL)?, var(ENV_USERNAME)?, var(ENV_PASSWORD)?))
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_stream_field(mut self, field: impl Into<String>) -> Self {
        self.stream_field = field.into();
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use = "builder methods return a new value"]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn endpoint(&self, stream: &str) -> String {
        format!(
            "{}://{}/api/default/{}/_json",
            self.scheme,
            self.host.trim_end_matches('/'),
            stream
        )
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(LoggerError::config("openobserve", "collector host is empty"));
        }
        if self.scheme != "http" && self.scheme != "https" {
            return Err(LoggerError::config(
                "openobserve",
                format!("unsupported scheme '{}'", self.scheme),
            ));
        }
        Ok(())
    }
}

enum Job {
    One(LogEntry),
    Batch(Vec<LogEntry>),
}

pub struct OpenObserveSink {
    config: Arc<OpenObserveConfig>,
    sender: Mutex<Option<Sender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<DeliveryMetrics>,
}

impl OpenObserveSink {
    pub fn new(config: OpenObserveConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let (sender, receiver) = bounded(config.queue_capacity);
        let metrics = Arc::new(DeliveryMetrics::new());

        let worker_config = Arc::clone(&config);
        let worker_metrics = Arc::clone(&metrics);
        let handle = thread::Builder::new()
            .name("openobserve-sink".to_string())
            .spawn(move || Self::run(receiver, worker_config, worker_metrics))
            .map_err(|e| LoggerError::io_operation("spawning sink worker", "thread spawn failed", e))?;

        Ok(Self {
            config,
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            metrics,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenObserveConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenObserveConfig {
        &self.config
    }

    pub fn metrics(&self) -> &DeliveryMetrics {
        &self.metrics
    }

    // The blocking client owns an internal runtime, so it is created and
    // dropped on this thread rather than on a caller's async runtime.
    fn run(receiver: Receiver<Job>, config: Arc<OpenObserveConfig>, metrics: Arc<DeliveryMetrics>) {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout)
            .user_agent(USER_AGENT)
            .build();

        let client = match client {
            Ok(client) => client,
            Err(e) => {
                eprintln!("[LOGGER ERROR] OpenObserve client setup failed: {}", e);
                for _ in receiver.iter() {
                    metrics.record_dropped();
                }
                return;
            }
        };

        for job in receiver.iter() {
            match job {
                Job::One(entry) => {
                    let stream = entry.stream_name(&config.stream_field).to_string();
                    Self::deliver(&client, &config, &metrics, &stream, &entry, 1);
                }
                Job::Batch(entries) => {
                    let mut by_stream: BTreeMap<String, Vec<LogEntry>> = BTreeMap::new();
                    for entry in entries {
                        by_stream
                            .entry(entry.stream_name(&config.stream_field).to_string())
                            .or_default()
                            .push(entry);
                    }
                    for (stream, group) in by_stream {
                        let count = group.len() as u64;
                        Self::deliver(&client, &config, &metrics, &stream, &group, count);
                    }
                }
            }
        }
    }

    fn deliver<T: serde::Serialize + ?Sized>(
        client: &reqwest::blocking::Client,
        config: &OpenObserveConfig,
        metrics: &DeliveryMetrics,
        stream: &str,
        body: &T,
        count: u64,
    ) {
        match Self::post(client, config, stream, body) {
            Ok(()) => {
                metrics.record_sent(count);
            }
            Err(e) => {
                eprintln!("[LOGGER ERROR] {}", e);
                metrics.record_failed(count);
            }
        }
    }

    fn post<T: serde::Serialize + ?Sized>(
        client: &reqwest::blocking::Client,
        config: &OpenObserveConfig,
        stream: &str,
        body: &T,
    ) -> Result<()> {
        client
            .post(config.endpoint(stream))
            .basic_auth(&config.username, Some(&config.password))
            .json(body)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map(|_| ())
            .map_err(|e| LoggerError::delivery(stream, e.to_string()))
    }

    fn enqueue(&self, job: Job) -> Result<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            self.metrics.record_dropped();
            return Err(LoggerError::WorkerStopped);
        };

        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.record_dropped();
                Err(LoggerError::queue_full(sender.len(), self.config.queue_capacity))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.metrics.record_dropped();
                Err(LoggerError::WorkerStopped)
            }
        }
    }

    /// Stop accepting entries and wait for queued requests to finish
    pub fn shutdown(&self, timeout: Duration) -> bool {
        drop(self.sender.lock().take());
        match self.handle.lock().take() {
            Some(handle) => join_worker(handle, timeout, "OpenObserve"),
            None => true,
        }
    }
}

impl Sink for OpenObserveSink {
    fn send(&self, _ctx: &Context, entry: LogEntry) -> Result<()> {
        self.enqueue(Job::One(entry))
    }

    fn send_batch(&self, _ctx: &Context, entries: Vec<LogEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.enqueue(Job::Batch(entries))
    }
}

impl Drop for OpenObserveSink {
    fn drop(&mut self) {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
    }
}

impl std::fmt::Debug for OpenObserveSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenObserveSink")
            .field("endpoint", &self.config.endpoint("{stream}"))
            .field("metrics", &self.metrics)
            .finish()
    }
}
