//! Async sink: sharded admission in front of a single draining worker

use super::{
    admission_policy::{AdmissionPolicy, ErrorCallback, OverflowCallback, ReadStrategy},
    error::{Result, SinkError},
    metrics::SinkMetrics,
    options::SinkOptions,
    record::{annotate_drop_count, Record, DROP_SAMPLE_INTERVAL},
    shard_set::{Shard, ShardSet},
    sink::Sink,
    worker::DrainingWorker,
};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Default number of shards
pub const DEFAULT_SHARD_COUNT: usize = 256;

/// Default capacity of each shard, in records
pub const DEFAULT_SHARD_CAPACITY: usize = 1024;

const DEFAULT_THREAD_NAME: &str = "log-sink-drain";

/// Worker thread and the sender half of the shutdown broadcast. Present until
/// the sink is closed.
struct Lifecycle {
    shutdown: Sender<()>,
    worker: JoinHandle<Box<dyn Sink>>,
}

/// Asynchronous, sharded front end for a [`Sink`].
///
/// Producers call [`write`](AsyncSink::write) from any number of threads; a
/// single background worker forwards records to the sink. Records written to
/// the same shard keep their order; records in different shards do not.
///
/// # Example
///
/// ```no_run
/// use sharded_log_sink::{AdmissionPolicy, AsyncSink, FileSink};
///
/// let file = FileSink::new("/var/log/app/app.log").unwrap();
/// let sink = AsyncSink::builder()
///     .shard_count(64)
///     .shard_capacity(4096)
///     .admission_policy(AdmissionPolicy::DropWithSampling)
///     .build(file)
///     .unwrap();
///
/// sink.write(b"{\"msg\":\"started\"}\n");
/// sink.close().unwrap();
/// ```
pub struct AsyncSink {
    shards: Arc<ShardSet>,
    policy: AdmissionPolicy,
    metrics: Arc<SinkMetrics>,
    on_overflow: Option<OverflowCallback>,
    /// Disconnects once the sink starts closing
    shutdown: Receiver<()>,
    /// Held shared for the whole of an admission. The worker takes it
    /// exclusively before draining, so no record lands after the drain starts.
    admission: Arc<RwLock<()>>,
    lifecycle: Mutex<Option<Lifecycle>>,
}

impl AsyncSink {
    /// Wrap `sink` with default settings
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be started.
    pub fn new<S: Sink + 'static>(sink: S) -> Result<Self> {
        AsyncSinkBuilder::new().build(sink)
    }

    #[must_use]
    pub fn builder() -> AsyncSinkBuilder {
        AsyncSinkBuilder::new()
    }

    /// Open the file described by `options` and start draining into it
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for invalid options, or the error from
    /// opening the log file.
    pub fn open(options: &SinkOptions) -> Result<Self> {
        options.validate()?;
        let sink = options.build_sink()?;
        AsyncSinkBuilder::new()
            .shard_count(options.shard_count)
            .shard_capacity(options.shard_capacity)
            .admission_policy(options.admission_policy)
            .read_strategy(options.read_strategy)
            .build(sink)
    }

    /// Admit a copy of `record`.
    ///
    /// Never reports failure. Under [`AdmissionPolicy::Block`] this waits for
    /// room in the selected shard; under [`AdmissionPolicy::DropWithSampling`]
    /// a record that does not fit is dropped, except every 100th which is
    /// forced through with the cumulative drop count attached.
    #[inline]
    pub fn write(&self, record: &[u8]) {
        self.admit(record.to_vec());
    }

    /// Admit `record` without copying it
    #[inline]
    pub fn write_owned(&self, record: Record) {
        self.admit(record);
    }

    fn admit(&self, record: Record) {
        let forced = self.enqueue(record);

        // Outside the admission guard: the callback may write or close
        if let (Some(failures), Some(callback)) = (forced, self.on_overflow.as_ref()) {
            callback(failures);
        }
    }

    /// Place `record` in a shard under the admission guard. Returns the
    /// cumulative failure count when the record was forced through.
    fn enqueue(&self, record: Record) -> Option<u64> {
        let _admitting = self.admission.read();
        if self.shards.is_closed() {
            self.metrics.record_rejected();
            return None;
        }

        let (shard, _) = self.shards.select_for_write();
        let record = match shard.try_push(record) {
            Ok(()) => {
                self.metrics.record_admitted();
                return None;
            }
            Err(TrySendError::Full(record)) => record,
            Err(TrySendError::Disconnected(_)) => {
                self.metrics.record_rejected();
                return None;
            }
        };

        match self.policy {
            AdmissionPolicy::Block => {
                self.metrics.record_block();
                self.push_blocking(shard, record);
                None
            }
            AdmissionPolicy::DropWithSampling => {
                let failures = self.metrics.record_failed_admission();
                if failures % DROP_SAMPLE_INTERVAL != 0 {
                    return None;
                }
                self.metrics.record_forced_through();
                self.push_blocking(shard, annotate_drop_count(record, failures));
                Some(failures)
            }
        }
    }

    /// Wait for room in `shard`. Gives up once the sink starts closing.
    fn push_blocking(&self, shard: &Shard, record: Record) {
        let admitted = select! {
            send(shard.sender(), record) -> res => res.is_ok(),
            recv(self.shutdown) -> _ => false,
        };
        if admitted {
            self.metrics.record_admitted();
        } else {
            self.metrics.record_rejected();
        }
    }

    /// Drain every admitted record into the sink, then close it.
    ///
    /// Producers still waiting on a full shard are released and their records
    /// rejected. Blocks until the worker has exited. Only the first call does
    /// any work; concurrent and later calls wait for it and return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the sink's close error, or `WorkerPanicked` if the worker
    /// thread died and took the sink with it or the sink's `close` panicked.
    pub fn close(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        let Some(Lifecycle { shutdown, worker }) = lifecycle.take() else {
            return Ok(());
        };

        self.shards.close_all();
        drop(shutdown);

        let mut sink = worker
            .join()
            .map_err(|payload| SinkError::worker_panicked("worker", "drain", payload.as_ref()))?;

        match panic::catch_unwind(AssertUnwindSafe(|| sink.close())) {
            Ok(result) => result,
            Err(payload) => Err(SinkError::worker_panicked(
                sink.name(),
                "close",
                payload.as_ref(),
            )),
        }
    }

    /// Same as [`close`](AsyncSink::close): the sink is drained and closed,
    /// not merely flushed.
    pub fn sync(&self) -> Result<()> {
        self.close()
    }

    pub fn is_closed(&self) -> bool {
        self.shards.is_closed()
    }

    pub fn metrics(&self) -> &SinkMetrics {
        &self.metrics
    }

    /// Number of shards after rounding up to a power of two
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_capacity(&self) -> usize {
        self.shards.capacity()
    }

    pub fn admission_policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Records admitted but not yet taken by the worker
    pub fn pending(&self) -> usize {
        self.shards.total_depth()
    }
}

impl Drop for AsyncSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            eprintln!("[SINK ERROR] Failed to close sink during drop: {}", e);
        }

        let dropped = self.metrics.dropped();
        if dropped > 0 {
            eprintln!(
                "[SINK WARNING] Sink shut down with {} dropped records (drop rate: {:.2}%)",
                dropped,
                self.metrics.drop_rate()
            );
        }
    }
}

/// Builder for constructing an [`AsyncSink`] with a fluent API
///
/// # Example
/// ```
/// use sharded_log_sink::prelude::*;
/// use std::sync::Arc;
///
/// # struct NullSink;
/// # impl Sink for NullSink {
/// #     fn write(&mut self, _: &[u8]) -> Result<()> { Ok(()) }
/// #     fn flush(&mut self) -> Result<()> { Ok(()) }
/// #     fn close(&mut self) -> Result<()> { Ok(()) }
/// # }
/// let sink = AsyncSink::builder()
///     .shard_count(5) // rounded up to 8
///     .shard_capacity(128)
///     .admission_policy(AdmissionPolicy::DropWithSampling)
///     .on_overflow(Arc::new(|count: u64| {
///         eprintln!("ALERT: {} records dropped so far", count);
///     }))
///     .build(NullSink)
///     .unwrap();
///
/// assert_eq!(sink.shard_count(), 8);
/// ```
pub struct AsyncSinkBuilder {
    shard_count: usize,
    shard_capacity: usize,
    admission_policy: AdmissionPolicy,
    read_strategy: ReadStrategy,
    thread_name: String,
    on_overflow: Option<OverflowCallback>,
    on_error: Option<ErrorCallback>,
}

impl AsyncSinkBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            shard_capacity: DEFAULT_SHARD_CAPACITY,
            admission_policy: AdmissionPolicy::default(),
            read_strategy: ReadStrategy::default(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            on_overflow: None,
            on_error: None,
        }
    }

    /// Number of shards; rounded up to the next power of two
    #[must_use = "builder methods return a new value"]
    pub fn shard_count(mut self, count: usize) -> Self {
        self.shard_count = count;
        self
    }

    /// Capacity of each shard in records (at least 1)
    #[must_use = "builder methods return a new value"]
    pub fn shard_capacity(mut self, capacity: usize) -> Self {
        self.shard_capacity = capacity;
        self
    }

    /// What a producer does when its shard is full. Default is `Block`.
    #[must_use = "builder methods return a new value"]
    pub fn admission_policy(mut self, policy: AdmissionPolicy) -> Self {
        self.admission_policy = policy;
        self
    }

    /// How the worker picks the next shard. Default is `RoundRobin`.
    #[must_use = "builder methods return a new value"]
    pub fn read_strategy(mut self, strategy: ReadStrategy) -> Self {
        self.read_strategy = strategy;
        self
    }

    /// Name of the draining worker thread
    #[must_use = "builder methods return a new value"]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set a callback invoked with the cumulative drop count each time a
    /// record is forced through. It runs on the writing thread once the
    /// record is placed.
    #[must_use = "builder methods return a new value"]
    pub fn on_overflow(mut self, callback: OverflowCallback) -> Self {
        self.on_overflow = Some(callback);
        self
    }

    /// Set a callback for sink errors and panics inside the worker,
    /// replacing the stderr report
    #[must_use = "builder methods return a new value"]
    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    /// Allocate the shards and start the draining worker over `sink`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero shard capacity or an
    /// unrepresentable shard count, and `WorkerSpawn` if the thread cannot
    /// be started. No worker is left running on error.
    pub fn build<S: Sink + 'static>(self, sink: S) -> Result<AsyncSink> {
        let shards = Arc::new(ShardSet::new(self.shard_count, self.shard_capacity)?);
        let metrics = Arc::new(SinkMetrics::new());
        let (shutdown_tx, shutdown_rx) = bounded(0);
        let admission = Arc::new(RwLock::new(()));

        let worker = DrainingWorker::new(
            Arc::clone(&shards),
            Box::new(sink),
            shutdown_rx.clone(),
            Arc::clone(&admission),
            Arc::clone(&metrics),
            self.on_error,
            self.read_strategy,
        )
        .spawn(self.thread_name)?;

        Ok(AsyncSink {
            shards,
            policy: self.admission_policy,
            metrics,
            on_overflow: self.on_overflow,
            shutdown: shutdown_rx,
            admission,
            lifecycle: Mutex::new(Some(Lifecycle {
                shutdown: shutdown_tx,
                worker,
            })),
        })
    }
}

impl Default for AsyncSinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
