//! Draining worker: the single thread that moves records from the shards
//! into the sink
//!
//! The worker owns the sink outright. It is moved into the thread at spawn
//! and handed back through the join handle, so nothing else can touch it
//! while records are flowing.
//!
//! Every sink call runs inside its own `catch_unwind` boundary. A panic while
//! the sink is open costs the record being written; a panic while draining
//! for shutdown stops the drain.

use super::{
    admission_policy::{ErrorCallback, ReadStrategy},
    error::{Result, SinkError},
    metrics::SinkMetrics,
    shard_set::{Shard, ShardSet},
    sink::Sink,
};
use crossbeam_channel::{select, Receiver, Select};
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Result of one guarded sink call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Done,
    Failed,
    Panicked,
}

pub(crate) struct DrainingWorker {
    shards: Arc<ShardSet>,
    sink: Box<dyn Sink>,
    shutdown: Receiver<()>,
    admission: Arc<RwLock<()>>,
    metrics: Arc<SinkMetrics>,
    on_error: Option<ErrorCallback>,
    read_strategy: ReadStrategy,
}

impl DrainingWorker {
    pub(crate) fn new(
        shards: Arc<ShardSet>,
        sink: Box<dyn Sink>,
        shutdown: Receiver<()>,
        admission: Arc<RwLock<()>>,
        metrics: Arc<SinkMetrics>,
        on_error: Option<ErrorCallback>,
        read_strategy: ReadStrategy,
    ) -> Self {
        Self {
            shards,
            sink,
            shutdown,
            admission,
            metrics,
            on_error,
            read_strategy,
        }
    }

    /// Start the worker on a named thread. The thread returns the sink once
    /// every shard has been drained.
    pub(crate) fn spawn(self, thread_name: String) -> Result<JoinHandle<Box<dyn Sink>>> {
        thread::Builder::new()
            .name(thread_name)
            .spawn(move || self.run())
            .map_err(SinkError::WorkerSpawn)
    }

    fn run(mut self) -> Box<dyn Sink> {
        match self.read_strategy {
            ReadStrategy::RoundRobin => self.run_round_robin(),
            ReadStrategy::FirstAvailable => self.run_first_available(),
        }
        // Wait out admissions that started before the sink was closed
        drop(self.admission.write());
        self.drain();
        self.sink
    }

    /// Open state: wait on one shard at a time, in cursor order, until the
    /// shutdown signal fires.
    fn run_round_robin(&mut self) {
        let shards = Arc::clone(&self.shards);
        let shutdown = self.shutdown.clone();

        loop {
            let (shard, cursor) = shards.select_for_read();
            select! {
                recv(shard.receiver()) -> msg => {
                    // The shard set keeps its senders alive, so recv cannot disconnect
                    if let Ok(record) = msg {
                        self.forward(&record);
                    }
                    if shards.depth(cursor.wrapping_add(1)) == 0 {
                        self.flush();
                    }
                }
                recv(shutdown) -> _ => return,
            }
        }
    }

    /// Open state, alternative strategy: wait on every shard at once.
    fn run_first_available(&mut self) {
        let shards = Arc::clone(&self.shards);
        let shutdown = self.shutdown.clone();
        let receivers: Vec<_> = shards.iter().map(Shard::receiver).collect();

        let mut sel = Select::new();
        for &receiver in &receivers {
            sel.recv(receiver);
        }
        let shutdown_index = sel.recv(&shutdown);

        loop {
            let oper = sel.select();
            let index = oper.index();
            if index == shutdown_index {
                let _ = oper.recv(&shutdown);
                return;
            }
            if let Ok(record) = oper.recv(receivers[index]) {
                self.forward(&record);
            }
            if shards.total_depth() == 0 {
                self.flush();
            }
        }
    }

    /// Draining state: never blocks. Stops after a full cycle of empty
    /// shards, then flushes once.
    fn drain(&mut self) {
        let shards = Arc::clone(&self.shards);
        let mut empty_in_a_row = 0;

        while empty_in_a_row < shards.len() {
            let (shard, _) = shards.select_for_read();
            match shard.try_pop() {
                Ok(record) => {
                    empty_in_a_row = 0;
                    if self.forward(&record) == Outcome::Panicked {
                        eprintln!(
                            "[SINK CRITICAL] Draining aborted after sink '{}' panicked; \
                             {} records left undelivered.",
                            self.sink.name(),
                            shards.total_depth()
                        );
                        return;
                    }
                }
                Err(_) => empty_in_a_row += 1,
            }
        }

        self.flush();
    }

    fn forward(&mut self, record: &[u8]) -> Outcome {
        let outcome = self.guarded("write", |sink| sink.write(record));
        if outcome == Outcome::Done {
            self.metrics.record_written();
        }
        outcome
    }

    fn flush(&mut self) -> Outcome {
        let outcome = self.guarded("flush", |sink| sink.flush());
        if outcome == Outcome::Done {
            self.metrics.record_flush();
        }
        outcome
    }

    /// Run one sink operation, converting errors and panics into reports
    fn guarded<F>(&mut self, operation: &'static str, op: F) -> Outcome
    where
        F: FnOnce(&mut dyn Sink) -> Result<()>,
    {
        let sink: &mut dyn Sink = &mut *self.sink;
        match panic::catch_unwind(AssertUnwindSafe(|| op(sink))) {
            Ok(Ok(())) => Outcome::Done,
            Ok(Err(e)) => {
                self.metrics.record_write_error();
                self.report(&e, "[SINK ERROR]");
                Outcome::Failed
            }
            Err(payload) => {
                self.metrics.record_worker_panic();
                let err = SinkError::worker_panicked(self.sink.name(), operation, payload.as_ref());
                self.report(&err, "[SINK CRITICAL]");
                Outcome::Panicked
            }
        }
    }

    fn report(&self, err: &SinkError, tag: &str) {
        match self.on_error {
            Some(ref callback) => callback(err),
            None => eprintln!("{} {}", tag, err),
        }
    }
}
