//! # Sharded Log Sink
//!
//! An asynchronous, sharded write path for log records. Producers on any
//! number of threads hand pre-encoded records to an [`AsyncSink`]; a single
//! background worker forwards them to a [`Sink`] such as a rotating file.
//!
//! ## Features
//!
//! - **Sharded admission**: records spread round-robin over bounded queues
//! - **Two admission policies**: block for room, or drop and sample every
//!   100th failure with the running drop count attached
//! - **Clean shutdown**: `close` drains every admitted record, flushes and
//!   closes the sink exactly once
//! - **Bundled file sinks**: append-only and rotating, with gzip backups

pub mod core;
pub mod sinks;

pub mod prelude {
    pub use crate::core::{
        AdmissionPolicy, AsyncSink, AsyncSinkBuilder, ErrorCallback, OverflowCallback,
        ReadStrategy, Record, Result, Sink, SinkError, SinkMetrics, SinkOptions,
    };
    pub use crate::sinks::{FileSink, RotatingFileSink, RotationPolicy, RotationTrigger};
}

pub use self::core::{
    default_log_path, AdmissionPolicy, AsyncSink, AsyncSinkBuilder, ErrorCallback,
    OverflowCallback, ReadStrategy, Record, Result, Shard, ShardSet, Sink, SinkError, SinkMetrics,
    SinkOptions, DEFAULT_SHARD_CAPACITY, DEFAULT_SHARD_COUNT, DROP_COUNT_FIELD,
    DROP_SAMPLE_INTERVAL,
};
pub use self::sinks::{FileSink, RotatingFileSink, RotationPolicy, RotationTrigger};
