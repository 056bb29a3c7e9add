//! Core sink types and traits

pub mod admission_policy;
pub mod async_sink;
pub mod error;
pub mod metrics;
pub mod options;
pub mod record;
pub mod shard_set;
pub mod sink;
mod worker;

pub use admission_policy::{AdmissionPolicy, ErrorCallback, OverflowCallback, ReadStrategy};
pub use async_sink::{AsyncSink, AsyncSinkBuilder, DEFAULT_SHARD_CAPACITY, DEFAULT_SHARD_COUNT};
pub use error::{Result, SinkError};
pub use metrics::SinkMetrics;
pub use options::{default_log_path, SinkOptions};
pub use record::{Record, DROP_COUNT_FIELD, DROP_SAMPLE_INTERVAL};
pub use shard_set::{Shard, ShardSet};
pub use sink::Sink;
