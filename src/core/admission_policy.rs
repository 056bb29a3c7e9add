//! Admission policies and the worker read strategy
//!
//! The admission policy decides what a producer does when the shard it was
//! assigned is full. The read strategy decides how the draining worker picks
//! the next shard to wait on.

use super::error::SinkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Policy for a producer that finds its shard full
///
/// # Example
///
/// ```
/// use sharded_log_sink::AdmissionPolicy;
///
/// // Lossless default: producers wait for the worker
/// assert_eq!(AdmissionPolicy::default(), AdmissionPolicy::Block);
///
/// // Shed load instead, reporting the loss every 100th failure
/// let policy = AdmissionPolicy::DropWithSampling;
/// assert!(policy.is_lossy());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Block the producer until the shard has room
    ///
    /// Propagates backpressure; nothing is ever dropped.
    #[default]
    Block,

    /// Drop the record when the shard is full
    ///
    /// Every 100th failure the record is instead forced through (blocking),
    /// annotated with the sink's cumulative failure count.
    DropWithSampling,
}

impl AdmissionPolicy {
    #[inline]
    pub fn is_lossy(&self) -> bool {
        matches!(self, AdmissionPolicy::DropWithSampling)
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionPolicy::Block => write!(f, "Block"),
            AdmissionPolicy::DropWithSampling => write!(f, "DropWithSampling"),
        }
    }
}

/// How the draining worker chooses the next shard to wait on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStrategy {
    /// Wait on shards strictly in round-robin order, whether or not they
    /// hold records.
    ///
    /// A record in another shard waits until the cursor cycles back to it.
    #[default]
    RoundRobin,

    /// Wait on every shard at once and take whichever is ready first
    FirstAvailable,
}

impl fmt::Display for ReadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadStrategy::RoundRobin => write!(f, "RoundRobin"),
            ReadStrategy::FirstAvailable => write!(f, "FirstAvailable"),
        }
    }
}

/// Callback for overflow notifications
///
/// Called each time a record is forced through under
/// [`AdmissionPolicy::DropWithSampling`]. The parameter is the cumulative
/// number of failed admissions since the sink was created.
///
/// Runs on the producer thread once the forced record has been placed (or
/// rejected by a concurrent close), with no internal lock held. It may write
/// into the same sink or close it.
pub type OverflowCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Callback for errors and panics raised by the sink inside the worker
///
/// When set, it replaces the default stderr report.
///
/// Runs on the draining worker thread. Under [`AdmissionPolicy::Block`] a
/// callback that writes into the same sink while its shards are full waits
/// on the worker it is running on, and the sink stalls.
pub type ErrorCallback = Arc<dyn Fn(&SinkError) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_policy_default() {
        assert_eq!(AdmissionPolicy::default(), AdmissionPolicy::Block);
        assert!(!AdmissionPolicy::Block.is_lossy());
        assert!(AdmissionPolicy::DropWithSampling.is_lossy());
    }

    #[test]
    fn test_display() {
        assert_eq!(AdmissionPolicy::Block.to_string(), "Block");
        assert_eq!(
            AdmissionPolicy::DropWithSampling.to_string(),
            "DropWithSampling"
        );
        assert_eq!(ReadStrategy::RoundRobin.to_string(), "RoundRobin");
        assert_eq!(ReadStrategy::FirstAvailable.to_string(), "FirstAvailable");
    }

    #[test]
    fn test_serde_names() {
        let policy: AdmissionPolicy = serde_json::from_str("\"drop_with_sampling\"").unwrap();
        assert_eq!(policy, AdmissionPolicy::DropWithSampling);

        let strategy: ReadStrategy = serde_json::from_str("\"first_available\"").unwrap();
        assert_eq!(strategy, ReadStrategy::FirstAvailable);

        assert_eq!(
            serde_json::to_string(&AdmissionPolicy::Block).unwrap(),
            "\"block\""
        );
    }
}
