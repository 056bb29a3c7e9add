//! Stress tests for concurrent admission
//!
//! These tests verify:
//! - The blocking policy loses nothing under many producers and tiny shards
//! - Lossy accounting always balances: admitted + dropped = offered
//! - Closing while producers are still writing never loses an admitted record

mod common;

use common::{count_closes, written, RecordingSink};
use sharded_log_sink::{AdmissionPolicy, AsyncSink, ReadStrategy, DROP_COUNT_FIELD};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn tagged(producer: usize, n: usize) -> Vec<u8> {
    format!("{{\"producer\":{},\"n\":{}}}\n", producer, n).into_bytes()
}

/// Many producers against very small shards: everything must arrive exactly once
#[test]
fn test_block_policy_loses_nothing() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 5_000;

    let (sink, events) = RecordingSink::new();
    let sink = Arc::new(
        AsyncSink::builder()
            .shard_count(16)
            .shard_capacity(8)
            .admission_policy(AdmissionPolicy::Block)
            .build(sink)
            .expect("Failed to build sink"),
    );

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for n in 0..PER_PRODUCER {
                    sink.write_owned(tagged(p, n));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    sink.close().unwrap();

    let records = written(&events);
    assert_eq!(records.len(), PRODUCERS * PER_PRODUCER);

    let unique: HashSet<Vec<u8>> = records.into_iter().collect();
    assert_eq!(unique.len(), PRODUCERS * PER_PRODUCER, "duplicate records delivered");

    let metrics = sink.metrics();
    assert_eq!(metrics.admitted(), (PRODUCERS * PER_PRODUCER) as u64);
    assert_eq!(metrics.written(), metrics.admitted());
    assert_eq!(metrics.dropped(), 0);
    assert_eq!(count_closes(&events), 1);
}

/// Lossy policy under overload: every offered record is either admitted or
/// counted as dropped, and forced records carry multiples of 100
#[test]
fn test_lossy_accounting_balances() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 10_000;

    let (sink, events) = RecordingSink::new();
    let sink = Arc::new(
        AsyncSink::builder()
            .shard_count(4)
            .shard_capacity(4)
            .admission_policy(AdmissionPolicy::DropWithSampling)
            .read_strategy(ReadStrategy::FirstAvailable)
            .build(sink)
            .expect("Failed to build sink"),
    );

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for n in 0..PER_PRODUCER {
                    sink.write(&tagged(p, n));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    sink.close().unwrap();

    let metrics = sink.metrics();
    let offered = (PRODUCERS * PER_PRODUCER) as u64;
    assert_eq!(metrics.admitted() + metrics.dropped(), offered);
    assert_eq!(metrics.written(), metrics.admitted());
    assert_eq!(metrics.forced_through(), metrics.failed_admissions() / 100);

    let records = written(&events);
    assert_eq!(records.len() as u64, metrics.admitted());

    let needle = format!("\"{}\":", DROP_COUNT_FIELD);
    let mut forced = 0;
    for record in &records {
        let value: serde_json::Value =
            serde_json::from_slice(record).expect("record is valid JSON");
        if let Some(count) = value.get(DROP_COUNT_FIELD) {
            forced += 1;
            assert_eq!(count.as_u64().unwrap() % 100, 0);
            assert!(String::from_utf8_lossy(record).contains(&needle));
        }
    }
    assert_eq!(forced, metrics.forced_through());
}

/// Close while producers are running: admitted records are all written,
/// the rest are counted as rejected
#[test]
fn test_close_during_concurrent_writes() {
    const PRODUCERS: usize = 4;

    let (sink, events) = RecordingSink::new();
    let sink = Arc::new(
        AsyncSink::builder()
            .shard_count(8)
            .shard_capacity(16)
            .build(sink)
            .expect("Failed to build sink"),
    );
    let offered = Arc::new(AtomicU64::new(0));
    let stop = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let sink = Arc::clone(&sink);
            let offered = Arc::clone(&offered);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut n = 0;
                while !stop.load(Ordering::Relaxed) {
                    sink.write(&tagged(p, n));
                    offered.fetch_add(1, Ordering::Relaxed);
                    n += 1;
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    sink.close().unwrap();
    // Keep writing into the closed sink for a moment
    thread::sleep(Duration::from_millis(10));
    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        handle.join().unwrap();
    }

    let metrics = sink.metrics();
    assert_eq!(
        metrics.admitted() + metrics.rejected_after_close(),
        offered.load(Ordering::Relaxed)
    );
    assert_eq!(written(&events).len() as u64, metrics.admitted());
    assert!(metrics.rejected_after_close() > 0);
    assert_eq!(count_closes(&events), 1);
}
