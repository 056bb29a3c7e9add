//! File sink example
//!
//! Demonstrates writing JSON lines from several threads into a rotating log
//! file, then shedding load with the sampling policy.
//!
//! Run with: cargo run --example file_sink

use sharded_log_sink::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    println!("=== Sharded Log Sink - File Example ===\n");

    // 1. Lossless sink built from options
    let options = SinkOptions {
        log_path: "demo_logs/demo.log".into(),
        shard_count: 8,
        shard_capacity: 256,
        max_file_size_mb: 1,
        max_backups: 3,
        ..SinkOptions::default()
    };
    let sink = Arc::new(AsyncSink::open(&options)?);
    println!("1. Writing from 4 threads into {}", options.log_path.display());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let sink = Arc::clone(&sink);
            thread::spawn(move || {
                for i in 0..250 {
                    let line = format!(
                        "{{\"level\":\"info\",\"worker\":{},\"seq\":{}}}\n",
                        worker, i
                    );
                    sink.write_owned(line.into_bytes());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread panicked");
    }

    sink.close()?;
    let metrics = sink.metrics();
    println!(
        "   admitted={} written={} flushes={}",
        metrics.admitted(),
        metrics.written(),
        metrics.flushes()
    );

    // 2. Lossy sink over a deliberately slow disk
    println!("\n2. Overloading a small lossy sink:");

    struct SlowSink(FileSink);

    impl Sink for SlowSink {
        fn write(&mut self, record: &[u8]) -> Result<()> {
            thread::sleep(Duration::from_micros(50));
            self.0.write(record)
        }

        fn flush(&mut self) -> Result<()> {
            self.0.flush()
        }

        fn close(&mut self) -> Result<()> {
            self.0.close()
        }
    }

    let lossy = AsyncSink::builder()
        .shard_count(2)
        .shard_capacity(16)
        .admission_policy(AdmissionPolicy::DropWithSampling)
        .read_strategy(ReadStrategy::FirstAvailable)
        .on_overflow(Arc::new(|count: u64| {
            println!("   overflow: {} records dropped so far", count);
        }))
        .build(SlowSink(FileSink::new("demo_logs/lossy.log")?))?;

    for i in 0..5_000 {
        lossy.write(format!("{{\"seq\":{}}}\n", i).as_bytes());
    }
    lossy.close()?;

    let metrics = lossy.metrics();
    println!(
        "   admitted={} dropped={} drop rate={:.1}%",
        metrics.admitted(),
        metrics.dropped(),
        metrics.drop_rate()
    );

    println!("\nLogs written to demo_logs/");
    Ok(())
}
