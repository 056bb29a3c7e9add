//! Test sinks shared by the integration and stress suites

#![allow(dead_code)]

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use sharded_log_sink::{Result, Sink};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write(Vec<u8>),
    Flush,
    Close,
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// Records every call it receives
pub struct RecordingSink {
    events: EventLog,
}

impl RecordingSink {
    pub fn new() -> (Self, EventLog) {
        let events = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                events: Arc::clone(&events),
            },
            events,
        )
    }
}

impl Sink for RecordingSink {
    fn write(&mut self, record: &[u8]) -> Result<()> {
        self.events.lock().push(Event::Write(record.to_vec()));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.events.lock().push(Event::Flush);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.events.lock().push(Event::Close);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Recording sink whose writes wait for a permit, so a test can hold the
/// worker still while queues fill up.
///
/// Each write first announces itself on the `entered` channel. Dropping the
/// [`Gate`] opens it for good.
pub struct GatedSink {
    events: EventLog,
    permits: Receiver<()>,
    entered: Sender<()>,
}

pub struct Gate {
    permits: Option<Sender<()>>,
    entered: Receiver<()>,
}

impl Gate {
    /// Let exactly one pending write through
    pub fn release_one(&self) {
        if let Some(ref permits) = self.permits {
            let _ = permits.send(());
        }
    }

    /// Let every current and future write through
    pub fn open(&mut self) {
        self.permits.take();
    }

    /// Wait until the worker is inside a write
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(Duration::from_secs(5))
            .expect("worker never reached the sink");
    }
}

impl GatedSink {
    pub fn new() -> (Self, Gate, EventLog) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let (permit_tx, permit_rx) = bounded(0);
        let (entered_tx, entered_rx) = unbounded();
        (
            Self {
                events: Arc::clone(&events),
                permits: permit_rx,
                entered: entered_tx,
            },
            Gate {
                permits: Some(permit_tx),
                entered: entered_rx,
            },
            events,
        )
    }
}

impl Sink for GatedSink {
    fn write(&mut self, record: &[u8]) -> Result<()> {
        let _ = self.entered.send(());
        // Err means the gate was dropped: stay open from now on
        let _ = self.permits.recv();
        self.events.lock().push(Event::Write(record.to_vec()));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.events.lock().push(Event::Flush);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.events.lock().push(Event::Close);
        Ok(())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Written records in the order the sink saw them
pub fn written(events: &EventLog) -> Vec<Vec<u8>> {
    events
        .lock()
        .iter()
        .filter_map(|e| match e {
            Event::Write(r) => Some(r.clone()),
            _ => None,
        })
        .collect()
}

pub fn count_closes(events: &EventLog) -> usize {
    events.lock().iter().filter(|e| **e == Event::Close).count()
}

pub fn record(i: usize) -> Vec<u8> {
    format!("{{\"seq\":{}}}\n", i).into_bytes()
}

/// Poll `condition` until it holds or five seconds pass
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(std::time::Instant::now() < deadline, "condition not met in time");
        std::thread::sleep(Duration::from_millis(1));
    }
}
