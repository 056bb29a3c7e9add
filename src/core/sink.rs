//! Sink capability: the byte-writing resource behind an async sink

use super::error::Result;

/// Destination for already-serialized log records.
///
/// A sink is owned by exactly one draining worker and is never accessed
/// concurrently, so implementations need no internal locking. Buffering,
/// rotation and compression are entirely the implementation's concern.
///
/// # Example
///
/// ```
/// use sharded_log_sink::{Result, Sink};
///
/// struct StderrSink;
///
/// impl Sink for StderrSink {
///     fn write(&mut self, record: &[u8]) -> Result<()> {
///         use std::io::Write;
///         std::io::stderr().write_all(record)?;
///         Ok(())
///     }
///
///     fn flush(&mut self) -> Result<()> {
///         Ok(())
///     }
///
///     fn close(&mut self) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait Sink: Send {
    /// Write one complete record
    fn write(&mut self, record: &[u8]) -> Result<()>;

    /// Push buffered bytes to the underlying storage
    fn flush(&mut self) -> Result<()>;

    /// Release the underlying resource; called once, after the final flush
    fn close(&mut self) -> Result<()>;

    fn name(&self) -> &str {
        "sink"
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(&mut self, record: &[u8]) -> Result<()> {
        (**self).write(record)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
