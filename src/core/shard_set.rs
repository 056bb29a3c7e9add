//! Sharded set of bounded record queues
//!
//! Producers and the single consumer each walk the shards with their own
//! round-robin cursor. The shard count is a power of two so a cursor maps to a
//! shard with a mask instead of a division.

use super::error::{Result, SinkError};
use super::record::Record;
use crossbeam_channel::{bounded, Receiver, SendError, Sender, TryRecvError, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Round `n` up to the next power of two, treating 0 as 1.
///
/// Returns `None` when the result does not fit in a `usize`.
///
/// ```
/// use sharded_log_sink::core::shard_set::normalize_shard_count;
///
/// assert_eq!(normalize_shard_count(0), Some(1));
/// assert_eq!(normalize_shard_count(5), Some(8));
/// assert_eq!(normalize_shard_count(8), Some(8));
/// ```
pub fn normalize_shard_count(n: usize) -> Option<usize> {
    n.max(1).checked_next_power_of_two()
}

/// One bounded FIFO queue of records
pub struct Shard {
    sender: Sender<Record>,
    receiver: Receiver<Record>,
}

impl Shard {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// Enqueue without waiting
    pub fn try_push(&self, record: Record) -> std::result::Result<(), TrySendError<Record>> {
        self.sender.try_send(record)
    }

    /// Enqueue, waiting for free capacity
    pub fn push(&self, record: Record) -> std::result::Result<(), SendError<Record>> {
        self.sender.send(record)
    }

    /// Dequeue without waiting
    pub fn try_pop(&self) -> std::result::Result<Record, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.sender.capacity().unwrap_or(0)
    }

    pub(crate) fn sender(&self) -> &Sender<Record> {
        &self.sender
    }

    pub(crate) fn receiver(&self) -> &Receiver<Record> {
        &self.receiver
    }
}

/// Fixed array of `N` shards (`N` a power of two) with independent write and
/// read cursors.
///
/// # Example
///
/// ```
/// use sharded_log_sink::ShardSet;
///
/// let shards = ShardSet::new(3, 16).unwrap();
/// assert_eq!(shards.len(), 4);
///
/// let (shard, cursor) = shards.select_for_write();
/// shard.try_push(b"{}\n".to_vec()).unwrap();
/// assert_eq!(shards.depth(cursor), 1);
/// ```
pub struct ShardSet {
    shards: Box<[Shard]>,
    mask: u64,
    capacity: usize,
    write_cursor: AtomicU64,
    read_cursor: AtomicU64,
    closed: AtomicBool,
}

impl ShardSet {
    /// Allocate `desired_shard_count` (rounded up to a power of two) queues of
    /// `per_shard_capacity` records each.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the capacity is zero or the shard
    /// count cannot be rounded to a power of two.
    pub fn new(desired_shard_count: usize, per_shard_capacity: usize) -> Result<Self> {
        if per_shard_capacity == 0 {
            return Err(SinkError::config(
                "ShardSet",
                "per-shard capacity must be at least 1",
            ));
        }
        let count = normalize_shard_count(desired_shard_count).ok_or_else(|| {
            SinkError::config(
                "ShardSet",
                format!("shard count {} is too large", desired_shard_count),
            )
        })?;

        let shards = (0..count).map(|_| Shard::new(per_shard_capacity)).collect();

        Ok(Self {
            shards,
            mask: count as u64 - 1,
            capacity: per_shard_capacity,
            write_cursor: AtomicU64::new(0),
            read_cursor: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    #[inline]
    fn index(&self, cursor: u64) -> usize {
        (cursor & self.mask) as usize
    }

    /// Advance the write cursor and return the shard it lands on with the
    /// raw cursor value.
    #[inline]
    pub fn select_for_write(&self) -> (&Shard, u64) {
        let cursor = self.write_cursor.fetch_add(1, Ordering::Relaxed);
        (&self.shards[self.index(cursor)], cursor)
    }

    /// Advance the read cursor. Consecutive calls visit shards `0..N`
    /// in order, whether or not they hold records.
    #[inline]
    pub fn select_for_read(&self) -> (&Shard, u64) {
        let cursor = self.read_cursor.fetch_add(1, Ordering::Relaxed);
        (&self.shards[self.index(cursor)], cursor)
    }

    /// Number of queued records in the shard `cursor` maps to
    #[inline]
    pub fn depth(&self, cursor: u64) -> usize {
        self.shards[self.index(cursor)].len()
    }

    /// Number of queued records across all shards
    pub fn total_depth(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn shard(&self, index: usize) -> Option<&Shard> {
        self.shards.get(index)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Shard> {
        self.shards.iter()
    }

    /// Number of shards (always a power of two)
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Per-shard capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop accepting admissions on every shard. Queued records stay readable.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
