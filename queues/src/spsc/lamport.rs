// Lamport ring with the cache-aware refinements: shadow cursors (lazy mode)
// and the two-phase reserve/stage/publish batch API.
use super::alloc_slots;
use crate::config::QueueConfig;
use crate::error::{ConfigError, Empty, PushError};
use crate::sync::{Arc, AtomicUsize, Ordering};
use crate::{SpscReceiver, SpscSender};
use crossbeam_utils::CachePadded;
use std::fmt;
use tracing::debug;

// Shared part of the queue. Each cursor has exactly one writer and sits on
// its own line.
struct Ring {
    write: CachePadded<AtomicUsize>, // producer writes, consumer reads
    read: CachePadded<AtomicUsize>,  // consumer writes, producer reads
    slots: Box<[AtomicUsize]>,
    mask: usize,
}

impl Ring {
    #[inline]
    fn slot(&self, cursor: usize) -> &AtomicUsize {
        // mask keeps the index in bounds
        unsafe { self.slots.get_unchecked(cursor & self.mask) }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.mask + 1
    }
}

/// Producer half. Owns the write cursor and the read shadow.
pub struct LamportProducer {
    ring: Arc<Ring>,
    write_priv: usize,
    read_shadow: usize,
    slack: usize,
}

/// Consumer half. Owns the read cursor and the write shadow.
pub struct LamportConsumer {
    ring: Arc<Ring>,
    read_priv: usize,
    write_shadow: usize,
}

/// Builds a Lamport queue with `capacity` slots and the default line size.
pub fn channel(capacity: usize) -> Result<(LamportProducer, LamportConsumer), ConfigError> {
    with_config(&QueueConfig::new(capacity))
}

pub fn with_config(
    config: &QueueConfig,
) -> Result<(LamportProducer, LamportConsumer), ConfigError> {
    config.validate_lamport()?;

    let ring = Arc::new(Ring {
        write: CachePadded::new(AtomicUsize::new(0)),
        read: CachePadded::new(AtomicUsize::new(0)),
        slots: alloc_slots(config.entries, 0),
        mask: config.entries - 1,
    });
    let slack = config.lamport_slack();
    debug!(capacity = config.entries, slack, "lamport queue initialised");

    let producer = LamportProducer {
        ring: ring.clone(),
        write_priv: 0,
        read_shadow: 0,
        slack,
    };
    let consumer = LamportConsumer {
        ring,
        read_priv: 0,
        write_shadow: 0,
    };
    Ok((producer, consumer))
}

/// Bytes of control block plus slots for a ring of `capacity` entries.
pub fn storage_size(capacity: usize) -> Result<usize, ConfigError> {
    let config = QueueConfig::new(capacity);
    config.validate_lamport()?;
    Ok(config.storage_size(std::mem::size_of::<Ring>()))
}

impl LamportProducer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Items the plain mode can hold at once; one slot tells full from empty.
    #[inline]
    pub fn usable_capacity(&self) -> usize {
        self.ring.capacity() - 1
    }

    /// Slots the shadowed and batched modes keep free ahead of the consumer.
    #[inline]
    pub fn slack(&self) -> usize {
        self.slack
    }

    #[inline]
    fn batch_limit(&self) -> usize {
        self.ring.capacity() - self.slack
    }

    #[inline]
    fn store(&mut self, value: usize) {
        self.ring.slot(self.write_priv).store(value, Ordering::Relaxed);
        self.write_priv = self.write_priv.wrapping_add(1);
    }

    /// Plain enqueue: checks the live read cursor on every call.
    #[inline]
    pub fn write(&mut self, value: usize) -> Result<(), PushError> {
        self.read_shadow = self.ring.read.load(Ordering::Acquire);
        if self.write_priv.wrapping_sub(self.read_shadow) >= self.usable_capacity() {
            return Err(PushError::Full(value));
        }
        self.store(value);
        self.publish();
        Ok(())
    }

    // Space check against the read shadow; the live cursor is only loaded
    // once the shadow says the ring is full.
    #[inline]
    fn has_room(&mut self) -> bool {
        let limit = self.batch_limit();
        if self.write_priv.wrapping_sub(self.read_shadow) >= limit {
            self.read_shadow = self.ring.read.load(Ordering::Acquire);
            if self.write_priv.wrapping_sub(self.read_shadow) >= limit {
                return false;
            }
        }
        true
    }

    /// Lazy enqueue: the read cursor is loaded at most once per line of
    /// progress. Published immediately.
    #[inline]
    pub fn write_shadowed(&mut self, value: usize) -> Result<(), PushError> {
        if !self.has_room() {
            return Err(PushError::Full(value));
        }
        self.store(value);
        self.publish();
        Ok(())
    }

    /// Free slots for staging, refreshing the read shadow only if it shows
    /// fewer than `needed`.
    #[inline]
    pub fn reserve(&mut self, needed: usize) -> usize {
        let space = self
            .batch_limit()
            .saturating_sub(self.write_priv.wrapping_sub(self.read_shadow));
        if space >= needed {
            return space;
        }
        self.read_shadow = self.ring.read.load(Ordering::Acquire);
        self.batch_limit()
            .saturating_sub(self.write_priv.wrapping_sub(self.read_shadow))
    }

    /// Stages a value. Invisible to the consumer until [`publish`](Self::publish).
    #[inline]
    pub fn write_local(&mut self, value: usize) -> Result<(), PushError> {
        if !self.has_room() {
            return Err(PushError::Full(value));
        }
        self.store(value);
        Ok(())
    }

    /// Makes every staged value visible with one store.
    #[inline]
    pub fn publish(&mut self) {
        self.ring.write.store(self.write_priv, Ordering::Release);
    }

    /// Staged values not yet published.
    #[inline]
    pub fn pending(&self) -> usize {
        // only this side stores `write`
        self.write_priv
            .wrapping_sub(self.ring.write.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> ProducerSnapshot {
        let mask = self.ring.mask;
        let read = self.ring.read.load(Ordering::Acquire);
        ProducerSnapshot {
            read_shadow: self.read_shadow & mask,
            read: read & mask,
            write: self.ring.write.load(Ordering::Relaxed) & mask,
            write_priv: self.write_priv & mask,
            wspace: self
                .batch_limit()
                .saturating_sub(self.write_priv.wrapping_sub(read)),
        }
    }

    pub fn dump(&self, prefix: &str) {
        debug!(prefix, state = %self.snapshot(), "lamport producer");
    }
}

impl LamportConsumer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    #[inline]
    fn load(&mut self) -> usize {
        let value = self.ring.slot(self.read_priv).load(Ordering::Relaxed);
        self.read_priv = self.read_priv.wrapping_add(1);
        value
    }

    /// Plain dequeue: checks the live write cursor on every call.
    #[inline]
    pub fn read(&mut self) -> Result<usize, Empty> {
        self.write_shadow = self.ring.write.load(Ordering::Acquire);
        if self.read_priv == self.write_shadow {
            return Err(Empty);
        }
        let value = self.load();
        self.publish_read();
        Ok(value)
    }

    #[inline]
    fn has_item(&mut self) -> bool {
        if self.read_priv == self.write_shadow {
            self.write_shadow = self.ring.write.load(Ordering::Acquire);
            if self.read_priv == self.write_shadow {
                return false;
            }
        }
        true
    }

    /// Lazy dequeue: the write cursor is only reloaded once the shadow runs
    /// dry. Frees the slot immediately.
    #[inline]
    pub fn read_shadowed(&mut self) -> Result<usize, Empty> {
        if !self.has_item() {
            return Err(Empty);
        }
        let value = self.load();
        self.publish_read();
        Ok(value)
    }

    /// Items ready to read, refreshing the write shadow only if it shows
    /// fewer than `needed`.
    #[inline]
    pub fn reserve_read(&mut self, needed: usize) -> usize {
        let avail = self.write_shadow.wrapping_sub(self.read_priv);
        if avail >= needed {
            return avail;
        }
        self.write_shadow = self.ring.write.load(Ordering::Acquire);
        self.write_shadow.wrapping_sub(self.read_priv)
    }

    /// Reads without handing the slot back to the producer.
    #[inline]
    pub fn read_local(&mut self) -> Result<usize, Empty> {
        if !self.has_item() {
            return Err(Empty);
        }
        Ok(self.load())
    }

    /// Returns every slot read so far to the producer with one store.
    #[inline]
    pub fn publish_read(&mut self) {
        self.ring.read.store(self.read_priv, Ordering::Release);
    }

    pub fn snapshot(&self) -> ConsumerSnapshot {
        let mask = self.ring.mask;
        let write = self.ring.write.load(Ordering::Acquire);
        ConsumerSnapshot {
            write_shadow: self.write_shadow & mask,
            write: write & mask,
            read: self.ring.read.load(Ordering::Relaxed) & mask,
            read_priv: self.read_priv & mask,
            rspace: write.wrapping_sub(self.read_priv),
        }
    }

    pub fn dump(&self, prefix: &str) {
        debug!(prefix, state = %self.snapshot(), "lamport consumer");
    }
}

impl SpscSender for LamportProducer {
    #[inline]
    fn push(&mut self, value: usize) -> Result<(), PushError> {
        self.write(value)
    }

    #[inline]
    fn available(&self) -> bool {
        let read = self.ring.read.load(Ordering::Acquire);
        self.write_priv.wrapping_sub(read) < self.usable_capacity()
    }
}

impl SpscReceiver for LamportConsumer {
    #[inline]
    fn pop(&mut self) -> Result<usize, Empty> {
        self.read()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.read_priv == self.ring.write.load(Ordering::Acquire)
    }
}

/// Producer-side cursors, masked to slot indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerSnapshot {
    pub read_shadow: usize,
    pub read: usize,
    pub write: usize,
    pub write_priv: usize,
    pub wspace: usize,
}

impl fmt::Display for ProducerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rs {:4} r {:4}, w {:4} wp {:4} wspace {:4}",
            self.read_shadow, self.read, self.write, self.write_priv, self.wspace
        )
    }
}

/// Consumer-side cursors, masked to slot indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSnapshot {
    pub write_shadow: usize,
    pub write: usize,
    pub read: usize,
    pub read_priv: usize,
    pub rspace: usize,
}

impl fmt::Display for ConsumerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "r {:4} rp {:4} rspace {:4}, ws {:4} w {:4}",
            self.read, self.read_priv, self.rspace, self.write_shadow, self.write
        )
    }
}

impl fmt::Debug for LamportProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LamportProducer")
            .field("capacity", &self.capacity())
            .field("slack", &self.slack)
            .field("write_priv", &self.write_priv)
            .field("read_shadow", &self.read_shadow)
            .field("write", &self.ring.write.load(Ordering::Relaxed))
            .finish()
    }
}

impl fmt::Debug for LamportConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LamportConsumer")
            .field("capacity", &self.capacity())
            .field("read_priv", &self.read_priv)
            .field("write_shadow", &self.write_shadow)
            .field("read", &self.ring.read.load(Ordering::Relaxed))
            .finish()
    }
}
