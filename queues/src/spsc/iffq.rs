//! Improved FastForward queue.
//!
//! Same slot protocol as [`ffq`](super::ffq), with four changes:
//!
//! * the producer keeps `reserved_lines` cache lines of free slots between
//!   itself and the consumer's uncleared region, checked once per line
//!   through a "check" cursor, so producer stores and consumer clears
//!   never hit the same line;
//! * values can be staged in a one-line side buffer and flushed together;
//! * [`IffqConsumer::extract`] leaves consumed slots dirty and
//!   [`IffqConsumer::clear`] resets them a line at a time, one line behind
//!   the read cursor;
//! * the consumer can prefetch the next slot or the memory its payload
//!   points at.
//!
//! Usable capacity is `entries - (reserved_lines + 1) * line_entries`.
use super::ffq::{FfRing, EMPTY};
use super::prefetch_read;
use crate::config::QueueConfig;
use crate::error::{ConfigError, Empty, PushError};
use crate::sync::{Arc, Ordering};
use crate::{SpscReceiver, SpscSender};
use std::fmt;
use tracing::debug;

// Fills the drain window at start-up so the producer never reads it as free.
const GARBAGE: usize = 1;

pub struct IffqProducer {
    ring: Arc<FfRing>,
    write: usize,
    check: usize,
    line_entries: usize,
    lookahead: usize,
    staged: Box<[usize]>,
    staged_len: usize,
}

pub struct IffqConsumer {
    ring: Arc<FfRing>,
    read: usize,
    clear: usize,
    line_entries: usize,
    line_mask: usize,
}

pub fn channel(entries: usize) -> Result<(IffqProducer, IffqConsumer), ConfigError> {
    with_config(&QueueConfig::new(entries))
}

pub fn with_config(config: &QueueConfig) -> Result<(IffqProducer, IffqConsumer), ConfigError> {
    config.validate_improved()?;

    let line = config.line_entries();
    let ring = FfRing::new(config.entries);
    for i in 0..line {
        ring.slot(i).store(GARBAGE, Ordering::Relaxed);
    }
    let ring = Arc::new(ring);
    debug!(
        capacity = config.entries,
        line_entries = line,
        reserved_lines = config.reserved_lines,
        usable = config.entries - (config.reserved_lines + 1) * line,
        "iffq initialised"
    );

    let producer = IffqProducer {
        ring: ring.clone(),
        write: line,
        check: line,
        line_entries: line,
        lookahead: config.reserved_lines * line,
        staged: vec![EMPTY; line].into_boxed_slice(),
        staged_len: 0,
    };
    let consumer = IffqConsumer {
        ring,
        read: line,
        clear: 0,
        line_entries: line,
        line_mask: !(line - 1),
    };
    Ok((producer, consumer))
}

impl IffqProducer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    #[inline]
    pub fn line_entries(&self) -> usize {
        self.line_entries
    }

    // Moves the check point one line forward if the slot `lookahead` past
    // it has been cleared.
    #[inline]
    fn advance_check(&mut self) -> bool {
        if !self.ring.is_free(self.check.wrapping_add(self.lookahead)) {
            return false;
        }
        self.check = self.check.wrapping_add(self.line_entries);
        true
    }

    #[inline]
    pub fn insert(&mut self, value: usize) -> Result<(), PushError> {
        if value == EMPTY {
            return Err(PushError::Reserved);
        }
        if self.staged_len > 0 {
            self.insert_publish();
        }
        if self.write == self.check && !self.advance_check() {
            return Err(PushError::Full(value));
        }
        self.ring.slot(self.write).store(value, Ordering::Release);
        self.write = self.write.wrapping_add(1);
        Ok(())
    }

    /// Free slots before the check point. Advances the check point by at
    /// most one line when fewer than `needed` are left.
    #[inline]
    pub fn wspace(&mut self, needed: usize) -> usize {
        let space = self.check.wrapping_sub(self.write);
        if space >= needed || !self.advance_check() {
            return space;
        }
        self.check.wrapping_sub(self.write)
    }

    /// Stages a value in the side buffer. Fails with `Full` when the buffer
    /// holds a line's worth or the ring has no room for one more.
    #[inline]
    pub fn insert_local(&mut self, value: usize) -> Result<(), PushError> {
        if value == EMPTY {
            return Err(PushError::Reserved);
        }
        let want = self.staged_len + 1;
        if want > self.staged.len() || self.wspace(want) < want {
            return Err(PushError::Full(value));
        }
        self.staged[self.staged_len] = value;
        self.staged_len = want;
        Ok(())
    }

    /// Writes every staged value into the ring. Returns how many.
    #[inline]
    pub fn insert_publish(&mut self) -> usize {
        let n = self.staged_len;
        for &value in &self.staged[..n] {
            self.ring.slot(self.write).store(value, Ordering::Release);
            self.write = self.write.wrapping_add(1);
        }
        self.staged_len = 0;
        n
    }

    #[inline]
    pub fn staged(&self) -> usize {
        self.staged_len
    }

    pub fn snapshot(&self) -> IffqProducerSnapshot {
        IffqProducerSnapshot {
            write: self.write,
            check: self.check,
            staged: self.staged_len,
        }
    }

    pub fn dump(&self, prefix: &str) {
        debug!(prefix, state = %self.snapshot(), "iffq producer");
    }
}

impl IffqConsumer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Takes the next value without freeing its slot; see [`clear`](Self::clear).
    #[inline]
    pub fn extract(&mut self) -> Result<usize, Empty> {
        let value = self.ring.slot(self.read).load(Ordering::Acquire);
        if value == EMPTY {
            return Err(Empty);
        }
        self.read = self.read.wrapping_add(1);
        Ok(value)
    }

    /// Frees consumed slots up to the start of the line before the one
    /// being read. Returns how many slots were reset.
    #[inline]
    pub fn clear(&mut self) -> usize {
        let target = self.read.wrapping_sub(self.line_entries) & self.line_mask;
        let mut cleared = 0;
        while self.clear != target {
            self.ring.slot(self.clear).store(EMPTY, Ordering::Release);
            self.clear = self.clear.wrapping_add(1);
            cleared += 1;
        }
        cleared
    }

    /// Prefetches the slot the next `extract` will load.
    #[inline]
    pub fn prefetch(&self) {
        prefetch_read(self.ring.slot(self.read) as *const _);
    }

    /// Prefetches the memory the next payload points at, if there is one.
    #[inline]
    pub fn prefetch_payload(&self) {
        let value = self.ring.slot(self.read).load(Ordering::Relaxed);
        if value != EMPTY {
            prefetch_read(value as *const u8);
        }
    }

    pub fn snapshot(&self) -> IffqConsumerSnapshot {
        IffqConsumerSnapshot {
            clear: self.clear,
            read: self.read,
        }
    }

    pub fn dump(&self, prefix: &str) {
        debug!(prefix, state = %self.snapshot(), "iffq consumer");
    }
}

impl SpscSender for IffqProducer {
    #[inline]
    fn push(&mut self, value: usize) -> Result<(), PushError> {
        self.insert(value)
    }

    #[inline]
    fn available(&self) -> bool {
        // staged values are flushed ahead of the pushed one
        self.staged_len < self.check.wrapping_sub(self.write)
            || self.ring.is_free(self.check.wrapping_add(self.lookahead))
    }
}

impl SpscReceiver for IffqConsumer {
    #[inline]
    fn pop(&mut self) -> Result<usize, Empty> {
        let value = self.extract()?;
        self.clear();
        Ok(value)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.ring.is_free(self.read)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IffqProducerSnapshot {
    pub write: usize,
    pub check: usize,
    pub staged: usize,
}

impl fmt::Display for IffqProducerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pw {}, pc {}, staged {}", self.write, self.check, self.staged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IffqConsumerSnapshot {
    pub clear: usize,
    pub read: usize,
}

impl fmt::Display for IffqConsumerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cc {}, cr {}", self.clear, self.read)
    }
}

impl fmt::Debug for IffqProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IffqProducer")
            .field("capacity", &self.capacity())
            .field("line_entries", &self.line_entries)
            .field("lookahead", &self.lookahead)
            .field("write", &self.write)
            .field("check", &self.check)
            .field("staged", &self.staged_len)
            .finish()
    }
}

impl fmt::Debug for IffqConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IffqConsumer")
            .field("capacity", &self.capacity())
            .field("line_entries", &self.line_entries)
            .field("read", &self.read)
            .field("clear", &self.clear)
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn starts_one_line_in() {
        let (tx, rx) = channel(64).unwrap();
        assert_eq!(
            tx.snapshot(),
            IffqProducerSnapshot {
                write: 8,
                check: 8,
                staged: 0
            }
        );
        assert_eq!(rx.snapshot().to_string(), "cc 0, cr 8");
        assert!(rx.is_empty());
    }

    #[test]
    fn check_point_moves_a_line_at_a_time() {
        let (mut tx, _rx) = channel(64).unwrap();
        tx.insert(1).unwrap();
        assert_eq!(tx.snapshot().check, 16);
        for v in 2..=8 {
            tx.insert(v).unwrap();
        }
        assert_eq!(tx.snapshot().check, 16);
        tx.insert(9).unwrap();
        assert_eq!(tx.snapshot().check, 24);
    }

    #[test]
    fn clear_lags_one_line_behind() {
        let (mut tx, mut rx) = channel(64).unwrap();
        for v in 1..=20 {
            tx.insert(v).unwrap();
        }
        for v in 1..=8 {
            assert_eq!(rx.extract(), Ok(v));
        }
        // read sits at 16: only the start-up line is behind the line before it
        assert_eq!(rx.clear(), 8);
        assert_eq!(rx.clear(), 0);
        for v in 9..=12 {
            assert_eq!(rx.extract(), Ok(v));
        }
        assert_eq!(rx.clear(), 0);
        for v in 13..=16 {
            assert_eq!(rx.extract(), Ok(v));
        }
        assert_eq!(rx.clear(), 8);
        assert_eq!(rx.snapshot(), IffqConsumerSnapshot { clear: 16, read: 24 });
    }

    #[test]
    fn staging_is_capped_at_one_line() {
        let (mut tx, mut rx) = channel(64).unwrap();
        for v in 1..=8 {
            tx.insert_local(v).unwrap();
        }
        assert_eq!(tx.insert_local(9), Err(PushError::Full(9)));
        assert!(rx.is_empty());
        assert_eq!(tx.insert_publish(), 8);
        for v in 1..=8 {
            assert_eq!(rx.pop(), Ok(v));
        }
    }

    #[test]
    fn prefetch_is_harmless() {
        let (mut tx, rx) = channel(32).unwrap();
        rx.prefetch();
        rx.prefetch_payload();
        tx.insert(0xdead_beef).unwrap();
        rx.prefetch();
        rx.prefetch_payload();
    }
}
