// FastForward queue: no shared cursors, every slot is its own full/empty
// flag. A slot holding `EMPTY` is free; anything else is a payload.
use super::alloc_slots;
use crate::config::{QueueConfig, SLOT_SIZE};
use crate::error::{ConfigError, Empty, PushError};
use crate::sync::{Arc, AtomicUsize, Ordering};
use crate::{SpscReceiver, SpscSender};
use crossbeam_utils::CachePadded;
use std::fmt;
use tracing::debug;

/// Sentinel marking a free slot. Never accepted as a payload.
pub const EMPTY: usize = 0;

// Slot array shared by the basic and the improved variant.
pub(crate) struct FfRing {
    slots: Box<[AtomicUsize]>,
    mask: usize,
}

impl FfRing {
    pub(crate) fn new(entries: usize) -> Self {
        Self {
            slots: alloc_slots(entries, EMPTY),
            mask: entries - 1,
        }
    }

    #[inline]
    pub(crate) fn slot(&self, cursor: usize) -> &AtomicUsize {
        // mask keeps the index in bounds
        unsafe { self.slots.get_unchecked(cursor & self.mask) }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    pub(crate) fn is_free(&self, cursor: usize) -> bool {
        self.slot(cursor).load(Ordering::Acquire) == EMPTY
    }
}

pub struct FfqProducer {
    ring: Arc<FfRing>,
    write: usize,
}

pub struct FfqConsumer {
    ring: Arc<FfRing>,
    read: usize,
}

pub fn channel(entries: usize) -> Result<(FfqProducer, FfqConsumer), ConfigError> {
    with_config(&QueueConfig::new(entries))
}

pub fn with_config(config: &QueueConfig) -> Result<(FfqProducer, FfqConsumer), ConfigError> {
    config.validate_fast_forward(false)?;
    let ring = Arc::new(FfRing::new(config.entries));
    debug!(capacity = config.entries, "ffq initialised");
    Ok((
        FfqProducer {
            ring: ring.clone(),
            write: 0,
        },
        FfqConsumer { ring, read: 0 },
    ))
}

/// Bytes needed by a FastForward-family queue. `improved` adds the
/// producer's one-line staging buffer.
pub fn storage_size(config: &QueueConfig, improved: bool) -> Result<usize, ConfigError> {
    config.validate_fast_forward(improved)?;
    // slot array handle plus one padded line of cursors per side
    let mut control =
        std::mem::size_of::<FfRing>() + 2 * std::mem::size_of::<CachePadded<[usize; 3]>>();
    if improved {
        control += config.line_entries() * SLOT_SIZE;
    }
    Ok(config.storage_size(control))
}

impl FfqProducer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Fails with `Full` when the next slot still holds an unread value.
    #[inline]
    pub fn write(&mut self, value: usize) -> Result<(), PushError> {
        if value == EMPTY {
            return Err(PushError::Reserved);
        }
        let slot = self.ring.slot(self.write);
        if slot.load(Ordering::Acquire) != EMPTY {
            return Err(PushError::Full(value));
        }
        slot.store(value, Ordering::Release);
        self.write = self.write.wrapping_add(1);
        Ok(())
    }

    pub fn dump(&self, prefix: &str) {
        debug!(prefix, pw = self.write & self.ring.mask, "ffq producer");
    }
}

impl FfqConsumer {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    /// Takes the next value and frees its slot in the same call.
    #[inline]
    pub fn read(&mut self) -> Result<usize, Empty> {
        let slot = self.ring.slot(self.read);
        let value = slot.load(Ordering::Acquire);
        if value == EMPTY {
            return Err(Empty);
        }
        slot.store(EMPTY, Ordering::Release);
        self.read = self.read.wrapping_add(1);
        Ok(value)
    }

    pub fn dump(&self, prefix: &str) {
        debug!(prefix, cr = self.read & self.ring.mask, "ffq consumer");
    }
}

impl SpscSender for FfqProducer {
    #[inline]
    fn push(&mut self, value: usize) -> Result<(), PushError> {
        self.write(value)
    }

    #[inline]
    fn available(&self) -> bool {
        self.ring.is_free(self.write)
    }
}

impl SpscReceiver for FfqConsumer {
    #[inline]
    fn pop(&mut self) -> Result<usize, Empty> {
        self.read()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.ring.is_free(self.read)
    }
}

impl fmt::Debug for FfqProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfqProducer")
            .field("capacity", &self.capacity())
            .field("write", &self.write)
            .finish()
    }
}

impl fmt::Debug for FfqConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfqConsumer")
            .field("capacity", &self.capacity())
            .field("read", &self.read)
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn every_slot_is_usable() {
        let (mut tx, mut rx) = channel(8).unwrap();
        for v in 1..=8 {
            tx.write(v).unwrap();
        }
        assert_eq!(tx.write(9), Err(PushError::Full(9)));
        assert_eq!(rx.read(), Ok(1));
        tx.write(9).unwrap();
        for v in 2..=9 {
            assert_eq!(rx.read(), Ok(v));
        }
        assert_eq!(rx.read(), Err(Empty));
    }

    #[test]
    fn sentinel_is_rejected() {
        let (mut tx, mut rx) = channel(4).unwrap();
        assert_eq!(tx.write(EMPTY), Err(PushError::Reserved));
        assert!(rx.is_empty());
        assert_eq!(rx.read(), Err(Empty));
    }

    #[test]
    fn storage_grows_with_staging() {
        let cfg = QueueConfig::new(1024);
        let basic = storage_size(&cfg, false).unwrap();
        let improved = storage_size(&cfg, true).unwrap();
        assert!(basic >= 1024 * SLOT_SIZE);
        assert!(improved >= basic);
        assert!(storage_size(&QueueConfig::new(16), true).is_err());
    }
}
