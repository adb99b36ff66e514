//! Queue geometry: entry count, cache-line size and the improved
//! FastForward slack, plus the sizing queries built on top of them.

use crate::error::ConfigError;
use tracing::warn;

/// Bytes in one ring slot. Every variant moves pointer-sized words.
pub const SLOT_SIZE: usize = core::mem::size_of::<usize>();

/// Default cache-line size assumed for slack accounting.
pub const CACHE_LINE_SIZE: usize = 64;

/// Storage sizes are rounded up to this unit (two lines, to keep the
/// adjacent-line prefetcher from pairing our lines with a neighbour's).
pub const ALIGN_SIZE: usize = 128;

/// Smallest accepted ring.
pub const MIN_ENTRIES: usize = 2;

#[inline]
pub const fn aligned_size(size: usize) -> usize {
    (size + ALIGN_SIZE - 1) & !(ALIGN_SIZE - 1)
}

/// Geometry shared by every queue family.
///
/// ```
/// use spscq::QueueConfig;
///
/// let cfg = QueueConfig::new(1024).line_size(128);
/// assert_eq!(cfg.line_entries(), 16);
/// assert!(cfg.validate_improved().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub entries: usize,
    pub line_size: usize,
    /// Lines the improved FastForward producer keeps empty ahead of itself.
    pub reserved_lines: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            entries: 1024,
            line_size: CACHE_LINE_SIZE,
            reserved_lines: 1,
        }
    }
}

impl QueueConfig {
    pub fn new(entries: usize) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn line_size(mut self, line_size: usize) -> Self {
        self.line_size = line_size;
        self
    }

    pub fn reserved_lines(mut self, reserved_lines: usize) -> Self {
        self.reserved_lines = reserved_lines;
        self
    }

    /// Slots per cache line. Only meaningful once the line size validated.
    #[inline]
    pub fn line_entries(&self) -> usize {
        self.line_size / SLOT_SIZE
    }

    /// Slots the shadowed and batched Lamport modes leave free between the
    /// producer and the consumer: one line, clamped so tiny rings stay usable.
    #[inline]
    pub fn lamport_slack(&self) -> usize {
        self.line_entries().min(self.entries / 2).max(1)
    }

    fn check_entries(&self) -> Result<(), ConfigError> {
        if !self.entries.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                what: "entries",
                value: self.entries,
            });
        }
        if self.entries < MIN_ENTRIES {
            return Err(ConfigError::CapacityTooSmall {
                capacity: self.entries,
                minimum: MIN_ENTRIES,
            });
        }
        Ok(())
    }

    fn check_line(&self) -> Result<(), ConfigError> {
        if !self.line_size.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                what: "line size",
                value: self.line_size,
            });
        }
        if self.line_size < SLOT_SIZE {
            return Err(ConfigError::LineSmallerThanSlot {
                line_size: self.line_size,
                slot_size: SLOT_SIZE,
            });
        }
        Ok(())
    }

    pub fn validate_lamport(&self) -> Result<(), ConfigError> {
        self.check_entries()
            .and_then(|_| self.check_line())
            .inspect_err(|err| warn!(%err, config = ?self, "rejected lamport queue configuration"))
    }

    /// Mirrors the FastForward `init` checks; `improved` adds the
    /// reserved-line requirement.
    pub fn validate_fast_forward(&self, improved: bool) -> Result<(), ConfigError> {
        let res = self.check_entries().and_then(|_| self.check_line());
        let res = match res {
            Ok(()) if improved => self.check_reserved(),
            other => other,
        };
        res.inspect_err(|err| {
            warn!(%err, config = ?self, improved, "rejected fastforward queue configuration")
        })
    }

    pub fn validate_improved(&self) -> Result<(), ConfigError> {
        self.validate_fast_forward(true)
    }

    fn check_reserved(&self) -> Result<(), ConfigError> {
        if self.reserved_lines == 0 {
            return Err(ConfigError::NoReservedLines);
        }
        // The reserved lines plus the initial drain window must leave at
        // least one line for payloads.
        let too_few = ConfigError::TooFewEntries {
            entries: self.entries,
            line_size: self.line_size,
            reserved_lines: self.reserved_lines,
        };
        let needed = self
            .reserved_lines
            .checked_add(1)
            .and_then(|lines| lines.checked_mul(self.line_size))
            .ok_or(too_few)?;
        match self.entries.checked_mul(SLOT_SIZE) {
            Some(bytes) if bytes > needed => Ok(()),
            _ => Err(too_few),
        }
    }

    /// Bytes needed for a queue whose control block is `control` bytes.
    #[inline]
    pub fn storage_size(&self, control: usize) -> usize {
        aligned_size(control + self.entries * SLOT_SIZE)
    }
}
