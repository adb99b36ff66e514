use thiserror::Error;

/// Rejected queue geometry. Returned only at construction; no queue is built.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{what} must be a power of two, got {value}")]
    NotPowerOfTwo { what: &'static str, value: usize },

    #[error("capacity {capacity} is below the minimum of {minimum}")]
    CapacityTooSmall { capacity: usize, minimum: usize },

    #[error("line size {line_size} is smaller than one slot ({slot_size} bytes)")]
    LineSmallerThanSlot { line_size: usize, slot_size: usize },

    #[error(
        "{entries} entries leave no room for {reserved_lines} reserved line(s) plus the drain \
         window with {line_size}-byte lines"
    )]
    TooFewEntries {
        entries: usize,
        line_size: usize,
        reserved_lines: usize,
    },

    #[error("at least one reserved line is required")]
    NoReservedLines,
}

/// Outcome of a rejected enqueue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    /// No free slot from the producer's point of view. Carries the value back.
    #[error("queue is full")]
    Full(usize),

    /// The value collides with the empty-slot sentinel of the FastForward family.
    #[error("value 0 is reserved as the empty-slot sentinel")]
    Reserved,
}

impl PushError {
    /// The value the caller tried to enqueue.
    pub fn into_inner(self) -> usize {
        match self {
            PushError::Full(value) => value,
            PushError::Reserved => 0,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PushError::Full(_))
    }
}

/// Nothing to read.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Default)]
#[error("queue is empty")]
pub struct Empty;
