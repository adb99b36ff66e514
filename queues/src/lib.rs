//! Lock-free single-producer/single-consumer queues for handing
//! pointer-sized words between two threads.
//!
//! Three families are provided:
//!
//! * [`lamport`]: index-based ring with a plain mode, a shadowed mode that
//!   caches the remote cursor, and a two-phase reserve/stage/publish API.
//! * [`ffq`]: FastForward ring, occupancy read straight from the slot.
//! * [`iffq`]: Improved FastForward ring with line-granular slack, staged
//!   inserts, deferred clearing and prefetching.
//!
//! Every constructor hands back a producer and a consumer handle. Neither is
//! `Clone`, so a ring can never gain a second producer or consumer.

pub mod config;
pub mod error;
pub mod spsc;
mod sync;

pub use config::{QueueConfig, CACHE_LINE_SIZE, SLOT_SIZE};
pub use error::{ConfigError, Empty, PushError};
pub use spsc::ffq::{FfqConsumer, FfqProducer};
pub use spsc::iffq::{IffqConsumer, IffqProducer};
pub use spsc::lamport::{LamportConsumer, LamportProducer};
pub use spsc::{ffq, iffq, lamport};

/// Common interface for the producing side of every spsc queue.
pub trait SpscSender: Send {
    /// Enqueue one value, visible to the consumer when this returns `Ok`.
    fn push(&mut self, value: usize) -> Result<(), PushError>;

    /// Whether a `push` would currently succeed.
    fn available(&self) -> bool;
}

/// Common interface for the consuming side of every spsc queue.
pub trait SpscReceiver: Send {
    /// Dequeue the oldest published value.
    fn pop(&mut self) -> Result<usize, Empty>;

    /// Whether a `pop` would currently fail.
    fn is_empty(&self) -> bool;
}
