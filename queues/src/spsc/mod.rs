pub mod ffq;
pub mod iffq;
pub mod lamport;

use crate::sync::AtomicUsize;

/// Allocates a ring of `entries` slots, every slot holding `fill`.
pub(crate) fn alloc_slots(entries: usize, fill: usize) -> Box<[AtomicUsize]> {
    (0..entries).map(|_| AtomicUsize::new(fill)).collect()
}

/// Hints the CPU to pull the line holding `addr` into L1. Never faults,
/// whatever `addr` points at.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
#[allow(unused_unsafe)]
pub(crate) fn prefetch_read<T>(addr: *const T) {
    use core::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
    unsafe { _mm_prefetch::<_MM_HINT_T0>(addr.cast::<i8>()) }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline(always)]
pub(crate) fn prefetch_read<T>(_addr: *const T) {}
