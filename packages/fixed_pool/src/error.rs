use std::alloc::Layout;

use thiserror::Error;

/// Errors that can occur when creating a [`FixedPool`][crate::FixedPool] or constructing
/// items in one.
///
/// Running out of vacant slots in [`acquire()`][crate::FixedPool::acquire] is not an error;
/// that method reports exhaustion as `None`. Only the convenience construction methods turn
/// exhaustion into [`Error::Exhausted`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The pool was configured with a capacity of zero slots, or no capacity at all.
    #[error("invalid pool configuration: capacity must be greater than zero")]
    ZeroCapacity,

    /// The backing region for the requested capacity would not fit in the address space.
    #[error(
        "invalid pool configuration: {capacity} slots of {slot_size} bytes exceed the maximum allocation size"
    )]
    CapacityOverflow {
        /// The requested number of slots.
        capacity: usize,

        /// The size of one slot in bytes.
        slot_size: usize,
    },

    /// The global allocator could not provide the backing region.
    #[error("out of memory: failed to allocate the backing region ({layout:?})")]
    OutOfMemory {
        /// The layout of the allocation that failed.
        layout: Layout,
    },

    /// Every slot in the pool is occupied.
    #[error("pool exhausted: all {capacity} slots are occupied")]
    Exhausted {
        /// The capacity of the exhausted pool.
        capacity: usize,
    },
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
