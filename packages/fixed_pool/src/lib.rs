#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A fixed-capacity object pool for items of a single type, with constant-time acquire and
//! release that never touch the global allocator after the pool is created.
//!
//! This crate provides [`FixedPool`], which allocates storage for a fixed number of items in one
//! contiguous block when it is created. Vacant slots are tracked with an intrusive free list that
//! is threaded through the vacant slots themselves, so there is no per-slot bookkeeping
//! structure next to the items.
//!
//! # Key Features
//!
//! - **Fixed capacity**: One allocation at creation, one deallocation at drop, nothing in between
//! - **Constant-time operations**: Acquire and release are a pop and a push on the free list
//! - **Stable addresses**: Items never move while they are in the pool
//! - **Thread-safe**: The pool can be shared between threads, guarded by a per-pool mutex
//! - **Exhaustion as a value**: A full pool is reported by [`FixedPool::acquire()`] as `None`
//! - **In-place construction**: [`FixedPool::construct()`] and [`FixedPool::construct_with()`]
//! - **Flexible drop policies**: Configure what happens when a pool is dropped with items in it
//!
//! The pool hands out pointers rather than references. Releasing an item is `unsafe` because the
//! pool does not track which pointers are still in use; it is the caller's responsibility to
//! release each item exactly once, to this pool, before the pool is dropped.
//!
//! # Example
//!
//! ```rust
//! use fixed_pool::FixedPool;
//!
//! let pool = FixedPool::<[u8; 16]>::new(3).unwrap();
//!
//! let a = pool.acquire().unwrap();
//! let b = pool.acquire().unwrap();
//! let c = pool.acquire().unwrap();
//!
//! // Every slot is in use, so there is nothing left to acquire.
//! assert!(pool.acquire().is_none());
//! assert!(pool.is_full());
//!
//! // SAFETY: The slot came from this pool and was never initialized.
//! unsafe { pool.deallocate(b) };
//! assert_eq!(pool.available(), 1);
//!
//! // The most recently vacated slot is handed out next.
//! let d = pool.acquire().unwrap();
//! assert_eq!(d, b);
//!
//! // SAFETY: The slots came from this pool and were never initialized.
//! unsafe {
//!     pool.deallocate(a);
//!     pool.deallocate(c);
//!     pool.deallocate(d);
//! }
//!
//! assert!(pool.is_empty());
//! ```
//!
//! # Logging
//!
//! The pool emits [`tracing`] events when it is created and dropped, when it runs out of vacant
//! slots and when it is dropped with items still in it. No subscriber is installed by this crate.

mod builder;
mod constants;
mod drop_policy;
mod error;
mod free_list;
mod pool;
mod region;
mod slot;

pub use builder::*;
pub use drop_policy::*;
pub use error::*;
pub(crate) use free_list::*;
pub use pool::FixedPool;
pub(crate) use region::*;
pub(crate) use slot::*;
