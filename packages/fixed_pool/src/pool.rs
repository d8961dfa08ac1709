use std::alloc::Layout;
use std::any::type_name;
use std::fmt;
use std::mem::MaybeUninit;
use std::num::NonZero;
use std::ptr::{self, NonNull};
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use scopeguard::ScopeGuard;
use tracing::{debug, trace, warn};

use crate::constants::ERR_POISONED_LOCK;
use crate::{BackingRegion, DropPolicy, Error, FixedPoolBuilder, FreeList, Result, Slot};

/// Global counter for generating unique pool IDs.
static POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a unique pool ID.
fn generate_pool_id() -> u64 {
    POOL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A fixed-capacity pool of slots for items of type `T`, shareable between threads.
///
/// All storage is allocated up front, as one contiguous region of [`capacity()`][1] slots.
/// Acquiring and releasing a slot never calls into the global allocator: vacant slots are
/// kept in an intrusive free list that is threaded through the vacant slots themselves, so
/// both operations are a constant-time pop or push under a short-lived lock.
///
/// There are two ways to use the pool:
///
/// * [`construct()`][2] and [`construct_with()`][3] place a value in a vacant slot and return
///   a pointer to it, with [`release()`][4] dropping the value and vacating the slot again.
/// * [`acquire()`][5] hands out raw uninitialized storage, leaving initialization to the
///   caller. Such a slot is returned with [`release()`][4] once it holds a value, or with
///   [`deallocate()`][6] if it does not.
///
/// A full pool is a normal condition: [`acquire()`][5] returns `None` and the construction
/// methods return [`Error::Exhausted`]. The pool never grows.
///
/// # Out of band access
///
/// The pool hands out pointers, not references, and never creates references to the items it
/// stores. Callers own the contents of an occupied slot and are free to create references to
/// it from unsafe code, for as long as the slot stays occupied and the pool stays alive.
///
/// # Caller obligations
///
/// For minimal overhead, the pool does not tag slots with ownership information. Releasing a
/// pointer that did not come from this pool, releasing the same slot twice or using a pointer
/// after the pool is dropped is undefined behavior. Debug builds verify released pointers and
/// the structure of the free list to catch such mistakes early.
///
/// Dropping the pool does not drop items still stored in it; see [`DropPolicy`].
///
/// # Thread safety
///
/// The pool is thread-safe ([`Send`] and [`Sync`]) if `T` is [`Send`]. Every operation that
/// touches the free list takes a per-pool mutex; item constructors and destructors run outside
/// of it.
///
/// # Example
///
/// ```rust
/// use fixed_pool::FixedPool;
///
/// let pool = FixedPool::<String>::new(2).unwrap();
///
/// let greeting = pool.construct("hello".to_string()).unwrap();
///
/// // SAFETY: The item was constructed by this pool and has not been released.
/// assert_eq!(unsafe { greeting.as_ref() }, "hello");
/// assert_eq!(pool.available(), 1);
///
/// // SAFETY: The item came from this pool and is released exactly once.
/// unsafe { pool.release(greeting.as_ptr()) };
/// assert!(pool.is_empty());
/// ```
///
/// [1]: Self::capacity
/// [2]: Self::construct
/// [3]: Self::construct_with
/// [4]: Self::release
/// [5]: Self::acquire
/// [6]: Self::deallocate
pub struct FixedPool<T> {
    /// Identifies the pool in log events and debug output.
    pool_id: u64,

    region: BackingRegion<T>,

    /// The free list is the only mutable state of the pool. Holding the lock across the whole
    /// pop or push keeps the list and its counter consistent with each other.
    free_list: Mutex<FreeList<T>>,

    drop_policy: DropPolicy,
}

impl<T> FixedPool<T> {
    /// Creates a new pool with `capacity` slots and the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroCapacity`] if `capacity` is zero, [`Error::CapacityOverflow`] if the
    /// backing region would not fit in the address space and [`Error::OutOfMemory`] if the
    /// backing region cannot be allocated.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fixed_pool::FixedPool;
    ///
    /// let pool = FixedPool::<[u8; 16]>::new(3).unwrap();
    ///
    /// assert_eq!(pool.capacity(), 3);
    /// assert_eq!(pool.available(), 3);
    /// assert!(pool.is_empty());
    /// ```
    pub fn new(capacity: usize) -> Result<Self> {
        Self::builder().capacity(capacity).build()
    }

    /// Starts building a new [`FixedPool`].
    ///
    /// Use this when you want to customize the pool configuration beyond the capacity.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fixed_pool::{DropPolicy, FixedPool};
    ///
    /// let pool = FixedPool::<u32>::builder()
    ///     .capacity(10)
    ///     .drop_policy(DropPolicy::MustNotLeakItems)
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn builder() -> FixedPoolBuilder<T> {
        FixedPoolBuilder::new()
    }

    pub(crate) fn new_inner(capacity: usize, drop_policy: DropPolicy) -> Result<Self> {
        let capacity = NonZero::new(capacity).ok_or(Error::ZeroCapacity)?;

        let region = BackingRegion::new(capacity)?;

        // SAFETY: The region was just allocated, so none of its slots are in use. The list is
        // stored next to the region in the pool and never outlives it.
        let free_list = unsafe { FreeList::thread(&region) };

        let pool_id = generate_pool_id();

        debug!(
            pool_id,
            capacity = capacity.get(),
            slot_size = size_of::<Slot<T>>(),
            item_type = type_name::<T>(),
            "created pool"
        );

        Ok(Self {
            pool_id,
            region,
            free_list: Mutex::new(free_list),
            drop_policy,
        })
    }

    /// Takes a vacant slot and returns its storage, or returns `None` if every slot is occupied.
    ///
    /// The storage is uninitialized and properly aligned for `T`. The most recently vacated slot
    /// is handed out first.
    ///
    /// Once the caller has written a value into the storage, the slot can be returned with
    /// [`release()`][1]. A slot that never received a value must be returned with
    /// [`deallocate()`][2] instead.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fixed_pool::FixedPool;
    ///
    /// let pool = FixedPool::<u64>::new(1).unwrap();
    ///
    /// let mut storage = pool.acquire().unwrap();
    /// assert!(pool.acquire().is_none());
    ///
    /// // SAFETY: We own the storage until we give it back to the pool.
    /// unsafe { storage.as_mut().write(42) };
    ///
    /// // SAFETY: The slot came from this pool and now holds a value.
    /// unsafe { pool.release(storage.cast::<u64>().as_ptr()) };
    /// assert_eq!(pool.available(), 1);
    /// ```
    ///
    /// [1]: Self::release
    /// [2]: Self::deallocate
    #[must_use]
    pub fn acquire(&self) -> Option<NonNull<MaybeUninit<T>>> {
        let slot = {
            let mut free_list = self.free_list.lock().expect(ERR_POISONED_LOCK);
            let slot = free_list.pop();

            #[cfg(debug_assertions)]
            free_list.integrity_check(&self.region);

            slot
        };

        let Some(slot) = slot else {
            trace!(pool_id = self.pool_id, "pool exhausted");
            return None;
        };

        Some(Slot::item_ptr(slot))
    }

    /// Moves a value into a vacant slot and returns a pointer to it.
    ///
    /// The item stays in place until it is [released][1]. If the pool has no vacant slot,
    /// the value is dropped and an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] if every slot is occupied.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fixed_pool::{Error, FixedPool};
    ///
    /// let pool = FixedPool::<u32>::new(1).unwrap();
    ///
    /// let item = pool.construct(7).unwrap();
    /// assert!(matches!(pool.construct(8), Err(Error::Exhausted { capacity: 1 })));
    ///
    /// // SAFETY: The item came from this pool and is released exactly once.
    /// unsafe { pool.release(item.as_ptr()) };
    /// ```
    ///
    /// [1]: Self::release
    pub fn construct(&self, value: T) -> Result<NonNull<T>> {
        self.construct_with(|| value)
    }

    /// Creates a value in a vacant slot and returns a pointer to it.
    ///
    /// The closure is only called once a slot has been obtained, so no value is created if
    /// the pool is full. If the closure panics, the slot is vacated again before the panic
    /// propagates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Exhausted`] if every slot is occupied.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fixed_pool::FixedPool;
    ///
    /// let pool = FixedPool::<Vec<u8>>::new(4).unwrap();
    ///
    /// let buffer = pool.construct_with(|| Vec::with_capacity(1024)).unwrap();
    ///
    /// // SAFETY: The item was constructed by this pool and has not been released.
    /// assert!(unsafe { buffer.as_ref() }.capacity() >= 1024);
    ///
    /// // SAFETY: The item came from this pool and is released exactly once.
    /// unsafe { pool.release(buffer.as_ptr()) };
    /// ```
    pub fn construct_with(&self, f: impl FnOnce() -> T) -> Result<NonNull<T>> {
        let storage = self.acquire().ok_or_else(|| Error::Exhausted {
            capacity: self.capacity(),
        })?;

        let storage = scopeguard::guard(storage, |storage| {
            // SAFETY: The slot was acquired from this pool above and is still uninitialized
            // because the constructor did not return.
            unsafe {
                self.deallocate(storage);
            }
        });

        let value = f();

        let mut storage = ScopeGuard::into_inner(storage);

        // SAFETY: We own the slot exclusively until we hand out the pointer below.
        unsafe { storage.as_mut() }.write(value);

        Ok(storage.cast())
    }

    /// Drops the item at `ptr` and vacates its slot.
    ///
    /// The slot becomes the next one handed out by the pool. Releasing a null pointer
    /// does nothing.
    ///
    /// If the destructor of the item panics, the slot is still vacated before the panic
    /// propagates.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `ptr` is null or that:
    ///
    /// * it was returned by [`construct()`][1], [`construct_with()`][2] or
    ///   [`acquire()`][3] of this pool and its slot has not been vacated since;
    /// * it points to an initialized `T`;
    /// * nobody accesses the item after this call.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the pointer is not the start of a slot of this pool or if
    /// the slot is already vacant.
    ///
    /// [1]: Self::construct
    /// [2]: Self::construct_with
    /// [3]: Self::acquire
    pub unsafe fn release(&self, ptr: *mut T) {
        let Some(item) = NonNull::new(ptr) else {
            return;
        };

        // Checked before anything is dropped, so a foreign pointer is reported without
        // running its destructor or panicking again while unwinding.
        debug_assert!(
            self.contains(item.as_ptr()),
            "{item:?} is not a slot of pool {} of {}",
            self.pool_id,
            type_name::<T>()
        );

        #[cfg(debug_assertions)]
        self.assert_occupied(Slot::from_item_ptr(item.cast()));

        let _vacate_slot = scopeguard::guard(item.cast::<MaybeUninit<T>>(), |storage| {
            // SAFETY: The caller guarantees the slot is an occupied slot of this pool. The item
            // has been dropped by the time this runs, whether or not its destructor panicked.
            unsafe {
                self.deallocate(storage);
            }
        });

        // SAFETY: Forwarding guarantees from the caller.
        unsafe {
            self.destroy(item.as_ptr());
        }
    }

    /// Vacates the slot at `ptr` without dropping anything stored in it.
    ///
    /// This is how storage from [`acquire()`][1] is returned when it was never initialized.
    /// It is also useful together with [`destroy()`][2] for callers that manage the lifetime
    /// of items themselves.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `ptr` was returned by [`acquire()`][1],
    /// [`construct()`][3] or [`construct_with()`][4] of this pool, that its slot has not been
    /// vacated since and that nobody accesses the storage after this call.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the pointer is not the start of a slot of this pool or if
    /// the slot is already vacant.
    ///
    /// [1]: Self::acquire
    /// [2]: Self::destroy
    /// [3]: Self::construct
    /// [4]: Self::construct_with
    pub unsafe fn deallocate(&self, ptr: NonNull<MaybeUninit<T>>) {
        let slot = Slot::from_item_ptr(ptr);

        debug_assert!(
            self.region.contains(slot),
            "{ptr:?} is not a slot of pool {} of {}",
            self.pool_id,
            type_name::<T>()
        );

        #[cfg(debug_assertions)]
        self.assert_occupied(slot);

        let mut free_list = self.free_list.lock().expect(ERR_POISONED_LOCK);

        // SAFETY: The caller guarantees the slot is an occupied slot of this pool that nobody
        // accesses anymore, which is exactly what the free list requires.
        unsafe {
            free_list.push(slot);
        }

        #[cfg(debug_assertions)]
        free_list.integrity_check(&self.region);
    }

    /// Drops the item at `ptr` in place, leaving its slot occupied.
    ///
    /// The storage may be reused for a new value or returned with [`deallocate()`][1].
    /// Destroying a null pointer does nothing.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `ptr` is null or points to an initialized `T` in an
    /// occupied slot of this pool, and that the item is not accessed again as an initialized
    /// value after this call.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if the pointer is not the start of a slot of this pool.
    ///
    /// [1]: Self::deallocate
    pub unsafe fn destroy(&self, ptr: *mut T) {
        let Some(item) = NonNull::new(ptr) else {
            return;
        };

        debug_assert!(
            self.contains(item.as_ptr()),
            "{item:?} is not a slot of pool {} of {}",
            self.pool_id,
            type_name::<T>()
        );

        // SAFETY: The caller guarantees the pointer refers to an initialized `T` that is not
        // used after this point.
        unsafe {
            ptr::drop_in_place(item.as_ptr());
        }
    }

    /// Panics if the slot is already on the free list, i.e. it is being released twice.
    ///
    /// The lock is released before panicking, as the list itself is still intact.
    #[cfg(debug_assertions)]
    fn assert_occupied(&self, slot: NonNull<Slot<T>>) {
        let already_vacant = self
            .free_list
            .lock()
            .expect(ERR_POISONED_LOCK)
            .contains(slot);

        assert!(
            !already_vacant,
            "{slot:?} was released twice to pool {} of {}",
            self.pool_id,
            type_name::<T>()
        );
    }

    /// The number of slots in the pool. This never changes.
    ///
    /// Unlike the other introspection methods, this does not take the pool lock.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.region.capacity().get()
    }

    /// The number of vacant slots, i.e. how many more items fit in the pool right now.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fixed_pool::FixedPool;
    ///
    /// let pool = FixedPool::<u8>::new(2).unwrap();
    /// let item = pool.construct(1).unwrap();
    ///
    /// assert_eq!(pool.available(), 1);
    ///
    /// // SAFETY: The item came from this pool and is released exactly once.
    /// unsafe { pool.release(item.as_ptr()) };
    /// assert_eq!(pool.available(), 2);
    /// ```
    #[must_use]
    pub fn available(&self) -> usize {
        self.free_list.lock().expect(ERR_POISONED_LOCK).available()
    }

    /// The number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        let available = self.available();

        // Cannot underflow because the free list never holds more slots than the region.
        self.capacity().wrapping_sub(available)
    }

    /// Whether every slot is occupied, in which case [`acquire()`][1] returns `None`.
    ///
    /// [1]: Self::acquire
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.available() == 0
    }

    /// Whether every slot is vacant.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.available() == self.capacity()
    }

    /// Whether `ptr` is the start of a slot of this pool, regardless of whether the slot
    /// is occupied.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fixed_pool::FixedPool;
    ///
    /// let pool = FixedPool::<u32>::new(1).unwrap();
    /// let item = pool.construct(5).unwrap();
    ///
    /// assert!(pool.contains(item.as_ptr()));
    /// assert!(!pool.contains(&5));
    ///
    /// // SAFETY: The item came from this pool and is released exactly once.
    /// unsafe { pool.release(item.as_ptr()) };
    /// ```
    #[must_use]
    pub fn contains(&self, ptr: *const T) -> bool {
        NonNull::new(ptr.cast_mut())
            .is_some_and(|item| self.region.contains(Slot::from_item_ptr(item.cast())))
    }

    /// The memory layout of one slot. The backing region is an array of `capacity()` slots.
    ///
    /// The slot is large enough for either a `T` or a pointer and aligned for both.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fixed_pool::FixedPool;
    ///
    /// let layout = FixedPool::<u8>::slot_layout();
    ///
    /// assert_eq!(layout.size(), size_of::<usize>());
    /// ```
    #[must_use]
    pub fn slot_layout() -> Layout {
        Layout::new::<Slot<T>>()
    }

    /// The [drop policy][DropPolicy] the pool was built with.
    #[must_use]
    pub fn drop_policy(&self) -> DropPolicy {
        self.drop_policy
    }
}

impl<T> Drop for FixedPool<T> {
    fn drop(&mut self) {
        // Only a failed debug check can poison the lock. The counter is still readable and
        // this may run while that panic unwinds.
        let available = self
            .free_list
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .available();

        // Cannot underflow because the free list never holds more slots than the region.
        let occupied = self.capacity().wrapping_sub(available);

        debug!(pool_id = self.pool_id, occupied, "dropping pool");

        if occupied == 0 {
            return;
        }

        match self.drop_policy {
            DropPolicy::MayLeakItems => {
                warn!(
                    pool_id = self.pool_id,
                    occupied,
                    item_type = type_name::<T>(),
                    "dropped a pool with occupied slots, their items are leaked"
                );
            }
            DropPolicy::MustNotLeakItems => {
                // If we are already panicking, we do not want to panic again because that will
                // simply obscure whatever the original panic was, leading to debug difficulties.
                // The region is still freed, as the fields are dropped during unwinding.
                if !thread::panicking() {
                    panic!(
                        "dropped pool {} of {} with {occupied} occupied slots and a policy that says it must be empty when dropped",
                        self.pool_id,
                        type_name::<T>()
                    );
                }
            }
        }
    }
}

impl<T> fmt::Debug for FixedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedPool")
            .field("item_type", &std::format_args!("{}", type_name::<T>()))
            .field("pool_id", &self.pool_id)
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("drop_policy", &self.drop_policy)
            .finish_non_exhaustive()
    }
}

// SAFETY: The pool owns its region exclusively and only accesses items to drop them, so it can
// move between threads as long as the items it may drop can.
unsafe impl<T: Send> Send for FixedPool<T> {}

// SAFETY: All shared mutable state is behind the mutex. Through a shared reference the pool
// only ever drops items, on whichever thread calls `release()`, which `T: Send` permits.
unsafe impl<T: Send> Sync for FixedPool<T> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "keep tests concise and easy to read"
)]
mod tests {
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(FixedPool<u64>: Send, Sync, fmt::Debug);
    assert_impl_all!(FixedPool<String>: Send, Sync);
    assert_not_impl_any!(FixedPool<Rc<u64>>: Send, Sync);

    struct DropCounter {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[repr(align(128))]
    struct OverAligned {
        value: u8,
    }

    #[test]
    fn smoke_test() {
        let pool = FixedPool::<u32>::new(3).unwrap();

        let a = pool.construct(42).unwrap();
        let b = pool.construct(43).unwrap();
        let c = pool.construct(44).unwrap();

        unsafe {
            assert_eq!(*a.as_ref(), 42);
            assert_eq!(*b.as_ref(), 43);
            assert_eq!(*c.as_ref(), 44);
        }

        assert_eq!(pool.len(), 3);
        assert!(pool.is_full());

        unsafe { pool.release(b.as_ptr()) };

        assert_eq!(pool.len(), 2);

        let d = pool.construct(45).unwrap();
        assert_eq!(d, b);

        unsafe {
            assert_eq!(*a.as_ref(), 42);
            assert_eq!(*c.as_ref(), 44);
            assert_eq!(*d.as_ref(), 45);

            pool.release(a.as_ptr());
            pool.release(c.as_ptr());
            pool.release(d.as_ptr());
        }

        assert!(pool.is_empty());
    }

    #[test]
    fn zero_capacity_is_error() {
        assert!(matches!(
            FixedPool::<u32>::new(0),
            Err(Error::ZeroCapacity)
        ));
    }

    #[test]
    fn overflowing_capacity_is_error() {
        assert!(matches!(
            FixedPool::<[u64; 16]>::new(usize::MAX),
            Err(Error::CapacityOverflow { .. })
        ));
    }

    #[test]
    fn new_pool_is_empty() {
        let pool = FixedPool::<u64>::new(8).unwrap();

        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.available(), 8);
        assert_eq!(pool.len(), 0);
        assert!(pool.is_empty());
        assert!(!pool.is_full());
    }

    #[test]
    fn acquire_hands_out_slots_in_address_order() {
        let pool = FixedPool::<u16>::new(4).unwrap();
        let slot_size = FixedPool::<u16>::slot_layout().size();

        let first = pool.acquire().unwrap();
        let mut previous = first;

        for _ in 1..4 {
            let next = pool.acquire().unwrap();
            assert_eq!(next.addr().get() - previous.addr().get(), slot_size);
            previous = next;
        }

        assert!(pool.acquire().is_none());
        assert!(pool.is_full());
    }

    #[test]
    fn exhausted_pool_recovers_after_release() {
        let pool = FixedPool::<u64>::new(2).unwrap();

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert!(pool.acquire().is_none());

        unsafe { pool.deallocate(a) };

        assert_eq!(pool.acquire(), Some(a));

        unsafe {
            pool.deallocate(a);
            pool.deallocate(b);
        }
    }

    #[test]
    fn construct_when_exhausted_drops_value() {
        let drops = Rc::new(Cell::new(0));
        let pool = FixedPool::<DropCounter>::new(1).unwrap();

        let held = pool
            .construct(DropCounter {
                drops: Rc::clone(&drops),
            })
            .unwrap();

        let result = pool.construct(DropCounter {
            drops: Rc::clone(&drops),
        });

        assert!(matches!(result, Err(Error::Exhausted { capacity: 1 })));
        assert_eq!(drops.get(), 1);

        unsafe { pool.release(held.as_ptr()) };
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn construct_with_does_not_run_closure_when_exhausted() {
        let pool = FixedPool::<u32>::new(1).unwrap();
        let held = pool.construct(1).unwrap();

        let called = Cell::new(false);
        let result = pool.construct_with(|| {
            called.set(true);
            2
        });

        assert!(result.is_err());
        assert!(!called.get());

        unsafe { pool.release(held.as_ptr()) };
    }

    #[test]
    fn construct_with_panic_vacates_slot() {
        let pool = FixedPool::<String>::new(2).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| {
            pool.construct_with(|| panic!("constructor failed"))
        }));

        assert!(result.is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn release_drops_exactly_once() {
        let drops = Rc::new(Cell::new(0));
        let pool = FixedPool::<DropCounter>::new(2).unwrap();

        let item = pool
            .construct(DropCounter {
                drops: Rc::clone(&drops),
            })
            .unwrap();
        assert_eq!(drops.get(), 0);

        unsafe { pool.release(item.as_ptr()) };

        assert_eq!(drops.get(), 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn release_null_is_noop() {
        let pool = FixedPool::<u64>::new(1).unwrap();

        unsafe { pool.release(ptr::null_mut()) };

        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn destroy_null_is_noop() {
        let pool = FixedPool::<u64>::new(1).unwrap();

        unsafe { pool.destroy(ptr::null_mut()) };

        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn destroy_keeps_slot_occupied() {
        let drops = Rc::new(Cell::new(0));
        let pool = FixedPool::<DropCounter>::new(1).unwrap();

        let item = pool
            .construct(DropCounter {
                drops: Rc::clone(&drops),
            })
            .unwrap();

        unsafe { pool.destroy(item.as_ptr()) };

        assert_eq!(drops.get(), 1);
        assert!(pool.is_full());

        // The storage can be reused for a new value in the same slot.
        unsafe {
            item.as_ptr().write(DropCounter {
                drops: Rc::clone(&drops),
            });
            pool.release(item.as_ptr());
        }

        assert_eq!(drops.get(), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn release_vacates_slot_even_if_destructor_panics() {
        struct PanicOnDrop;

        impl Drop for PanicOnDrop {
            fn drop(&mut self) {
                panic!("destructor failed");
            }
        }

        let pool = FixedPool::<PanicOnDrop>::new(1).unwrap();
        let item = pool.construct(PanicOnDrop).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| unsafe {
            pool.release(item.as_ptr());
        }));

        assert!(result.is_err());
        assert!(pool.is_empty());
    }

    #[test]
    fn acquired_storage_is_aligned() {
        let pool = FixedPool::<OverAligned>::new(5).unwrap();
        let mut items = Vec::new();

        for value in 0..5 {
            let item = pool.construct(OverAligned { value }).unwrap();
            assert!(item.is_aligned());
            items.push(item);
        }

        for (expected, item) in items.into_iter().enumerate() {
            assert_eq!(usize::from(unsafe { item.as_ref() }.value), expected);
            unsafe { pool.release(item.as_ptr()) };
        }
    }

    #[test]
    fn contains_recognizes_own_slots_only() {
        let pool = FixedPool::<u64>::new(2).unwrap();
        let other = FixedPool::<u64>::new(2).unwrap();

        let item = pool.construct(1).unwrap();

        assert!(pool.contains(item.as_ptr()));
        assert!(!other.contains(item.as_ptr()));
        assert!(!pool.contains(ptr::null()));
        assert!(!pool.contains(item.as_ptr().cast::<u8>().wrapping_add(1).cast()));

        unsafe { pool.release(item.as_ptr()) };

        // Vacant slots still belong to the pool.
        assert!(pool.contains(item.as_ptr()));
    }

    #[test]
    fn slot_layout_fits_item_and_link() {
        let layout = FixedPool::<[u8; 3]>::slot_layout();
        assert!(layout.size() >= size_of::<*mut u8>());
        assert!(layout.align() >= align_of::<*mut u8>());

        let layout = FixedPool::<[u64; 8]>::slot_layout();
        assert_eq!(layout.size(), 64);

        let layout = FixedPool::<OverAligned>::slot_layout();
        assert_eq!(layout.align(), 128);
    }

    #[test]
    fn zero_sized_items_use_pointer_sized_slots() {
        let pool = FixedPool::<()>::new(3).unwrap();

        let a = pool.construct(()).unwrap();
        let b = pool.construct(()).unwrap();
        assert_ne!(a, b);

        unsafe {
            pool.release(a.as_ptr());
            pool.release(b.as_ptr());
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "was released twice")]
    fn double_release_panics_in_debug() {
        let pool = FixedPool::<u64>::new(2).unwrap();
        let item = pool.construct(1).unwrap();

        unsafe {
            pool.release(item.as_ptr());
            pool.release(item.as_ptr());
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    fn double_release_is_detected_before_destructor_runs() {
        let drops = Rc::new(Cell::new(0));
        let pool = FixedPool::<DropCounter>::new(2).unwrap();

        let item = pool
            .construct(DropCounter {
                drops: Rc::clone(&drops),
            })
            .unwrap();

        unsafe { pool.release(item.as_ptr()) };
        assert_eq!(drops.get(), 1);

        let result = catch_unwind(AssertUnwindSafe(|| unsafe {
            pool.release(item.as_ptr());
        }));

        let message = *result.unwrap_err().downcast::<String>().unwrap();
        assert!(message.contains("was released twice"));

        // The destructor did not run over the free-list link and the pool is intact.
        assert_eq!(drops.get(), 1);
        assert!(pool.is_empty());

        let again = pool
            .construct(DropCounter {
                drops: Rc::clone(&drops),
            })
            .unwrap();
        unsafe { pool.release(again.as_ptr()) };
        assert_eq!(drops.get(), 2);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "was released twice")]
    fn double_deallocate_panics_in_debug() {
        let pool = FixedPool::<Vec<u64>>::new(2).unwrap();
        let storage = pool.acquire().unwrap();

        unsafe {
            pool.deallocate(storage);
            pool.deallocate(storage);
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "is not a slot of pool")]
    fn foreign_release_panics_in_debug() {
        let pool = FixedPool::<u64>::new(2).unwrap();
        let mut local = 5_u64;

        unsafe { pool.release(&raw mut local) };
    }

    #[test]
    #[should_panic(expected = "must be empty when dropped")]
    fn drop_with_items_and_must_not_leak_policy_panics() {
        let pool = FixedPool::<u64>::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MustNotLeakItems)
            .build()
            .unwrap();

        _ = pool.construct(1).unwrap();
    }

    #[test]
    fn drop_with_poisoned_lock_does_not_panic() {
        let pool = FixedPool::<u64>::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MustNotLeakItems)
            .build()
            .unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| {
            let _free_list = pool.free_list.lock().unwrap();
            panic!("poisoning the free list lock");
        }));

        assert!(result.is_err());
        assert!(pool.free_list.is_poisoned());

        drop(pool);
    }

    #[test]
    fn drop_empty_with_must_not_leak_policy_ok() {
        let pool = FixedPool::<u64>::builder()
            .capacity(2)
            .drop_policy(DropPolicy::MustNotLeakItems)
            .build()
            .unwrap();

        let item = pool.construct(1).unwrap();
        unsafe { pool.release(item.as_ptr()) };

        drop(pool);
    }

    #[test]
    fn drop_with_items_and_may_leak_policy_does_not_drop_items() {
        let drops = Rc::new(Cell::new(0));
        let pool = FixedPool::<DropCounter>::new(2).unwrap();

        _ = pool
            .construct(DropCounter {
                drops: Rc::clone(&drops),
            })
            .unwrap();

        drop(pool);

        assert_eq!(drops.get(), 0);
    }

    #[test]
    fn pool_ids_are_unique() {
        let a = FixedPool::<u8>::new(1).unwrap();
        let b = FixedPool::<u8>::new(1).unwrap();

        assert_ne!(a.pool_id, b.pool_id);
    }

    #[test]
    fn debug_output_describes_pool() {
        let pool = FixedPool::<u16>::new(3).unwrap();
        let item = pool.construct(9).unwrap();

        let debug_output = format!("{pool:?}");

        assert!(debug_output.contains("FixedPool"));
        assert!(debug_output.contains("u16"));
        assert!(debug_output.contains("capacity: 3"));
        assert!(debug_output.contains("available: 2"));

        unsafe { pool.release(item.as_ptr()) };
    }

    #[test]
    fn shared_between_threads() {
        let pool = Arc::new(FixedPool::<usize>::new(16).unwrap());
        let constructed = Arc::new(AtomicUsize::new(0));

        let handles = (0..4)
            .map(|thread_index| {
                let pool = Arc::clone(&pool);
                let constructed = Arc::clone(&constructed);

                thread::spawn(move || {
                    for round in 0..100 {
                        let item = pool.construct(thread_index * 1000 + round).unwrap();
                        constructed.fetch_add(1, Ordering::Relaxed);

                        assert_eq!(unsafe { *item.as_ref() }, thread_index * 1000 + round);

                        unsafe { pool.release(item.as_ptr()) };
                    }
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(constructed.load(Ordering::Relaxed), 400);
        assert!(pool.is_empty());
    }

    #[test]
    fn all_addresses_distinct_when_full() {
        let pool = FixedPool::<u32>::new(32).unwrap();

        let storages = (0..32)
            .map(|_| pool.acquire().unwrap())
            .collect::<Vec<_>>();

        let distinct = storages.iter().map(|s| s.addr()).collect::<HashSet<_>>();
        assert_eq!(distinct.len(), 32);

        for storage in storages {
            unsafe { pool.deallocate(storage) };
        }
    }
}
