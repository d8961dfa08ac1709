use std::alloc::{Layout, alloc, dealloc};
use std::num::NonZero;
use std::ptr::NonNull;

use crate::{Error, Result, Slot};

/// The single contiguous block of slots owned by a pool.
///
/// The region is allocated once, at a fixed capacity, and never moves or grows. It knows
/// nothing about which slots are vacant; that is tracked by the free list threaded through it.
/// Dropping the region returns the memory to the global allocator without touching the contents
/// of any slot.
#[derive(Debug)]
pub(crate) struct BackingRegion<T> {
    first_slot_ptr: NonNull<Slot<T>>,

    capacity: NonZero<usize>,

    /// Layout of the whole allocation. We need the exact same layout again to deallocate.
    layout: Layout,
}

impl<T> BackingRegion<T> {
    /// Allocates an uninitialized region of `capacity` slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityOverflow`] if the region would not fit in the address space and
    /// [`Error::OutOfMemory`] if the global allocator fails to provide it.
    pub(crate) fn new(capacity: NonZero<usize>) -> Result<Self> {
        let Ok(layout) = Layout::array::<Slot<T>>(capacity.get()) else {
            return Err(Error::CapacityOverflow {
                capacity: capacity.get(),
                slot_size: size_of::<Slot<T>>(),
            });
        };

        // SAFETY: The layout is not zero-sized because a slot is at least as large as a pointer
        // and the capacity is non-zero.
        let ptr = unsafe { alloc(layout) };

        let first_slot_ptr = NonNull::new(ptr)
            .ok_or(Error::OutOfMemory { layout })?
            .cast::<Slot<T>>();

        Ok(Self {
            first_slot_ptr,
            capacity,
            layout,
        })
    }

    #[must_use]
    pub(crate) fn capacity(&self) -> NonZero<usize> {
        self.capacity
    }

    /// The slot at `index`, counting from the start of the region.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of bounds.
    #[must_use]
    pub(crate) fn slot_ptr(&self, index: usize) -> NonNull<Slot<T>> {
        assert!(
            index < self.capacity.get(),
            "slot {index} index out of bounds in region of capacity {}",
            self.capacity.get()
        );

        // SAFETY: Guarded by the bounds check above, so the result stays inside the allocation.
        unsafe { self.first_slot_ptr.add(index) }
    }

    /// The index of the slot starting at `slot`, or `None` if the address is not the start of
    /// a slot in this region.
    #[must_use]
    pub(crate) fn index_of(&self, slot: NonNull<Slot<T>>) -> Option<usize> {
        let offset = slot
            .addr()
            .get()
            .checked_sub(self.first_slot_ptr.addr().get())?;

        if offset >= self.layout.size() {
            return None;
        }

        let slot_size = size_of::<Slot<T>>();

        if offset.checked_rem(slot_size)? != 0 {
            return None;
        }

        offset.checked_div(slot_size)
    }

    /// Whether `slot` is the start of a slot in this region.
    #[must_use]
    pub(crate) fn contains(&self, slot: NonNull<Slot<T>>) -> bool {
        self.index_of(slot).is_some()
    }
}

impl<T> Drop for BackingRegion<T> {
    fn drop(&mut self) {
        // SAFETY: The pointer came from `alloc()` with this same layout and is only freed here.
        unsafe {
            dealloc(self.first_slot_ptr.as_ptr().cast(), self.layout);
        }
    }
}
