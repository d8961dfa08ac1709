use std::ptr::NonNull;

use crate::{BackingRegion, Slot};

/// The intrusive free list of a backing region.
///
/// Think of this as a stack of the most recently vacated slots, with the stack links stored in
/// the vacant slots themselves. Popping hands out the most recently pushed slot first.
///
/// This type does no synchronization of its own. The pool keeps it behind a mutex so that
/// reading a link, moving the head and updating the counter always happen as one step.
#[derive(Debug)]
pub(crate) struct FreeList<T> {
    /// First vacant slot, or `None` if every slot is occupied.
    head: Option<NonNull<Slot<T>>>,

    /// Number of slots reachable from `head`.
    available: usize,
}

impl<T> FreeList<T> {
    /// Threads every slot of the region into a new free list, in ascending address order.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that no slot of the region is in use, as every slot is
    /// overwritten with a link. The returned list must not outlive the region.
    #[must_use]
    pub(crate) unsafe fn thread(region: &BackingRegion<T>) -> Self {
        let capacity = region.capacity().get();

        for index in 0..capacity {
            // Cannot overflow because the index is below a capacity that fits in memory.
            let next_index = index.wrapping_add(1);

            let next = (next_index < capacity).then(|| region.slot_ptr(next_index));

            // SAFETY: The slot belongs to the region and is not in use per the caller's guarantee.
            unsafe {
                Slot::set_next(region.slot_ptr(index), next);
            }
        }

        Self {
            head: Some(region.slot_ptr(0)),
            available: capacity,
        }
    }

    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinite loop in tests that fill the pool.
    pub(crate) fn available(&self) -> usize {
        self.available
    }

    /// Takes the first vacant slot off the list, or returns `None` if the list is empty.
    #[must_use]
    pub(crate) fn pop(&mut self) -> Option<NonNull<Slot<T>>> {
        let slot = self.head?;

        // SAFETY: Every slot reachable from the head is a vacant slot of a live region, as only
        // `thread()` and `push()` add slots to the list and both require exactly that.
        self.head = unsafe { Slot::next(slot) };

        self.available = self
            .available
            .checked_sub(1)
            .expect("the list had a head, so at least one slot must have been available");

        Some(slot)
    }

    /// Puts a slot back on the list, making it the next one to be handed out.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that the slot belongs to the region this list was threaded
    /// through, that it is not already on the list and that nobody is accessing its storage.
    pub(crate) unsafe fn push(&mut self, slot: NonNull<Slot<T>>) {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe {
            Slot::set_next(slot, self.head);
        }

        self.head = Some(slot);

        // Cannot overflow because a region cannot hold more slots than fit in memory.
        self.available = self.available.wrapping_add(1);
    }

    /// Whether the slot is currently on the list. Walks the whole list.
    #[cfg(debug_assertions)]
    #[must_use]
    pub(crate) fn contains(&self, slot: NonNull<Slot<T>>) -> bool {
        self.iter().take(self.available).any(|vacant| vacant == slot)
    }

    #[cfg(debug_assertions)]
    fn iter(&self) -> impl Iterator<Item = NonNull<Slot<T>>> + '_ {
        std::iter::successors(self.head, |slot| {
            // SAFETY: Every slot reachable from the head is a vacant slot of a live region.
            unsafe { Slot::next(*slot) }
        })
    }

    /// Verifies that the list only links slots of `region` and that its length matches the
    /// counter. A double release shows up here as a cycle, which makes the walk run past the
    /// capacity of the region.
    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self, region: &BackingRegion<T>) {
        let capacity = region.capacity().get();
        let mut observed_count: usize = 0;

        for slot in self.iter() {
            assert!(
                region.contains(slot),
                "free list links to {slot:?}, which is not a slot of the region"
            );

            observed_count = observed_count
                .checked_add(1)
                .expect("guarded by the capacity check below");

            assert!(
                observed_count <= capacity,
                "free list is longer than the capacity {capacity}; a slot was released twice"
            );
        }

        assert!(
            observed_count == self.available,
            "free list holds {observed_count} slots but the counter says {}",
            self.available
        );
    }
}
