use std::mem::{ManuallyDrop, MaybeUninit};
use std::ptr::NonNull;

/// One storage cell of the backing region.
///
/// A slot is either vacant, in which case `next` links it into the free list, or occupied,
/// in which case `item` is storage owned by whoever acquired the slot (initialized or not).
/// Which field is meaningful is never decided by looking at the bytes; it is determined
/// solely by whether the slot is currently reachable from the free list.
///
/// Being a union, the slot is as large as the larger of its fields and as aligned as the
/// stricter of them, with the size padded to a multiple of the alignment. An array of slots
/// therefore keeps every item correctly aligned for `T` and every link aligned for a pointer.
///
/// `repr(C)` places both fields at offset 0, so a pointer to the slot is also a pointer to
/// the item and vice versa.
#[repr(C)]
pub(crate) union Slot<T> {
    next: Option<NonNull<Slot<T>>>,

    #[allow(
        dead_code,
        reason = "only accessed through casts of the slot pointer; present to size and align the slot"
    )]
    item: ManuallyDrop<T>,
}

impl<T> Slot<T> {
    /// A standalone vacant slot that links nowhere.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn vacant() -> Self {
        Self { next: None }
    }

    /// The item storage of a slot, handed out to callers when the slot is acquired.
    #[must_use]
    pub(crate) fn item_ptr(slot: NonNull<Self>) -> NonNull<MaybeUninit<T>> {
        slot.cast()
    }

    /// The slot that contains the item at `item`.
    ///
    /// This is pure pointer arithmetic. Whether the result actually denotes a slot of some
    /// pool is for the caller to decide.
    #[must_use]
    pub(crate) fn from_item_ptr(item: NonNull<MaybeUninit<T>>) -> NonNull<Self> {
        item.cast()
    }

    /// Reads the free-list link of a vacant slot.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `slot` points to a slot of a live backing region and that
    /// the slot is vacant, i.e. its link was the last thing written to it.
    #[must_use]
    pub(crate) unsafe fn next(slot: NonNull<Self>) -> Option<NonNull<Self>> {
        // SAFETY: The slot is valid for reads per the caller's guarantee, so projecting to one
        // of its fields stays in bounds of the allocation.
        let next_ptr = unsafe { &raw const (*slot.as_ptr()).next };

        // SAFETY: The slot is vacant per the caller's guarantee, so the link field holds a
        // value written by `set_next()`. Union fields are always aligned within the union.
        unsafe { next_ptr.read() }
    }

    /// Overwrites the start of the slot with a free-list link, making the slot vacant.
    ///
    /// Any item previously in the slot is overwritten without being dropped.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that `slot` points to a slot of a live backing region and that
    /// nobody else is accessing the slot's storage.
    pub(crate) unsafe fn set_next(slot: NonNull<Self>, next: Option<NonNull<Self>>) {
        // SAFETY: The slot is valid for writes per the caller's guarantee, so projecting to one
        // of its fields stays in bounds of the allocation.
        let next_ptr = unsafe { &raw mut (*slot.as_ptr()).next };

        // SAFETY: We have exclusive access per the caller's guarantee and the field is aligned.
        unsafe {
            next_ptr.write(next);
        }
    }
}
