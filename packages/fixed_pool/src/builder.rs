use std::marker::PhantomData;

use crate::{DropPolicy, Error, FixedPool, Result};

/// Builder for creating an instance of [`FixedPool`].
///
/// The capacity is mandatory, whereas other settings are optional. If all you need is
/// a capacity, [`FixedPool::new()`][1] is a shorthand for this builder.
///
/// # Examples
///
/// ```
/// use fixed_pool::{DropPolicy, FixedPool};
///
/// let pool = FixedPool::<u32>::builder()
///     .capacity(64)
///     .drop_policy(DropPolicy::MustNotLeakItems)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.capacity(), 64);
/// ```
///
/// [1]: FixedPool::new
#[must_use]
pub struct FixedPoolBuilder<T> {
    capacity: Option<usize>,
    drop_policy: DropPolicy,

    _item: PhantomData<T>,
}

impl<T> std::fmt::Debug for FixedPoolBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedPoolBuilder")
            .field(
                "item_type",
                &std::format_args!("{}", std::any::type_name::<T>()),
            )
            .field("capacity", &self.capacity)
            .field("drop_policy", &self.drop_policy)
            .finish()
    }
}

impl<T> FixedPoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            capacity: None,
            drop_policy: DropPolicy::default(),
            _item: PhantomData,
        }
    }

    /// Sets the number of slots in the pool. The capacity never changes after the pool is built.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::FixedPool;
    ///
    /// let pool = FixedPool::<String>::builder().capacity(3).build().unwrap();
    ///
    /// assert_eq!(pool.available(), 3);
    /// ```
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Sets the [drop policy][DropPolicy] for the pool. This governs how to treat
    /// occupied slots when the pool is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::{DropPolicy, FixedPool};
    ///
    /// let pool = FixedPool::<u32>::builder()
    ///     .capacity(8)
    ///     .drop_policy(DropPolicy::MayLeakItems)
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn drop_policy(mut self, policy: DropPolicy) -> Self {
        self.drop_policy = policy;
        self
    }

    /// Builds the pool, allocating its backing region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZeroCapacity`] if the capacity is zero or was never set,
    /// [`Error::CapacityOverflow`] if the backing region would not fit in the address space and
    /// [`Error::OutOfMemory`] if the backing region cannot be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use fixed_pool::{Error, FixedPool};
    ///
    /// let result = FixedPool::<u32>::builder().capacity(0).build();
    ///
    /// assert!(matches!(result, Err(Error::ZeroCapacity)));
    /// ```
    pub fn build(self) -> Result<FixedPool<T>> {
        let capacity = self.capacity.ok_or(Error::ZeroCapacity)?;

        FixedPool::new_inner(capacity, self.drop_policy)
    }
}
