/// Determines what the pool does when it is dropped while some of its slots are still occupied.
///
/// The pool never runs the destructor of items left in occupied slots because it does not know
/// which of them were initialized. Releasing every item before dropping the pool is the
/// caller's responsibility; the policy decides how a violation is reported.
///
/// # Examples
///
/// ```
/// use fixed_pool::{DropPolicy, FixedPool};
///
/// let pool = FixedPool::<u64>::builder()
///     .capacity(16)
///     .drop_policy(DropPolicy::MustNotLeakItems)
///     .build()
///     .unwrap();
///
/// assert_eq!(pool.drop_policy(), DropPolicy::MustNotLeakItems);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum DropPolicy {
    /// Items still in the pool are leaked when the pool is dropped and a warning is logged.
    /// This is the default.
    #[default]
    MayLeakItems,

    /// The pool will panic if any slot is still occupied when it is dropped.
    ///
    /// This may be valuable in tests or when items own resources that must be
    /// released explicitly, making a forgotten release a bug worth stopping on.
    MustNotLeakItems,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn default_is_may_leak() {
        assert_eq!(DropPolicy::default(), DropPolicy::MayLeakItems);
    }
}
