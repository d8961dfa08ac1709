//! Integration tests for the `fixed_pool` package.
//!
//! These tests exercise the public API of `FixedPool` the way a caller would, verifying slot
//! accounting, exhaustion, reuse order, alignment, item lifetimes and thread safety.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "keep tests concise and easy to read"
)]

use std::collections::HashSet;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use fixed_pool::{Error, FixedPool};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type Storage<T> = NonNull<MaybeUninit<T>>;

#[derive(Debug, PartialEq)]
struct Record {
    id: u64,
    name: String,
    scores: Vec<u32>,
}

impl Record {
    fn new(id: u64) -> Self {
        Self {
            id,
            name: format!("record-{id}"),
            scores: vec![1, 2, 3],
        }
    }
}

/// Counts its drops into a counter owned by the test that created it.
struct CountedDrop {
    drops: Arc<AtomicUsize>,
}

impl CountedDrop {
    fn new(drops: &Arc<AtomicUsize>) -> Self {
        Self {
            drops: Arc::clone(drops),
        }
    }
}

impl Drop for CountedDrop {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn capacity_three_scenario() {
    let pool = FixedPool::<[u8; 16]>::new(3).unwrap();
    assert_eq!(pool.available(), 3);

    let first = pool.acquire().unwrap();
    let second = pool.acquire().unwrap();
    let third = pool.acquire().unwrap();

    let distinct = [first, second, third]
        .iter()
        .map(|storage| storage.addr())
        .collect::<HashSet<_>>();
    assert_eq!(distinct.len(), 3);

    assert_eq!(pool.available(), 0);
    assert!(pool.acquire().is_none());

    unsafe { pool.deallocate(second) };
    assert_eq!(pool.available(), 1);

    let reused = pool.acquire().unwrap();
    assert_eq!(reused, second);

    unsafe {
        pool.deallocate(first);
        pool.deallocate(reused);
        pool.deallocate(third);
    }
}

#[test]
fn exhaustion_after_capacity_acquires() {
    for capacity in [1, 2, 7, 64] {
        let pool = FixedPool::<u64>::new(capacity).unwrap();

        let storages = (0..capacity)
            .map(|_| pool.acquire().expect("pool must not be exhausted before capacity"))
            .collect::<Vec<_>>();

        assert!(pool.acquire().is_none());
        assert!(pool.is_full());
        assert!(matches!(
            pool.construct(0),
            Err(Error::Exhausted { capacity: c }) if c == capacity
        ));

        for storage in storages {
            unsafe { pool.deallocate(storage) };
        }
    }
}

#[test]
fn capacity_is_conserved_across_random_operations() {
    const CAPACITY: usize = 24;

    let mut rng = StdRng::seed_from_u64(0x5107_5eed);
    let pool = FixedPool::<u32>::new(CAPACITY).unwrap();
    let mut occupied: Vec<Storage<u32>> = Vec::new();

    for _ in 0..2_000 {
        if rng.random_bool(0.55) {
            match pool.acquire() {
                Some(storage) => occupied.push(storage),
                None => assert_eq!(occupied.len(), CAPACITY),
            }
        } else if !occupied.is_empty() {
            let index = rng.random_range(0..occupied.len());
            let storage = occupied.swap_remove(index);
            unsafe { pool.deallocate(storage) };
        }

        assert_eq!(pool.available() + occupied.len(), pool.capacity());
        assert_eq!(pool.len(), occupied.len());
    }

    for storage in occupied {
        unsafe { pool.deallocate(storage) };
    }

    assert!(pool.is_empty());
}

#[test]
fn full_circle_yields_distinct_addresses_twice() {
    const CAPACITY: usize = 50;

    let mut rng = StdRng::seed_from_u64(42);
    let pool = FixedPool::<Record>::new(CAPACITY).unwrap();

    for _ in 0..2 {
        let mut storages = (0..CAPACITY)
            .map(|_| pool.acquire().unwrap())
            .collect::<Vec<_>>();

        let distinct = storages
            .iter()
            .map(|storage| storage.addr())
            .collect::<HashSet<_>>();
        assert_eq!(distinct.len(), CAPACITY);
        assert!(storages.iter().all(|storage| pool.contains(storage.cast::<Record>().as_ptr())));

        // Release in a shuffled order.
        while !storages.is_empty() {
            let index = rng.random_range(0..storages.len());
            let storage = storages.swap_remove(index);
            unsafe { pool.deallocate(storage) };
        }

        assert!(pool.is_empty());
    }
}

#[test]
fn reuse_is_last_in_first_out() {
    let pool = FixedPool::<u64>::new(4).unwrap();

    let storages = (0..4).map(|_| pool.acquire().unwrap()).collect::<Vec<_>>();

    unsafe {
        pool.deallocate(storages[1]);
        pool.deallocate(storages[3]);
        pool.deallocate(storages[0]);
    }

    assert_eq!(pool.acquire(), Some(storages[0]));
    assert_eq!(pool.acquire(), Some(storages[3]));
    assert_eq!(pool.acquire(), Some(storages[1]));
    assert_eq!(pool.acquire(), None);

    for storage in storages {
        unsafe { pool.deallocate(storage) };
    }
}

#[test]
fn every_address_is_aligned() {
    #[repr(align(16))]
    struct Align16([u8; 3]);

    #[repr(align(256))]
    struct Align256(u8);

    fn check<T>(capacity: usize) {
        let pool = FixedPool::<T>::new(capacity).unwrap();

        let storages = (0..capacity)
            .map(|_| pool.acquire().unwrap())
            .collect::<Vec<_>>();

        for storage in &storages {
            assert!(storage.cast::<T>().is_aligned());
        }

        for storage in storages {
            unsafe { pool.deallocate(storage) };
        }
    }

    check::<u8>(9);
    check::<u16>(9);
    check::<(u8, u32)>(9);
    check::<[u8; 13]>(9);
    check::<Align16>(9);
    check::<Align256>(9);
    check::<()>(9);
}

#[test]
fn construct_matches_direct_construction() {
    let pool = FixedPool::<Record>::new(2).unwrap();

    let constructed = pool.construct(Record::new(7)).unwrap();
    let lazily_constructed = pool.construct_with(|| Record::new(8)).unwrap();

    unsafe {
        assert_eq!(constructed.as_ref(), &Record::new(7));
        assert_eq!(lazily_constructed.as_ref(), &Record::new(8));
        assert_eq!(lazily_constructed.as_ref().id, 8);
        assert_eq!(lazily_constructed.as_ref().name, "record-8");
        assert_eq!(lazily_constructed.as_ref().scores, vec![1, 2, 3]);

        pool.release(constructed.as_ptr());
        pool.release(lazily_constructed.as_ptr());
    }

    assert!(pool.is_empty());
}

#[test]
fn release_tears_down_once_before_reuse() {
    let drops = Arc::new(AtomicUsize::new(0));
    let pool = FixedPool::<CountedDrop>::new(1).unwrap();

    let item = pool.construct(CountedDrop::new(&drops)).unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    unsafe { pool.release(item.as_ptr()) };
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    // The slot is reusable and reuse does not tear anything down again.
    let again = pool.construct(CountedDrop::new(&drops)).unwrap();
    assert_eq!(again, item);
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    unsafe { pool.release(again.as_ptr()) };
    assert_eq!(drops.load(Ordering::SeqCst), 2);
}

#[test]
fn manual_placement_after_acquire() {
    let pool = FixedPool::<Record>::new(1).unwrap();

    let mut storage = pool.acquire().unwrap();
    unsafe { storage.as_mut() }.write(Record::new(3));

    let item = storage.cast::<Record>();
    assert_eq!(unsafe { item.as_ref() }.name, "record-3");

    unsafe { pool.release(item.as_ptr()) };
    assert!(pool.is_empty());
}

#[test]
fn destroy_then_deallocate_equals_release() {
    let drops = Arc::new(AtomicUsize::new(0));
    let pool = FixedPool::<CountedDrop>::new(1).unwrap();

    let item = pool.construct(CountedDrop::new(&drops)).unwrap();

    unsafe { pool.destroy(item.as_ptr()) };
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(pool.is_full());

    unsafe { pool.deallocate(item.cast()) };
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert!(pool.is_empty());
}

#[cfg(debug_assertions)]
#[test]
fn double_release_of_heap_owning_item_panics_without_double_free() {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    let pool = FixedPool::<Vec<u64>>::new(2).unwrap();
    let item = pool.construct(vec![1, 2, 3]).unwrap();

    unsafe { pool.release(item.as_ptr()) };

    let result = catch_unwind(AssertUnwindSafe(|| unsafe { pool.release(item.as_ptr()) }));

    let message = *result.unwrap_err().downcast::<String>().unwrap();
    assert!(message.contains("was released twice"));
    assert!(pool.is_empty());

    let replacement = pool.construct(vec![4]).unwrap();
    assert_eq!(unsafe { replacement.as_ref() }, &vec![4]);
    unsafe { pool.release(replacement.as_ptr()) };
}

#[test]
fn pools_are_independent() {
    let a = FixedPool::<u64>::new(1).unwrap();
    let b = FixedPool::<u64>::new(1).unwrap();

    let item = a.construct(1).unwrap();

    assert!(a.is_full());
    assert!(b.is_empty());
    assert!(!b.contains(item.as_ptr()));

    unsafe { a.release(item.as_ptr()) };
}

#[test]
fn concurrent_acquire_release_never_shares_a_slot() {
    const CAPACITY: usize = 8;
    const THREADS: usize = 6;
    const ROUNDS: usize = 300;

    let pool = Arc::new(FixedPool::<usize>::new(CAPACITY).unwrap());
    let live = Arc::new(AtomicUsize::new(0));
    let max_live = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles = (0..THREADS)
        .map(|thread_index| {
            let pool = Arc::clone(&pool);
            let live = Arc::clone(&live);
            let max_live = Arc::clone(&max_live);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();

                let mut exhausted_count = 0_usize;

                for round in 0..ROUNDS {
                    let tag = thread_index * ROUNDS + round;

                    let Ok(item) = pool.construct(tag) else {
                        exhausted_count += 1;
                        continue;
                    };

                    let now_live = live.fetch_add(1, Ordering::SeqCst) + 1;
                    max_live.fetch_max(now_live, Ordering::SeqCst);

                    thread::yield_now();

                    // If any other thread had been handed the same slot, it would have
                    // overwritten our tag.
                    assert_eq!(unsafe { *item.as_ref() }, tag);

                    live.fetch_sub(1, Ordering::SeqCst);
                    unsafe { pool.release(item.as_ptr()) };
                }

                exhausted_count
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        let exhausted_count = handle.join().unwrap();
        assert!(exhausted_count <= ROUNDS);
    }

    assert!(max_live.load(Ordering::SeqCst) <= CAPACITY);
    assert!(pool.is_empty());
}

#[test]
fn concurrent_fill_hands_out_each_slot_once() {
    const CAPACITY: usize = 64;
    const THREADS: usize = 4;

    let pool = Arc::new(FixedPool::<u128>::new(CAPACITY).unwrap());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles = (0..THREADS)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();

                let mut addresses = Vec::new();
                while let Some(storage) = pool.acquire() {
                    addresses.push(storage.as_ptr().expose_provenance());
                }
                addresses
            })
        })
        .collect::<Vec<_>>();

    let addresses = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    let distinct = addresses.iter().copied().collect::<HashSet<_>>();

    assert_eq!(addresses.len(), CAPACITY);
    assert_eq!(distinct.len(), CAPACITY);
    assert!(pool.is_full());

    for address in addresses {
        let storage =
            NonNull::new(ptr::with_exposed_provenance_mut::<MaybeUninit<u128>>(address)).unwrap();
        unsafe { pool.deallocate(storage) };
    }

    assert!(pool.is_empty());
}
