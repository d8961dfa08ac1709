//! Concise example of the two ways to use a `FixedPool`.
//!
//! This shows in-place construction with automatic teardown on release, and raw slot
//! acquisition with manual initialization, plus what happens when the pool runs out of slots.

use std::mem::MaybeUninit;
use std::ptr::NonNull;

use fixed_pool::{DropPolicy, Error, FixedPool};

#[derive(Debug)]
struct Connection {
    id: u32,
    peer: String,
}

fn main() {
    println!("=== Construct and release ===");
    construct_and_release();

    println!("\n=== Raw slots ===");
    raw_slots();
}

fn construct_and_release() {
    let pool = FixedPool::<Connection>::builder()
        .capacity(2)
        .drop_policy(DropPolicy::MustNotLeakItems)
        .build()
        .expect("pool of two small items must fit in memory");

    let first = pool
        .construct(Connection {
            id: 1,
            peer: "10.0.0.1:443".to_string(),
        })
        .expect("pool has two vacant slots");

    let second = pool
        .construct_with(|| Connection {
            id: 2,
            peer: "10.0.0.2:443".to_string(),
        })
        .expect("pool has one vacant slot");

    // SAFETY: Both items were constructed by this pool and are still in it.
    let (first_ref, second_ref) = unsafe { (first.as_ref(), second.as_ref()) };
    println!(
        "Stored #{} to {} and #{} to {}",
        first_ref.id, first_ref.peer, second_ref.id, second_ref.peer
    );

    match pool.construct(Connection {
        id: 3,
        peer: "10.0.0.3:443".to_string(),
    }) {
        Err(Error::Exhausted { capacity }) => println!("Pool is full at {capacity} items"),
        other => println!("Unexpected result: {other:?}"),
    }

    // SAFETY: Each item came from this pool and is released exactly once.
    unsafe {
        pool.release(first.as_ptr());
    }
    // SAFETY: As above.
    unsafe {
        pool.release(second.as_ptr());
    }

    println!("Pool is empty again: {}", pool.is_empty());
}

fn raw_slots() {
    let pool = FixedPool::<[u8; 16]>::new(3).expect("pool of three buffers must fit in memory");

    let mut slots: Vec<NonNull<MaybeUninit<[u8; 16]>>> = Vec::new();
    while let Some(slot) = pool.acquire() {
        slots.push(slot);
    }

    println!(
        "Acquired {} slots of {} bytes each, {} available",
        slots.len(),
        FixedPool::<[u8; 16]>::slot_layout().size(),
        pool.available()
    );

    for (index, slot) in slots.iter_mut().enumerate() {
        let fill = u8::try_from(index).expect("only three slots");

        // SAFETY: The slot was acquired from the pool and nobody else is accessing it.
        unsafe { slot.as_mut() }.write([fill; 16]);
    }

    for slot in slots {
        // SAFETY: Each slot came from this pool and holds an initialized value.
        unsafe {
            pool.release(slot.cast::<[u8; 16]>().as_ptr());
        }
    }

    println!("All slots returned, {} available", pool.available());
}
