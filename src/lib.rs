//! Deterministic, fixed-size block memory pool for `no_std` and
//! safety-relevant systems that forbid dynamic memory.
//!
//! This crate provides a single type, [`Pool`], living entirely inside two
//! contiguous, caller-owned byte regions: a small state region holding the
//! pool's control block, and a pool region holding the allocation bitmap
//! and the blocks themselves. There is no heap usage anywhere in this
//! crate — both regions come from the caller, typically `static` arrays on
//! targets that have no heap at all.
//!
//! # Usage
//! ```
//! use blockpool::Pool;
//!
//! const STATE_SIZE: usize = blockpool::state_size();
//! let mut state = [0u8; STATE_SIZE];
//! let mut region = [0u8; 4096];
//!
//! let pool = Pool::init(&mut state, &mut region, 64, 8).unwrap();
//! let block = pool.alloc().unwrap();
//! assert!(pool.contains(block.as_ptr()));
//! pool.free(block).unwrap();
//! ```
//!
//! # Design
//! Blocks are handed out from a singly linked LIFO free list threaded
//! through the blocks themselves — a free block's first pointer-sized word
//! is its link to the next free block, so the free list costs no memory
//! beyond the blocks it already owns. A parallel one-bit-per-block bitmap,
//! stored at the head of the pool region, lets [`Pool::free`] detect a
//! double-free in O(1) without scanning the free list.
//!
//! Concurrency is never assumed: the crate has no internal locks or
//! atomics. Callers that share a pool across threads or interrupt context
//! install a `(lock, unlock, ctx)` triple with [`Pool::set_sync`]; without
//! one, a pool must only ever be touched from a single thread of
//! execution.
#![cfg_attr(not(test), no_std)]
#![warn(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

mod bitmap;
mod control;
mod error;
mod freelist;
mod hook;
mod layout;
mod stats;

pub use control::{state_size, Pool};
pub use error::{strerror, Error};
pub use hook::{LockFn, UnlockFn};
pub use stats::Stats;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_example_shape_round_trips() {
        const STATE_SIZE: usize = state_size();
        let mut state = [0u8; STATE_SIZE];
        let mut region = [0u8; 4096];

        let pool = Pool::init(&mut state, &mut region, 64, 8).unwrap();
        let block = pool.alloc().unwrap();
        assert!(pool.contains(block.as_ptr()));
        pool.free(block).unwrap();
    }

    #[test]
    fn strerror_is_reexported_and_stable() {
        assert_eq!(strerror(Error::OutOfMemory), Error::OutOfMemory.as_str());
    }
}
