//! The control block and the `Pool` handle built around it.

use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::bitmap::Bitmap;
use crate::error::Error;
use crate::freelist::FreeList;
use crate::hook::{Hook, LockFn, UnlockFn};
use crate::layout;
use crate::stats::Stats;

fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// Everything the pool needs to remember between calls, laid out once by
/// `init` and placed in the caller's state region.
///
/// `Copy` so that a call site can read the whole block out into a local,
/// mutate it, and write it back — the same value-snapshot discipline
/// `get_stats` exposes publicly (see the module-level docs for why this
/// avoids requiring the state buffer to be naturally aligned).
#[derive(Clone, Copy)]
struct ControlBlock {
    initialized: bool,
    blocks_start: *mut u8,
    bitmap_ptr: *mut u8,
    bitmap_bytes: u32,
    block_size: u32,
    total_blocks: u32,
    free_list: FreeList,
    stats: Stats,
    hook: Hook,
}

/// Bytes required for the control block `init` will place in the state
/// region. Callers are expected to size their state buffer against this,
/// typically with a `const` binding checked against a compile-time upper
/// bound.
#[must_use]
pub const fn state_size() -> usize {
    core::mem::size_of::<ControlBlock>()
}

/// A fixed-size block memory pool living in two caller-owned byte regions.
///
/// `Pool<'s, 'p>` borrows the state region for `'s` and the pool region for
/// `'p` for as long as it exists, so the borrow checker — not a runtime
/// flag — enforces that the caller does not otherwise touch either region
/// while the pool is live. See [`Pool::init`].
pub struct Pool<'s, 'p> {
    control: NonNull<u8>,
    _state: PhantomData<&'s mut [u8]>,
    _pool: PhantomData<&'p mut [u8]>,
}

// SAFETY: a `Pool` only ever touches its control block and pool region
// through its own methods, which apply the caller-installed hook around
// every mutating section. Moving a `Pool` to another thread carries no
// thread-local state with it.
unsafe impl Send for Pool<'_, '_> {}

// SAFETY: sharing a `&Pool` across threads is sound only if a critical
// section hook has been installed via `set_sync` and every thread's calls
// are made through that shared reference — the same contract the
// specification places on callers that touch the pool from more than one
// thread or from interrupt context. The type itself cannot enforce that a
// hook is installed; this is a documented caller obligation, matching the
// "external critical section instead of a built-in lock" design.
unsafe impl Sync for Pool<'_, '_> {}

impl<'s, 'p> Pool<'s, 'p> {
    /// Initializes a pool in `pool_region`, recording its layout in `state`.
    ///
    /// `state` must be at least [`state_size`] bytes. `pool_region`'s start
    /// address must already be aligned to `alignment`, which must be a
    /// non-zero power of two; `block_size` must be at least
    /// `size_of::<*mut u8>()`. See the module-level documentation for the
    /// layout search this performs.
    pub fn init(
        state: &'s mut [u8],
        pool_region: &'p mut [u8],
        block_size: usize,
        alignment: usize,
    ) -> Result<Self, Error> {
        if state.len() < state_size() {
            return Err(Error::InvalidSize);
        }

        let region_ptr_aligned =
            alignment != 0 && is_power_of_two(alignment) && (pool_region.as_ptr() as usize) % alignment == 0;
        let plan = layout::plan(pool_region.len(), region_ptr_aligned, block_size, alignment)?;

        let bitmap_ptr = pool_region.as_mut_ptr();
        // SAFETY: `plan.blocks_offset()` was computed so that
        // `blocks_offset() + total_blocks * aligned_block_size <=
        // pool_region.len()`, so this stays within `pool_region`.
        let blocks_start = unsafe { bitmap_ptr.add(plan.blocks_offset()) };

        let bitmap = Bitmap::new(bitmap_ptr, plan.bitmap_bytes);
        bitmap.clear_all();

        let mut free_list = FreeList::empty();
        for i in 0..plan.total_blocks {
            // SAFETY: `i < total_blocks`, so `i * aligned_block_size` stays
            // within the blocks region carved out above; each block is at
            // least a pointer wide (enforced by `layout::plan`).
            let block = unsafe { blocks_start.add(i as usize * plan.aligned_block_size) };
            let block = unsafe { NonNull::new_unchecked(block) };
            // SAFETY: pushing in ascending order as required by the
            // specification, onto a list that owns no prior entries.
            unsafe { free_list.push(block) };
        }

        let cb = ControlBlock {
            initialized: true,
            blocks_start,
            bitmap_ptr,
            bitmap_bytes: plan.bitmap_bytes,
            block_size: plan.aligned_block_size as u32,
            total_blocks: plan.total_blocks,
            free_list,
            stats: Stats {
                total_blocks: plan.total_blocks,
                used_blocks: 0,
                free_blocks: plan.total_blocks,
                peak_usage: 0,
                alloc_count: 0,
                free_count: 0,
                block_size: plan.aligned_block_size as u32,
            },
            hook: Hook::none(),
        };

        #[cfg(feature = "log")]
        log::debug!(
            "blockpool: init total_blocks={} block_size={} alignment={}",
            cb.total_blocks,
            cb.block_size,
            alignment
        );

        let control = NonNull::new(state.as_mut_ptr()).expect("state is a non-empty slice");
        // SAFETY: `control` points into `state`, which has at least
        // `state_size()` bytes (checked above); `write_unaligned` does not
        // require `state`'s natural alignment to match `ControlBlock`'s.
        unsafe { control.as_ptr().cast::<ControlBlock>().write_unaligned(cb) };

        Ok(Self { control, _state: PhantomData, _pool: PhantomData })
    }

    fn read(&self) -> ControlBlock {
        // SAFETY: `self.control` was written by `init` with a fully
        // populated `ControlBlock` and is never observed uninitialized;
        // `read_unaligned` tolerates the state buffer's actual alignment.
        unsafe { self.control.as_ptr().cast::<ControlBlock>().read_unaligned() }
    }

    fn write(&self, cb: ControlBlock) {
        // SAFETY: see `read`.
        unsafe { self.control.as_ptr().cast::<ControlBlock>().write_unaligned(cb) };
    }

    fn block_index(cb: &ControlBlock, ptr: *mut u8) -> u32 {
        let offset = ptr as usize - cb.blocks_start as usize;
        (offset / cb.block_size as usize) as u32
    }

    fn blocks_span(cb: &ControlBlock) -> (usize, usize) {
        let start = cb.blocks_start as usize;
        let span = cb.total_blocks as usize * cb.block_size as usize;
        (start, span)
    }

    /// Allocates a block, or returns [`Error::OutOfMemory`] if none remain.
    ///
    /// Takes `&self`, not `&mut self`: every mutation goes through raw
    /// pointer writes into the state region rather than a Rust-owned field,
    /// so nothing here requires exclusive access on its own. Calling this
    /// from more than one thread without a hook installed via
    /// [`Pool::set_sync`] is a data race regardless of this signature — see
    /// the safety comment on the `Sync` impl above.
    pub fn alloc(&self) -> Result<NonNull<u8>, Error> {
        // The hook itself is read unlocked — by contract it is installed
        // once, before the pool is shared, and never changes concurrently
        // with `alloc`/`free`/`reset`. Everything that *does* change
        // concurrently (the free list, the bitmap, the stats) is read,
        // mutated, and written back entirely inside the critical section
        // below, so no thread can act on a snapshot another thread has
        // already invalidated.
        let hook = self.read().hook;

        let result;
        {
            let _guard = hook.enter();
            let mut cb = self.read();
            debug_assert!(cb.initialized, "Pool always wraps an initialized control block");

            result = Self::alloc_locked(&mut cb);
            self.write(cb);

            #[cfg(feature = "log")]
            match &result {
                Ok(_) => log::trace!("blockpool: alloc ok, free_blocks={}", cb.stats.free_blocks),
                Err(_) => log::trace!("blockpool: alloc out of memory"),
            }
        }

        result
    }

    fn alloc_locked(cb: &mut ControlBlock) -> Result<NonNull<u8>, Error> {
        if cb.free_list.is_empty() || cb.stats.free_blocks == 0 {
            debug_assert!(cb.free_list.is_empty() && cb.stats.free_blocks == 0);
            return Err(Error::OutOfMemory);
        }

        // SAFETY: the free list is non-empty (checked above) and only ever
        // contains pointers written by `init`/`reset`/`free`.
        let block = unsafe { cb.free_list.pop() }.expect("checked non-empty above");

        cb.stats.free_blocks -= 1;
        cb.stats.alloc_count += 1;
        cb.stats.used_blocks = cb.stats.total_blocks - cb.stats.free_blocks;
        cb.stats.peak_usage = cb.stats.peak_usage.max(cb.stats.used_blocks);

        let index = Pool::block_index(cb, block.as_ptr());
        Bitmap::new(cb.bitmap_ptr, cb.bitmap_bytes).set(index);

        Ok(block)
    }

    /// Returns `block` to the pool.
    ///
    /// `block` must have been returned by a prior, not-yet-freed call to
    /// [`alloc`](Self::alloc) on this pool. Freeing a pointer that is
    /// already free (including a genuine double-free, or any in-range,
    /// block-aligned pointer that was never allocated) returns
    /// [`Error::DoubleFree`] without mutating the pool.
    pub fn free(&self, block: NonNull<u8>) -> Result<(), Error> {
        // `blocks_start`/`block_size`/`total_blocks` are fixed by `init` and
        // never change afterwards (not even across `reset`), so validating
        // the pointer against them needs no lock — only the free list, the
        // bitmap, and the stats are mutated concurrently, and those are
        // read, mutated, and written back entirely inside the critical
        // section below. See `alloc` for why reading the hook alone,
        // unlocked, is likewise safe.
        let cb_snapshot = self.read();
        debug_assert!(cb_snapshot.initialized, "Pool always wraps an initialized control block");

        let (start, span) = Self::blocks_span(&cb_snapshot);
        let addr = block.as_ptr() as usize;
        if addr < start || addr >= start + span {
            return Err(Error::InvalidBlock);
        }
        if (addr - start) % cb_snapshot.block_size as usize != 0 {
            return Err(Error::InvalidBlock);
        }

        let result;
        {
            let _guard = cb_snapshot.hook.enter();
            let mut cb = self.read();
            debug_assert!(cb.initialized, "Pool always wraps an initialized control block");

            result = Self::free_locked(&mut cb, block);
            self.write(cb);

            #[cfg(feature = "log")]
            match &result {
                Ok(()) => log::trace!("blockpool: free ok, free_blocks={}", cb.stats.free_blocks),
                Err(Error::DoubleFree) => log::warn!("blockpool: double free detected"),
                Err(_) => {}
            }
        }

        result
    }

    fn free_locked(cb: &mut ControlBlock, block: NonNull<u8>) -> Result<(), Error> {
        let index = Pool::block_index(cb, block.as_ptr());
        let bitmap = Bitmap::new(cb.bitmap_ptr, cb.bitmap_bytes);

        if !bitmap.is_set(index) {
            return Err(Error::DoubleFree);
        }

        // SAFETY: `block` was validated as an in-range, block-aligned
        // address by the caller, and the bitmap confirms it is currently
        // allocated (not already on the free list).
        unsafe { cb.free_list.push(block) };
        bitmap.clear(index);

        cb.stats.free_blocks = (cb.stats.free_blocks + 1).min(cb.stats.total_blocks);
        cb.stats.free_count += 1;
        cb.stats.used_blocks = cb.stats.total_blocks - cb.stats.free_blocks;

        Ok(())
    }

    /// Revokes every outstanding allocation and restores all blocks to the
    /// free list, in the same canonical order `init` builds it in.
    ///
    /// Any pointer returned by a prior `alloc` must be treated as invalid
    /// after this call: freeing it afterwards finds a cleared bitmap bit
    /// and returns [`Error::DoubleFree`] rather than corrupting the pool.
    pub fn reset(&self) {
        // See `alloc` for why reading the hook alone, unlocked, is safe.
        let hook = self.read().hook;

        {
            let _guard = hook.enter();
            let mut cb = self.read();
            debug_assert!(cb.initialized, "Pool always wraps an initialized control block");

            Bitmap::new(cb.bitmap_ptr, cb.bitmap_bytes).clear_all();

            cb.free_list = FreeList::empty();
            for i in 0..cb.total_blocks {
                // SAFETY: mirrors `init`'s free-list construction: `i` is in
                // range and every block is at least pointer-sized.
                let ptr = unsafe { cb.blocks_start.add(i as usize * cb.block_size as usize) };
                let ptr = unsafe { NonNull::new_unchecked(ptr) };
                unsafe { cb.free_list.push(ptr) };
            }

            cb.stats.free_blocks = cb.stats.total_blocks;
            cb.stats.used_blocks = 0;
            cb.stats.alloc_count = 0;
            cb.stats.free_count = 0;
            cb.stats.peak_usage = 0;

            self.write(cb);

            #[cfg(feature = "log")]
            log::debug!("blockpool: reset, total_blocks={}", cb.stats.total_blocks);
        }
    }

    /// Returns a snapshot of the pool's current counters and gauges.
    #[must_use]
    pub fn get_stats(&self) -> Stats {
        // See `alloc` for why reading the hook alone, unlocked, is safe. The
        // stats themselves are only read once the lock is held, so the
        // snapshot can't observe a write straddling another thread's
        // critical section.
        let hook = self.read().hook;
        let _guard = hook.enter();
        self.read().stats
    }

    /// Returns whether `ptr` lies within this pool's blocks region.
    ///
    /// A pure range test: it does not check block alignment and does not
    /// consult the bitmap, so it does not distinguish an allocated block
    /// from a free one. A null pointer always yields `false`.
    #[must_use]
    pub fn contains(&self, ptr: *const u8) -> bool {
        if ptr.is_null() {
            return false;
        }
        let cb = self.read();
        let (start, span) = Self::blocks_span(&cb);
        let addr = ptr as usize;
        addr >= start && addr < start + span
    }

    /// Installs (or clears) the critical-section hook.
    ///
    /// If either `lock` or `unlock` is `None`, synchronization is disabled
    /// and any previously installed pair is cleared. Call this after
    /// `init` and before the pool is shared with any concurrent actor;
    /// reinstalling while concurrent access is already underway is not
    /// supported.
    pub fn set_sync(&self, lock: Option<LockFn>, unlock: Option<UnlockFn>, ctx: *mut ()) {
        let mut cb = self.read();
        cb.hook.install(lock, unlock, ctx);
        self.write(cb);
    }
}
