//! Optional caller-supplied critical-section hook.
//!
//! The pool never names a concrete synchronization primitive. Instead it
//! accepts an optional `(lock, unlock, ctx)` triple and invokes `lock(ctx)`
//! before every mutating region and `unlock(ctx)` after, on every return
//! path, via the [`CriticalSection`] guard below. Without a hook installed,
//! the pool must be used single-threaded — the crate has no atomics of its
//! own, by design (see the specification's concurrency section).

/// A caller-supplied lock function.
///
/// Must not panic and must not call back into the pool it guards. `ctx` is
/// the opaque pointer passed to [`Hook::install`]; the pool never
/// dereferences it.
pub type LockFn = unsafe fn(ctx: *mut ());

/// A caller-supplied unlock function. See [`LockFn`].
pub type UnlockFn = unsafe fn(ctx: *mut ());

/// The installed (or absent) critical-section hook.
#[derive(Clone, Copy)]
pub(crate) struct Hook {
    lock: Option<LockFn>,
    unlock: Option<UnlockFn>,
    ctx: *mut (),
}

impl Hook {
    pub(crate) const fn none() -> Self {
        Self { lock: None, unlock: None, ctx: core::ptr::null_mut() }
    }

    /// Installs `lock`/`unlock`/`ctx`. Per the specification, if either
    /// callback is `None`, synchronization is disabled and any previously
    /// installed pair is cleared — a hook is only active with both present.
    pub(crate) fn install(&mut self, lock: Option<LockFn>, unlock: Option<UnlockFn>, ctx: *mut ()) {
        match (lock, unlock) {
            (Some(l), Some(u)) => {
                self.lock = Some(l);
                self.unlock = Some(u);
                self.ctx = ctx;
            }
            _ => *self = Self::none(),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.lock.is_some() && self.unlock.is_some()
    }

    /// Enters the critical section, returning a guard that releases it on
    /// `Drop`. A no-op guard is returned when no hook is installed.
    ///
    /// Takes `self` by value (`Hook` is `Copy`) rather than by reference so
    /// the guard carries no borrow of the control block it was read out
    /// of — callers mutate that control block while the guard is held.
    pub(crate) fn enter(self) -> CriticalSection {
        if self.is_active() {
            if let Some(lock) = self.lock {
                // SAFETY: `lock` was supplied by the caller via `install`
                // and is required by contract not to panic or reenter the
                // pool. `ctx` is the opaque pointer the same caller paired
                // with it.
                unsafe { lock(self.ctx) };
            }
        }
        CriticalSection { unlock: self.unlock, ctx: self.ctx }
    }
}

/// RAII guard over the pool's critical section.
///
/// Acquired by [`Hook::enter`]; releases via `unlock` on `Drop`, so every
/// mutating entry point releases the lock on every return path — including
/// early returns — without repeating the unlock call at each one.
pub(crate) struct CriticalSection {
    unlock: Option<UnlockFn>,
    ctx: *mut (),
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        if let Some(unlock) = self.unlock {
            // SAFETY: see `Hook::enter`; `unlock` is paired with the `lock`
            // call that produced this guard and shares its contract.
            unsafe { unlock(self.ctx) };
        }
    }
}
