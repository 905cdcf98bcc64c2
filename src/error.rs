//! Stable error taxonomy for the pool.
//!
//! Every fallible operation on [`crate::Pool`] returns `Result<T, Error>`; `OK`
//! from the specification is simply the `Ok` side of that `Result` rather than
//! a member of this enum. [`strerror`] gives every variant a stable, non-empty
//! string, mirroring the C-style `strerror` a caller-facing allocator API is
//! expected to offer.

use core::fmt;

/// Reasons a pool operation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// A required pointer argument was null.
    NullPointer,
    /// A size argument was invalid: too small, zero, or the layout planner
    /// could not fit even a single block.
    InvalidSize,
    /// `alloc` was called while `free_blocks == 0`.
    OutOfMemory,
    /// A pointer passed to `free` falls outside the blocks region, or does
    /// not sit on a block boundary.
    InvalidBlock,
    /// The requested alignment is not a power of two, or the pool region is
    /// not aligned to it.
    Alignment,
    /// A pointer passed to `free` is on a block boundary, but the block's
    /// bitmap bit is already clear.
    DoubleFree,
    /// The operation requires an initialized pool, but `init` has not
    /// (successfully) run on this handle.
    NotInitialized,
}

impl Error {
    /// Stable, non-empty, human-readable string for this error.
    ///
    /// Equivalent to the free function [`strerror`]; kept as an inherent
    /// method so callers that already have an `Error` in hand don't need to
    /// import a second item.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Error::NullPointer => "a required pointer argument was null",
            Error::InvalidSize => "invalid size: buffer too small or no layout fits",
            Error::OutOfMemory => "pool exhausted: no free blocks remain",
            Error::InvalidBlock => "pointer is not a valid block of this pool",
            Error::Alignment => "alignment is not a power of two, or the region is misaligned",
            Error::DoubleFree => "block is already free",
            Error::NotInitialized => "pool has not been initialized",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for Error {}

/// Returns a stable, human-readable string for `err`.
///
/// Matches the specification's `strerror` as a free function rather than a
/// method, for callers that only have an error code in hand. The
/// specification's "unknown value" case — a code that doesn't map to any
/// known variant — is structurally unreachable here: `err` is always a
/// value of the closed `Error` enum, not a raw integer crossing a wire or
/// FFI boundary, so there is no way to construct one that isn't already one
/// of the variants matched in [`Error::as_str`].
#[must_use]
pub const fn strerror(err: Error) -> &'static str {
    err.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_non_empty_message() {
        let variants = [
            Error::NullPointer,
            Error::InvalidSize,
            Error::OutOfMemory,
            Error::InvalidBlock,
            Error::Alignment,
            Error::DoubleFree,
            Error::NotInitialized,
        ];
        for err in variants {
            assert!(!strerror(err).is_empty());
            assert_eq!(strerror(err), err.as_str());
        }
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(Error::OutOfMemory.to_string(), Error::OutOfMemory.as_str());
    }
}
