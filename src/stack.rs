//! Stack growth for the recursive passes (parser, validator, interpreter).
//!
//! Evaluation depth is bounded by `RuntimeConfig::max_depth`, not by the
//! caller's thread stack, so every recursive step runs through
//! `ensure_sufficient_stack`.

/// Keep at least this much stack free before recursing.
const RED_ZONE: usize = 128 * 1024;

/// Size of each new stack segment.
const STACK_PER_RECURSION: usize = 2 * 1024 * 1024;

#[inline]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}
