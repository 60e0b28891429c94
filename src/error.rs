//! Error types returned by fatal conditions described in the crate's invariant
//! and misuse contracts.

use thiserror::Error;

/// Catch-all error for this crate.
///
/// Every fatal condition the driver can hit - misuse, a violated invariant, or
/// resource exhaustion - is returned as one of these variants rather than a
/// panic, so a caller can report it instead of crashing the whole process.
#[derive(Debug, Error)]
pub enum Error {
    /// The caller passed something the API contract forbids: fewer than two
    /// valuations, non-concave Maille-Tuffin bids, or a malformed grid shape.
    #[error("{0}")]
    Misuse(String),
    /// A consistency check the driver performs on its own output failed:
    /// allocations don't sum to `used_resources`, forward and reverse welfare
    /// disagree, or a payment fell outside `[0, v_i(a_i)]`.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Allocating a Joint Grid of the requested shape failed.
    #[error("failed to allocate a joint grid of shape {shape:?}")]
    Alloc {
        /// The shape that could not be allocated.
        shape: Vec<usize>,
    },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
