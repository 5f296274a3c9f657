//! Error taxonomy for the harmonic memory engine.
//!
//! Configuration errors and malformed inputs fail fast: silently proceeding with an
//! unsupported tuning or an out-of-limit coordinate would corrupt the lattice.

use thiserror::Error;

use crate::monzo::PRIMES;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HarmonicError {
    /// Only tunings with a precomputed candidate-ratio table are usable.
    #[error("unsupported tuning: {0}-edo has no candidate ratio table")]
    UnsupportedEdo(u32),

    /// A ratio contains a prime factor outside the supported prime table.
    #[error("ratio {num}/{den} exceeds the {limit}-limit", limit = PRIMES[PRIMES.len() - 1])]
    PrimeLimitExceeded { num: u64, den: u64 },

    /// Ratios must have nonzero numerator and denominator.
    #[error("zero is not a valid ratio term")]
    ZeroRatio,

    /// A coordinate was supplied with more axes than the prime table supports.
    #[error("coordinate has {0} axes, but the prime table only covers {max}", max = PRIMES.len())]
    TooManyAxes(usize),

    /// The external resolution strategy needs the caller to supply the coordinate.
    #[error("the external resolution strategy requires an explicit coordinate")]
    MissingExplicitCoordinate,

    /// Non-external strategies resolve coordinates themselves.
    #[error("an explicit coordinate was supplied, but the active strategy resolves notes itself")]
    UnexpectedExplicitCoordinate,
}
