//! Prime-exponent lattice coordinates ("monzos").
//!
//! A [Monzo] is an ordered list of integer exponents over [PRIMES], representing the exact
//! frequency ratio `2^e0 * 3^e1 * 5^e2 * 7^e3 * 11^e4`. All interval arithmetic in the engine is
//! exact integer vector arithmetic on these exponents; floats only appear at the very edges
//! (frequencies, distances, screen-space projection).
//!
//! Two exponent encodings are supported, selected once per engine via [PrimeEncoding]:
//!
//! * [PrimeEncoding::Absolute]: `e0` is the true power of 2.
//! * [PrimeEncoding::OctaveReduced]: every non-2 axis stores the exponent of the octave-reduced
//!   version of that prime (3/2, 5/4, 7/4, 11/8), and `e0` absorbs the octave carry. In this
//!   encoding one step along the 3-axis is a perfect fifth rather than a twelfth, which makes
//!   unit lattice edges match the intervals the renderer draws.

use crate::error::HarmonicError;

/// The supported prime table. Intervals beyond the 11-limit are rejected.
pub const PRIMES: [u32; 5] = [2, 3, 5, 7, 11];

/// Octaves folded into each prime when the octave-reduced encoding is active:
/// 3 -> 3/2, 5 -> 5/4, 7 -> 7/4, 11 -> 11/8.
const OCTAVE_CARRY: [i32; 5] = [0, 1, 2, 2, 3];

/// Fixed per-prime screen-space projection (angle in degrees, length) used to flatten the
/// 5-dimensional lattice into 2D for the renderer.
const PROJ_ANGLE_DEG: [f64; 5] = [90.0, 0.0, 30.0, 20.0, 40.0];
const PROJ_LEN: [f64; 5] = [4.0, 6.0, 5.0, 8.0, 7.0];

/// Which exponent convention monzos are written in. Must be applied consistently across an
/// entire engine instance; mixing encodings silently produces nonsense coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimeEncoding {
    Absolute,
    OctaveReduced,
}

/// An exact tuning-lattice coordinate: one integer exponent per prime in [PRIMES].
///
/// Canonical form trims trailing zero exponents, so `[−1, 1]` and `[−1, 1, 0, 0]` are the same
/// coordinate and hash identically. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Monzo {
    exponents: Vec<i32>,
}

impl Monzo {
    /// The zero vector, i.e. the ratio 1/1.
    pub fn unison() -> Monzo {
        Monzo { exponents: vec![] }
    }

    /// A pure power of two.
    pub fn octaves(n: i32) -> Monzo {
        Monzo::canonical(vec![n])
    }

    /// Construct from raw exponents. Fails if more axes are given than [PRIMES] covers.
    pub fn new(exponents: Vec<i32>) -> Result<Monzo, HarmonicError> {
        if exponents.len() > PRIMES.len() {
            return Err(HarmonicError::TooManyAxes(exponents.len()));
        }
        Ok(Monzo::canonical(exponents))
    }

    fn canonical(mut exponents: Vec<i32>) -> Monzo {
        while exponents.last() == Some(&0) {
            exponents.pop();
        }
        Monzo { exponents }
    }

    /// Prime-factorize `num/den` into a monzo under the given encoding.
    ///
    /// Errors if either term is zero or contains a prime factor beyond the 11-limit.
    pub fn from_ratio(num: u64, den: u64, encoding: PrimeEncoding) -> Result<Monzo, HarmonicError> {
        if num == 0 || den == 0 {
            return Err(HarmonicError::ZeroRatio);
        }
        let mut exponents = vec![0i32; PRIMES.len()];
        let mut factorize = |mut n: u64, sign: i32| -> Result<(), HarmonicError> {
            for (axis, &p) in PRIMES.iter().enumerate() {
                while n % p as u64 == 0 {
                    exponents[axis] += sign;
                    n /= p as u64;
                }
            }
            if n != 1 {
                return Err(HarmonicError::PrimeLimitExceeded { num, den });
            }
            Ok(())
        };
        factorize(num, 1)?;
        factorize(den, -1)?;

        if encoding == PrimeEncoding::OctaveReduced {
            for axis in 1..PRIMES.len() {
                exponents[0] += OCTAVE_CARRY[axis] * exponents[axis];
            }
        }
        Ok(Monzo::canonical(exponents))
    }

    /// Nearest lattice point to a rational-valued (per-axis float) coordinate. Axes beyond the
    /// prime table are ignored.
    ///
    /// Only used to derive the effective origin from the centroid; short-term-memory members are
    /// never rounded.
    pub fn rounded(axes: &[f64]) -> Monzo {
        Monzo::canonical(axes.iter().take(PRIMES.len()).map(|x| x.round() as i32).collect())
    }

    /// The exponent on the given axis, zero-padded beyond the canonical length.
    pub fn exponent(&self, axis: usize) -> i32 {
        self.exponents.get(axis).copied().unwrap_or(0)
    }

    /// Number of axes in canonical (trailing-zero-trimmed) form.
    pub fn len(&self) -> usize {
        self.exponents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exponents.is_empty()
    }

    /// Exact vector addition over the padded union of both operands' axes.
    pub fn add(&self, other: &Monzo) -> Monzo {
        let n = self.exponents.len().max(other.exponents.len());
        Monzo::canonical((0..n).map(|i| self.exponent(i) + other.exponent(i)).collect())
    }

    /// Exact vector subtraction.
    pub fn sub(&self, other: &Monzo) -> Monzo {
        let n = self.exponents.len().max(other.exponents.len());
        Monzo::canonical((0..n).map(|i| self.exponent(i) - other.exponent(i)).collect())
    }

    /// Log-weighted L1 norm: `Σ |e_i| · log2(p_i)`.
    ///
    /// Larger primes and larger exponents cost more. This is the heuristic complexity metric
    /// used for eviction ceilings and nearest-node tie-breaks throughout the engine.
    pub fn harmonic_distance_from_origin(&self) -> f64 {
        self.exponents
            .iter()
            .zip(PRIMES.iter())
            .map(|(&e, &p)| e.unsigned_abs() as f64 * (p as f64).log2())
            .sum()
    }

    /// Harmonic distance between two lattice points. Symmetric.
    pub fn harmonic_distance(&self, other: &Monzo) -> f64 {
        other.sub(self).harmonic_distance_from_origin()
    }

    /// Harmonic distance to a rational-valued point (e.g. the centroid of the short-term
    /// memory, whose axes are means and generally not integers).
    pub fn harmonic_distance_to_point(&self, axes: &[f64]) -> f64 {
        let n = self.exponents.len().max(axes.len()).min(PRIMES.len());
        (0..n)
            .map(|i| {
                let t = axes.get(i).copied().unwrap_or(0.0);
                (self.exponent(i) as f64 - t).abs() * (PRIMES[i] as f64).log2()
            })
            .sum()
    }

    /// Lattice edge-existence predicate.
    ///
    /// Returns 0 unless `other` differs from `self` by exactly one unit step along exactly one
    /// axis, in which case returns the prime of that axis, negated if `other` is a step *down*.
    /// E.g. a return of -5 means `other` is one 5-axis step below `self`.
    pub fn check_adjacent(&self, other: &Monzo) -> i32 {
        let diff = other.sub(self);
        if diff.exponents.iter().any(|x| x.abs() > 1) {
            return 0;
        }
        let mut num_ones = 0;
        let mut prime = 0;
        for (axis, &x) in diff.exponents.iter().enumerate() {
            if x == 1 || x == -1 {
                num_ones += 1;
                prime = PRIMES[axis] as i32 * x;
            }
        }
        if num_ones == 1 {
            prime
        } else {
            0
        }
    }

    /// Exponents with octave-reduction undone, i.e. true prime powers.
    fn absolute_exponents(&self, encoding: PrimeEncoding) -> Vec<i32> {
        let mut exps: Vec<i32> = (0..PRIMES.len()).map(|i| self.exponent(i)).collect();
        if encoding == PrimeEncoding::OctaveReduced {
            for axis in 1..PRIMES.len() {
                exps[0] -= OCTAVE_CARRY[axis] * exps[axis];
            }
        }
        exps
    }

    /// Reconstruct the (numerator, denominator) pair from the absolute exponents.
    pub fn to_ratio(&self, encoding: PrimeEncoding) -> (u128, u128) {
        let mut num = 1u128;
        let mut den = 1u128;
        for (axis, &e) in self.absolute_exponents(encoding).iter().enumerate() {
            if e > 0 {
                num *= (PRIMES[axis] as u128).pow(e as u32);
            } else if e < 0 {
                den *= (PRIMES[axis] as u128).pow(e.unsigned_abs());
            }
        }
        (num, den)
    }

    /// The frequency of this coordinate relative to a fundamental.
    pub fn to_frequency(&self, fundamental: f64, encoding: PrimeEncoding) -> f64 {
        self.absolute_exponents(encoding)
            .iter()
            .enumerate()
            .fold(fundamental, |f, (axis, &e)| f * (PRIMES[axis] as f64).powi(e))
    }

    /// Flatten the lattice position into unscaled 2D screen coordinates using the fixed
    /// per-prime projection table. Consumed by the renderer for ball/scaffolding placement.
    pub fn unscaled_coords(&self) -> (f64, f64) {
        point_unscaled_coords(&self.exponents.iter().map(|&e| e as f64).collect::<Vec<f64>>())
    }
}

/// Projection of a rational-valued lattice point (e.g. the centroid) into 2D screen space.
pub fn point_unscaled_coords(axes: &[f64]) -> (f64, f64) {
    let mut x = 0.0;
    let mut y = 0.0;
    for (axis, &e) in axes.iter().enumerate().take(PRIMES.len()) {
        let theta = PROJ_ANGLE_DEG[axis].to_radians();
        x += e * theta.cos() * PROJ_LEN[axis];
        y += e * theta.sin() * PROJ_LEN[axis];
    }
    (x, y)
}

impl std::fmt::Display for Monzo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, e) in self.exponents.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", e)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapidhash::RapidHashMap as HashMap;

    fn m(exps: &[i32]) -> Monzo {
        Monzo::new(exps.to_vec()).unwrap()
    }

    #[test]
    fn canonical_equality_ignores_trailing_zeros() {
        assert_eq!(m(&[1, 0, 0]), m(&[1]));
        assert_eq!(m(&[0, 0, 0]), Monzo::unison());

        let mut map: HashMap<Monzo, u32> = HashMap::default();
        map.insert(m(&[-1, 1, 0, 0, 0]), 1);
        assert_eq!(map.get(&m(&[-1, 1])), Some(&1));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn add_sub_round_trip() {
        let a = m(&[-3, 2, 0, 1]);
        let b = m(&[1, -1, 2]);
        assert_eq!(a.add(&b).sub(&b), a);
        assert_eq!(a.add(&b), b.add(&a));
        assert_eq!(a.sub(&a), Monzo::unison());
    }

    #[test]
    fn from_ratio_factorizes_exactly() {
        assert_eq!(Monzo::from_ratio(3, 2, PrimeEncoding::Absolute).unwrap(), m(&[-1, 1]));
        assert_eq!(Monzo::from_ratio(45, 44, PrimeEncoding::Absolute).unwrap(), m(&[-2, 2, 1, 0, -1]));
        // 3/2 octave-reduced: the fifth is a unit step on the 3-axis.
        assert_eq!(Monzo::from_ratio(3, 2, PrimeEncoding::OctaveReduced).unwrap(), m(&[0, 1]));
        // 5/4 octave-reduced: unit step on the 5-axis.
        assert_eq!(Monzo::from_ratio(5, 4, PrimeEncoding::OctaveReduced).unwrap(), m(&[0, 0, 1]));

        assert_eq!(
            Monzo::from_ratio(13, 8, PrimeEncoding::Absolute),
            Err(HarmonicError::PrimeLimitExceeded { num: 13, den: 8 })
        );
        assert_eq!(Monzo::from_ratio(0, 1, PrimeEncoding::Absolute), Err(HarmonicError::ZeroRatio));
    }

    #[test]
    fn ratio_round_trip_undoes_octave_reduction() {
        for &(num, den) in &[(3u64, 2u64), (5, 4), (7, 4), (11, 8), (45, 44), (9, 8), (16, 15)] {
            for encoding in [PrimeEncoding::Absolute, PrimeEncoding::OctaveReduced] {
                let monzo = Monzo::from_ratio(num, den, encoding).unwrap();
                assert_eq!(monzo.to_ratio(encoding), (num as u128, den as u128));
            }
        }
    }

    #[test]
    fn to_frequency() {
        let fifth = Monzo::from_ratio(3, 2, PrimeEncoding::OctaveReduced).unwrap();
        assert!((fifth.to_frequency(440.0, PrimeEncoding::OctaveReduced) - 660.0).abs() < 1e-9);
        let fifth = Monzo::from_ratio(3, 2, PrimeEncoding::Absolute).unwrap();
        assert!((fifth.to_frequency(440.0, PrimeEncoding::Absolute) - 660.0).abs() < 1e-9);
    }

    #[test]
    fn distance_symmetry() {
        let a = m(&[-1, 1]);
        let b = m(&[2, 0, -1]);
        assert!((a.harmonic_distance(&b) - b.harmonic_distance(&a)).abs() < 1e-12);
        assert!((m(&[1, 1]).harmonic_distance_from_origin() - (1.0 + 3f64.log2())).abs() < 1e-12);
    }

    #[test]
    fn adjacency_depends_on_encoding() {
        // Octave-reduced: 3/2 is a single 3-axis step from 1/1.
        let fifth = Monzo::from_ratio(3, 2, PrimeEncoding::OctaveReduced).unwrap();
        assert_eq!(fifth.check_adjacent(&Monzo::unison()), -3);
        assert_eq!(Monzo::unison().check_adjacent(&fifth), 3);

        let third = Monzo::from_ratio(5, 4, PrimeEncoding::OctaveReduced).unwrap();
        assert_eq!(Monzo::unison().check_adjacent(&third), 5);

        // Absolute encoding: 3/2 = [-1, 1] differs on two axes, so no direct edge.
        let fifth = Monzo::from_ratio(3, 2, PrimeEncoding::Absolute).unwrap();
        assert_eq!(fifth.check_adjacent(&Monzo::unison()), 0);
        // 5/4 = [-2, 0, 1] has a step of magnitude 2, also no edge.
        let third = Monzo::from_ratio(5, 4, PrimeEncoding::Absolute).unwrap();
        assert_eq!(Monzo::unison().check_adjacent(&third), 0);

        // Same coordinate is not adjacent to itself.
        assert_eq!(fifth.check_adjacent(&fifth), 0);
    }

    #[test]
    fn rounding_and_point_distance() {
        let centroid = [0.4, 0.6, -0.5];
        assert_eq!(Monzo::rounded(&centroid), m(&[0, 1, -1]));
        // Excess axes are dropped rather than building an out-of-table coordinate.
        assert_eq!(Monzo::rounded(&[0.1, 1.2, 0.0, 0.0, 0.9, 7.0]), m(&[0, 1, 0, 0, 1]));
        // A lattice point at distance 0 from itself as a float point.
        assert!(m(&[1, 2]).harmonic_distance_to_point(&[1.0, 2.0]) < 1e-12);
    }
}
