//! Tempered-step to just-intonation candidate generation.
//!
//! Notes arrive as 31-edo step indices. For a given step difference between two notes, the
//! [TuningTable] returns the finite set of plausible justly-tuned intervals that could explain
//! that tempered interval: a fixed lookup keyed by the step class (difference modulo 31), plus an
//! octave offset from the integer division.

use crate::error::HarmonicError;
use crate::monzo::{Monzo, PrimeEncoding};

/// Approximate 11-limit ratios of each 31-edo step class.
///
/// DO NOT MODIFY THE VALUES! The engine's entire candidate search space is this table; changing
/// an entry changes which lattice points a tempered pitch may be heard as.
const RATIOS31: [&[(u64, u64)]; 31] = [
    &[(1, 1)],
    &[(45, 44), (49, 48), (128, 125), (36, 35)],
    &[(25, 24), (21, 20), (22, 21)],
    &[(15, 14), (16, 15)],
    &[(12, 11), (11, 10), (35, 32)],
    &[(9, 8), (10, 9), (28, 25)],
    &[(8, 7), (144, 125)],
    &[(7, 6), (75, 64)],
    &[(6, 5), (25, 21)],
    &[(11, 9), (27, 22), (60, 49), (49, 40)],
    &[(5, 4)],
    &[(9, 7), (14, 11), (32, 25)],
    &[(21, 16), (125, 96)],
    &[(4, 3)],
    &[(11, 8), (15, 11)],
    &[(7, 5), (45, 32), (25, 18)],
    &[(10, 7), (64, 45), (36, 25)],
    &[(16, 11), (22, 15)],
    &[(3, 2)],
    &[(32, 21), (192, 125)],
    &[(14, 9), (11, 7), (25, 16)],
    &[(8, 5)],
    &[(18, 11), (44, 27), (49, 30), (80, 49)],
    &[(5, 3), (42, 25)],
    &[(12, 7), (128, 75)],
    &[(7, 4), (125, 72)],
    &[(16, 9), (9, 5), (25, 14)],
    &[(11, 6), (20, 11), (64, 35)],
    &[(28, 15), (15, 8)],
    &[(48, 25), (40, 21), (21, 11)],
    &[(88, 45), (96, 49), (125, 64), (35, 18)],
];

/// Number of steps in a perfect fifth of 31-edo.
const FIFTH_STEPS_31: u32 = 18;

/// Candidate lookup for one equal division of the octave, built once per engine with the active
/// prime encoding baked in.
#[derive(Debug, Clone)]
pub struct TuningTable {
    edo: u32,
    steps: Vec<Vec<Monzo>>,
    /// `fifths_of_step[s]` = position of step class `s` on the circle of fifths.
    fifths_of_step: Vec<u32>,
    fifth_steps: u32,
}

impl TuningTable {
    /// Build the candidate table for the given tuning. Only 31-edo has a ratio table; any other
    /// size is a configuration error.
    pub fn new(edo: u32, encoding: PrimeEncoding) -> Result<TuningTable, HarmonicError> {
        if edo != 31 {
            return Err(HarmonicError::UnsupportedEdo(edo));
        }
        let mut steps = Vec::with_capacity(RATIOS31.len());
        for ratios in RATIOS31.iter() {
            let coords = ratios
                .iter()
                .map(|&(num, den)| Monzo::from_ratio(num, den, encoding))
                .collect::<Result<Vec<Monzo>, HarmonicError>>()?;
            steps.push(coords);
        }

        // 31 and 18 are coprime, so stacking fifths visits every step class exactly once.
        let mut fifths_of_step = vec![0u32; edo as usize];
        for fifths in 0..edo {
            fifths_of_step[(fifths * FIFTH_STEPS_31 % edo) as usize] = fifths;
        }

        Ok(TuningTable {
            edo,
            steps,
            fifths_of_step,
            fifth_steps: FIFTH_STEPS_31,
        })
    }

    pub fn edo(&self) -> u32 {
        self.edo
    }

    /// Steps per perfect fifth in this tuning.
    pub fn fifth_steps(&self) -> u32 {
        self.fifth_steps
    }

    /// All plausible just intervals explaining a tempered step difference.
    ///
    /// The step delta splits into an octave offset (integer division) and a step class (modulo),
    /// and each table entry for the class is shifted by that many octaves.
    pub fn candidates(&self, step_delta: i32) -> Vec<Monzo> {
        let octaves = step_delta.div_euclid(self.edo as i32);
        let class = step_delta.rem_euclid(self.edo as i32) as usize;
        let octave = Monzo::octaves(octaves);
        self.steps[class].iter().map(|c| c.add(&octave)).collect()
    }

    /// Position of a step on the circle of fifths, in 0..edo.
    pub fn steps_to_fifths(&self, steps: i32) -> u32 {
        self.fifths_of_step[steps.rem_euclid(self.edo as i32) as usize]
    }

    /// Convert a (possibly fractional) circle-of-fifths position back into a step count
    /// modulo the tuning size.
    pub fn fifths_to_steps(&self, fifths: f64) -> f64 {
        (fifths * self.fifth_steps as f64).rem_euclid(self.edo as f64)
    }

    /// The tempered frequency of a step index relative to the fundamental.
    pub fn step_frequency(&self, fundamental: f64, steps: i32) -> f64 {
        fundamental * 2f64.powf(steps as f64 / self.edo as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_edo_fails_fast() {
        assert_eq!(
            TuningTable::new(12, PrimeEncoding::OctaveReduced).unwrap_err(),
            HarmonicError::UnsupportedEdo(12)
        );
    }

    #[test]
    fn table_covers_every_step_class() {
        let table = TuningTable::new(31, PrimeEncoding::OctaveReduced).unwrap();
        for class in 0..31 {
            assert!(!table.candidates(class).is_empty());
        }
        // The fifth class has exactly one interpretation: 3/2.
        let fifth = table.candidates(18);
        assert_eq!(fifth.len(), 1);
        assert_eq!(fifth[0], Monzo::from_ratio(3, 2, PrimeEncoding::OctaveReduced).unwrap());
    }

    #[test]
    fn candidates_carry_octave_offsets() {
        let table = TuningTable::new(31, PrimeEncoding::OctaveReduced).unwrap();
        // -13 steps = a fourth below = 3/4.
        let down_fourth = table.candidates(-13);
        assert_eq!(down_fourth.len(), 1);
        assert_eq!(down_fourth[0], Monzo::from_ratio(3, 4, PrimeEncoding::OctaveReduced).unwrap());

        // 49 steps = an octave above the fifth = 3/1.
        let twelfth = table.candidates(49);
        assert_eq!(twelfth[0], Monzo::from_ratio(3, 1, PrimeEncoding::OctaveReduced).unwrap());
    }

    #[test]
    fn circle_of_fifths_lookup() {
        let table = TuningTable::new(31, PrimeEncoding::OctaveReduced).unwrap();
        assert_eq!(table.steps_to_fifths(0), 0);
        assert_eq!(table.steps_to_fifths(18), 1);
        // A whole tone (5 steps) is two fifths up.
        assert_eq!(table.steps_to_fifths(5), 2);
        // Steps wrap modulo the tuning size.
        assert_eq!(table.steps_to_fifths(18 - 31), 1);

        assert!((table.fifths_to_steps(1.0) - 18.0).abs() < 1e-12);
        assert!((table.fifths_to_steps(2.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn step_frequency_is_tempered() {
        let table = TuningTable::new(31, PrimeEncoding::OctaveReduced).unwrap();
        assert!((table.step_frequency(440.0, 0) - 440.0).abs() < 1e-9);
        assert!((table.step_frequency(440.0, 31) - 880.0).abs() < 1e-9);
        // The tempered fifth of 31-edo is a couple cents flat of 3/2.
        let fifth = table.step_frequency(440.0, 18);
        assert!((fifth / 440.0 - 1.5).abs() < 0.005);
    }
}
