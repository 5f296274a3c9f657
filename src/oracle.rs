//! Dissonance scoring, abstracted behind [DissonanceScorer] so the engine's memory logic is
//! testable with deterministic stubs.
//!
//! The engine only ever asks three questions: how rough is this set of frequencies, which of a
//! nested matrix of candidate frequency sets is the smoothest, and which currently-remembered
//! note would reduce roughness the most if forgotten. The production answer is [SetharesScorer];
//! anything implementing the trait works.

/// Synchronous, pure dissonance oracle. All methods must be deterministic given identical input
/// order; ties resolve to the earliest index.
pub trait DissonanceScorer {
    /// Scalar roughness of a set of simultaneous frequencies. An empty set scores 0.
    fn score(&self, freqs: &[f64]) -> f64;

    /// The (group, item) of the lowest-scoring frequency set across a nested candidate matrix,
    /// or `None` if the matrix contains no sets.
    fn best_candidate(&self, matrix: &[Vec<Vec<f64>>]) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for (group, sets) in matrix.iter().enumerate() {
            for (item, freqs) in sets.iter().enumerate() {
                let diss = self.score(freqs);
                if best.map_or(true, |(_, _, b)| diss < b) {
                    best = Some((group, item, diss));
                }
            }
        }
        best.map(|(group, item, _)| (group, item))
    }

    /// Index of the member whose removal most reduces the score.
    ///
    /// The last entry is the newest note and is never offered up; `None` if there are fewer
    /// than two entries.
    fn worst_offender(&self, freqs: &[f64]) -> Option<usize> {
        if freqs.len() < 2 {
            return None;
        }
        let mut min_dissonance = f64::MAX;
        let mut offender = 0;
        for i in 0..freqs.len() - 1 {
            let (left, right) = freqs.split_at(i);
            let minus_one = [left, &right[1..]].concat();
            let diss = self.score(&minus_one);
            if diss < min_dissonance {
                min_dissonance = diss;
                offender = i;
            }
        }
        Some(offender)
    }
}

/// Plomp-Levelt style roughness slope parameters.
const A: f64 = 3.5;
const B: f64 = 5.75;
const D_MAX: f64 = 0.24;
const S_1: f64 = 0.0207;
const S_2: f64 = 18.96;

/// How many harmonics each tone contributes to the partial list.
const NUM_HARMONICS: i32 = 16;

/// Amplitude rolloff per harmonic.
const AMP_ROLLOFF: f64 = 0.88;

/// Sethares roughness over the pairwise interference of all partials.
///
/// Each input frequency contributes [NUM_HARMONICS] harmonics with geometrically decaying
/// amplitude; every pair of partials adds roughness according to its distance relative to the
/// critical band around the lower partial.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetharesScorer;

impl DissonanceScorer for SetharesScorer {
    fn score(&self, freqs: &[f64]) -> f64 {
        if freqs.is_empty() {
            return 0.0;
        }

        let mut partials = Vec::with_capacity(freqs.len() * NUM_HARMONICS as usize);
        for &f in freqs {
            for h in 1..=NUM_HARMONICS {
                partials.push((f * h as f64, AMP_ROLLOFF.powi(h - 1)));
            }
        }
        partials.sort_by(|(f1, _), (f2, _)| f1.total_cmp(f2));

        let mut dissonance = 0.0;
        for i in 0..partials.len() - 1 {
            for j in (i + 1)..partials.len() {
                let (f1, a1) = partials[i];
                let (f2, a2) = partials[j];

                let amplitude_of_interference = a1.max(a2);
                // Critical bandwidth scaling around the lower partial. f2 >= f1 after the sort.
                let s = D_MAX / (S_1 * f1 + S_2);
                let x = s * (f2 - f1);
                let d = (-A * x).exp() - (-B * x).exp();
                dissonance += amplitude_of_interference * d;
            }
        }

        dissonance
    }
}
