//! The harmonic memory state machine.
//!
//! A [HarmonicContext] models the listener's tonal short-term memory: a bounded set of [Pitch]
//! nodes, each justified as a just-intonation interval relative to another remembered note. Every
//! incoming note is resolved to the best-fitting lattice coordinate, linked into the memory, and
//! then the competing forgetting policies run until the memory invariants hold again:
//!
//! * the STM never exceeds [HarmonicConfig::max_short_term_memory] members;
//! * its aggregate dissonance never exceeds the fatigue-modulated ceiling;
//! * no member is further than [HarmonicConfig::max_harmonic_distance] from the newest note;
//! * notes that have not been heard for too many new notes (strikes) or too much wall-clock
//!   time are forgotten.
//!
//! All mutation is synchronous inside [HarmonicContext::register_note] and
//! [HarmonicContext::tick]; a single logical thread owns the memory.

use std::f64::consts::TAU;

use compute::statistics::mean;
use log::{debug, trace};
use rapidhash::RapidHashMap as HashMap;

use crate::edo::TuningTable;
use crate::error::HarmonicError;
use crate::keys::{KeyHold, SustainSource};
use crate::monzo::{point_unscaled_coords, Monzo, PrimeEncoding, PRIMES};
use crate::oracle::DissonanceScorer;
use crate::pitch::Pitch;

/// How an incoming tempered note is resolved to a lattice coordinate. Selected once at
/// construction; every variant shares the same surrounding eviction logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Score every (existing note, candidate interval) pair with the dissonance oracle and take
    /// the smoothest resulting sonority.
    OracleScored,
    /// Take the deduplicated candidate coordinate lattice-nearest to the centroid, then link it
    /// to whichever existing note is lattice-nearest to it.
    CentroidDistance,
    /// Like [Strategy::CentroidDistance], but measured from the effective origin.
    OriginDistance,
    /// The caller already knows the coordinate (e.g. explicit MIDI per-key tuning); no search.
    External,
}

/// Immutable engine configuration. Constructed once, passed to [HarmonicContext::new]; multiple
/// engines with different configurations can coexist.
#[derive(Debug, Clone)]
pub struct HarmonicConfig {
    /// Equal division of the octave notes arrive in. Only 31 has a candidate table.
    pub edo: u32,
    /// Frequency of step 0.
    pub fundamental: f64,
    /// Exponent encoding applied consistently to every coordinate in this engine.
    pub encoding: PrimeEncoding,
    pub strategy: Strategy,
    /// Hard STM capacity.
    pub max_short_term_memory: usize,
    /// Dissonance ceiling when fully rested (fatigue 0).
    pub max_dissonance: f64,
    /// Dissonance level considered consonant. Fatigue accumulates above it, the effective
    /// ceiling shrinks toward it, and the effective origin only moves below it.
    pub consonance_threshold: f64,
    /// Any old note further than this from a newly registered coordinate is forgotten.
    pub max_harmonic_distance: f64,
    /// How many genuinely new notes may pass before an unrefreshed note is forgotten.
    pub max_strikes: u32,
    /// Wall-clock forget time for released notes.
    pub forget_secs: f64,
    /// Wall-clock forget time for held or pedal-sustained notes. Should exceed
    /// [HarmonicConfig::forget_secs].
    pub forget_sustained_secs: f64,
    /// Seconds of maximally-exceeding dissonance needed to reach full fatigue.
    pub max_fatigue_secs: f64,
    /// Minimum dwell time between effective-origin updates, so the perceived key center does
    /// not flicker.
    pub min_origin_update_secs: f64,
    /// Ceilings on how far the effective origin's octave/fifth exponents may sit above the
    /// lowest currently in memory.
    pub max_origin_octaves: i32,
    pub max_origin_fifths: i32,
    /// Per-tick elapsed-time clamp, so a stalled host does not dump a huge delta into the
    /// fatigue integral and the staleness sweep.
    pub max_tick_secs: f64,
}

impl Default for HarmonicConfig {
    fn default() -> HarmonicConfig {
        HarmonicConfig {
            edo: 31,
            fundamental: 440.0,
            encoding: PrimeEncoding::OctaveReduced,
            strategy: Strategy::OracleScored,
            max_short_term_memory: 6,
            max_dissonance: 20.0,
            consonance_threshold: 10.0,
            max_harmonic_distance: 8.0,
            max_strikes: 8,
            forget_secs: 12.0,
            forget_sustained_secs: 30.0,
            max_fatigue_secs: 20.0,
            min_origin_update_secs: 0.5,
            max_origin_octaves: 2,
            max_origin_fifths: 2,
            max_tick_secs: 1.0,
        }
    }
}

/// What a registration resolved to: the snapshot of the note it was heard relative to (None for
/// the first note of a fresh context) and the relative interval from it. The renderer places the
/// new visual object at `origin.act() + relative`.
#[derive(Debug, Clone)]
pub struct Registration {
    pub origin: Option<Pitch>,
    pub relative: Monzo,
}

/// The orchestrating state machine. Generic over the dissonance oracle so tests can inject a
/// deterministic stub.
#[derive(Debug)]
pub struct HarmonicContext<S: DissonanceScorer> {
    config: HarmonicConfig,
    tuning: TuningTable,
    scorer: S,
    stm: Vec<Pitch>,
    /// Engine clock, advanced only by [HarmonicContext::tick].
    now: f64,
    dissonance: f64,
    fatigue: f64,
    /// Per-axis arithmetic mean of all STM coordinates. Rational-valued, never rounded.
    centroid: Vec<f64>,
    effective_origin: Monzo,
    /// Circular-mean circle-of-fifths position, in steps modulo the tuning size. Survives
    /// [HarmonicContext::reset]: the probable key stays the same.
    central_fifth: f64,
    last_origin_update: f64,
}

impl<S: DissonanceScorer> HarmonicContext<S> {
    pub fn new(config: HarmonicConfig, scorer: S) -> Result<HarmonicContext<S>, HarmonicError> {
        let tuning = TuningTable::new(config.edo, config.encoding)?;
        Ok(HarmonicContext {
            config,
            tuning,
            scorer,
            stm: Vec::new(),
            now: 0.0,
            dissonance: 0.0,
            fatigue: 0.0,
            centroid: vec![0.0; PRIMES.len()],
            effective_origin: Monzo::unison(),
            central_fifth: 0.0,
            last_origin_update: f64::NEG_INFINITY,
        })
    }

    /// Register a new note-on event.
    ///
    /// `explicit` must be given exactly when the engine was built with [Strategy::External];
    /// a mismatch fails before any state is touched, so a failed call leaves the memory exactly
    /// as it was.
    ///
    /// On return the STM capacity and dissonance invariants hold.
    pub fn register_note(
        &mut self,
        steps: i32,
        explicit: Option<Monzo>,
    ) -> Result<Registration, HarmonicError> {
        let explicit = match (self.config.strategy, explicit) {
            (Strategy::External, Some(act)) => Some(act),
            (Strategy::External, None) => return Err(HarmonicError::MissingExplicitCoordinate),
            (_, Some(_)) => return Err(HarmonicError::UnexpectedExplicitCoordinate),
            (_, None) => None,
        };

        if self.stm.is_empty() {
            let act = explicit.unwrap_or_else(Monzo::unison);
            let frequency = self.note_frequency(steps, &act);
            self.stm.push(Pitch::root(steps, act.clone(), frequency, self.now));
            debug!("fresh context: step {} enters as {}", steps, act);
            // The ceilings apply even to a lone first note.
            self.evict_after(steps, &act, false);
            self.update_statistics();
            self.maybe_update_origin();
            return Ok(Registration {
                origin: None,
                relative: act,
            });
        }

        let (act, parent_idx, relative) = self.resolve(steps, explicit);

        // Octave equivalence is judged against the notes present *before* this registration.
        let octave_equivalent = self
            .stm
            .iter()
            .any(|p| (steps - p.steps()).rem_euclid(self.config.edo as i32) == 0);
        let count_strikes = self.config.strategy != Strategy::External && !octave_equivalent;

        if let Some(idx) = self.stm.iter().position(|p| p.act() == &act) {
            // Restrike: the coordinate is already remembered. Refresh, never re-insert.
            self.stm[idx].refresh(self.now);
            let origin_coord = self.stm[idx].origin().cloned();
            let relative = self.stm[idx].relative().clone();
            let origin = origin_coord
                .as_ref()
                .and_then(|coord| self.stm.iter().find(|p| p.act() == coord))
                .cloned();
            trace!("restrike of step {} as {}", steps, act);
            self.evict_after(steps, &act, false);
            self.update_statistics();
            self.maybe_update_origin();
            return Ok(Registration { origin, relative });
        }

        let origin = self.stm[parent_idx].clone();
        let frequency = self.note_frequency(steps, &act);
        self.stm.push(Pitch::linked(
            steps,
            act.clone(),
            origin.act().clone(),
            relative.clone(),
            frequency,
            self.now,
        ));
        debug!(
            "registered step {} as {} = {} from {}",
            steps,
            act,
            relative,
            origin.act()
        );

        self.evict_after(steps, &act, count_strikes);
        self.update_statistics();
        self.maybe_update_origin();
        Ok(Registration {
            origin: Some(origin),
            relative,
        })
    }

    /// Periodic frame tick with externally supplied elapsed time.
    ///
    /// Runs the wall-clock staleness sweep (consulting `sustain` for per-note allowances),
    /// integrates fatigue, and recomputes all aggregates. Large elapsed-time spikes are clamped
    /// to [HarmonicConfig::max_tick_secs].
    pub fn tick(&mut self, elapsed_secs: f64, sustain: &impl SustainSource) {
        let dt = elapsed_secs.clamp(0.0, self.config.max_tick_secs);
        self.now += dt;

        let now = self.now;
        let cfg = &self.config;
        let before = self.stm.len();
        self.stm.retain(|p| {
            let allowance = match sustain.hold_state(p.steps()) {
                KeyHold::Held | KeyHold::Sustained => cfg.forget_sustained_secs,
                KeyHold::Released => cfg.forget_secs,
            };
            now - p.refreshed_at() <= allowance
        });
        if self.stm.len() != before {
            trace!("staleness sweep forgot {} notes", before - self.stm.len());
        }

        self.update_statistics();
        self.update_fatigue(dt);
        self.maybe_update_origin();
    }

    /// Clear the memory and all aggregates. The central fifth deliberately survives, and the
    /// effective origin returns to the unison.
    pub fn reset(&mut self) {
        self.stm.clear();
        self.dissonance = 0.0;
        self.fatigue = 0.0;
        self.centroid = vec![0.0; PRIMES.len()];
        self.effective_origin = Monzo::unison();
        self.last_origin_update = f64::NEG_INFINITY;
    }

    // ------------------------------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------------------------------

    fn note_frequency(&self, steps: i32, act: &Monzo) -> f64 {
        match self.config.strategy {
            // Externally resolved notes sound at their exact just frequency.
            Strategy::External => act.to_frequency(self.config.fundamental, self.config.encoding),
            _ => self.tuning.step_frequency(self.config.fundamental, steps),
        }
    }

    /// Pick the winning absolute coordinate, the linking parent, and the relative interval.
    /// Only called with a nonempty STM.
    fn resolve(&self, steps: i32, explicit: Option<Monzo>) -> (Monzo, usize, Monzo) {
        if let Some(act) = explicit {
            let parent_idx = self.nearest_node(&act);
            let relative = act.sub(self.stm[parent_idx].act());
            return (act, parent_idx, relative);
        }

        match self.config.strategy {
            Strategy::OracleScored => {
                let stm_freqs = self.stm_frequencies();
                let mut candidates: Vec<Vec<Monzo>> = Vec::with_capacity(self.stm.len());
                let mut matrix: Vec<Vec<Vec<f64>>> = Vec::with_capacity(self.stm.len());
                for pitch in &self.stm {
                    let cands = self.tuning.candidates(steps - pitch.steps());
                    let sets = cands
                        .iter()
                        .map(|c| {
                            let mut freqs = stm_freqs.clone();
                            freqs.push(c.to_frequency(pitch.frequency(), self.config.encoding));
                            freqs
                        })
                        .collect();
                    matrix.push(sets);
                    candidates.push(cands);
                }
                // The STM is nonempty and every step class has at least one candidate, so a
                // well-behaved oracle always answers; an absent or out-of-range answer falls
                // back to the first pair, which always exists.
                let (p_idx, r_idx) = self
                    .scorer
                    .best_candidate(&matrix)
                    .filter(|&(p, r)| candidates.get(p).map_or(false, |c| r < c.len()))
                    .unwrap_or((0, 0));
                let relative = candidates[p_idx][r_idx].clone();
                let act = self.stm[p_idx].act().add(&relative);
                (act, p_idx, relative)
            }
            Strategy::CentroidDistance | Strategy::OriginDistance => {
                let target: Vec<f64> = match self.config.strategy {
                    Strategy::OriginDistance => (0..PRIMES.len())
                        .map(|i| self.effective_origin.exponent(i) as f64)
                        .collect(),
                    _ => self.centroid.clone(),
                };
                // Deduplicate candidate absolutes; first occurrence wins ties, so the result is
                // deterministic in STM order.
                let mut seen: HashMap<Monzo, ()> = HashMap::default();
                let mut best: Option<(Monzo, f64)> = None;
                for pitch in &self.stm {
                    for cand in self.tuning.candidates(steps - pitch.steps()) {
                        let act = pitch.act().add(&cand);
                        if seen.insert(act.clone(), ()).is_some() {
                            continue;
                        }
                        let dist = act.harmonic_distance_to_point(&target);
                        if best.as_ref().map_or(true, |(_, b)| dist < *b) {
                            best = Some((act, dist));
                        }
                    }
                }
                // STM nonempty, so at least one candidate was seen.
                let act = best.map(|(act, _)| act).unwrap_or_else(Monzo::unison);
                // The linking parent is chosen independently of which node generated the winner.
                let parent_idx = self.nearest_node(&act);
                let relative = act.sub(self.stm[parent_idx].act());
                (act, parent_idx, relative)
            }
            Strategy::External => unreachable!("explicit coordinate extracted above"),
        }
    }

    /// Index of the STM node lattice-nearest to `act`; first wins ties.
    fn nearest_node(&self, act: &Monzo) -> usize {
        let mut best = (0, f64::INFINITY);
        for (i, p) in self.stm.iter().enumerate() {
            let dist = p.act().harmonic_distance(act);
            if dist < best.1 {
                best = (i, dist);
            }
        }
        best.0
    }

    // ------------------------------------------------------------------------------------------
    // Forgetting
    // ------------------------------------------------------------------------------------------

    /// All registration-time eviction passes, in order. `new_act` identifies the just-inserted
    /// (or just-restruck) node, which is never evicted here.
    fn evict_after(&mut self, steps: i32, new_act: &Monzo, count_strikes: bool) {
        // 1. Adjacent-step collision: two pitches one tempered step apart cannot both be held
        //    as distinct lattice points.
        self.stm
            .retain(|p| p.act() == new_act || (p.steps() - steps).abs() != 1);

        // 2. Capacity ceiling.
        while self.stm.len() > self.config.max_short_term_memory {
            let removed = match self.config.strategy {
                Strategy::OracleScored => self.remove_worst_offender(new_act),
                _ => self.remove_least_recent(new_act),
            };
            if !removed {
                break;
            }
        }

        // 3. Dissonance ceiling. Each iteration strictly shrinks the STM. The routine must not
        //    return with the ceiling exceeded: when the new note alone is still over it, even
        //    the new note is forgotten.
        while !self.stm.is_empty()
            && self.scorer.score(&self.stm_frequencies()) > self.effective_max_dissonance()
        {
            if self.stm.len() == 1 {
                let gone = self.stm.remove(0);
                trace!("forgetting sole over-ceiling note {} (step {})", gone.act(), gone.steps());
                break;
            }
            if !self.remove_worst_offender(new_act) {
                break;
            }
        }

        // 4. Harmonic-distance ceiling, measured from the winning coordinate.
        let max_hd = self.config.max_harmonic_distance;
        self.stm
            .retain(|p| p.act() == new_act || p.act().harmonic_distance(new_act) <= max_hd);

        // 5. Strike-count staleness: a genuinely new note is one more reason to forget
        //    everything that has not been heard again.
        if count_strikes {
            for p in self.stm.iter_mut().filter(|p| p.act() != new_act) {
                p.add_strike();
            }
            let max_strikes = self.config.max_strikes;
            self.stm
                .retain(|p| p.act() == new_act || p.strikes() <= max_strikes);
        }
    }

    /// Remove the member whose removal most reduces dissonance, per the oracle. The protected
    /// new note is passed to the oracle last, matching its exclude-the-newest convention.
    /// Returns false when there is nothing but the new note to remove.
    fn remove_worst_offender(&mut self, new_act: &Monzo) -> bool {
        let mut others: Vec<usize> = Vec::with_capacity(self.stm.len());
        let mut freqs: Vec<f64> = Vec::with_capacity(self.stm.len());
        let mut new_freq = 0.0;
        for (i, p) in self.stm.iter().enumerate() {
            if p.act() == new_act {
                new_freq = p.frequency();
            } else {
                others.push(i);
                freqs.push(p.frequency());
            }
        }
        if others.is_empty() {
            return false;
        }
        freqs.push(new_freq);

        let offender = match self.scorer.worst_offender(&freqs) {
            Some(idx) => idx,
            None => return false,
        };
        let idx = match others.get(offender) {
            Some(&idx) => idx,
            // A misbehaving oracle pointed at the protected note; refuse.
            None => return false,
        };
        let gone = self.stm.remove(idx);
        trace!("forgetting worst offender {} (step {})", gone.act(), gone.steps());
        true
    }

    /// Remove the least-recently-refreshed member other than the new note; first wins ties.
    fn remove_least_recent(&mut self, new_act: &Monzo) -> bool {
        let mut idx: Option<(usize, f64)> = None;
        for (i, p) in self.stm.iter().enumerate() {
            if p.act() == new_act {
                continue;
            }
            if idx.map_or(true, |(_, t)| p.refreshed_at() < t) {
                idx = Some((i, p.refreshed_at()));
            }
        }
        match idx.map(|(i, _)| i) {
            Some(i) => {
                let gone = self.stm.remove(i);
                trace!("forgetting stalest note {} (step {})", gone.act(), gone.steps());
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------------------------------

    /// Recompute dissonance, centroid, and central fifth from the current STM.
    fn update_statistics(&mut self) {
        self.dissonance = if self.stm.is_empty() {
            0.0
        } else {
            self.scorer.score(&self.stm_frequencies())
        };

        let mut centroid = vec![0.0; PRIMES.len()];
        if !self.stm.is_empty() {
            for p in &self.stm {
                for (axis, c) in centroid.iter_mut().enumerate() {
                    *c += p.act().exponent(axis) as f64;
                }
            }
            let n = self.stm.len() as f64;
            for c in centroid.iter_mut() {
                *c /= n;
            }
        }
        self.centroid = centroid;

        // Central fifth: circular mean of each note's circle-of-fifths position. A zero
        // accumulated vector (in particular, an empty STM) keeps the previous value.
        let mut sx = 0.0;
        let mut sy = 0.0;
        for p in &self.stm {
            let angle =
                TAU * self.tuning.steps_to_fifths(p.steps()) as f64 / self.tuning.edo() as f64;
            sx += angle.cos();
            sy += angle.sin();
        }
        if sx != 0.0 || sy != 0.0 {
            let fifths =
                (sy.atan2(sx) / TAU * self.tuning.edo() as f64).rem_euclid(self.tuning.edo() as f64);
            self.central_fifth = self.tuning.fifths_to_steps(fifths);
        }
    }

    /// Integrate or decay fatigue over one clamped tick.
    fn update_fatigue(&mut self, dt: f64) {
        let threshold = self.config.consonance_threshold;
        let span = (self.config.max_dissonance - threshold).max(f64::EPSILON);
        if self.dissonance > threshold {
            let excess = ((self.dissonance - threshold) / span).min(1.0);
            self.fatigue += dt * excess / self.config.max_fatigue_secs;
        } else {
            // Recovery runs at twice the peak accumulation rate.
            self.fatigue -= 2.0 * dt / self.config.max_fatigue_secs;
        }
        self.fatigue = self.fatigue.clamp(0.0, 1.0);
    }

    /// Debounced effective-origin update: only when the sonority is consonant and the minimum
    /// dwell time has passed, so the perceived key center does not flicker.
    fn maybe_update_origin(&mut self) {
        if self.stm.is_empty()
            || self.dissonance >= self.config.consonance_threshold
            || self.now - self.last_origin_update < self.config.min_origin_update_secs
        {
            return;
        }

        let mut origin = Monzo::rounded(&self.centroid);

        // Keep the origin's octave and fifth from drifting above what is actually sounding.
        let min_octave = self.stm.iter().map(|p| p.act().exponent(0)).min().unwrap_or(0);
        let min_fifth = self.stm.iter().map(|p| p.act().exponent(1)).min().unwrap_or(0);
        let e0 = origin.exponent(0).min(min_octave + self.config.max_origin_octaves);
        let e1 = origin.exponent(1).min(min_fifth + self.config.max_origin_fifths);
        if e0 != origin.exponent(0) || e1 != origin.exponent(1) {
            let mut axes: Vec<f64> = (0..PRIMES.len()).map(|i| origin.exponent(i) as f64).collect();
            axes[0] = e0 as f64;
            axes[1] = e1 as f64;
            origin = Monzo::rounded(&axes);
        }

        if origin != self.effective_origin {
            debug!("effective origin moved to {}", origin);
            self.effective_origin = origin;
        }
        self.last_origin_update = self.now;
    }

    // ------------------------------------------------------------------------------------------
    // Read-only surface
    // ------------------------------------------------------------------------------------------

    pub fn config(&self) -> &HarmonicConfig {
        &self.config
    }

    /// Aggregate dissonance of the current STM.
    pub fn dissonance(&self) -> f64 {
        self.dissonance
    }

    /// Listener fatigue in [0, 1].
    pub fn fatigue(&self) -> f64 {
        self.fatigue
    }

    /// The dissonance ceiling after fatigue: shrinks linearly from
    /// [HarmonicConfig::max_dissonance] down to [HarmonicConfig::consonance_threshold].
    pub fn effective_max_dissonance(&self) -> f64 {
        let threshold = self.config.consonance_threshold;
        threshold + (self.config.max_dissonance - threshold) * (1.0 - self.fatigue)
    }

    /// Per-axis mean of all remembered coordinates. Rational-valued.
    pub fn centroid(&self) -> &[f64] {
        &self.centroid
    }

    /// The centroid flattened through the fixed lattice projection, for centering the viewport
    /// on the literal tonal center.
    pub fn tonal_center_coords(&self) -> (f64, f64) {
        point_unscaled_coords(&self.centroid)
    }

    /// The current key-center lattice point.
    pub fn effective_origin(&self) -> &Monzo {
        &self.effective_origin
    }

    /// Circular-mean circle-of-fifths position, as a step count modulo the tuning size.
    pub fn central_fifth(&self) -> f64 {
        self.central_fifth
    }

    /// Largest harmonic distance from the effective origin across the STM.
    pub fn max_harmonic_distance(&self) -> f64 {
        self.stm
            .iter()
            .map(|p| self.effective_origin.harmonic_distance(p.act()))
            .fold(0.0, f64::max)
    }

    /// Mean harmonic distance from the effective origin across the STM.
    pub fn mean_harmonic_distance(&self) -> f64 {
        if self.stm.is_empty() {
            return 0.0;
        }
        let distances: Vec<f64> = self
            .stm
            .iter()
            .map(|p| self.effective_origin.harmonic_distance(p.act()))
            .collect();
        mean(&distances)
    }

    /// The short-term memory itself, for diagnostic display.
    pub fn stm(&self) -> &[Pitch] {
        &self.stm
    }

    pub fn stm_frequencies(&self) -> Vec<f64> {
        self.stm.iter().map(|p| p.frequency()).collect()
    }

    /// Engine-clock time in seconds.
    pub fn now(&self) -> f64 {
        self.now
    }
}
