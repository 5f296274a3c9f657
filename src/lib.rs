//! Real-time harmonic memory for the 31-edo just-intonation lattice visualizer.
//!
//! Incoming tempered notes are reinterpreted as exact lattice coordinates ([monzo::Monzo]),
//! linked into a bounded short-term memory, and forgotten under competing policies (dissonance,
//! capacity, lattice distance, strikes, wall-clock staleness). The host renderer reads the
//! resulting coordinates and aggregates to place and color visual objects.
//!
//! The crate builds both as a native rlib (tests, offline tooling) and as a wasm module; the
//! [HarmonicMemory] wrapper at the bottom of this file is the JS-facing surface.

pub mod context;
pub mod edo;
pub mod error;
pub mod keys;
pub mod monzo;
pub mod oracle;
pub mod pitch;
mod utils;

pub use context::{HarmonicConfig, HarmonicContext, Registration, Strategy};
pub use error::HarmonicError;
pub use keys::{KeyHold, KeyTracker, SustainSource};
pub use monzo::{Monzo, PrimeEncoding, PRIMES};
pub use oracle::{DissonanceScorer, SetharesScorer};
pub use pitch::Pitch;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Roughness of a raw frequency set under the default Sethares scorer. Exposed for the host's
/// diagnostic display.
#[wasm_bindgen(js_name = scoreFrequencies)]
pub fn score_frequencies(freqs: &[f64]) -> f64 {
    SetharesScorer.score(freqs)
}

fn push_axes(out: &mut Vec<f64>, coord: &Monzo) {
    for axis in 0..PRIMES.len() {
        out.push(coord.exponent(axis) as f64);
    }
}

/// The engine plus key tracking, packaged for the JS host.
///
/// Registration results come back as a flat f64 array
/// `[has_origin, origin_e2..origin_e11, relative_e2..relative_e11]`.
#[wasm_bindgen]
pub struct HarmonicMemory {
    ctx: HarmonicContext<SetharesScorer>,
    keys: KeyTracker,
}

#[wasm_bindgen]
impl HarmonicMemory {
    /// `strategy`: 0 = oracle-scored, 1 = centroid distance, 2 = origin distance, 3 = external
    /// (per-key explicit tuning; use [HarmonicMemory::note_on_explicit]).
    #[wasm_bindgen(constructor)]
    pub fn new(strategy: u8) -> Result<HarmonicMemory, JsError> {
        utils::set_panic_hook();
        let strategy = match strategy {
            0 => Strategy::OracleScored,
            1 => Strategy::CentroidDistance,
            2 => Strategy::OriginDistance,
            3 => Strategy::External,
            other => return Err(JsError::new(&format!("unknown strategy {}", other))),
        };
        let config = HarmonicConfig {
            strategy,
            ..HarmonicConfig::default()
        };
        Ok(HarmonicMemory {
            ctx: HarmonicContext::new(config, SetharesScorer)?,
            keys: KeyTracker::new(),
        })
    }

    #[wasm_bindgen(js_name = noteOn)]
    pub fn note_on(&mut self, steps: i32, vel: u8) -> Result<Vec<f64>, JsError> {
        self.keys.note_on(steps, vel);
        let reg = self.ctx.register_note(steps, None)?;
        Ok(Self::flatten(&reg))
    }

    /// Note-on with an externally resolved lattice coordinate (strategy 3 only).
    #[wasm_bindgen(js_name = noteOnExplicit)]
    pub fn note_on_explicit(
        &mut self,
        steps: i32,
        vel: u8,
        exponents: Vec<i32>,
    ) -> Result<Vec<f64>, JsError> {
        let act = Monzo::new(exponents)?;
        self.keys.note_on(steps, vel);
        let reg = self.ctx.register_note(steps, Some(act))?;
        Ok(Self::flatten(&reg))
    }

    #[wasm_bindgen(js_name = noteOff)]
    pub fn note_off(&mut self, steps: i32) {
        self.keys.note_off(steps);
    }

    /// Sustain pedal (MIDI CC 64) state change.
    pub fn sustain(&mut self, on: bool) {
        self.keys.set_sustain(on);
    }

    /// Periodic frame tick with elapsed seconds since the previous tick.
    pub fn tick(&mut self, elapsed_secs: f64) {
        self.ctx.tick(elapsed_secs, &self.keys);
    }

    pub fn reset(&mut self) {
        self.ctx.reset();
    }

    pub fn dissonance(&self) -> f64 {
        self.ctx.dissonance()
    }

    pub fn fatigue(&self) -> f64 {
        self.ctx.fatigue()
    }

    #[wasm_bindgen(js_name = effectiveMaxDissonance)]
    pub fn effective_max_dissonance(&self) -> f64 {
        self.ctx.effective_max_dissonance()
    }

    #[wasm_bindgen(js_name = centralFifth)]
    pub fn central_fifth(&self) -> f64 {
        self.ctx.central_fifth()
    }

    /// `[x, y]` of the centroid under the lattice projection, for viewport centering.
    #[wasm_bindgen(js_name = tonalCenterCoords)]
    pub fn tonal_center_coords(&self) -> Vec<f64> {
        let (x, y) = self.ctx.tonal_center_coords();
        vec![x, y]
    }

    #[wasm_bindgen(js_name = effectiveOrigin)]
    pub fn effective_origin(&self) -> Vec<i32> {
        let origin = self.ctx.effective_origin();
        (0..PRIMES.len()).map(|axis| origin.exponent(axis)).collect()
    }

    #[wasm_bindgen(js_name = maxHarmonicDistance)]
    pub fn max_harmonic_distance(&self) -> f64 {
        self.ctx.max_harmonic_distance()
    }

    #[wasm_bindgen(js_name = meanHarmonicDistance)]
    pub fn mean_harmonic_distance(&self) -> f64 {
        self.ctx.mean_harmonic_distance()
    }

    /// Diagnostic dump of the short-term memory: one
    /// `[steps, frequency, strikes, e2..e11]` row per remembered note.
    pub fn stm(&self) -> js_sys::Array {
        let rows = js_sys::Array::new();
        for p in self.ctx.stm() {
            let row = js_sys::Array::new();
            row.push(&JsValue::from_f64(p.steps() as f64));
            row.push(&JsValue::from_f64(p.frequency()));
            row.push(&JsValue::from_f64(p.strikes() as f64));
            for axis in 0..PRIMES.len() {
                row.push(&JsValue::from_f64(p.act().exponent(axis) as f64));
            }
            rows.push(&row);
        }
        rows
    }

    fn flatten(reg: &Registration) -> Vec<f64> {
        let mut out = Vec::with_capacity(1 + 2 * PRIMES.len());
        match &reg.origin {
            Some(origin) => {
                out.push(1.0);
                push_axes(&mut out, origin.act());
            }
            None => {
                out.push(0.0);
                out.extend(std::iter::repeat(0.0).take(PRIMES.len()));
            }
        }
        push_axes(&mut out, &reg.relative);
        out
    }
}
