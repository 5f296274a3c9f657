//! One remembered note in the short-term memory.

use crate::monzo::Monzo;

/// A pitch held in short-term memory: the tempered step it arrived as, the lattice coordinate it
/// is currently heard as, and the bookkeeping the forgetting policies need.
///
/// The origin back-reference stores the parent's *coordinate*, not the parent node itself. The
/// parent may be forgotten while this pitch survives; in that case the stored origin and relative
/// interval become historical and are never recomputed, and no graph repair is needed.
#[derive(Debug, Clone)]
pub struct Pitch {
    steps: i32,
    act: Monzo,
    origin: Option<Monzo>,
    relative: Monzo,
    frequency: f64,
    refreshed_at: f64,
    strikes: u32,
}

impl Pitch {
    /// A root pitch with no origin: heard as an absolute coordinate, relative to nothing.
    pub fn root(steps: i32, act: Monzo, frequency: f64, now: f64) -> Pitch {
        Pitch {
            steps,
            relative: act.clone(),
            act,
            origin: None,
            frequency,
            refreshed_at: now,
            strikes: 0,
        }
    }

    /// A pitch heard as `relative` away from the node whose absolute coordinate is `origin`.
    pub fn linked(
        steps: i32,
        act: Monzo,
        origin: Monzo,
        relative: Monzo,
        frequency: f64,
        now: f64,
    ) -> Pitch {
        Pitch {
            steps,
            act,
            origin: Some(origin),
            relative,
            frequency,
            refreshed_at: now,
            strikes: 0,
        }
    }

    /// Tuning-step index. This is the identity key for "is this physically the same key".
    pub fn steps(&self) -> i32 {
        self.steps
    }

    /// The absolute lattice coordinate this note is currently functioning as.
    pub fn act(&self) -> &Monzo {
        &self.act
    }

    /// Absolute coordinate of the node this pitch was interpreted relative to, if any.
    pub fn origin(&self) -> Option<&Monzo> {
        self.origin.as_ref()
    }

    /// Interval from the origin; equal to [Pitch::act] for root pitches.
    pub fn relative(&self) -> &Monzo {
        &self.relative
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// Engine-clock time of creation or last restrike.
    pub fn refreshed_at(&self) -> f64 {
        self.refreshed_at
    }

    /// How many genuinely new notes have been registered since this one was last heard.
    pub fn strikes(&self) -> u32 {
        self.strikes
    }

    /// A restrike of the same key: bump the timestamp. Strikes deliberately survive the
    /// refresh; only a note's own re-registration as a *new* coordinate clears them.
    pub fn refresh(&mut self, now: f64) {
        self.refreshed_at = now;
    }

    pub fn add_strike(&mut self) {
        self.strikes += 1;
    }
}
