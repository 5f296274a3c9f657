//! Physical key state: which tuning steps are held, and which are only ringing because of the
//! sustain pedal.
//!
//! The engine itself only consumes this through [SustainSource], to pick the staleness allowance
//! for each remembered note. Hosts without a pedal can pass a closure.

use rapidhash::RapidHashMap as HashMap;

/// Hold status of a single tuning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyHold {
    /// The key is physically depressed.
    Held,
    /// The key was released while the sustain pedal was down.
    Sustained,
    /// Not sounding (or unknown to the tracker).
    Released,
}

/// External held-note/sustain signal consumed by the wall-clock staleness sweep.
pub trait SustainSource {
    fn hold_state(&self, steps: i32) -> KeyHold;
}

impl<F: Fn(i32) -> KeyHold> SustainSource for F {
    fn hold_state(&self, steps: i32) -> KeyHold {
        self(steps)
    }
}

#[derive(Debug, Clone)]
struct KeyState {
    vel: u8,
    from_sustain_pedal: bool,
}

/// Tracks note-on/note-off/pedal events into per-step hold states.
#[derive(Debug, Default)]
pub struct KeyTracker {
    keys: HashMap<i32, KeyState>,
    sustain: bool,
}

impl KeyTracker {
    pub fn new() -> KeyTracker {
        KeyTracker::default()
    }

    pub fn note_on(&mut self, steps: i32, vel: u8) {
        self.keys.insert(
            steps,
            KeyState {
                vel,
                from_sustain_pedal: false,
            },
        );
    }

    /// A key release only drops the key when the pedal is up; otherwise it is handed over to
    /// the pedal.
    pub fn note_off(&mut self, steps: i32) {
        if self.sustain {
            if let Some(state) = self.keys.get_mut(&steps) {
                state.from_sustain_pedal = true;
            }
        } else {
            self.keys.remove(&steps);
        }
    }

    /// Pedal state change. Releasing the pedal drops every key it was carrying.
    pub fn set_sustain(&mut self, sustain: bool) {
        self.sustain = sustain;
        if !sustain {
            self.keys.retain(|_, state| !state.from_sustain_pedal);
        }
    }

    pub fn sustain(&self) -> bool {
        self.sustain
    }

    /// Velocity the step was last struck with, for the host's renderer.
    pub fn velocity(&self, steps: i32) -> Option<u8> {
        self.keys.get(&steps).map(|state| state.vel)
    }

    /// (physically held, pedal-sustained) counts.
    pub fn counts(&self) -> (usize, usize) {
        let sustained = self.keys.values().filter(|state| state.from_sustain_pedal).count();
        (self.keys.len() - sustained, sustained)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl SustainSource for KeyTracker {
    fn hold_state(&self, steps: i32) -> KeyHold {
        match self.keys.get(&steps) {
            Some(state) if state.from_sustain_pedal => KeyHold::Sustained,
            Some(_) => KeyHold::Held,
            None => KeyHold::Released,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pedal_carries_released_keys() {
        let mut keys = KeyTracker::new();
        keys.note_on(0, 100);
        keys.note_on(18, 80);
        assert_eq!(keys.hold_state(0), KeyHold::Held);
        assert_eq!(keys.counts(), (2, 0));

        keys.set_sustain(true);
        keys.note_off(0);
        assert_eq!(keys.hold_state(0), KeyHold::Sustained);
        assert_eq!(keys.hold_state(18), KeyHold::Held);
        assert_eq!(keys.counts(), (1, 1));

        // Pedal release drops only the pedal-held key.
        keys.set_sustain(false);
        assert_eq!(keys.hold_state(0), KeyHold::Released);
        assert_eq!(keys.hold_state(18), KeyHold::Held);

        keys.note_off(18);
        assert!(keys.is_empty());
    }

    #[test]
    fn closures_are_sustain_sources() {
        let source = |steps: i32| {
            if steps == 5 {
                KeyHold::Sustained
            } else {
                KeyHold::Released
            }
        };
        assert_eq!(source.hold_state(5), KeyHold::Sustained);
        assert_eq!(source.hold_state(6), KeyHold::Released);
    }
}
