// The pianoroll grid: the central representation for infilling.
//
// A grid is a dense 3-D array indexed `[step, pitch, voice]` holding 0/1
// indicator values. Each voice sings exactly one pitch at each step, so a
// complete grid has exactly one 1 in every `(step, voice)` pitch column (the
// "slab"). An all-zero slab means "unspecified": it is what the infill
// machinery fills in.
//
// `Roll` is the plain dense array; it is also the currency at the density
// model boundary (masked input, mask indicator, predictions). `Grid` wraps a
// roll with the pitch-axis offset and the one-hot operations the sampler
// needs.
//
// The grid is the "source of truth" throughout sampling. Note sequences and
// MIDI are derived from it (codec.rs, midi.rs), never the other way around.

use crate::error::{InfillError, Result};
use crate::mask::CellMask;
use serde::{Deserialize, Serialize};

/// Lowest MIDI pitch on the default pitch axis (C2).
pub const MIN_PITCH: u8 = 36;
/// Highest MIDI pitch on the default pitch axis (A5).
pub const MAX_PITCH: u8 = 81;
/// Largest grid, in scalar cells, built from external input (1 GiB of f32).
pub const MAX_GRID_CELLS: usize = 1 << 28;
/// Number of voices in a chorale.
pub const NUM_VOICES: usize = 4;

/// Voice index in SATB order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Voice {
    Soprano = 0,
    Alto = 1,
    Tenor = 2,
    Bass = 3,
}

impl Voice {
    pub const ALL: [Voice; 4] = [Voice::Soprano, Voice::Alto, Voice::Tenor, Voice::Bass];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Voice> {
        Voice::ALL.get(index).copied()
    }

    /// Standard MIDI pitch ranges for each voice (approximate).
    /// These are soft constraints: the voice-leading model down-weights
    /// pitches outside them but never forbids them.
    pub fn range(self) -> (u8, u8) {
        match self {
            Voice::Soprano => (60, 79), // C4–G5
            Voice::Alto => (53, 72),    // F3–C5
            Voice::Tenor => (48, 67),   // C3–G4
            Voice::Bass => (40, 60),    // E2–C4
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Voice::Soprano => "Soprano",
            Voice::Alto => "Alto",
            Voice::Tenor => "Tenor",
            Voice::Bass => "Bass",
        }
    }
}

/// Dimensions of a `[step, pitch, voice]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub steps: usize,
    pub pitches: usize,
    pub voices: usize,
}

impl Shape {
    pub fn new(steps: usize, pitches: usize, voices: usize) -> Self {
        Shape {
            steps,
            pitches,
            voices,
        }
    }

    /// Total number of scalar cells.
    pub fn len(&self) -> usize {
        self.steps * self.pitches * self.voices
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of scalar cells, or `None` on overflow.
    pub fn checked_len(&self) -> Option<usize> {
        self.steps
            .checked_mul(self.pitches)?
            .checked_mul(self.voices)
    }

    /// Row-major offset of `[step, pitch, voice]`.
    #[inline]
    pub fn offset(&self, step: usize, pitch: usize, voice: usize) -> usize {
        debug_assert!(step < self.steps && pitch < self.pitches && voice < self.voices);
        (step * self.pitches + pitch) * self.voices + voice
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} x {} x {}]", self.steps, self.pitches, self.voices)
    }
}

/// Pitch axis and voice count for grids built from note sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollLayout {
    pub min_pitch: u8,
    pub max_pitch: u8,
    pub num_voices: usize,
}

impl Default for RollLayout {
    fn default() -> Self {
        RollLayout {
            min_pitch: MIN_PITCH,
            max_pitch: MAX_PITCH,
            num_voices: NUM_VOICES,
        }
    }
}

impl RollLayout {
    pub fn num_pitches(&self) -> usize {
        (self.max_pitch as usize + 1).saturating_sub(self.min_pitch as usize)
    }

    pub fn shape(&self, steps: usize) -> Shape {
        Shape::new(steps, self.num_pitches(), self.num_voices)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_pitch > self.max_pitch || self.max_pitch > 127 {
            return Err(InfillError::InvalidConfig {
                reason: format!(
                    "pitch range {}..={} is not a valid MIDI range",
                    self.min_pitch, self.max_pitch
                ),
            });
        }
        if self.num_voices == 0 {
            return Err(InfillError::InvalidConfig {
                reason: "layout needs at least one voice".to_string(),
            });
        }
        Ok(())
    }
}

/// A dense `[step, pitch, voice]` array of `f32` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roll {
    shape: Shape,
    data: Vec<f32>,
}

impl Roll {
    pub fn zeros(shape: Shape) -> Self {
        Roll {
            shape,
            data: vec![0.0; shape.len()],
        }
    }

    /// Wrap existing row-major data. Fails if the length doesn't match.
    pub fn from_vec(shape: Shape, data: Vec<f32>) -> Result<Self> {
        if data.len() != shape.len() {
            return Err(InfillError::invalid_input(format!(
                "roll data has {} values, shape {} needs {}",
                data.len(),
                shape,
                shape.len()
            )));
        }
        Ok(Roll { shape, data })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn get(&self, step: usize, pitch: usize, voice: usize) -> f32 {
        self.data[self.shape.offset(step, pitch, voice)]
    }

    pub fn set(&mut self, step: usize, pitch: usize, voice: usize, value: f32) {
        let i = self.shape.offset(step, pitch, voice);
        self.data[i] = value;
    }

    /// Copy the pitch column at `(step, voice)` out into a contiguous vector.
    pub fn slab(&self, step: usize, voice: usize) -> Vec<f32> {
        (0..self.shape.pitches)
            .map(|p| self.get(step, p, voice))
            .collect()
    }

    /// Index of the first pitch whose value is set (> 0.5) in the slab.
    pub fn active_pitch(&self, step: usize, voice: usize) -> Option<usize> {
        (0..self.shape.pitches).find(|&p| self.get(step, p, voice) > 0.5)
    }
}

/// A pianoroll grid: a `Roll` of 0/1 values plus the MIDI pitch of index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    roll: Roll,
    min_pitch: u8,
}

impl Grid {
    /// Create an all-silent grid with the given number of steps.
    pub fn new(steps: usize, layout: &RollLayout) -> Self {
        Grid {
            roll: Roll::zeros(layout.shape(steps)),
            min_pitch: layout.min_pitch,
        }
    }

    pub fn shape(&self) -> Shape {
        self.roll.shape()
    }

    pub fn steps(&self) -> usize {
        self.roll.shape().steps
    }

    pub fn voices(&self) -> usize {
        self.roll.shape().voices
    }

    pub fn roll(&self) -> &Roll {
        &self.roll
    }

    /// Pitch-axis index sounding in `voice` at `step`, if any.
    pub fn pitch_index(&self, step: usize, voice: usize) -> Option<usize> {
        self.roll.active_pitch(step, voice)
    }

    /// MIDI pitch sounding in `voice` at `step`, if any.
    pub fn midi_pitch(&self, step: usize, voice: usize) -> Option<u8> {
        self.pitch_index(step, voice)
            .map(|k| self.min_pitch + k as u8)
    }

    /// Overwrite the slab at `(step, voice)` with the one-hot vector for
    /// pitch index `k`. Nothing outside the slab is touched.
    pub fn set_pitch_index(&mut self, step: usize, voice: usize, k: usize) {
        for p in 0..self.shape().pitches {
            self.roll.set(step, p, voice, if p == k { 1.0 } else { 0.0 });
        }
    }

    /// Set a MIDI pitch at `(step, voice)`. Fails if it's off the pitch axis.
    pub fn set_midi_pitch(&mut self, step: usize, voice: usize, pitch: u8) -> Result<()> {
        let pitches = self.shape().pitches;
        match pitch.checked_sub(self.min_pitch) {
            Some(k) if (k as usize) < pitches => {
                self.set_pitch_index(step, voice, k as usize);
                Ok(())
            }
            _ => Err(InfillError::invalid_input(format!(
                "pitch {} is outside the grid range {}..={}",
                pitch,
                self.min_pitch,
                self.min_pitch as usize + pitches - 1
            ))),
        }
    }

    pub fn is_silent(&self, step: usize, voice: usize) -> bool {
        (0..self.shape().pitches).all(|p| self.roll.get(step, p, voice) == 0.0)
    }

    /// Whether exactly one pitch is set at `(step, voice)`.
    pub fn slab_is_one_hot(&self, step: usize, voice: usize) -> bool {
        let mut ones = 0;
        for p in 0..self.shape().pitches {
            let v = self.roll.get(step, p, voice);
            if v == 1.0 {
                ones += 1;
            } else if v != 0.0 {
                return false;
            }
        }
        ones == 1
    }

    /// Whether every slab in the grid is one-hot.
    pub fn is_one_hot(&self) -> bool {
        let shape = self.shape();
        (0..shape.steps).all(|s| (0..shape.voices).all(|v| self.slab_is_one_hot(s, v)))
    }

    /// The grid with every slab selected by `mask` zeroed: what the density
    /// model is allowed to see.
    pub fn masked_view(&self, mask: &CellMask) -> Roll {
        let mut roll = self.roll.clone();
        for (step, voice) in mask.iter_set() {
            for p in 0..self.shape().pitches {
                roll.set(step, p, voice, 0.0);
            }
        }
        roll
    }
}

impl Grid {
    /// Print a compact text summary of the grid for debugging.
    /// One row per voice, one token per step, `.` for silent slabs.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let bar_steps = 16; // 4/4 time in sixteenth notes

        for voice in 0..self.voices() {
            let label = Voice::from_index(voice)
                .map(|v| v.name().to_string())
                .unwrap_or_else(|| format!("Voice{voice}"));
            out.push_str(&format!("{label:>8}: "));
            for step in 0..self.steps() {
                if step > 0 && step % bar_steps == 0 {
                    out.push('|');
                }
                match self.midi_pitch(step, voice) {
                    Some(pitch) => out.push_str(pitch_name(pitch)),
                    None => out.push('.'),
                }
                out.push(' ');
            }
            out.push('\n');
        }
        out
    }
}

/// Convert a MIDI pitch to a compact note name (e.g., "C4", "F#3").
pub fn pitch_name(pitch: u8) -> &'static str {
    const NAMES: &[&str] = &[
        "C0", "C#0", "D0", "Eb0", "E0", "F0", "F#0", "G0", "Ab0", "A0", "Bb0", "B0", "C1", "C#1",
        "D1", "Eb1", "E1", "F1", "F#1", "G1", "Ab1", "A1", "Bb1", "B1", "C2", "C#2", "D2", "Eb2",
        "E2", "F2", "F#2", "G2", "Ab2", "A2", "Bb2", "B2", "C3", "C#3", "D3", "Eb3", "E3", "F3",
        "F#3", "G3", "Ab3", "A3", "Bb3", "B3", "C4", "C#4", "D4", "Eb4", "E4", "F4", "F#4", "G4",
        "Ab4", "A4", "Bb4", "B4", "C5", "C#5", "D5", "Eb5", "E5", "F5", "F#5", "G5", "Ab5", "A5",
        "Bb5", "B5", "C6", "C#6", "D6", "Eb6", "E6", "F6", "F#6", "G6", "Ab6", "A6", "Bb6", "B6",
        "C7", "C#7", "D7", "Eb7", "E7", "F7", "F#7", "G7", "Ab7", "A7", "Bb7", "B7", "C8", "C#8",
        "D8", "Eb8", "E8", "F8", "F#8", "G8", "Ab8", "A8", "Bb8", "B8",
    ];
    if (pitch as usize) < NAMES.len() {
        NAMES[pitch as usize]
    } else {
        "??"
    }
}

/// Musical interval helpers.
pub mod interval {
    /// Interval class (0-11): the interval mod 12, direction ignored.
    pub fn pitch_class_interval(semitones: i16) -> u8 {
        (semitones.unsigned_abs() % 12) as u8
    }
}
