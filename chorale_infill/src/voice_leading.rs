// A rule-based density model built from interval weight tables.
//
// Scores each candidate pitch for a hidden slab by multiplying:
// - melodic weights for the interval from the nearest observed pitch earlier
//   in the same voice, and to the nearest observed pitch later in it;
// - harmonic weights for the interval class against every observed pitch in
//   the other voices at the same step;
// - a crossing penalty when the candidate would sit above a higher voice or
//   below a lower one;
// - a range penalty outside the voice's soft SATB range.
//
// Only what the masked input shows is used, so hidden slabs never inform
// each other within one iteration. That is exactly the conditional structure
// the Gibbs loop expects from a learned model; this one just isn't learned.
//
// Tables default to stepwise-heavy melodic weights and consonance-heavy
// harmonic weights, and can be loaded from JSON.

use crate::error::{InfillError, Result};
use crate::grid::{NUM_VOICES, Roll, Voice, interval};
use crate::model::DensityModel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Interval (semitones) → relative weight.
type MelodicTable = BTreeMap<i8, f64>;

/// Interval class (0-11) → relative weight.
type HarmonicTable = BTreeMap<u8, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalTables {
    /// Weights for melodic motion within a voice.
    pub melodic: MelodicTable,
    /// Weight for melodic intervals missing from the table.
    pub melodic_floor: f64,
    /// Weights for vertical intervals between voices, by interval class.
    pub harmonic: HarmonicTable,
    /// Multiplier for a candidate that crosses an adjacent voice.
    pub crossing_penalty: f64,
    /// Multiplier for a candidate outside the voice's range.
    pub range_penalty: f64,
}

impl Default for IntervalTables {
    fn default() -> Self {
        let mut melodic = MelodicTable::new();
        // Stepwise motion dominates, then thirds, then the rest
        melodic.insert(0, 12.0); // repeated note (held notes flatten to repeats)
        melodic.insert(1, 15.0); // minor 2nd up
        melodic.insert(-1, 15.0); // minor 2nd down
        melodic.insert(2, 15.0); // major 2nd up
        melodic.insert(-2, 15.0); // major 2nd down
        melodic.insert(3, 5.0); // minor 3rd up
        melodic.insert(-3, 5.0); // minor 3rd down
        melodic.insert(4, 5.0); // major 3rd up
        melodic.insert(-4, 5.0); // major 3rd down
        melodic.insert(5, 3.0); // perfect 4th up
        melodic.insert(-5, 3.0); // perfect 4th down
        melodic.insert(7, 2.0); // perfect 5th up
        melodic.insert(-7, 2.0); // perfect 5th down
        melodic.insert(12, 1.0); // octave up
        melodic.insert(-12, 1.0); // octave down

        let mut harmonic = HarmonicTable::new();
        for ic in 0u8..12 {
            let weight = match ic {
                0 => 8.0,  // unison/octave
                3 => 10.0, // minor 3rd
                4 => 10.0, // major 3rd
                5 => 6.0,  // perfect 4th
                7 => 12.0, // perfect 5th
                8 => 8.0,  // minor 6th
                9 => 8.0,  // major 6th
                _ => 1.0,  // dissonances
            };
            harmonic.insert(ic, weight);
        }

        IntervalTables {
            melodic,
            melodic_floor: 0.1,
            harmonic,
            crossing_penalty: 0.1,
            range_penalty: 0.05,
        }
    }
}

impl IntervalTables {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let tables: IntervalTables = serde_json::from_str(&data)?;
        tables.validate()?;
        Ok(tables)
    }

    pub fn validate(&self) -> Result<()> {
        let all_weights = self
            .melodic
            .values()
            .chain(self.harmonic.values())
            .chain([
                &self.melodic_floor,
                &self.crossing_penalty,
                &self.range_penalty,
            ]);
        for &w in all_weights {
            if !(w > 0.0 && w.is_finite()) {
                return Err(InfillError::InvalidConfig {
                    reason: format!("interval table weights must be positive, found {w}"),
                });
            }
        }
        Ok(())
    }

    fn melodic_weight(&self, semitones: i16) -> f64 {
        i8::try_from(semitones)
            .ok()
            .and_then(|iv| self.melodic.get(&iv))
            .copied()
            .unwrap_or(self.melodic_floor)
    }

    fn harmonic_weight(&self, semitones: i16) -> f64 {
        let ic = interval::pitch_class_interval(semitones);
        self.harmonic.get(&ic).copied().unwrap_or(1.0)
    }
}

/// Voice-leading heuristic satisfying the density model contract.
#[derive(Debug, Clone)]
pub struct VoiceLeadingModel {
    tables: IntervalTables,
    /// MIDI pitch of pitch-axis index 0 in the rolls this model will see.
    min_pitch: u8,
}

impl VoiceLeadingModel {
    pub fn new(tables: IntervalTables, min_pitch: u8) -> Self {
        VoiceLeadingModel { tables, min_pitch }
    }

    /// Unnormalized weight of pitch index `k` for a slab in `voice`.
    fn candidate_weight(&self, context: &SlabContext, voice: usize, k: usize) -> f64 {
        let k = k as i16;
        let mut weight = 1.0;

        if let Some(prev) = context.prev {
            weight *= self.tables.melodic_weight(k - prev);
        }
        if let Some(next) = context.next {
            weight *= self.tables.melodic_weight(next - k);
        }

        for &(other, p) in &context.others {
            weight *= self.tables.harmonic_weight(k - p);
            // Voice 0 is the highest voice.
            let crosses = (other < voice && k > p) || (other > voice && k < p);
            if crosses {
                weight *= self.tables.crossing_penalty;
            }
        }

        if let Some((low, high)) = context.range {
            let midi = self.min_pitch as i16 + k;
            if midi < low as i16 || midi > high as i16 {
                weight *= self.tables.range_penalty;
            }
        }

        weight
    }
}

/// What the model can see around one hidden slab, in pitch-index units.
#[derive(Debug, Clone, PartialEq)]
struct SlabContext {
    /// Nearest observed pitch earlier in the same voice.
    prev: Option<i16>,
    /// Nearest observed pitch later in the same voice.
    next: Option<i16>,
    /// `(voice, pitch)` of every other voice sounding at this step.
    others: Vec<(usize, i16)>,
    /// Soft MIDI range for the voice, for four-voice grids only.
    range: Option<(u8, u8)>,
}

impl SlabContext {
    fn observe(observed: &Roll, step: usize, voice: usize) -> Self {
        let shape = observed.shape();
        let prev = (0..step)
            .rev()
            .find_map(|s| observed.active_pitch(s, voice))
            .map(|p| p as i16);
        let next = (step + 1..shape.steps)
            .find_map(|s| observed.active_pitch(s, voice))
            .map(|p| p as i16);
        let others = (0..shape.voices)
            .filter(|&other| other != voice)
            .filter_map(|other| observed.active_pitch(step, other).map(|p| (other, p as i16)))
            .collect();
        let range = if shape.voices == NUM_VOICES
            && let Some(v) = Voice::from_index(voice)
        {
            Some(v.range())
        } else {
            None
        };
        SlabContext {
            prev,
            next,
            others,
            range,
        }
    }
}

impl Default for VoiceLeadingModel {
    fn default() -> Self {
        VoiceLeadingModel::new(IntervalTables::default(), crate::grid::MIN_PITCH)
    }
}

impl DensityModel for VoiceLeadingModel {
    fn name(&self) -> &str {
        "voice-leading"
    }

    fn predict(&self, masked_input: &Roll, mask: &Roll) -> Result<Roll> {
        let shape = masked_input.shape();
        if mask.shape() != shape {
            return Err(InfillError::invalid_input(format!(
                "mask shape {} does not match input shape {}",
                mask.shape(),
                shape
            )));
        }
        let mut out = Roll::zeros(shape);
        if shape.pitches == 0 {
            return Ok(out);
        }
        for step in 0..shape.steps {
            for voice in 0..shape.voices {
                if mask.get(step, 0, voice) < 0.5 {
                    continue;
                }
                let context = SlabContext::observe(masked_input, step, voice);
                let weights: Vec<f64> = (0..shape.pitches)
                    .map(|k| self.candidate_weight(&context, voice, k))
                    .collect();
                let total: f64 = weights.iter().sum();
                for (k, w) in weights.into_iter().enumerate() {
                    out.set(step, k, voice, (w / total) as f32);
                }
            }
        }
        Ok(out)
    }
}
