// Note sequences and their conversion to and from grids.
//
// A note is `(pitch, voice, start_step, end_step)` on a quantized step axis.
// Encoding marks the note's pitch in its voice at every step it covers, so a
// held note becomes the same pitch repeated at consecutive steps. Decoding
// emits one single-step note for every `(step, voice)` with a pitch set.
//
// The round trip is therefore lossy: a note held for four steps comes back
// as four repeated one-step notes, and a grid cannot tell a new onset from a
// sustained pitch. This flattening is intended; the grid only models which
// pitch each voice sings at each step.
//
// Note sequences are stored as JSON; see midi.rs for Standard MIDI Files.

use crate::error::{InfillError, Result};
use crate::grid::{Grid, MAX_GRID_CELLS, RollLayout};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default tempo for sequences that don't specify one.
pub const DEFAULT_TEMPO_BPM: u16 = 120;

/// A single note on the quantized step axis. `end_step` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub voice: usize,
    pub start_step: usize,
    pub end_step: usize,
}

impl Note {
    pub fn new(pitch: u8, voice: usize, start_step: usize, end_step: usize) -> Self {
        Note {
            pitch,
            voice,
            start_step,
            end_step,
        }
    }
}

fn default_tempo() -> u16 {
    DEFAULT_TEMPO_BPM
}

/// A quantized polyphonic sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSequence {
    pub notes: Vec<Note>,
    /// Length of the step axis. Defaults to the last note's end.
    #[serde(default)]
    pub total_steps: Option<usize>,
    #[serde(default = "default_tempo")]
    pub tempo_bpm: u16,
}

impl NoteSequence {
    pub fn new(notes: Vec<Note>) -> Self {
        NoteSequence {
            notes,
            total_steps: None,
            tempo_bpm: DEFAULT_TEMPO_BPM,
        }
    }

    /// Explicit `total_steps`, or the furthest note end.
    pub fn num_steps(&self) -> usize {
        self.total_steps
            .unwrap_or_else(|| self.notes.iter().map(|n| n.end_step).max().unwrap_or(0))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let seq: NoteSequence = serde_json::from_str(&data)?;
        Ok(seq)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Encode a note sequence as a grid.
///
/// Fails if the sequence spans zero steps or more than the grid size limit
/// allows, a note has `end <= start` or runs past `total_steps`, a voice or
/// pitch is off the layout, or two different pitches claim the same voice at
/// the same step.
pub fn sequence_to_grid(seq: &NoteSequence, layout: &RollLayout) -> Result<Grid> {
    let steps = seq.num_steps();
    if steps == 0 {
        return Err(InfillError::invalid_input("sequence spans zero steps"));
    }
    let shape = layout.shape(steps);
    if shape.checked_len().is_none_or(|cells| cells > MAX_GRID_CELLS) {
        return Err(InfillError::invalid_input(format!(
            "sequence of {steps} steps exceeds the {MAX_GRID_CELLS}-cell grid limit"
        )));
    }
    let mut grid = Grid::new(steps, layout);

    for note in &seq.notes {
        if note.end_step <= note.start_step {
            return Err(InfillError::invalid_input(format!(
                "note {note:?} must end after it starts"
            )));
        }
        if note.end_step > steps {
            return Err(InfillError::invalid_input(format!(
                "note {note:?} runs past the sequence end at step {steps}"
            )));
        }
        if note.voice >= layout.num_voices {
            return Err(InfillError::invalid_input(format!(
                "note voice {} is outside the valid range 0..{}",
                note.voice, layout.num_voices
            )));
        }
        for step in note.start_step..note.end_step {
            match grid.midi_pitch(step, note.voice) {
                Some(existing) if existing != note.pitch => {
                    return Err(InfillError::invalid_input(format!(
                        "voice {} has both pitch {} and {} at step {}",
                        note.voice, existing, note.pitch, step
                    )));
                }
                _ => grid.set_midi_pitch(step, note.voice, note.pitch)?,
            }
        }
    }

    Ok(grid)
}

/// Decode a grid into single-step notes, ordered by step then voice.
/// Silent slabs produce no note.
pub fn grid_to_sequence(grid: &Grid, tempo_bpm: u16) -> NoteSequence {
    let mut notes = Vec::new();
    for step in 0..grid.steps() {
        for voice in 0..grid.voices() {
            if let Some(pitch) = grid.midi_pitch(step, voice) {
                notes.push(Note::new(pitch, voice, step, step + 1));
            }
        }
    }
    NoteSequence {
        notes,
        total_steps: Some(grid.steps()),
        tempo_bpm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn onsets(seq: &NoteSequence) -> BTreeSet<(usize, usize, u8)> {
        seq.notes
            .iter()
            .map(|n| (n.start_step, n.voice, n.pitch))
            .collect()
    }

    #[test]
    fn test_roundtrip_single_step_notes() {
        let notes = vec![
            Note::new(72, 0, 0, 1),
            Note::new(74, 0, 1, 2),
            Note::new(60, 2, 0, 1),
            Note::new(48, 3, 1, 2),
        ];
        let seq = NoteSequence::new(notes);
        let grid = sequence_to_grid(&seq, &RollLayout::default()).unwrap();
        let back = grid_to_sequence(&grid, seq.tempo_bpm);
        assert_eq!(onsets(&back), onsets(&seq));
    }

    #[test]
    fn test_held_note_flattens_to_repeats() {
        let seq = NoteSequence::new(vec![Note::new(67, 1, 2, 5)]);
        let grid = sequence_to_grid(&seq, &RollLayout::default()).unwrap();
        assert_eq!(grid.steps(), 5);
        let back = grid_to_sequence(&grid, 90);
        assert_eq!(
            back.notes,
            vec![
                Note::new(67, 1, 2, 3),
                Note::new(67, 1, 3, 4),
                Note::new(67, 1, 4, 5),
            ]
        );
        assert_eq!(back.total_steps, Some(5));
        assert_eq!(back.tempo_bpm, 90);
    }

    #[test]
    fn test_total_steps_pads_with_silence() {
        let mut seq = NoteSequence::new(vec![Note::new(60, 0, 0, 2)]);
        seq.total_steps = Some(8);
        let grid = sequence_to_grid(&seq, &RollLayout::default()).unwrap();
        assert_eq!(grid.steps(), 8);
        assert!(grid.is_silent(5, 0));
    }

    #[test]
    fn test_encoding_errors() {
        let layout = RollLayout::default();
        let cases = vec![
            NoteSequence::new(vec![]),
            NoteSequence::new(vec![Note::new(60, 4, 0, 1)]),
            NoteSequence::new(vec![Note::new(20, 0, 0, 1)]),
            NoteSequence::new(vec![Note::new(60, 0, 3, 3)]),
            NoteSequence::new(vec![Note::new(60, 0, 0, 2), Note::new(62, 0, 1, 3)]),
        ];
        for seq in cases {
            let err = sequence_to_grid(&seq, &layout).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_INPUT", "{seq:?}");
        }

        let mut short = NoteSequence::new(vec![Note::new(60, 0, 0, 4)]);
        short.total_steps = Some(2);
        assert!(sequence_to_grid(&short, &layout).is_err());
    }

    #[test]
    fn test_oversized_total_steps_rejected() {
        let layout = RollLayout::default();
        for total in [usize::MAX / 8, usize::MAX, MAX_GRID_CELLS] {
            let mut seq = NoteSequence::new(vec![Note::new(60, 0, 0, 1)]);
            seq.total_steps = Some(total);
            let err = sequence_to_grid(&seq, &layout).unwrap_err();
            assert_eq!(err.error_code(), "INVALID_INPUT", "total_steps {total}");
        }
    }

    #[test]
    fn test_overlapping_same_pitch_is_fine() {
        let seq = NoteSequence::new(vec![Note::new(60, 0, 0, 2), Note::new(60, 0, 1, 3)]);
        let grid = sequence_to_grid(&seq, &RollLayout::default()).unwrap();
        assert!((0..3).all(|s| grid.midi_pitch(s, 0) == Some(60)));
    }

    #[test]
    fn test_json_defaults() {
        let json = r#"{"notes":[{"pitch":60,"voice":0,"start_step":0,"end_step":1}]}"#;
        let seq: NoteSequence = serde_json::from_str(json).unwrap();
        assert_eq!(seq.tempo_bpm, DEFAULT_TEMPO_BPM);
        assert_eq!(seq.total_steps, None);
        assert_eq!(seq.num_steps(), 1);
    }
}
