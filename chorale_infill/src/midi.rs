// Standard MIDI File input and output for note sequences.
//
// Output is SMF Format 1: a tempo track followed by one track per voice,
// with voice N on channel N and a choir program. Input reads note on/off
// pairs from every track, takes the channel as the voice, and quantizes
// ticks to sixteenth-note steps.
//
// Uses the `midly` crate for parsing and writing.

use crate::codec::{DEFAULT_TEMPO_BPM, Note, NoteSequence};
use crate::error::{InfillError, Result};
use crate::grid::Voice;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::collections::HashMap;
use std::path::Path;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;

/// Grid steps per quarter note (sixteenth-note resolution).
const STEPS_PER_QUARTER: u32 = 4;

/// General MIDI "Choir Aahs".
const CHOIR_PROGRAM: u8 = 52;

/// MIDI has 16 channels; one voice per channel.
const MAX_MIDI_VOICES: usize = 16;

/// Slowest whole-number tempo whose microseconds per quarter fit in 24 bits.
const MIN_TEMPO_BPM: u16 = 4;

/// Largest absolute tick a 28-bit delta can reach from tick 0.
const MAX_TICK: u32 = (1 << 28) - 1;

/// Write a note sequence to a MIDI file.
pub fn write_midi(seq: &NoteSequence, path: &Path) -> Result<()> {
    let smf = sequence_to_smf(seq)?;
    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    std::fs::write(path, &buf)?;
    Ok(())
}

/// Read a MIDI file into a note sequence.
pub fn read_midi(path: &Path) -> Result<NoteSequence> {
    let bytes = std::fs::read(path)?;
    let smf = Smf::parse(&bytes)?;
    smf_to_sequence(&smf)
}

/// Absolute tick of a step, or `InvalidInput` if it can't be encoded.
fn step_to_tick(step: usize, ticks_per_step: u32) -> Result<u32> {
    u32::try_from(step)
        .ok()
        .and_then(|s| s.checked_mul(ticks_per_step))
        .filter(|&tick| tick <= MAX_TICK)
        .ok_or_else(|| {
            InfillError::invalid_input(format!("step {step} is too far out for a MIDI file"))
        })
}

fn midi_event(delta: u32, channel: u4, message: MidiMessage) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi { channel, message },
    }
}

/// Convert a note sequence to an in-memory SMF.
fn sequence_to_smf(seq: &NoteSequence) -> Result<Smf<'static>> {
    let num_voices = seq
        .notes
        .iter()
        .map(|n| n.voice + 1)
        .max()
        .unwrap_or(0)
        .max(Voice::ALL.len());
    if num_voices > MAX_MIDI_VOICES {
        return Err(InfillError::invalid_input(format!(
            "{num_voices} voices don't fit in {MAX_MIDI_VOICES} MIDI channels"
        )));
    }

    if seq.tempo_bpm < MIN_TEMPO_BPM {
        return Err(InfillError::invalid_input(format!(
            "tempo {} BPM is below the MIDI minimum of {MIN_TEMPO_BPM}",
            seq.tempo_bpm
        )));
    }

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    // Track 0: tempo track
    let tempo_microseconds = 60_000_000 / seq.tempo_bpm as u32;
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    let ticks_per_step = TICKS_PER_QUARTER as u32 / STEPS_PER_QUARTER;

    for voice in 0..num_voices {
        let channel = u4::new(voice as u8);
        let name: &'static str = Voice::from_index(voice).map(Voice::name).unwrap_or("Voice");
        let mut track: Track<'static> = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
            },
            midi_event(
                0,
                channel,
                MidiMessage::ProgramChange {
                    program: u7::new(CHOIR_PROGRAM),
                },
            ),
        ];

        // (tick, is_note_on, pitch): offs sort before ons at the same tick
        // so repeated pitches re-strike cleanly.
        let mut events: Vec<(u32, bool, u8)> = Vec::new();
        for note in seq.notes.iter().filter(|n| n.voice == voice) {
            events.push((step_to_tick(note.start_step, ticks_per_step)?, true, note.pitch));
            events.push((step_to_tick(note.end_step, ticks_per_step)?, false, note.pitch));
        }
        events.sort();

        let mut last_tick = 0u32;
        for (tick, is_on, pitch) in events {
            let message = if is_on {
                MidiMessage::NoteOn {
                    key: u7::new(pitch),
                    vel: u7::new(80),
                }
            } else {
                MidiMessage::NoteOff {
                    key: u7::new(pitch),
                    vel: u7::new(0),
                }
            };
            track.push(midi_event(tick - last_tick, channel, message));
            last_tick = tick;
        }

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    Ok(smf)
}

/// Quantize a tick position to the nearest step.
fn tick_to_step(tick: u32, ticks_per_step: u32) -> usize {
    ((tick + ticks_per_step / 2) / ticks_per_step) as usize
}

/// Collect notes from every track of a parsed SMF.
fn smf_to_sequence(smf: &Smf) -> Result<NoteSequence> {
    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u32,
        Timing::Timecode(..) => {
            return Err(InfillError::invalid_input(
                "timecode-based MIDI files can't be quantized to steps",
            ));
        }
    };
    let ticks_per_step = (ticks_per_quarter / STEPS_PER_QUARTER).max(1);

    let mut tempo_bpm = DEFAULT_TEMPO_BPM;
    let mut notes = Vec::new();

    for track in &smf.tracks {
        let mut tick: u32 = 0;
        // (channel, key) -> onset tick
        let mut sounding: HashMap<(u8, u8), u32> = HashMap::new();

        for event in track {
            tick += event.delta.as_int();
            match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us)) => {
                    let bpm = 60_000_000 / us.as_int().max(1);
                    tempo_bpm = bpm.clamp(MIN_TEMPO_BPM as u32, u16::MAX as u32) as u16;
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            sounding.insert((channel, key.as_int()), tick);
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            let key = key.as_int();
                            if let Some(onset) = sounding.remove(&(channel, key)) {
                                let start_step = tick_to_step(onset, ticks_per_step);
                                let end_step =
                                    tick_to_step(tick, ticks_per_step).max(start_step + 1);
                                notes.push(Note::new(key, channel as usize, start_step, end_step));
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
    }

    notes.sort_by_key(|n| (n.start_step, n.voice, n.pitch));
    let mut seq = NoteSequence::new(notes);
    seq.tempo_bpm = tempo_bpm;
    Ok(seq)
}
