// Chorale Infill
//
// Fills in missing notes of a multi-voice chorale by annealed blocked Gibbs
// sampling over a pianoroll. The score is a dense `[step, pitch, voice]` grid
// holding at most one pitch per voice per step. A region of the grid is
// marked for infill; on every iteration a random subset of that region is
// hidden, a density model predicts a pitch distribution for each hidden
// slab given everything else, and fresh pitches are sampled at a chosen
// temperature. The fraction hidden per iteration anneals from nearly all to
// a small floor, so early iterations rough in the region and later ones
// polish it.
//
// Architecture:
// - grid.rs: Pianoroll storage, voices and the one-hot grid
// - mask.rs: Outer (eligible) and inner (per-iteration) slab masks
// - schedule.rs: Annealing schedules for the resample probability
// - sampler.rs: Tempered categorical sampling over pitch columns
// - model.rs: The density model trait, output validation, a uniform model
// - voice_leading.rs: Interval-table model built from melodic and harmonic
//   weights
// - gibbs.rs: The Gibbs loop, run report and cancellation
// - codec.rs: Note sequences and their grid encoding
// - midi.rs: MIDI file input and output for note sequences
// - config.rs: Run configuration loaded from JSON
// - infill.rs: Sequence-level entry points and parallel batches
// - error.rs: Error type shared by everything above
//
// Output is deterministic given a seed.

pub mod codec;
pub mod config;
pub mod error;
pub mod gibbs;
pub mod grid;
pub mod infill;
pub mod mask;
pub mod midi;
pub mod model;
pub mod sampler;
pub mod schedule;
pub mod voice_leading;

pub use error::{InfillError, Result};
pub use infill::{InfillOptions, InfillRegion, infill, infill_batch, infill_with_config};
