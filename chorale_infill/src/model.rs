// The density model boundary.
//
// The Gibbs loop never looks inside the model that scores pitches. It hands
// over the current grid with the slabs being resampled zeroed out, plus a
// dense indicator marking those slabs, and gets back a roll of the same shape
// whose masked columns are categorical distributions over pitch. Anything
// satisfying that contract (a convolutional net, a lookup table, a rule-based
// heuristic) can drive the sampler.
//
// Output is checked here, before it gets anywhere near the grid: wrong shape,
// negative values or non-finite values in a masked column are reported as
// `ModelContractViolation`. Unmasked columns are ignored.
//
// Models are ordinary owned values. Loading weights happens at construction
// and releasing them happens on drop; the sampler only ever borrows a model.

use crate::error::{InfillError, Result};
use crate::grid::{Roll, Shape};
use crate::mask::CellMask;

/// A conditional model over pitches for hidden slabs.
pub trait DensityModel: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Predict pitch distributions for the hidden slabs.
    ///
    /// * `masked_input` - the grid with every hidden slab zeroed
    /// * `mask` - 1 across every pitch of a hidden slab, 0 elsewhere
    ///
    /// The result must have the input's shape. For hidden slabs the pitch
    /// column must be nonnegative and finite; it needn't sum to 1.
    fn predict(&self, masked_input: &Roll, mask: &Roll) -> Result<Roll>;
}

/// Check a model's output against the contract for the slabs in `mask`.
pub fn validate_predictions(expected: Shape, mask: &CellMask, predictions: &Roll) -> Result<()> {
    if predictions.shape() != expected {
        return Err(InfillError::contract(format!(
            "prediction shape {} does not match grid shape {}",
            predictions.shape(),
            expected
        )));
    }
    for (step, voice) in mask.iter_set() {
        for pitch in 0..expected.pitches {
            let v = predictions.get(step, pitch, voice);
            if !v.is_finite() || v < 0.0 {
                return Err(InfillError::contract(format!(
                    "step {step}, voice {voice}, pitch {pitch}: value {v} is not a finite nonnegative probability"
                )));
            }
        }
    }
    Ok(())
}

/// Every pitch equally likely. Useful as a baseline and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformModel;

impl DensityModel for UniformModel {
    fn name(&self) -> &str {
        "uniform"
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
        let weight = 1.0 / shape.pitches.max(1) as f32;
        let data = mask
            .as_slice()
            .iter()
            .map(|&m| if m > 0.5 { weight } else { 0.0 })
            .collect();
        Roll::from_vec(shape, data)
    }
}
