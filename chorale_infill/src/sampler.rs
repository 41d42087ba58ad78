// Categorical sampling with temperature.
//
// Turns one pitch column of the model's output into a concrete pitch by
// inverse-CDF sampling over `x^(1/T)`. Inputs need not be normalized: the
// uniform draw is scaled by the total mass instead of dividing through.
//
// The temperature power is taken relative to the column maximum in the log
// domain, `exp((ln x - ln max) / T)`. That is `x^(1/T)` divided by the
// positive constant `max^(1/T)`, so the sampled distribution is unchanged,
// but it cannot overflow at very small temperatures.
//
// A column with zero total mass degenerates to index 0 with a warning.
// Negative or non-finite entries are a model contract violation.

use crate::error::{InfillError, Result};
use crate::grid::Roll;
use crate::mask::CellMask;
use rand::Rng;

/// Reject temperatures the power transform can't use.
pub fn check_temperature(temperature: f64) -> Result<()> {
    if temperature > 0.0 && temperature.is_finite() {
        Ok(())
    } else {
        Err(InfillError::invalid_input(format!(
            "temperature must be positive and finite, got {temperature}"
        )))
    }
}

/// Sample an index from an unnormalized nonnegative distribution.
pub fn sample(distribution: &[f32], temperature: f64, rng: &mut impl Rng) -> Result<usize> {
    check_temperature(temperature)?;
    if distribution.is_empty() {
        return Err(InfillError::contract("empty distribution"));
    }
    if let Some((i, v)) = distribution
        .iter()
        .enumerate()
        .find(|&(_, v)| !v.is_finite() || *v < 0.0)
    {
        return Err(InfillError::contract(format!(
            "distribution entry {i} is {v}; expected a finite nonnegative value"
        )));
    }

    let max = distribution.iter().fold(0.0f32, |m, &v| m.max(v)) as f64;
    if max == 0.0 {
        log::warn!("zero-mass distribution; falling back to index 0");
        return Ok(0);
    }
    let log_max = max.ln();

    let mut cdf = Vec::with_capacity(distribution.len());
    let mut total = 0.0f64;
    for &v in distribution {
        if v > 0.0 {
            total += (((v as f64).ln() - log_max) / temperature).exp();
        }
        cdf.push(total);
    }

    let draw = rng.random::<f64>() * total;
    Ok(cdf
        .iter()
        .position(|&c| draw < c)
        .unwrap_or(distribution.len() - 1))
}

/// Draw a pitch for every slab selected in `mask`.
///
/// Returns `(step, voice, pitch_index)` triples in step-major order. Slabs
/// outside the mask are never read.
pub fn sample_masked(
    predictions: &Roll,
    mask: &CellMask,
    temperature: f64,
    rng: &mut impl Rng,
) -> Result<Vec<(usize, usize, usize)>> {
    let mut samples = Vec::with_capacity(mask.count());
    for (step, voice) in mask.iter_set() {
        let column = predictions.slab(step, voice);
        let pitch = sample(&column, temperature, rng).map_err(|e| match e {
            InfillError::ModelContractViolation { reason } => InfillError::contract(format!(
                "step {step}, voice {voice}: {reason}"
            )),
            other => other,
        })?;
        samples.push((step, voice, pitch));
    }
    Ok(samples)
}
