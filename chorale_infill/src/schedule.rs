// Annealing schedules for blocked Gibbs sampling.
//
// A schedule maps (iteration, total iterations) to the probability that any
// given eligible slab is resampled on that iteration. Early iterations
// resample nearly everything; later ones touch progressively smaller random
// subsets, so the chain settles while every cell keeps a nonzero chance of
// being revisited.
//
// The Yao schedule starts at `pmax / alpha`, which exceeds 1 with the default
// constants. There is no upper clamp: a Bernoulli draw against
// p > 1 always succeeds, which makes iteration 0 a full resample of the
// infill region.

use crate::error::{InfillError, Result};
use serde::{Deserialize, Serialize};

pub const YAO_PMIN: f64 = 0.1;
pub const YAO_PMAX: f64 = 0.9;
pub const YAO_ALPHA: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnnealSchedule {
    /// Linear decay from `pmax / alpha`, floored at `pmin`.
    Yao { pmin: f64, pmax: f64, alpha: f64 },
    /// The same resample probability on every iteration.
    Constant { p: f64 },
}

impl Default for AnnealSchedule {
    fn default() -> Self {
        AnnealSchedule::Yao {
            pmin: YAO_PMIN,
            pmax: YAO_PMAX,
            alpha: YAO_ALPHA,
        }
    }
}

impl AnnealSchedule {
    /// Resample probability for iteration `i` of `n`.
    ///
    /// `n` is expected to be positive; zero is treated as one.
    pub fn resample_probability(&self, i: usize, n: usize) -> f64 {
        match *self {
            AnnealSchedule::Yao { pmin, pmax, alpha } => {
                let n = n.max(1) as f64;
                let wat = (pmax - pmin) * i as f64 / n;
                pmin.max((pmax - wat) / alpha)
            }
            AnnealSchedule::Constant { p } => p,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match *self {
            AnnealSchedule::Yao { pmin, pmax, alpha } => {
                if !(pmin > 0.0 && pmin <= pmax && pmax.is_finite()) {
                    return Err(InfillError::InvalidConfig {
                        reason: format!("yao schedule needs 0 < pmin <= pmax, got {pmin} / {pmax}"),
                    });
                }
                if !(alpha > 0.0 && alpha.is_finite()) {
                    return Err(InfillError::InvalidConfig {
                        reason: format!("yao schedule alpha must be positive, got {alpha}"),
                    });
                }
            }
            AnnealSchedule::Constant { p } => {
                if !(p > 0.0 && p <= 1.0) {
                    return Err(InfillError::InvalidConfig {
                        reason: format!("constant schedule p must be in (0, 1], got {p}"),
                    });
                }
            }
        }
        Ok(())
    }
}
