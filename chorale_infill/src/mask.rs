// Outer and inner masks over `(step, voice)` slabs.
//
// The outer mask marks which slabs are eligible for infill at all. It is
// fixed for the whole run, built either from an explicit list of regions or
// automatically from the silent slabs of the input grid.
//
// The inner mask is rebuilt every Gibbs iteration: each slab is selected
// independently with the schedule's resample probability, then intersected
// with the outer mask. Selection happens per slab (never per pitch) so a
// voice at a step is always resampled as a whole and the merge keeps the
// one-hot invariant.
//
// Masks are stored per slab; `to_indicator` broadcasts one across the pitch
// axis for the density model boundary.

use crate::error::{InfillError, Result};
use crate::grid::{Grid, Roll, Shape};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A boolean per `(step, voice)` slab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMask {
    steps: usize,
    voices: usize,
    cells: Vec<bool>,
}

impl CellMask {
    pub fn empty(steps: usize, voices: usize) -> Self {
        CellMask {
            steps,
            voices,
            cells: vec![false; steps * voices],
        }
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn voices(&self) -> usize {
        self.voices
    }

    /// Whether this mask covers the slabs of `shape`.
    pub fn fits(&self, shape: Shape) -> bool {
        self.steps == shape.steps && self.voices == shape.voices
    }

    pub fn get(&self, step: usize, voice: usize) -> bool {
        self.cells[step * self.voices + voice]
    }

    pub fn set(&mut self, step: usize, voice: usize, selected: bool) {
        self.cells[step * self.voices + voice] = selected;
    }

    /// Number of selected slabs.
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&c| c)
    }

    /// Selected `(step, voice)` pairs in step-major order.
    pub fn iter_set(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let voices = self.voices;
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c)
            .map(move |(i, _)| (i / voices, i % voices))
    }

    /// Whether every slab selected here is also selected in `other`.
    pub fn is_subset_of(&self, other: &CellMask) -> bool {
        self.steps == other.steps
            && self.voices == other.voices
            && self
                .cells
                .iter()
                .zip(&other.cells)
                .all(|(&a, &b)| !a || b)
    }

    /// Dense `[step, pitch, voice]` indicator: 1 across every pitch of a
    /// selected slab, 0 elsewhere.
    pub fn to_indicator(&self, pitches: usize) -> Roll {
        let shape = Shape::new(self.steps, pitches, self.voices);
        let mut roll = Roll::zeros(shape);
        for (step, voice) in self.iter_set() {
            for p in 0..pitches {
                roll.set(step, p, voice, 1.0);
            }
        }
        roll
    }
}

/// Slabs eligible for resampling during a run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OuterMask {
    cells: CellMask,
}

impl OuterMask {
    /// Eligible exactly at the given `(step, voice)` pairs; everything else
    /// is frozen. Fails on any pair outside the grid.
    pub fn from_regions(shape: Shape, regions: &[(usize, usize)]) -> Result<Self> {
        let mut cells = CellMask::empty(shape.steps, shape.voices);
        for &(step, voice) in regions {
            if voice >= shape.voices {
                return Err(InfillError::invalid_input(format!(
                    "infill voice {voice} is outside the valid range 0..{}",
                    shape.voices
                )));
            }
            if step >= shape.steps {
                return Err(InfillError::invalid_input(format!(
                    "infill step {step} is outside the valid range 0..{}",
                    shape.steps
                )));
            }
            cells.set(step, voice, true);
        }
        Ok(OuterMask { cells })
    }

    /// Eligible wherever the grid's slab is entirely zero.
    pub fn from_silence(grid: &Grid) -> Self {
        let shape = grid.shape();
        let mut cells = CellMask::empty(shape.steps, shape.voices);
        for step in 0..shape.steps {
            for voice in 0..shape.voices {
                if grid.is_silent(step, voice) {
                    cells.set(step, voice, true);
                }
            }
        }
        OuterMask { cells }
    }

    pub fn cells(&self) -> &CellMask {
        &self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Select each slab independently with probability `p`, restricted to the
/// outer mask.
///
/// One uniform draw is consumed per slab whether or not it is eligible, so
/// the random stream doesn't depend on the outer mask's contents. `p >= 1`
/// selects every eligible slab; `p <= 0` selects none.
pub fn build_inner_mask(p: f64, outer: &OuterMask, rng: &mut impl Rng) -> CellMask {
    let eligible = outer.cells();
    let mut inner = CellMask::empty(eligible.steps(), eligible.voices());
    for step in 0..eligible.steps() {
        for voice in 0..eligible.voices() {
            let draw: f64 = rng.random();
            if draw < p && eligible.get(step, voice) {
                inner.set(step, voice, true);
            }
        }
    }
    inner
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::RollLayout;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_from_regions_rejects_bad_voice() {
        let shape = Shape::new(8, 46, 4);
        let err = OuterMask::from_regions(shape, &[(0, 4)]).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert!(OuterMask::from_regions(shape, &[(8, 0)]).is_err());
        let ok = OuterMask::from_regions(shape, &[(0, 3), (7, 0)]).unwrap();
        assert_eq!(ok.cells().count(), 2);
        assert!(ok.cells().get(7, 0));
    }

    #[test]
    fn test_from_silence_marks_empty_slabs() {
        let mut grid = Grid::new(4, &RollLayout::default());
        for step in 0..4 {
            for voice in 0..3 {
                grid.set_midi_pitch(step, voice, 60).unwrap();
            }
        }
        let outer = OuterMask::from_silence(&grid);
        assert_eq!(outer.cells().count(), 4);
        assert!(outer.cells().iter_set().all(|(_, v)| v == 3));
    }

    #[test]
    fn test_inner_mask_is_subset_of_outer() {
        let shape = Shape::new(16, 46, 4);
        let regions: Vec<(usize, usize)> = (0..16).filter(|s| s % 3 == 0).map(|s| (s, 1)).collect();
        let outer = OuterMask::from_regions(shape, &regions).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for i in 0..50 {
            let p = 1.0 - i as f64 / 50.0;
            let inner = build_inner_mask(p, &outer, &mut rng);
            assert!(inner.is_subset_of(outer.cells()));
        }
    }

    #[test]
    fn test_inner_mask_probability_extremes() {
        let outer = OuterMask::from_regions(Shape::new(4, 46, 4), &[(0, 0), (3, 2)]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let all = build_inner_mask(1.3, &outer, &mut rng);
        assert_eq!(&all, outer.cells());
        let none = build_inner_mask(0.0, &outer, &mut rng);
        assert!(none.is_empty());
    }

    #[test]
    fn test_empty_outer_gives_empty_inner() {
        let outer = OuterMask::from_regions(Shape::new(8, 46, 4), &[]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(build_inner_mask(0.9, &outer, &mut rng).is_empty());
    }

    #[test]
    fn test_indicator_broadcasts_across_pitch() {
        let mut mask = CellMask::empty(2, 4);
        mask.set(1, 3, true);
        let roll = mask.to_indicator(5);
        for p in 0..5 {
            assert_eq!(roll.get(1, p, 3), 1.0);
            assert_eq!(roll.get(0, p, 3), 0.0);
            assert_eq!(roll.get(1, p, 2), 0.0);
        }
    }
}
