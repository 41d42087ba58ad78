// Annealed blocked Gibbs sampling over a grid.
//
// Each iteration:
// 1. ask the schedule for this iteration's resample probability `p`;
// 2. build an inner mask: every eligible slab is picked with probability `p`;
// 3. show the model the current grid with the picked slabs zeroed, plus the
//    mask indicator, and validate what comes back;
// 4. sample a pitch for every picked slab;
// 5. overwrite exactly those slabs in the grid.
//
// The model always sees the current state, including everything earlier
// iterations wrote. Slabs outside the inner mask are never written, so
// frozen cells come out bit-identical to how they went in. All samples for an
// iteration are drawn before any are merged, so a failing iteration leaves
// the grid as it was.
//
// Iterations are strictly sequential. A run can be cancelled between
// iterations through a shared flag; the partially infilled grid it returns
// is still valid (slabs not yet sampled keep their input values).

use crate::config::InfillConfig;
use crate::error::{InfillError, Result};
use crate::grid::Grid;
use crate::mask::{CellMask, OuterMask, build_inner_mask};
use crate::model::{DensityModel, validate_predictions};
use crate::sampler::{check_temperature, sample_masked};
use crate::schedule::AnnealSchedule;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};

/// Statistics about a Gibbs run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfillReport {
    /// Iterations completed (empty-mask iterations included).
    pub iterations_run: usize,
    pub total_iterations: usize,
    /// Slab writes summed over all iterations.
    pub slabs_resampled: usize,
    /// Iterations whose inner mask was non-empty.
    pub model_calls: usize,
    /// True if the run stopped early on the cancel flag.
    pub cancelled: bool,
    /// Resample probability used at each completed iteration.
    pub probabilities: Vec<f64>,
}

/// Final grid plus run statistics.
#[derive(Debug, Clone)]
pub struct InfillOutcome {
    pub grid: Grid,
    pub report: InfillReport,
}

/// The Gibbs loop, borrowing a density model for the length of a run.
pub struct GibbsSampler<'a, M: DensityModel + ?Sized> {
    model: &'a M,
    schedule: AnnealSchedule,
    temperature: f64,
    total_iterations: usize,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, M: DensityModel + ?Sized> GibbsSampler<'a, M> {
    pub fn new(model: &'a M, config: &InfillConfig) -> Self {
        GibbsSampler {
            model,
            schedule: config.schedule,
            temperature: config.temperature,
            total_iterations: config.total_iterations,
            cancel: None,
        }
    }

    /// Stop between iterations once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn with_schedule(mut self, schedule: AnnealSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn check_inputs(&self, grid: &Grid, outer: &OuterMask) -> Result<()> {
        check_temperature(self.temperature)?;
        if self.total_iterations == 0 {
            return Err(InfillError::invalid_input(
                "total_iterations must be at least 1",
            ));
        }
        if !outer.cells().fits(grid.shape()) {
            return Err(InfillError::invalid_input(format!(
                "outer mask is {} x {} but the grid is {}",
                outer.cells().steps(),
                outer.cells().voices(),
                grid.shape()
            )));
        }
        Ok(())
    }

    /// Run the full schedule on a copy of `grid`.
    pub fn run(&self, grid: &Grid, outer: &OuterMask, rng: &mut impl Rng) -> Result<InfillOutcome> {
        self.check_inputs(grid, outer)?;

        log::info!(
            "gibbs: {} iterations at temperature {} over {} eligible slabs (model: {})",
            self.total_iterations,
            self.temperature,
            outer.cells().count(),
            self.model.name()
        );

        let mut state = grid.clone();
        let mut report = InfillReport {
            total_iterations: self.total_iterations,
            ..Default::default()
        };

        for i in 0..self.total_iterations {
            if self.is_cancelled() {
                log::info!("gibbs: cancelled after {i} iterations");
                report.cancelled = true;
                break;
            }
            let p = self.schedule.resample_probability(i, self.total_iterations);
            let inner = self.iteration(&mut state, outer, p, rng)?;
            let resampled = inner.count();
            log::debug!("gibbs: iteration {i}: p = {p:.3}, resampled {resampled} slabs");

            report.iterations_run += 1;
            report.slabs_resampled += resampled;
            if resampled > 0 {
                report.model_calls += 1;
            }
            report.probabilities.push(p);
        }

        log::info!(
            "gibbs: done after {} iterations, {} slab writes",
            report.iterations_run,
            report.slabs_resampled
        );
        Ok(InfillOutcome {
            grid: state,
            report,
        })
    }

    /// One masked resample-and-merge step at resample probability `p`.
    ///
    /// Returns the inner mask that was used. An empty inner mask skips the
    /// model call and leaves `state` untouched. On error `state` is
    /// unchanged.
    pub fn iteration(
        &self,
        state: &mut Grid,
        outer: &OuterMask,
        p: f64,
        rng: &mut impl Rng,
    ) -> Result<CellMask> {
        let inner = build_inner_mask(p, outer, rng);
        debug_assert!(inner.is_subset_of(outer.cells()));
        if inner.is_empty() {
            return Ok(inner);
        }

        let shape = state.shape();
        let masked_input = state.masked_view(&inner);
        let indicator = inner.to_indicator(shape.pitches);
        let predictions = self.model.predict(&masked_input, &indicator)?;
        validate_predictions(shape, &inner, &predictions)?;

        let samples = sample_masked(&predictions, &inner, self.temperature, rng)?;
        for (step, voice, pitch) in samples {
            state.set_pitch_index(step, voice, pitch);
        }
        Ok(inner)
    }
}

/// Infill `grid` within `outer` using the Yao schedule.
pub fn gibbs_infill<M: DensityModel + ?Sized>(
    grid: &Grid,
    outer: &OuterMask,
    total_iterations: usize,
    temperature: f64,
    model: &M,
    rng: &mut impl Rng,
) -> Result<Grid> {
    let config = InfillConfig {
        total_iterations,
        temperature,
        ..Default::default()
    };
    let outcome = GibbsSampler::new(model, &config).run(grid, outer, rng)?;
    Ok(outcome.grid)
}
