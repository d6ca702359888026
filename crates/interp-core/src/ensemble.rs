//! Weighted ensemble mean of the member accumulations.

use nowcast_common::GridSpec;
use tracing::debug;

use crate::codes::Accum;
use crate::config::InterpConfig;
use crate::error::{InterpError, Result};

/// Largest mean written to the 16-bit output; `u16::MAX` is nodata.
const MEAN_OUTPUT_MAX: f64 = (u16::MAX - 1) as f64;

/// Lead-time dependent weight of the deterministic member.
///
/// The weight starts at `init_weight` percent of the member count and falls
/// linearly to zero over `weight_span` percent of the nowcast length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetermWeightSchedule {
    start: f64,
    lapse: f64,
}

impl DetermWeightSchedule {
    pub fn new(init_weight: f64, weight_span: f64, members: usize, steps: usize) -> Self {
        let start = 0.01 * init_weight * members as f64;
        let lapse = if weight_span > 0.0 && steps > 0 {
            100.0 * start / (weight_span * steps as f64)
        } else {
            0.0
        };
        Self { start, lapse }
    }

    /// The schedule of a configuration, or `None` when member 0 is weighted
    /// like every other member.
    pub fn from_config(config: &InterpConfig) -> Option<Self> {
        config.determ_weighting_enabled().then(|| {
            Self::new(
                config.determ_init_weight,
                config.determ_weight_span,
                config.members,
                config.timesteps,
            )
        })
    }

    /// Weight at step 0.
    pub fn start(&self) -> f64 {
        self.start
    }

    /// Weight lost per step.
    pub fn lapse(&self) -> f64 {
        self.lapse
    }

    /// Weight at `step`, clamped at zero.
    ///
    /// The raw weight never increases, so once it reaches zero the member
    /// stays excluded for the rest of the run.
    pub fn weight_at(&self, step: usize) -> f64 {
        (self.start - self.lapse * step as f64).max(0.0)
    }
}

/// Mean accumulation of one step, `None` where no member had valid data.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleMean {
    grid: GridSpec,
    values: Vec<Option<f64>>,
}

impl EnsembleMean {
    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// Mean in 1/100000 mm.
    pub fn get(&self, pixel: usize) -> Option<f64> {
        self.values.get(pixel).copied().flatten()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Number of pixels without any contributing member.
    pub fn nodata_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    /// Output values in 1/100 mm.
    ///
    /// Nodata becomes `0xFFFF`, or `0` with `ignore_nodata`.
    pub fn to_hundredths(&self, ignore_nodata: bool) -> Vec<u16> {
        let nodata = if ignore_nodata { 0 } else { u16::MAX };
        self.values
            .iter()
            .map(|value| match value {
                Some(mean) => (0.001 * mean).clamp(0.0, MEAN_OUTPUT_MAX) as u16,
                None => nodata,
            })
            .collect()
    }
}

/// Combines the member accumulations of a step into a weighted mean.
#[derive(Debug, Clone)]
pub struct EnsembleAggregator {
    grid: GridSpec,
    members: usize,
    schedule: Option<DetermWeightSchedule>,
}

impl EnsembleAggregator {
    pub fn new(config: &InterpConfig, grid: GridSpec) -> Self {
        Self {
            grid,
            members: config.members,
            schedule: DetermWeightSchedule::from_config(config),
        }
    }

    pub fn schedule(&self) -> Option<&DetermWeightSchedule> {
        self.schedule.as_ref()
    }

    /// Weight of `member` at `step`.
    pub fn member_weight(&self, member: usize, step: usize) -> f64 {
        match (&self.schedule, member) {
            (Some(schedule), 0) => schedule.weight_at(step),
            _ => 1.0,
        }
    }

    /// Weighted mean over all members with valid data at each pixel.
    pub fn aggregate(&self, step: usize, fields: &[&[Accum]]) -> Result<EnsembleMean> {
        if fields.len() != self.members {
            return Err(InterpError::shape_mismatch(
                "ensemble members",
                self.members,
                fields.len(),
            ));
        }
        for field in fields {
            if field.len() != self.grid.len() {
                return Err(InterpError::shape_mismatch(
                    "member accumulation",
                    self.grid.len(),
                    field.len(),
                ));
            }
        }

        let weights: Vec<f64> = (0..self.members)
            .map(|member| self.member_weight(member, step))
            .collect();

        if let Some(schedule) = &self.schedule {
            debug!(
                step,
                weight = weights[0],
                start = schedule.start(),
                "Deterministic member weight"
            );
        }

        let values = (0..self.grid.len())
            .map(|n| {
                let mut sum = 0.0;
                let mut count = 0.0;
                for (field, &weight) in fields.iter().zip(&weights) {
                    if weight <= 0.0 {
                        continue;
                    }
                    if let Some(acc) = field[n].get() {
                        sum += weight * acc as f64;
                        count += weight;
                    }
                }
                (count > 0.0).then(|| sum / count)
            })
            .collect();

        Ok(EnsembleMean {
            grid: self.grid,
            values,
        })
    }
}
