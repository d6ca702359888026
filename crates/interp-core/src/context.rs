//! Immutable run context: configuration plus every precomputed table.

use std::sync::Arc;
use std::time::Instant;

use nowcast_common::GridSpec;
use tracing::info;

use crate::acc_lut::AccumulationLut;
use crate::codes::{Code, CodeTables, ObservationScale};
use crate::config::InterpConfig;
use crate::ensemble::EnsembleAggregator;
use crate::error::{InterpError, Result};
use crate::trajectory::{build_member_tables, MotionField, TrajectoryTables};

/// Everything the member sweep reads, built once before the first step and
/// shared by reference afterwards.
#[derive(Debug)]
pub struct InterpContext {
    config: InterpConfig,
    grid: GridSpec,
    codes: CodeTables,
    lut: AccumulationLut,
    trajectories: Vec<Arc<TrajectoryTables>>,
    aggregator: EnsembleAggregator,
}

impl InterpContext {
    /// Validate the configuration and build all tables.
    ///
    /// `motion` holds either one field shared by every member or one field
    /// per member.
    pub fn build(config: InterpConfig, grid: GridSpec, motion: Vec<MotionField>) -> Result<Self> {
        config.validate().map_err(InterpError::InvalidConfig)?;

        if grid.is_empty() {
            return Err(InterpError::invalid_config(format!("empty grid {}", grid)));
        }
        if grid.len() > i32::MAX as usize {
            return Err(InterpError::invalid_config(format!(
                "grid {} exceeds the pixel index range",
                grid
            )));
        }
        if let Some(pixel) = config.sample_pixel {
            if pixel >= grid.len() {
                return Err(InterpError::invalid_config(format!(
                    "sample pixel {} outside grid {}",
                    pixel, grid
                )));
            }
        }
        for field in &motion {
            if field.grid() != grid {
                return Err(InterpError::invalid_config(format!(
                    "motion field grid {} does not match {}",
                    field.grid(),
                    grid
                )));
            }
        }

        let start = Instant::now();

        // the table builds never use more threads than there are motion fields
        let pool = init_pool(motion.len())?;
        let (codes, lut, trajectories) = pool.install(|| -> Result<_> {
            let codes = CodeTables::new(&config.calibration, config.step_secs, config.substeps)?;
            let lut = AccumulationLut::build(&codes, config.substeps);
            info!(
                codes = codes.code_count(),
                max_code = codes.max_code(),
                slots = lut.slots(),
                threads = pool.current_num_threads(),
                "Built code tables"
            );
            let trajectories = build_member_tables(&motion, config.members, config.substeps)?;
            Ok((codes, lut, trajectories))
        })?;
        let aggregator = EnsembleAggregator::new(&config, grid);

        info!(
            grid = %grid,
            members = config.members,
            motion_fields = motion.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Interpolation context ready"
        );

        Ok(Self {
            config,
            grid,
            codes,
            lut,
            trajectories,
            aggregator,
        })
    }

    pub fn config(&self) -> &InterpConfig {
        &self.config
    }

    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    pub fn codes(&self) -> &CodeTables {
        &self.codes
    }

    pub fn lut(&self) -> &AccumulationLut {
        &self.lut
    }

    pub fn aggregator(&self) -> &EnsembleAggregator {
        &self.aggregator
    }

    /// Trajectory tables of `member`.
    pub fn trajectories(&self, member: usize) -> Result<&Arc<TrajectoryTables>> {
        self.trajectories
            .get(member)
            .ok_or(InterpError::MemberOutOfRange {
                member,
                members: self.config.members,
            })
    }

    /// Remap an observation raster onto the code scale.
    ///
    /// The result is shared read-only as the first past field of every
    /// member.
    pub fn remap_observation(&self, raw: &[u16], scale: ObservationScale) -> Result<Arc<[Code]>> {
        if raw.len() != self.grid.len() {
            return Err(InterpError::shape_mismatch("observation", self.grid.len(), raw.len()));
        }
        Ok(raw
            .iter()
            .map(|&value| self.codes.remap_observation(value, scale))
            .collect())
    }
}

/// Worker pool for the table builds, one thread per motion field.
fn init_pool(fields: usize) -> Result<rayon::ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(fields.max(1))
        .thread_name(|i| format!("interp-init-{}", i))
        .build()?)
}
