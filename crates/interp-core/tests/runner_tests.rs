//! End-to-end tests of the step loop with in-memory inputs and outputs.

use std::collections::HashMap;
use std::sync::Arc;

use interp_core::{
    Accum, Calibration, Code, EnsembleMean, FieldSource, InterpConfig, InterpContext, MotionField,
    NowcastRunner, OutputSink,
};
use nowcast_common::{GridSpec, NowcastError, NowcastResult};
use test_utils::{
    assert_field_close, create_code_ramp, create_rain_cell, create_rotation_motion, fixtures::scale,
    with_nodata,
};

/// Serves pre-built raw fields keyed by `(member, step)`.
struct MemorySource {
    fields: HashMap<(usize, usize), Vec<u16>>,
    reads: Vec<(usize, usize)>,
}

impl MemorySource {
    fn constant(members: usize, steps: usize, len: usize, value: u16) -> Self {
        let mut fields = HashMap::new();
        for member in 0..members {
            for step in 0..steps {
                fields.insert((member, step), vec![value; len]);
            }
        }
        Self {
            fields,
            reads: Vec::new(),
        }
    }
}

impl FieldSource for MemorySource {
    fn read_member_step(&mut self, member: usize, step: usize, out: &mut [u16]) -> NowcastResult<()> {
        let field = self
            .fields
            .get(&(member, step))
            .ok_or_else(|| NowcastError::MissingData(format!("member {} step {}", member, step)))?;
        out.copy_from_slice(field);
        self.reads.push((member, step));
        Ok(())
    }
}

/// Collects everything the runner writes.
#[derive(Default)]
struct MemorySink {
    accumulations: Vec<Vec<Vec<i32>>>,
    substep_rasters: HashMap<(usize, usize), Vec<Vec<u8>>>,
    monitor: HashMap<(usize, usize), Vec<u8>>,
    means: Vec<EnsembleMean>,
}

impl OutputSink for MemorySink {
    fn write_accumulations(&mut self, step: usize, members: &[&[Accum]]) -> NowcastResult<()> {
        assert_eq!(step, self.accumulations.len());
        self.accumulations.push(
            members
                .iter()
                .map(|field| field.iter().map(|a| a.raw()).collect())
                .collect(),
        );
        Ok(())
    }

    fn write_substep_rasters(&mut self, step: usize, member: usize, rasters: &[Vec<u8>]) -> NowcastResult<()> {
        self.substep_rasters.insert((step, member), rasters.to_vec());
        Ok(())
    }

    fn write_monitor_raster(&mut self, step: usize, member: usize, raster: &[u8]) -> NowcastResult<()> {
        self.monitor.insert((step, member), raster.to_vec());
        Ok(())
    }

    fn write_ensemble_mean(&mut self, step: usize, mean: &EnsembleMean) -> NowcastResult<()> {
        assert_eq!(step, self.means.len());
        self.means.push(mean.clone());
        Ok(())
    }
}

fn coarse_config(members: usize, substeps: u32, timesteps: usize) -> InterpConfig {
    let (gain, offset) = scale::COARSE;
    InterpConfig {
        members,
        substeps,
        timesteps,
        calibration: Calibration {
            gain,
            offset,
            ..Calibration::default()
        },
        ..InterpConfig::default()
    }
}

fn observation(ctx: &InterpContext, code: u16) -> Arc<[Code]> {
    vec![Code::new(code); ctx.grid().len()].into()
}

// =============================================================================
// Single member
// =============================================================================

#[test]
fn test_uniform_field_zero_motion_two_substeps() {
    let grid = GridSpec::new(4, 4);
    let ctx = InterpContext::build(
        coarse_config(1, 2, 1),
        grid,
        vec![MotionField::uniform(grid, 0.0, 0.0)],
    )
    .unwrap();

    let mut source = MemorySource::constant(1, 1, grid.len(), 70);
    let mut sink = MemorySink::default();
    let mut runner = NowcastRunner::new(&ctx, observation(&ctx, 70)).unwrap();
    let summary = runner.run(&mut source, &mut sink).unwrap();

    assert_eq!(summary.steps, 1);
    assert_eq!(summary.nodata_pixels, 0);

    let one = ctx.codes().accumulation(Code::new(70)).raw();
    assert!(one > 0);
    assert_eq!(sink.accumulations.len(), 1);
    assert!(sink.accumulations[0][0].iter().all(|&a| a == 2 * one));
}

#[test]
fn test_every_member_read_once_per_step() {
    let grid = GridSpec::new(3, 3);
    let ctx = InterpContext::build(
        coarse_config(3, 2, 4),
        grid,
        vec![MotionField::uniform(grid, 0.0, 0.0)],
    )
    .unwrap();

    let mut source = MemorySource::constant(3, 4, grid.len(), 10);
    let mut sink = MemorySink::default();
    let mut runner = NowcastRunner::new(&ctx, observation(&ctx, 10)).unwrap();
    runner.run(&mut source, &mut sink).unwrap();

    assert_eq!(source.reads.len(), 12);
    for step in 0..4 {
        for member in 0..3 {
            assert!(source.reads.contains(&(member, step)));
        }
    }
    assert_eq!(runner.next_step(), 4);
    assert_eq!(sink.accumulations.len(), 4);
    assert!(sink.accumulations.iter().all(|step| step.len() == 3));
}

#[test]
fn test_missing_field_aborts_run() {
    let grid = GridSpec::new(2, 2);
    let ctx = InterpContext::build(
        coarse_config(1, 2, 3),
        grid,
        vec![MotionField::uniform(grid, 0.0, 0.0)],
    )
    .unwrap();

    // only two of three steps available
    let mut source = MemorySource::constant(1, 2, grid.len(), 10);
    let mut sink = MemorySink::default();
    let mut runner = NowcastRunner::new(&ctx, observation(&ctx, 10)).unwrap();

    assert!(runner.run(&mut source, &mut sink).is_err());
    assert_eq!(sink.accumulations.len(), 2);
}

#[test]
fn test_code_ramp_accumulation_is_monotone() {
    let grid = GridSpec::new(8, 2);
    let ctx = InterpContext::build(
        coarse_config(1, 4, 1),
        grid,
        vec![MotionField::uniform(grid, 0.0, 0.0)],
    )
    .unwrap();

    let ramp = create_code_ramp(grid.width, grid.height, ctx.codes().max_code());
    let observation: Arc<[Code]> = ramp.iter().map(|&c| Code::new(c)).collect();
    let mut source = MemorySource::constant(1, 1, grid.len(), 0);
    source.fields.insert((0, 0), ramp.clone());

    let mut sink = MemorySink::default();
    let mut runner = NowcastRunner::new(&ctx, observation).unwrap();
    runner.run(&mut source, &mut sink).unwrap();

    let acc = &sink.accumulations[0][0];
    for row in acc.chunks(grid.width) {
        assert!(row.windows(2).all(|w| w[0] <= w[1]));
    }
    // zero motion: every substep sees the same code
    for (n, &code) in ramp.iter().enumerate() {
        assert_eq!(acc[n], 4 * ctx.codes().accumulation(Code::new(code)).raw());
    }
}

// =============================================================================
// Nodata handling
// =============================================================================

#[test]
fn test_off_grid_pixel_is_nodata_and_masks_next_step() {
    // one pixel per step towards the east; with 2 substeps the western
    // column's backward trajectory exits the grid at the first substep
    let grid = GridSpec::new(6, 1);
    let ctx = InterpContext::build(
        coarse_config(1, 2, 2),
        grid,
        vec![MotionField::uniform(grid, 2.0, 0.0)],
    )
    .unwrap();

    let mut source = MemorySource::constant(1, 2, grid.len(), 50);
    let mut sink = MemorySink::default();
    let mut runner = NowcastRunner::new(&ctx, observation(&ctx, 50)).unwrap();
    runner.run(&mut source, &mut sink).unwrap();

    let step0 = &sink.accumulations[0][0];
    assert_eq!(step0[0], -1);
    assert!(step0[1] > 0);

    // eastern column: the forward trajectory leaves the grid
    assert_eq!(step0[5], -1);

    // the two western pixels were masked in the incoming field; pixel 2
    // reaches the masked pixel 1 on its way back
    let step1 = &sink.accumulations[1][0];
    assert_eq!(&step1[..3], &[-1, -1, -1]);
    assert!(step1[3] > 0);
    assert!(step1[4] > 0);
}

#[test]
fn test_external_nodata_in_archive_field() {
    let grid = GridSpec::new(3, 1);
    let ctx = InterpContext::build(
        coarse_config(1, 3, 1),
        grid,
        vec![MotionField::uniform(grid, 0.0, 0.0)],
    )
    .unwrap();

    let mut source = MemorySource::constant(1, 1, grid.len(), 40);
    source
        .fields
        .insert((0, 0), with_nodata(vec![40; 3], 3, &[(1, 0)], u16::MAX));
    let mut sink = MemorySink::default();
    let mut runner = NowcastRunner::new(&ctx, observation(&ctx, 40)).unwrap();
    runner.run(&mut source, &mut sink).unwrap();

    let acc = &sink.accumulations[0][0];
    assert!(acc[0] > 0);
    assert_eq!(acc[1], -1);
    assert_eq!(acc[0], acc[2]);
}

// =============================================================================
// Ensemble
// =============================================================================

#[test]
fn test_ensemble_mean_with_deterministic_decay() {
    let grid = GridSpec::new(2, 2);
    let mut config = coarse_config(2, 2, 2);
    config.deterministic = true;
    config.determ_init_weight = 100.0;
    config.determ_weight_span = 100.0;
    config.diagnostics.ensemble_mean = true;
    let ctx = InterpContext::build(config, grid, vec![MotionField::uniform(grid, 0.0, 0.0)]).unwrap();

    // deterministic member wet, the other dry
    let mut source = MemorySource::constant(2, 2, grid.len(), 0);
    for step in 0..2 {
        source.fields.insert((0, step), vec![60; grid.len()]);
    }
    let mut sink = MemorySink::default();
    let mut runner = NowcastRunner::new(&ctx, observation(&ctx, 60)).unwrap();
    runner.run(&mut source, &mut sink).unwrap();

    assert_eq!(sink.means.len(), 2);

    // step 0: weights 2 and 1, step 1: weights 1 and 1
    let weighted = |step: usize, determ_weight: f64| -> Vec<Option<f64>> {
        let determ = &sink.accumulations[step][0];
        let other = &sink.accumulations[step][1];
        determ
            .iter()
            .zip(other)
            .map(|(&d, &o)| Some((determ_weight * d as f64 + o as f64) / (determ_weight + 1.0)))
            .collect()
    };
    assert_field_close(grid.width, sink.means[0].values(), &weighted(0, 2.0), 1e-6);
    assert_field_close(grid.width, sink.means[1].values(), &weighted(1, 1.0), 1e-6);
}

#[test]
fn test_ensemble_mean_disabled_by_default() {
    let grid = GridSpec::new(2, 2);
    let ctx = InterpContext::build(
        coarse_config(2, 2, 1),
        grid,
        vec![MotionField::uniform(grid, 0.0, 0.0)],
    )
    .unwrap();

    let mut source = MemorySource::constant(2, 1, grid.len(), 30);
    let mut sink = MemorySink::default();
    let mut runner = NowcastRunner::new(&ctx, observation(&ctx, 30)).unwrap();
    runner.run(&mut source, &mut sink).unwrap();

    assert!(sink.means.is_empty());
    assert!(sink.substep_rasters.is_empty());
    assert!(sink.monitor.is_empty());
}

#[test]
fn test_diagnostics_written_per_member() {
    let grid = GridSpec::new(3, 3);
    let mut config = coarse_config(2, 4, 1);
    config.diagnostics.substep_dbz = true;
    config.diagnostics.monitor_accumulation = true;
    let ctx = InterpContext::build(config, grid, vec![MotionField::uniform(grid, 0.0, 0.0)]).unwrap();

    let mut source = MemorySource::constant(2, 1, grid.len(), 55);
    let mut sink = MemorySink::default();
    let mut runner = NowcastRunner::new(&ctx, observation(&ctx, 55)).unwrap();
    runner.run(&mut source, &mut sink).unwrap();

    for member in 0..2 {
        assert_eq!(sink.substep_rasters[&(0, member)].len(), 4);
        assert_eq!(sink.monitor[&(0, member)].len(), grid.len());
    }
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_parallel_sweep_matches_single_thread() {
    let grid = GridSpec::new(24, 18);
    let (dx, dy) = create_rotation_motion(grid.width, grid.height, 6.0);
    let motion = MotionField::new(grid, dx, dy).unwrap();
    let cell = create_rain_cell(grid.width, grid.height, (12.0, 9.0), 8.0, 80);

    let run = |threads: usize| {
        let mut config = coarse_config(3, 5, 3);
        config.threads = Some(threads);
        let ctx = InterpContext::build(config, grid, vec![motion.clone()]).unwrap();

        let mut source = MemorySource::constant(3, 3, grid.len(), 0);
        for member in 0..3 {
            for step in 0..3 {
                source.fields.insert((member, step), cell.clone());
            }
        }
        let observation: Arc<[Code]> = cell.iter().map(|&c| Code::new(c)).collect();

        let mut sink = MemorySink::default();
        let mut runner = NowcastRunner::new(&ctx, observation).unwrap();
        runner.run(&mut source, &mut sink).unwrap();
        sink.accumulations
    };

    assert_eq!(run(1), run(3));
}
