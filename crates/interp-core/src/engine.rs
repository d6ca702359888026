//! Per-member interpolation of one nowcast step.
//!
//! A member holds two code fields: the past field (the observation before
//! the first step, afterwards the previous step's nowcast) and the incoming
//! future field. [`MemberState::interpolate`] walks every substep slot over
//! all pixels, summing the substep accumulations into the step total, then
//! advects the nodata mask into the incoming field. [`MemberState::advance`]
//! rotates the buffers for the next step.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::codes::{Accum, Code, CodeTables};
use crate::config::AccumulationMode;
use crate::context::InterpContext;
use crate::error::{InterpError, Result};
use crate::trajectory::{Direction, TrajectoryTables};

/// Statistics of one member's step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepSummary {
    pub member: usize,
    pub step: usize,
    /// Pixels whose accumulation is nodata.
    pub nodata_pixels: usize,
    /// Pixels of the incoming field masked by nodata advection.
    pub masked_pixels: usize,
    /// Largest valid accumulation, 1/100000 mm.
    pub max_accumulation: u32,
}

#[derive(Debug)]
enum PastField {
    /// The shared observation, before the first advance.
    Observed(Arc<[Code]>),
    Owned(Vec<Code>),
}

impl PastField {
    fn as_slice(&self) -> &[Code] {
        match self {
            Self::Observed(codes) => codes,
            Self::Owned(codes) => codes,
        }
    }
}

/// Buffers of one ensemble member.
#[derive(Debug)]
pub struct MemberState {
    member: usize,
    step: usize,
    tables: Arc<TrajectoryTables>,
    past: PastField,
    future: Vec<Code>,
    /// Becomes the future buffer when the observation is released.
    spare: Vec<Code>,
    /// Scratch step total, before the accumulation mode is applied.
    step_acc: Vec<Accum>,
    accumulation: Vec<Accum>,
    substep_dbz: Option<Vec<Vec<u8>>>,
    monitor: Option<Vec<u8>>,
}

impl MemberState {
    /// Create the state of `member`, starting from the shared observation.
    pub fn new(ctx: &InterpContext, member: usize, observation: Arc<[Code]>) -> Result<Self> {
        let grid = ctx.grid();
        if observation.len() != grid.len() {
            return Err(InterpError::shape_mismatch(
                "observation codes",
                grid.len(),
                observation.len(),
            ));
        }

        let config = ctx.config();
        let len = grid.len();
        let diagnostics = &config.diagnostics;

        Ok(Self {
            member,
            step: 0,
            tables: Arc::clone(ctx.trajectories(member)?),
            past: PastField::Observed(observation),
            future: vec![Code::ZERO; len],
            spare: vec![Code::ZERO; len],
            step_acc: vec![Accum::ZERO; len],
            accumulation: vec![Accum::ZERO; len],
            substep_dbz: diagnostics
                .substep_dbz
                .then(|| vec![vec![0u8; len]; config.substeps as usize]),
            monitor: diagnostics.monitor_accumulation.then(|| vec![0u8; len]),
        })
    }

    pub fn member(&self) -> usize {
        self.member
    }

    /// Index of the step the buffers currently cover.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Buffer for the raw values of the incoming field.
    ///
    /// Call [`Self::load_incoming`] after filling it.
    pub fn incoming_raw(&mut self) -> &mut [u16] {
        bytemuck::cast_slice_mut(&mut self.future)
    }

    /// Translate the raw incoming values onto the internal code scale.
    pub fn load_incoming(&mut self, codes: &CodeTables) {
        for code in self.future.iter_mut() {
            *code = codes.translate_external(code.value());
        }
    }

    pub fn past(&self) -> &[Code] {
        self.past.as_slice()
    }

    pub fn future(&self) -> &[Code] {
        &self.future
    }

    /// Accumulation of the last interpolated step.
    pub fn accumulation(&self) -> &[Accum] {
        &self.accumulation
    }

    /// dBZ index rasters of the last step, one per substep.
    pub fn substep_rasters(&self) -> Option<&[Vec<u8>]> {
        self.substep_dbz.as_deref()
    }

    /// Monitoring raster of the last step.
    pub fn monitor_raster(&self) -> Option<&[u8]> {
        self.monitor.as_deref()
    }

    /// Interpolate between the past and the loaded incoming field.
    pub fn interpolate(&mut self, ctx: &InterpContext) -> Result<StepSummary> {
        let codes = ctx.codes();
        let lut = ctx.lut();
        let config = ctx.config();
        let tables = &*self.tables;
        let past = self.past.as_slice();
        let future = &self.future;

        let mut rasters = self.substep_dbz.as_deref_mut();

        // substep 0 starts at the destination pixel itself
        let mut raster = rasters.as_deref_mut().map(|r| r[0].as_mut_slice());
        for (n, acc) in self.step_acc.iter_mut().enumerate() {
            *acc = codes.accumulation(past[n]);
            if let Some(raster) = raster.as_deref_mut() {
                raster[n] = codes.dbz_index_from_acc(*acc);
            }
        }

        for slot in 0..tables.slots() {
            let past_src = tables.slot(Direction::Past, slot);
            let future_src = tables.slot(Direction::Future, slot);
            let mut raster = rasters.as_deref_mut().map(|r| r[slot + 1].as_mut_slice());

            for (n, acc) in self.step_acc.iter_mut().enumerate() {
                let substep = match (past_src[n].get(), future_src[n].get()) {
                    (Some(p), Some(f)) => lut.get(past[p], future[f], slot),
                    _ => Accum::NODATA,
                };
                if let Some(raster) = raster.as_deref_mut() {
                    raster[n] = codes.dbz_index_from_acc(substep);
                }
                *acc = add(*acc, substep);
            }
        }

        match config.accumulation_mode {
            AccumulationMode::PerStep => self.accumulation.copy_from_slice(&self.step_acc),
            AccumulationMode::Cumulative => {
                for (total, &acc) in self.accumulation.iter_mut().zip(&self.step_acc) {
                    *total = add(*total, acc);
                }
            }
        }

        if let Some(pixel) = config.sample_pixel {
            self.trace_sample(ctx, pixel);
        }

        let masked_pixels = self.mask_incoming(codes);

        if let Some(monitor) = self.monitor.as_mut() {
            let scaler = config.diagnostics.monitor_scaler;
            for (byte, &acc) in monitor.iter_mut().zip(&self.accumulation) {
                *byte = CodeTables::monitor_byte(acc, scaler);
            }
        }

        let mut summary = StepSummary {
            member: self.member,
            step: self.step,
            ..StepSummary::default()
        };
        for acc in &self.accumulation {
            match acc.get() {
                Some(value) => summary.max_accumulation = summary.max_accumulation.max(value),
                None => summary.nodata_pixels += 1,
            }
        }
        summary.masked_pixels = masked_pixels;

        debug!(
            member = summary.member,
            step = summary.step,
            nodata = summary.nodata_pixels,
            masked = summary.masked_pixels,
            max_acc = summary.max_accumulation,
            "Member step interpolated"
        );

        Ok(summary)
    }

    /// Carry nodata of the past field into the incoming field along the
    /// one-step motion. Runs after the sweep so the sweep never sees a
    /// partially masked field.
    fn mask_incoming(&mut self, codes: &CodeTables) -> usize {
        let nodata = codes.nodata_code();
        let past = self.past.as_slice();
        let mut masked = 0;

        for (n, code) in self.future.iter_mut().enumerate() {
            let source_missing = match self.tables.one_step(n).get() {
                Some(src) => codes.is_nodata(past[src]),
                None => true,
            };
            if source_missing && *code != nodata {
                *code = nodata;
                masked += 1;
            }
        }
        masked
    }

    fn trace_sample(&self, ctx: &InterpContext, pixel: usize) {
        let codes = ctx.codes();
        let past = self.past.as_slice();
        let code = past[pixel];

        trace!(
            member = self.member,
            step = self.step,
            pixel,
            substep = 0,
            past_code = code.value(),
            acc = codes.accumulation(code).raw(),
            "Sample pixel"
        );
        for slot in 0..self.tables.slots() {
            let p = self.tables.source(Direction::Past, slot, pixel).get();
            let f = self.tables.source(Direction::Future, slot, pixel).get();
            let (past_code, future_code, acc) = match (p, f) {
                (Some(p), Some(f)) => (
                    Some(past[p].value()),
                    Some(self.future[f].value()),
                    ctx.lut().get(past[p], self.future[f], slot).raw(),
                ),
                _ => (None, None, Accum::NODATA.raw()),
            };
            trace!(
                member = self.member,
                step = self.step,
                pixel,
                substep = slot + 1,
                past_src = ?p,
                future_src = ?f,
                past_code = ?past_code,
                future_code = ?future_code,
                acc,
                "Sample pixel"
            );
        }
        trace!(
            member = self.member,
            step = self.step,
            pixel,
            total = self.accumulation[pixel].raw(),
            "Sample pixel total"
        );
    }

    /// Make the incoming field the past field of the next step.
    ///
    /// Buffers are rotated, never copied.
    pub fn advance(&mut self) {
        let incoming = std::mem::take(&mut self.future);
        let outgoing = std::mem::replace(&mut self.past, PastField::Owned(incoming));
        self.future = match outgoing {
            PastField::Owned(buffer) => buffer,
            PastField::Observed(_) => std::mem::take(&mut self.spare),
        };
        self.step += 1;
    }
}

/// Sum of two accumulations; nodata absorbs.
#[inline]
fn add(total: Accum, substep: Accum) -> Accum {
    match (total.get(), substep.get()) {
        (Some(a), Some(b)) => Accum::new(a.saturating_add(b)),
        _ => Accum::NODATA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Calibration, InterpConfig};
    use crate::trajectory::MotionField;
    use nowcast_common::GridSpec;

    fn coarse_config(substeps: u32) -> InterpConfig {
        InterpConfig {
            substeps,
            timesteps: 2,
            calibration: Calibration {
                gain: 1.0,
                offset: -32.0,
                ..Calibration::default()
            },
            ..InterpConfig::default()
        }
    }

    fn context(config: InterpConfig, motion: MotionField) -> InterpContext {
        let grid = motion.grid();
        InterpContext::build(config, grid, vec![motion]).unwrap()
    }

    fn fill_incoming(state: &mut MemberState, ctx: &InterpContext, value: u16) {
        state.incoming_raw().fill(value);
        state.load_incoming(ctx.codes());
    }

    #[test]
    fn test_uniform_field_zero_motion() {
        let grid = GridSpec::new(4, 4);
        let ctx = context(coarse_config(2), MotionField::uniform(grid, 0.0, 0.0));
        let code = Code::new(60);
        let observation: Arc<[Code]> = vec![code; grid.len()].into();

        let mut state = MemberState::new(&ctx, 0, observation).unwrap();
        fill_incoming(&mut state, &ctx, 60);
        let summary = state.interpolate(&ctx).unwrap();

        let expected = 2 * ctx.codes().accumulation(code).get().unwrap();
        assert!(state.accumulation().iter().all(|a| a.get() == Some(expected)));
        assert_eq!(summary.nodata_pixels, 0);
        assert_eq!(summary.masked_pixels, 0);
        assert_eq!(summary.max_accumulation, expected);
    }

    #[test]
    fn test_nodata_past_pixel_spoils_step_and_propagates() {
        let grid = GridSpec::new(4, 4);
        let ctx = context(coarse_config(4), MotionField::uniform(grid, 0.0, 0.0));
        let nodata = ctx.codes().nodata_code();

        let mut observation = vec![Code::new(50); grid.len()];
        observation[5] = nodata;
        let mut state = MemberState::new(&ctx, 0, observation.into()).unwrap();
        fill_incoming(&mut state, &ctx, 50);

        let summary = state.interpolate(&ctx).unwrap();
        assert!(state.accumulation()[5].is_nodata());
        assert_eq!(summary.nodata_pixels, 1);
        // nodata advected into the incoming field
        assert_eq!(summary.masked_pixels, 1);
        assert_eq!(state.future()[5], nodata);
        assert_eq!(state.future()[6], Code::new(50));
    }

    #[test]
    fn test_external_nodata_translated() {
        let grid = GridSpec::new(2, 2);
        let ctx = context(coarse_config(2), MotionField::uniform(grid, 0.0, 0.0));
        let mut state = MemberState::new(&ctx, 0, vec![Code::ZERO; 4].into()).unwrap();

        state.incoming_raw().copy_from_slice(&[0, u16::MAX, 70, 9999]);
        state.load_incoming(ctx.codes());

        let codes = ctx.codes();
        assert_eq!(state.future()[1], codes.nodata_code());
        assert_eq!(state.future()[2], Code::new(70));
        assert_eq!(state.future()[3], Code::new(codes.max_code()));
    }

    #[test]
    fn test_off_grid_trajectory_is_nodata_and_masked() {
        // 2 px per step to the east with 2 substeps: the western column's
        // backward trajectory and the eastern column's forward trajectory
        // leave the grid at the first substep.
        let grid = GridSpec::new(4, 4);
        let ctx = context(coarse_config(2), MotionField::uniform(grid, 2.0, 0.0));
        let observation: Arc<[Code]> = vec![Code::new(40); grid.len()].into();

        let mut state = MemberState::new(&ctx, 0, observation).unwrap();
        fill_incoming(&mut state, &ctx, 40);
        let summary = state.interpolate(&ctx).unwrap();

        let nodata = ctx.codes().nodata_code();
        for y in 0..4 {
            let west = grid.flat_index(0, y);
            assert!(state.accumulation()[west].is_nodata());
            // one full step back (2 px) is off grid for x < 2
            assert_eq!(state.future()[west], nodata);
            assert_eq!(state.future()[grid.flat_index(1, y)], nodata);
            assert_ne!(state.future()[grid.flat_index(2, y)], nodata);
            assert!(state.accumulation()[grid.flat_index(3, y)].is_nodata());
            assert!(!state.accumulation()[grid.flat_index(1, y)].is_nodata());
            assert!(!state.accumulation()[grid.flat_index(2, y)].is_nodata());
        }
        assert_eq!(summary.masked_pixels, 8);
    }

    #[test]
    fn test_advance_rotates_buffers() {
        let grid = GridSpec::new(3, 3);
        let ctx = context(coarse_config(2), MotionField::uniform(grid, 0.0, 0.0));
        let mut state = MemberState::new(&ctx, 0, vec![Code::ZERO; 9].into()).unwrap();

        fill_incoming(&mut state, &ctx, 30);
        state.interpolate(&ctx).unwrap();
        let incoming_ptr = state.future().as_ptr();
        state.advance();

        assert_eq!(state.step(), 1);
        assert_eq!(state.past().as_ptr(), incoming_ptr);
        assert_eq!(state.past()[0], Code::new(30));
        assert_eq!(state.future().len(), 9);

        // second rotation hands the old past buffer back
        let past_ptr = state.past().as_ptr();
        fill_incoming(&mut state, &ctx, 31);
        let second_incoming = state.future().as_ptr();
        state.advance();
        assert_eq!(state.past().as_ptr(), second_incoming);
        assert_eq!(state.future().as_ptr(), past_ptr);
    }

    #[test]
    fn test_cumulative_mode_keeps_running_total() {
        let grid = GridSpec::new(2, 1);
        let mut config = coarse_config(2);
        config.accumulation_mode = AccumulationMode::Cumulative;
        let ctx = context(config, MotionField::uniform(grid, 0.0, 0.0));
        let one = ctx.codes().accumulation(Code::new(50)).get().unwrap();

        let mut state = MemberState::new(&ctx, 0, vec![Code::new(50); 2].into()).unwrap();
        fill_incoming(&mut state, &ctx, 50);
        state.interpolate(&ctx).unwrap();
        state.advance();

        state.incoming_raw().copy_from_slice(&[50, u16::MAX]);
        state.load_incoming(ctx.codes());
        state.interpolate(&ctx).unwrap();

        assert_eq!(state.accumulation()[0].get(), Some(4 * one));
        assert!(state.accumulation()[1].is_nodata());
    }

    #[test]
    fn test_diagnostic_rasters() {
        let grid = GridSpec::new(2, 2);
        let mut config = coarse_config(3);
        config.diagnostics.substep_dbz = true;
        config.diagnostics.monitor_accumulation = true;
        config.diagnostics.monitor_scaler = 1;
        let ctx = context(config, MotionField::uniform(grid, 0.0, 0.0));

        let mut observation = vec![Code::new(80); 4];
        observation[3] = ctx.codes().nodata_code();
        let mut state = MemberState::new(&ctx, 0, observation.into()).unwrap();
        fill_incoming(&mut state, &ctx, 80);
        state.interpolate(&ctx).unwrap();

        let rasters = state.substep_rasters().unwrap();
        assert_eq!(rasters.len(), 3);
        let index = ctx.codes().dbz_index_from_acc(ctx.codes().accumulation(Code::new(80)));
        for raster in rasters {
            assert_eq!(&raster[..3], &[index; 3]);
            assert_eq!(raster[3], 255);
        }

        let monitor = state.monitor_raster().unwrap();
        assert_eq!(monitor[3], 255);
        assert!(monitor[0] > 0);
    }

    #[test]
    fn test_diagnostics_disabled_by_default() {
        let grid = GridSpec::new(2, 2);
        let ctx = context(coarse_config(2), MotionField::uniform(grid, 0.0, 0.0));
        let state = MemberState::new(&ctx, 0, vec![Code::ZERO; 4].into()).unwrap();
        assert!(state.substep_rasters().is_none());
        assert!(state.monitor_raster().is_none());
    }

    #[test]
    fn test_observation_shape_checked() {
        let grid = GridSpec::new(2, 2);
        let ctx = context(coarse_config(2), MotionField::uniform(grid, 0.0, 0.0));
        assert!(MemberState::new(&ctx, 0, vec![Code::ZERO; 3].into()).is_err());
        assert!(MemberState::new(&ctx, 1, vec![Code::ZERO; 4].into()).is_err());
    }
}
