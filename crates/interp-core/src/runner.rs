//! Step loop driving all members through the nowcast.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::codes::{Accum, Code};
use crate::context::InterpContext;
use crate::engine::{MemberState, StepSummary};
use crate::error::Result;
use crate::io::{FieldSource, OutputSink};

/// Totals of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: usize,
    pub members: usize,
    /// Member-step pixels written as nodata.
    pub nodata_pixels: usize,
    pub elapsed: Duration,
}

/// Runs the member sweep step by step.
///
/// Per step: read every member's field, interpolate all members in
/// parallel, write outputs once all members joined, aggregate the ensemble
/// mean, then rotate the member buffers.
pub struct NowcastRunner<'a> {
    ctx: &'a InterpContext,
    states: Vec<MemberState>,
    pool: rayon::ThreadPool,
    step: usize,
}

impl<'a> NowcastRunner<'a> {
    /// Prepare one state per member, all starting from `observation`.
    pub fn new(ctx: &'a InterpContext, observation: Arc<[Code]>) -> Result<Self> {
        let config = ctx.config();
        let states = (0..config.members)
            .map(|member| MemberState::new(ctx, member, Arc::clone(&observation)))
            .collect::<Result<Vec<_>>>()?;

        let threads = config.threads.unwrap_or(config.members);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("interp-worker-{}", i))
            .build()?;

        info!(members = config.members, threads, "Nowcast runner ready");

        Ok(Self {
            ctx,
            states,
            pool,
            step: 0,
        })
    }

    /// Index of the next step to run.
    pub fn next_step(&self) -> usize {
        self.step
    }

    pub fn states(&self) -> &[MemberState] {
        &self.states
    }

    /// Run every configured step.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<RunSummary>
    where
        S: FieldSource + ?Sized,
        K: OutputSink + ?Sized,
    {
        let start = Instant::now();
        let ctx = self.ctx;
        let config = ctx.config();
        let mut summary = RunSummary {
            members: config.members,
            ..RunSummary::default()
        };

        info!(
            steps = config.timesteps,
            members = config.members,
            substeps = config.substeps,
            "Starting nowcast interpolation"
        );

        while self.step < config.timesteps {
            let members = self.run_step(source, sink)?;
            summary.nodata_pixels += members.iter().map(|m| m.nodata_pixels).sum::<usize>();
            summary.steps += 1;
        }

        summary.elapsed = start.elapsed();
        info!(
            steps = summary.steps,
            nodata_pixels = summary.nodata_pixels,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Nowcast interpolation complete"
        );
        Ok(summary)
    }

    /// Run a single step and advance.
    pub fn run_step<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<Vec<StepSummary>>
    where
        S: FieldSource + ?Sized,
        K: OutputSink + ?Sized,
    {
        let ctx = self.ctx;
        let step = self.step;
        let step_start = Instant::now();

        for state in &mut self.states {
            source.read_member_step(state.member(), step, state.incoming_raw())?;
            state.load_incoming(ctx.codes());
        }

        let states = &mut self.states;
        let summaries = self.pool.install(|| {
            states
                .par_iter_mut()
                .map(|state| state.interpolate(ctx))
                .collect::<Result<Vec<_>>>()
        })?;

        let fields: Vec<&[Accum]> = self.states.iter().map(|s| s.accumulation()).collect();
        sink.write_accumulations(step, &fields)?;

        let diagnostics = &ctx.config().diagnostics;
        for state in &self.states {
            if let Some(rasters) = state.substep_rasters() {
                sink.write_substep_rasters(step, state.member(), rasters)?;
            }
            if let Some(raster) = state.monitor_raster() {
                sink.write_monitor_raster(step, state.member(), raster)?;
            }
        }

        if diagnostics.ensemble_mean {
            let mean = ctx.aggregator().aggregate(step, &fields)?;
            debug!(step, nodata = mean.nodata_count(), "Ensemble mean aggregated");
            sink.write_ensemble_mean(step, &mean)?;
        }

        for state in &mut self.states {
            state.advance();
        }
        self.step += 1;

        info!(
            step,
            members = summaries.len(),
            nodata_pixels = summaries.iter().map(|s| s.nodata_pixels).sum::<usize>(),
            elapsed_ms = step_start.elapsed().as_millis() as u64,
            "Step complete"
        );

        Ok(summaries)
    }
}
