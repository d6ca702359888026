//! Wiring of archive, observation, engine and outputs for one run.

use anyhow::{bail, Context, Result};
use interp_core::{InterpContext, InterpError, NowcastRunner, RunSummary};
use nowcast_common::{NowcastClock, NowcastError, TimeParseError};
use nowcast_io::{silence_hdf5_errors, FileSink, NowcastArchive, OutputNaming, PgmImage};
use tracing::{debug, info};

use crate::config::Args;

/// Interpolate every member of the archive named in `args`.
pub fn run(args: &Args) -> Result<RunSummary> {
    let analysis = NowcastClock::parse_analysis(&args.timestamp)
        .with_context(|| format!("invalid analysis time '{}'", args.timestamp))?;

    silence_hdf5_errors();
    let mut archive = NowcastArchive::open(&args.archive)
        .with_context(|| format!("failed to open archive {}", args.archive.display()))?;
    let grid = archive.grid();

    let config = args.interp_config(archive.configuration(), archive.calibration())?;
    debug!(config = %serde_json::to_string(&config)?, "Resolved interpolation configuration");

    let observation = PgmImage::read(&args.observation)
        .with_context(|| format!("failed to read observation {}", args.observation.display()))?;
    if observation.grid() != grid {
        bail!(
            "observation is {} but the archive grid is {}",
            observation.grid(),
            grid
        );
    }
    info!(
        path = %args.observation.display(),
        scale = ?observation.observation_scale(),
        "Read observation"
    );

    let motion = archive.read_motion_fields()?;
    let ctx = InterpContext::build(config, grid, motion)?;
    let codes = ctx.remap_observation(&observation.to_u16(), observation.observation_scale())?;

    let naming = OutputNaming::new(
        &args.outdir,
        &args.accumulation_prefix,
        &args.area,
        &args.timestamp,
        NowcastClock::new(analysis, ctx.config().step_secs, ctx.config().substeps),
    );
    let mut sink = FileSink::new(naming, grid, ctx.config().diagnostics.ignore_nodata)?;

    let mut runner = NowcastRunner::new(&ctx, codes)?;
    let summary = runner.run(&mut archive, &mut sink)?;

    info!(files = sink.files_written(), outdir = %args.outdir.display(), "Outputs written");
    Ok(summary)
}

/// Category of a failed run for log fields.
///
/// Read and write failures report the collaborator's category, other engine
/// errors report `engine`, anything else `setup`.
pub fn failure_category(error: &anyhow::Error) -> &'static str {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<NowcastError>() {
            return e.category();
        }
        if let Some(e) = cause.downcast_ref::<InterpError>() {
            return match e {
                InterpError::Collaborator(inner) => inner.category(),
                _ => "engine",
            };
        }
        if cause.is::<TimeParseError>() {
            return "input";
        }
    }
    "setup"
}
