//! Nowcast interpolation command line entry point.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

use nowcast_interp::Args;

fn main() -> Result<()> {
    let args = Args::parse();

    let builder = FmtSubscriber::builder()
        .with_env_filter(args.log_filter())
        .with_target(true)
        .with_thread_ids(true);
    if args.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    info!(
        analysis = %args.timestamp,
        archive = %args.archive.display(),
        area = %args.area,
        substeps = args.substeps,
        "Starting nowcast interpolation"
    );

    match nowcast_interp::run(&args) {
        Ok(summary) => {
            info!(
                steps = summary.steps,
                members = summary.members,
                nodata_pixels = summary.nodata_pixels,
                elapsed_ms = summary.elapsed.as_millis() as u64,
                "Nowcast interpolation finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(
                category = nowcast_interp::failure_category(&e),
                error = %format!("{:#}", e),
                "Nowcast interpolation failed"
            );
            Err(e)
        }
    }
}
