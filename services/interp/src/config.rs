//! Command line and environment configuration.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::builder::BoolishValueParser;
use clap::Parser;
use interp_core::config::{DEFAULT_MONITOR_SCALER, DEFAULT_SUBSTEPS};
use interp_core::{AccumulationMode, Calibration, DiagnosticsConfig, InterpConfig};
use nowcast_io::writer::DEFAULT_PREFIX;
use nowcast_io::{ArchiveConfiguration, FieldCalibration};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "nowcast-interp")]
#[command(about = "Motion-compensated temporal interpolation of ensemble precipitation nowcasts")]
pub struct Args {
    /// Analysis time, YYYYMMDDHHMM (UTC)
    pub timestamp: String,

    /// Nowcast archive (HDF5)
    pub archive: PathBuf,

    /// Observed reflectivity at analysis time (binary PGM, 8 or 16 bit)
    pub observation: PathBuf,

    /// Output directory
    pub outdir: PathBuf,

    /// Area label used in output file names
    pub area: String,

    /// Interpolation substeps per nowcast step
    #[arg(default_value_t = DEFAULT_SUBSTEPS)]
    pub substeps: u32,

    /// Prefix of the accumulation files
    #[arg(long, env = "INTERP_NC_ACCPREF", default_value = DEFAULT_PREFIX)]
    pub accumulation_prefix: String,

    /// Divisor of the monitoring accumulation raster
    #[arg(long, env = "INTERP_PGMSCALER", default_value_t = DEFAULT_MONITOR_SCALER)]
    pub monitor_scaler: i32,

    /// Process this many steps instead of the archive's NUM_TIMESTEPS
    #[arg(long, env = "INTERP_FORCED_TIMESTEPS")]
    pub forced_timesteps: Option<usize>,

    /// Pixel index whose per-substep values are traced
    #[arg(long, env = "INTERP_SAMPLE_INDEX")]
    pub sample_index: Option<usize>,

    /// Write per-substep dBZ index rasters
    #[arg(long, env = "INTERP_GENERATE_DBZ", value_parser = BoolishValueParser::new())]
    pub generate_dbz: bool,

    /// Write the weighted ensemble mean
    #[arg(long, env = "INTERP_GENERATE_ENSMEAN", value_parser = BoolishValueParser::new())]
    pub generate_ensmean: bool,

    /// Write monitoring accumulation rasters
    #[arg(long, env = "INTERP_GENERATE_INTER_ACC", value_parser = BoolishValueParser::new())]
    pub generate_inter_acc: bool,

    /// Initial deterministic member weight, percent of the member count
    #[arg(long, env = "INTERP_DETERM_INITWEIGHT", default_value_t = 0.0)]
    pub determ_init_weight: f64,

    /// Span of the deterministic weight decay, percent of the nowcast length
    #[arg(long, env = "INTERP_DETERM_WEIGHTSPAN", default_value_t = 100.0)]
    pub determ_weight_span: f64,

    /// Write ensemble-mean nodata as zero
    #[arg(long, env = "INTERP_IGNORE_NODATA", value_parser = BoolishValueParser::new())]
    pub ignore_nodata: bool,

    /// Accumulate from analysis time instead of per step
    #[arg(long, env = "INTERP_CUMULATIVE", value_parser = BoolishValueParser::new())]
    pub cumulative: bool,

    /// Worker threads for the member sweep (default: one per member)
    #[arg(long, env = "INTERP_THREADS")]
    pub threads: Option<usize>,

    /// Log level, or any `RUST_LOG` directive (overridden by `RUST_LOG`)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Log filter: `RUST_LOG` when set, otherwise `--log-level`.
    pub fn log_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.log_level.to_lowercase()))
    }

    /// Number of steps to process.
    pub fn timesteps(&self, archive: &ArchiveConfiguration) -> Result<usize> {
        match self.forced_timesteps.or(archive.timesteps) {
            Some(0) => bail!("number of timesteps must be > 0"),
            Some(steps) => Ok(steps),
            None => bail!("archive has no NUM_TIMESTEPS and INTERP_FORCED_TIMESTEPS is not set"),
        }
    }

    /// Combine the command line with the archive's own configuration.
    pub fn interp_config(
        &self,
        archive: &ArchiveConfiguration,
        calibration: FieldCalibration,
    ) -> Result<InterpConfig> {
        let config = InterpConfig {
            substeps: self.substeps,
            step_secs: archive.step_secs,
            timesteps: self.timesteps(archive)?,
            members: archive.members(),
            deterministic: archive.deterministic,
            determ_init_weight: self.determ_init_weight,
            determ_weight_span: self.determ_weight_span,
            calibration: Calibration {
                gain: calibration.gain,
                offset: calibration.offset,
                zr_a: archive.zr_a,
                zr_b: archive.zr_b,
                nodata: calibration.nodata,
            },
            accumulation_mode: if self.cumulative {
                AccumulationMode::Cumulative
            } else {
                AccumulationMode::PerStep
            },
            diagnostics: DiagnosticsConfig {
                substep_dbz: self.generate_dbz,
                monitor_accumulation: self.generate_inter_acc,
                monitor_scaler: self.monitor_scaler,
                ensemble_mean: self.generate_ensmean,
                ignore_nodata: self.ignore_nodata,
            },
            sample_pixel: self.sample_index,
            threads: self.threads,
        };

        if let Err(message) = config.validate() {
            bail!("invalid configuration: {}", message);
        }
        Ok(config)
    }
}
