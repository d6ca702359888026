//! File-based output sink.
//!
//! Every step produces one `.dat` file holding the accumulations of all
//! members; diagnostic rasters and the ensemble mean go to PGM files next
//! to it. Stamps are UTC and follow [`nowcast_common::time::STAMP_FORMAT`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use interp_core::{Accum, EnsembleMean, OutputSink};
use nowcast_common::{GridSpec, NowcastClock, NowcastError, NowcastResult};
use tracing::debug;

use crate::pgm;

/// Accumulation file prefix when none is configured.
pub const DEFAULT_PREFIX: &str = "RAVACC";

/// Builds output file names.
#[derive(Debug, Clone)]
pub struct OutputNaming {
    pub out_dir: PathBuf,
    pub prefix: String,
    pub area: String,
    /// Analysis time exactly as given on the command line.
    pub analysis_label: String,
    pub clock: NowcastClock,
}

impl OutputNaming {
    pub fn new(
        out_dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        area: impl Into<String>,
        analysis_label: impl Into<String>,
        clock: NowcastClock,
    ) -> Self {
        Self {
            out_dir: out_dir.into(),
            prefix: prefix.into(),
            area: area.into(),
            analysis_label: analysis_label.into(),
            clock,
        }
    }

    fn valid_stamp(&self, step: usize) -> String {
        NowcastClock::stamp(self.clock.valid_time(step))
    }

    /// `{prefix}_{analysis}-{valid12}+{lead}_{area}.dat`
    pub fn accumulation_path(&self, step: usize) -> PathBuf {
        let valid = self.valid_stamp(step);
        self.out_dir.join(format!(
            "{}_{}-{}+{:03}_{}.dat",
            self.prefix,
            self.analysis_label,
            &valid[..12],
            self.clock.lead_minutes(step),
            self.area
        ))
    }

    /// `Z_M{member}_{analysis}-{substep stamp}.pgm`
    pub fn substep_raster_path(&self, step: usize, member: usize, substep: usize) -> PathBuf {
        self.out_dir.join(format!(
            "Z_M{:02}_{}-{}.pgm",
            member,
            self.analysis_label,
            NowcastClock::stamp(self.clock.substep_time(step, substep))
        ))
    }

    /// `Interacc_M{member}_{analysis}-{valid stamp}.pgm`
    pub fn monitor_path(&self, step: usize, member: usize) -> PathBuf {
        self.out_dir.join(format!(
            "Interacc_M{:02}_{}-{}.pgm",
            member,
            self.analysis_label,
            self.valid_stamp(step)
        ))
    }

    /// `Ensmean_{analysis}-{valid12}+{lead}_{area}.pgm`
    pub fn ensemble_mean_path(&self, step: usize) -> PathBuf {
        let valid = self.valid_stamp(step);
        self.out_dir.join(format!(
            "Ensmean_{}-{}+{:03}_{}.pgm",
            self.analysis_label,
            &valid[..12],
            self.clock.lead_minutes(step),
            self.area
        ))
    }
}

/// Writes run outputs into a directory.
pub struct FileSink {
    naming: OutputNaming,
    grid: GridSpec,
    ignore_nodata: bool,
    files_written: usize,
}

impl FileSink {
    /// Create a sink writing into `naming.out_dir`, which must exist.
    pub fn new(naming: OutputNaming, grid: GridSpec, ignore_nodata: bool) -> NowcastResult<Self> {
        if !naming.out_dir.is_dir() {
            return Err(NowcastError::WriteError(format!(
                "output directory {} does not exist",
                naming.out_dir.display()
            )));
        }
        Ok(Self {
            naming,
            grid,
            ignore_nodata,
            files_written: 0,
        })
    }

    pub fn naming(&self) -> &OutputNaming {
        &self.naming
    }

    pub fn files_written(&self) -> usize {
        self.files_written
    }

    fn written(&mut self, path: &Path) {
        self.files_written += 1;
        debug!(path = %path.display(), "Wrote output file");
    }
}

impl OutputSink for FileSink {
    fn write_accumulations(&mut self, step: usize, members: &[&[Accum]]) -> NowcastResult<()> {
        for field in members {
            self.grid.check_len(field.len())?;
        }

        let path = self.naming.accumulation_path(step);
        let file = File::create(&path)
            .map_err(|e| NowcastError::WriteError(format!("{}: {}", path.display(), e)))?;
        let mut out = BufWriter::new(file);
        for field in members {
            out.write_all(bytemuck::cast_slice(field))?;
        }
        out.flush()?;

        self.written(&path);
        Ok(())
    }

    fn write_substep_rasters(&mut self, step: usize, member: usize, rasters: &[Vec<u8>]) -> NowcastResult<()> {
        for (substep, raster) in rasters.iter().enumerate() {
            let path = self.naming.substep_raster_path(step, member, substep);
            pgm::write_u8(&path, self.grid, raster)?;
            self.written(&path);
        }
        Ok(())
    }

    fn write_monitor_raster(&mut self, step: usize, member: usize, raster: &[u8]) -> NowcastResult<()> {
        let path = self.naming.monitor_path(step, member);
        pgm::write_u8(&path, self.grid, raster)?;
        self.written(&path);
        Ok(())
    }

    fn write_ensemble_mean(&mut self, step: usize, mean: &EnsembleMean) -> NowcastResult<()> {
        let path = self.naming.ensemble_mean_path(step);
        pgm::write_u16(&path, self.grid, &mean.to_hundredths(self.ignore_nodata))?;
        self.written(&path);
        Ok(())
    }
}
