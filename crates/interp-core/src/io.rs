//! Seams between the engine and its inputs and outputs.
//!
//! The engine never touches files directly. Nowcast fields come from a
//! [`FieldSource`] and results go to an [`OutputSink`], so the same runner
//! drives the HDF5 archive reader in production and in-memory doubles in
//! tests.

use nowcast_common::NowcastResult;

use crate::codes::Accum;
use crate::ensemble::EnsembleMean;

/// Provider of the per-member nowcast fields.
pub trait FieldSource {
    /// Fill `out` with the raw codes of `member` at nowcast step `step`.
    ///
    /// Values are on the archive's scale; the external nodata value is
    /// translated by the caller.
    fn read_member_step(&mut self, member: usize, step: usize, out: &mut [u16]) -> NowcastResult<()>;
}

/// Consumer of everything the runner produces for a step.
///
/// Only accumulations are mandatory; the diagnostic outputs default to
/// being dropped.
pub trait OutputSink {
    /// Step accumulations of every member, in member order.
    fn write_accumulations(&mut self, step: usize, members: &[&[Accum]]) -> NowcastResult<()>;

    /// Per-substep dBZ index rasters of one member.
    fn write_substep_rasters(
        &mut self,
        _step: usize,
        _member: usize,
        _rasters: &[Vec<u8>],
    ) -> NowcastResult<()> {
        Ok(())
    }

    /// Scaled accumulation raster of one member.
    fn write_monitor_raster(&mut self, _step: usize, _member: usize, _raster: &[u8]) -> NowcastResult<()> {
        Ok(())
    }

    /// Weighted ensemble mean of the step.
    fn write_ensemble_mean(&mut self, _step: usize, _mean: &EnsembleMean) -> NowcastResult<()> {
        Ok(())
    }
}
