//! Intensity codes and the static tables built from the calibration.
//!
//! Nowcast fields store reflectivity as integer codes
//! (`dBZ = gain * code + offset`). All hot-loop work happens on codes; the
//! tables here convert codes into accumulation per substep and back into
//! 8-bit dBZ indices for diagnostic rasters.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::config::Calibration;
use crate::error::{InterpError, Result};

/// Highest reflectivity represented by a regular code.
pub const MAX_DBZ: f64 = 100.0;

/// Rate scale of the diagnostic dBZ index table: one unit is 1/269 mm/h.
const RATE_UNITS_PER_MMH: f64 = 269.0;

/// Size of the rate → dBZ index table.
const RATE_TABLE_LEN: usize = 65536;

/// dBZ index written for missing data in 8-bit rasters.
pub const DBZ_INDEX_NODATA: u8 = 255;

/// Highest dBZ index for valid data.
const DBZ_INDEX_MAX: i32 = 254;

/// An intensity code on the internal scale.
///
/// Valid codes are `0..=max_code`; `max_code + 1` is reserved for missing
/// data. Whether a code is the nodata code depends on the calibration, so
/// the check lives on [`CodeTables::is_nodata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Pod, Zeroable)]
#[repr(transparent)]
pub struct Code(u16);

impl Code {
    pub const ZERO: Code = Code(0);

    #[inline]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn value(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Accumulated rainfall in 1/100000 mm, or missing.
///
/// Stored as a signed 32-bit value with `-1` for nodata so that output
/// grids can be written without conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(transparent)]
pub struct Accum(i32);

impl Accum {
    pub const ZERO: Accum = Accum(0);
    pub const NODATA: Accum = Accum(-1);

    /// Wrap a valid amount, saturating at `i32::MAX`.
    #[inline]
    pub fn new(amount: u32) -> Self {
        Self(amount.min(i32::MAX as u32) as i32)
    }

    /// Convert a physical amount, truncating and saturating.
    #[inline]
    pub fn from_f64(amount: f64) -> Self {
        if amount.is_nan() || amount <= 0.0 {
            return Self::ZERO;
        }
        Self(amount as i32)
    }

    /// The amount, or `None` for nodata.
    #[inline]
    pub fn get(self) -> Option<u32> {
        if self.0 < 0 {
            None
        } else {
            Some(self.0 as u32)
        }
    }

    #[inline]
    pub fn is_nodata(self) -> bool {
        self.0 < 0
    }

    /// Raw signed value as written to output grids.
    #[inline]
    pub fn raw(self) -> i32 {
        self.0
    }
}

impl Default for Accum {
    fn default() -> Self {
        Self::ZERO
    }
}

/// Dynamic range of an observation raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationScale {
    /// 8-bit IRIS dBZ: `dBZ = 0.5 v - 32`, 255 = nodata.
    Byte,
    /// 16-bit IRIS dBZ: `dBZ = 0.01 v - 327.68`, 65535 = nodata.
    Word,
}

impl ObservationScale {
    /// Pick the scale from a PGM maxval.
    pub fn from_maxval(maxval: u32) -> Self {
        if maxval > 255 {
            Self::Word
        } else {
            Self::Byte
        }
    }

    fn nodata(self) -> u16 {
        match self {
            Self::Byte => 255,
            Self::Word => u16::MAX,
        }
    }

    fn dbz(self, value: u16) -> f64 {
        match self {
            Self::Byte => 0.5 * value as f64 - 32.0,
            Self::Word => 0.01 * value as f64 - 327.68,
        }
    }
}

/// Static tables derived from the calibration, built once at startup.
#[derive(Debug, Clone)]
pub struct CodeTables {
    calibration: Calibration,
    max_code: u16,
    acc_from_code: Vec<Accum>,
    dbz_index_from_rate: Vec<u8>,
    /// Accumulation units per diagnostic rate unit.
    acc_per_rate_unit: f64,
}

impl CodeTables {
    /// Build the tables for fields with `step_secs` long steps split into
    /// `substeps` interpolation substeps.
    pub fn new(calibration: &Calibration, step_secs: i64, substeps: u32) -> Result<Self> {
        calibration.validate().map_err(InterpError::InvalidConfig)?;
        if substeps == 0 || step_secs <= 0 {
            return Err(InterpError::invalid_config(
                "step length and substep count must be > 0",
            ));
        }

        let max_code = (MAX_DBZ - calibration.offset) / calibration.gain;
        if !(max_code >= 1.0) || max_code >= (u16::MAX - 1) as f64 {
            return Err(InterpError::invalid_config(format!(
                "gain {} and offset {} give {} codes, outside the 16-bit code range",
                calibration.gain, calibration.offset, max_code
            )));
        }
        let max_code = max_code as u16;

        // mm/h during one substep -> 1/100000 mm
        let rate_scaler = step_secs as f64 / 0.036 / substeps as f64;
        let b = 0.1 / calibration.zr_b;
        let c = calibration.zr_a.log10() / calibration.zr_b;

        let mut acc_from_code = Vec::with_capacity(max_code as usize + 2);
        acc_from_code.push(Accum::ZERO);
        for code in 1..=max_code {
            let dbz = calibration.gain * code as f64 + calibration.offset;
            let rate = 10f64.powf(b * dbz - c);
            acc_from_code.push(Accum::from_f64(rate * rate_scaler));
        }
        acc_from_code.push(Accum::NODATA);

        Ok(Self {
            calibration: *calibration,
            max_code,
            acc_from_code,
            dbz_index_from_rate: build_dbz_index_table(calibration),
            acc_per_rate_unit: rate_scaler / RATE_UNITS_PER_MMH,
        })
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Highest valid code.
    pub fn max_code(&self) -> u16 {
        self.max_code
    }

    /// The reserved nodata code (`max_code + 1`).
    pub fn nodata_code(&self) -> Code {
        Code(self.max_code + 1)
    }

    /// Number of codes including the nodata code.
    pub fn code_count(&self) -> usize {
        self.acc_from_code.len()
    }

    #[inline]
    pub fn is_nodata(&self, code: Code) -> bool {
        code.0 > self.max_code
    }

    /// Accumulation of one substep at the intensity of `code`.
    #[inline]
    pub fn accumulation(&self, code: Code) -> Accum {
        self.acc_from_code
            .get(code.index())
            .copied()
            .unwrap_or(Accum::NODATA)
    }

    /// Translate a raw nowcast value onto the internal code scale.
    ///
    /// The external nodata value maps to the nodata code; anything above the
    /// highest code saturates to it.
    #[inline]
    pub fn translate_external(&self, raw: u16) -> Code {
        if raw == self.calibration.nodata {
            self.nodata_code()
        } else {
            Code(raw.min(self.max_code))
        }
    }

    /// Remap one observation raster value onto the internal code scale.
    pub fn remap_observation(&self, value: u16, scale: ObservationScale) -> Code {
        if value == scale.nodata() {
            return self.nodata_code();
        }
        if value == 0 {
            return Code::ZERO;
        }

        let code = (scale.dbz(value) - self.calibration.offset) / self.calibration.gain;
        Code(code.clamp(0.0, self.max_code as f64) as u16)
    }

    /// 8-bit dBZ index of a substep accumulation for diagnostic rasters.
    pub fn dbz_index_from_acc(&self, acc: Accum) -> u8 {
        let Some(amount) = acc.get() else {
            return DBZ_INDEX_NODATA;
        };

        let rate = (amount as f64 / self.acc_per_rate_unit) as i64;
        if rate <= 0 {
            return 0;
        }
        if rate >= (RATE_TABLE_LEN - 1) as i64 {
            return DBZ_INDEX_NODATA;
        }
        self.dbz_index_from_rate[rate as usize]
    }

    /// Byte value of a step accumulation in the monitoring raster.
    pub fn monitor_byte(acc: Accum, scaler: i32) -> u8 {
        let Some(amount) = acc.get() else {
            return 255;
        };
        let scaler = scaler.max(1) as u32;

        if amount == 0 {
            0
        } else if amount < 2 * scaler {
            1
        } else {
            let scaled = amount / scaler;
            if scaled > 250 {
                255
            } else {
                scaled as u8
            }
        }
    }
}

/// Rate (1/269 mm/h) → 8-bit dBZ index, `2 dBZ + 64`.
fn build_dbz_index_table(calibration: &Calibration) -> Vec<u8> {
    let mut table = vec![0u8; RATE_TABLE_LEN];
    for (rate_units, slot) in table.iter_mut().enumerate().take(RATE_TABLE_LEN - 1).skip(1) {
        let rate = rate_units as f64 / RATE_UNITS_PER_MMH;
        let dbz = 10.0 * (calibration.zr_a * rate.powf(calibration.zr_b)).log10();
        let index = if dbz > -32.0 {
            (2.0 * dbz) as i32 + 64
        } else {
            0
        };
        *slot = index.clamp(0, DBZ_INDEX_MAX) as u8;
    }
    table
}
