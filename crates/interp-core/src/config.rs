//! Configuration for the interpolation engine.

use serde::{Deserialize, Serialize};

/// Number of interpolation substeps used when none is given.
pub const DEFAULT_SUBSTEPS: u32 = 10;

/// Default nowcast step length (5 minutes).
pub const DEFAULT_STEP_SECS: i64 = 300;

/// Default divisor for the monitoring accumulation raster.
pub const DEFAULT_MONITOR_SCALER: i32 = 1000;

/// Configuration for one interpolation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpConfig {
    /// Interpolation substeps per nowcast step (at least 2).
    pub substeps: u32,

    /// Length of one nowcast step in seconds.
    pub step_secs: i64,

    /// Number of nowcast steps to process.
    pub timesteps: usize,

    /// Number of ensemble members, including a deterministic one.
    pub members: usize,

    /// Member 0 is a deterministic nowcast.
    pub deterministic: bool,

    /// Initial deterministic weight, percent of the member count.
    pub determ_init_weight: f64,

    /// Time span over which the deterministic weight decays to zero,
    /// percent of the whole nowcast length.
    pub determ_weight_span: f64,

    /// Code scale and rain-rate relation of the nowcast fields.
    pub calibration: Calibration,

    /// Whether accumulations restart every step or run from analysis time.
    pub accumulation_mode: AccumulationMode,

    /// Optional outputs.
    pub diagnostics: DiagnosticsConfig,

    /// Pixel whose per-substep values are traced.
    pub sample_pixel: Option<usize>,

    /// Worker threads for the member sweep (defaults to one per member).
    pub threads: Option<usize>,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            substeps: DEFAULT_SUBSTEPS,
            step_secs: DEFAULT_STEP_SECS,
            timesteps: 0,
            members: 1,
            deterministic: false,
            determ_init_weight: 0.0,
            determ_weight_span: 100.0,
            calibration: Calibration::default(),
            accumulation_mode: AccumulationMode::PerStep,
            diagnostics: DiagnosticsConfig::default(),
            sample_pixel: None,
            threads: None,
        }
    }
}

impl InterpConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.substeps < 2 {
            return Err("substeps must be >= 2".to_string());
        }

        if self.step_secs <= 0 {
            return Err("step_secs must be > 0".to_string());
        }

        if self.members == 0 {
            return Err("members must be > 0".to_string());
        }

        if self.threads == Some(0) {
            return Err("threads must be > 0".to_string());
        }

        if self.diagnostics.monitor_scaler <= 0 {
            return Err("monitor_scaler must be > 0".to_string());
        }

        self.calibration.validate()
    }

    /// Number of trajectory table slots (substeps that need both fields).
    pub fn slots(&self) -> usize {
        self.substeps as usize - 1
    }

    /// Whether the deterministic member gets its own decaying weight.
    pub fn determ_weighting_enabled(&self) -> bool {
        self.deterministic && !(self.determ_init_weight <= 0.0 && self.determ_weight_span <= 0.0)
    }
}

/// Conversion between stored codes and physical intensities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// dBZ per code step.
    pub gain: f64,
    /// dBZ at code 0.
    pub offset: f64,
    /// Z-R relation coefficient `a` in `Z = a R^b`.
    pub zr_a: f64,
    /// Z-R relation exponent `b`.
    pub zr_b: f64,
    /// Raw value marking missing data in the nowcast fields.
    pub nodata: u16,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            gain: 0.1,
            offset: -32.0,
            zr_a: 223.0,
            zr_b: 1.53,
            nodata: u16::MAX,
        }
    }
}

impl Calibration {
    /// Validate the calibration constants.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.gain > 0.0) || !self.gain.is_finite() {
            return Err("gain must be a positive number".to_string());
        }

        if !self.offset.is_finite() {
            return Err("offset must be finite".to_string());
        }

        if !(self.zr_a > 0.0) || !(self.zr_b > 0.0) {
            return Err("Z-R coefficients must be > 0".to_string());
        }

        Ok(())
    }
}

/// How the per-member accumulation field evolves between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumulationMode {
    /// Each step's output covers that step only.
    #[default]
    PerStep,
    /// Outputs run from the analysis time; nodata, once hit, sticks.
    Cumulative,
}

/// Optional outputs derived from the per-pixel results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Per-substep dBZ index rasters.
    pub substep_dbz: bool,
    /// Scaled accumulation raster per member and step.
    pub monitor_accumulation: bool,
    /// Divisor of the monitoring raster.
    pub monitor_scaler: i32,
    /// Weighted ensemble mean per step.
    pub ensemble_mean: bool,
    /// Write ensemble-mean nodata pixels as zero instead of 0xFFFF.
    pub ignore_nodata: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            substep_dbz: false,
            monitor_accumulation: false,
            monitor_scaler: DEFAULT_MONITOR_SCALER,
            ensemble_mean: false,
            ignore_nodata: false,
        }
    }
}
