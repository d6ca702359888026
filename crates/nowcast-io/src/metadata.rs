//! Run configuration stored in a nowcast archive.
//!
//! The archive carries its producer's configuration as string attributes of
//! `/meta/configuration`. Only the keys the interpolation needs are parsed;
//! everything else is ignored.

use std::collections::HashMap;

use nowcast_common::{NowcastError, NowcastResult};
use tracing::warn;

/// Z-R coefficient `a` when the archive does not record one.
pub const DEFAULT_ZR_A: f64 = 223.0;

/// Z-R exponent `b` when the archive does not record one.
pub const DEFAULT_ZR_B: f64 = 1.53;

/// Nowcast step length when the archive does not record one.
pub const DEFAULT_STEP_MINUTES: i64 = 5;

/// Motion perturbation arguments meaning every member shares one motion field.
const ZERO_PERTURBATION: &str = "{'p_par': [0, 0, 0], 'p_perp': [0, 0, 0]}";

/// Nowcast configuration recorded by the archive producer.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveConfiguration {
    pub zr_a: f64,
    pub zr_b: f64,
    /// A deterministic nowcast is stored in addition to the ensemble.
    pub deterministic: bool,
    /// Number of perturbed ensemble members.
    pub ensemble_size: usize,
    pub step_secs: i64,
    /// Number of stored lead times, if recorded.
    pub timesteps: Option<usize>,
    /// Number of stored motion fields: one shared or one per member.
    pub motion_fields: usize,
}

impl ArchiveConfiguration {
    /// Parse the `/meta/configuration` attributes.
    pub fn from_attributes(attrs: &HashMap<String, String>) -> NowcastResult<Self> {
        let zr_a = parse_or(attrs, "ZR_A", DEFAULT_ZR_A)?;
        let zr_b = parse_or(attrs, "ZR_B", DEFAULT_ZR_B)?;
        let deterministic = attrs
            .get("STORE_DETERMINISTIC")
            .map(|v| parse_flag(v))
            .unwrap_or(false);

        let ensemble_size: usize = attrs
            .get("ENSEMBLE_SIZE")
            .ok_or_else(|| NowcastError::MissingData("ENSEMBLE_SIZE configuration attribute".to_string()))
            .and_then(|v| parse_value("ENSEMBLE_SIZE", v))?;

        let step_minutes: i64 = parse_or(attrs, "NOWCAST_TIMESTEP", DEFAULT_STEP_MINUTES)?;
        if step_minutes <= 0 {
            return Err(NowcastError::invalid_parameter(
                "NOWCAST_TIMESTEP",
                format!("must be > 0, got {}", step_minutes),
            ));
        }

        let timesteps = attrs
            .get("NUM_TIMESTEPS")
            .map(|v| parse_value("NUM_TIMESTEPS", v))
            .transpose()?;

        let members = ensemble_size + deterministic as usize;
        let perturbed = attrs
            .get("STORE_PERTURBED_MOTION")
            .map(|v| parse_flag(v))
            .unwrap_or(false);
        let zero_perturbation = attrs
            .get("VEL_PERT_KWARGS")
            .map(|v| is_zero_perturbation(v))
            .unwrap_or(false);

        let motion_fields = if perturbed && !zero_perturbation {
            members
        } else {
            1
        };

        Ok(Self {
            zr_a,
            zr_b,
            deterministic,
            ensemble_size,
            step_secs: 60 * step_minutes,
            timesteps,
            motion_fields,
        })
    }

    /// Members including the deterministic one.
    pub fn members(&self) -> usize {
        self.ensemble_size + self.deterministic as usize
    }

    /// Every member uses the same motion field.
    pub fn common_motion(&self) -> bool {
        self.motion_fields == 1
    }

    /// Dataset of `member` at lead time index `step`.
    ///
    /// Member 0 is the deterministic nowcast when one is stored; the
    /// ensemble members follow, numbered from zero in the archive.
    pub fn field_path(&self, member: usize, step: usize) -> String {
        if self.deterministic && member == 0 {
            format!("deterministic/leadtime-{:02}", step)
        } else {
            format!(
                "member-{:02}/leadtime-{:02}",
                member - self.deterministic as usize,
                step
            )
        }
    }

    /// Dataset of motion field `index`.
    pub fn motion_path(&self, index: usize) -> String {
        if self.common_motion() || (self.deterministic && index == 0) {
            "motion".to_string()
        } else {
            format!("member-{:02}/motion", index - self.deterministic as usize)
        }
    }
}

/// Code scale of the stored nowcast fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldCalibration {
    pub gain: f64,
    pub offset: f64,
    pub nodata: u16,
}

impl FieldCalibration {
    /// Build from the `gain`, `offset` and `nodata` attributes.
    pub fn from_attributes(gain: f64, offset: f64, nodata: f64) -> NowcastResult<Self> {
        if !(gain > 0.0) {
            return Err(NowcastError::invalid_parameter("gain", format!("must be > 0, got {}", gain)));
        }
        if !(0.0..=u16::MAX as f64).contains(&nodata) {
            return Err(NowcastError::invalid_parameter(
                "nodata",
                format!("{} outside the 16-bit range", nodata),
            ));
        }
        Ok(Self {
            gain,
            offset,
            nodata: (nodata + 1e-6) as u16,
        })
    }
}

/// Dataset holding the field calibration attributes.
pub const CALIBRATION_DATASET: &str = "member-00/leadtime-00";

fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn is_zero_perturbation(value: &str) -> bool {
    let squeeze = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    squeeze(value) == squeeze(ZERO_PERTURBATION)
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> NowcastResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| NowcastError::invalid_parameter(key, format!("cannot parse '{}'", value)))
}

fn parse_or<T: std::str::FromStr + std::fmt::Display>(
    attrs: &HashMap<String, String>,
    key: &str,
    default: T,
) -> NowcastResult<T> {
    match attrs.get(key) {
        Some(value) => parse_value(key, value),
        None => {
            warn!(key, default = %default, "Configuration attribute missing, using default");
            Ok(default)
        }
    }
}
