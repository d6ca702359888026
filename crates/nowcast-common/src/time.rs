//! Time stamps for nowcast steps and interpolation substeps.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Format used for every stamp written into output file names.
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Maps step and substep indices onto wall-clock times.
///
/// Step `t` covers the interval from `analysis + t * step` to
/// `analysis + (t + 1) * step`; its outputs are labelled with the end time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowcastClock {
    /// Analysis (observation) time
    pub analysis: DateTime<Utc>,
    /// Length of one nowcast step in seconds
    pub step_secs: i64,
    /// Number of interpolation substeps per nowcast step
    pub substeps: u32,
}

impl NowcastClock {
    pub fn new(analysis: DateTime<Utc>, step_secs: i64, substeps: u32) -> Self {
        Self {
            analysis,
            step_secs,
            substeps,
        }
    }

    /// Parse an analysis time given as `YYYYMMDDHHMM` (UTC).
    pub fn parse_analysis(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
        let digits = s.get(..12).ok_or_else(|| TimeParseError::InvalidFormat(s.to_string()))?;
        let ndt = NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M")
            .map_err(|_| TimeParseError::InvalidFormat(s.to_string()))?;
        Ok(Utc.from_utc_datetime(&ndt))
    }

    /// Length of one interpolation substep in whole seconds.
    pub fn substep_secs(&self) -> i64 {
        self.step_secs / self.substeps.max(1) as i64
    }

    /// End time of nowcast step `step`.
    pub fn valid_time(&self, step: usize) -> DateTime<Utc> {
        self.analysis + Duration::seconds(self.step_secs * (step as i64 + 1))
    }

    /// Time of substep `substep` inside nowcast step `step`.
    ///
    /// Substep 0 coincides with the start of the step.
    pub fn substep_time(&self, step: usize, substep: usize) -> DateTime<Utc> {
        self.analysis
            + Duration::seconds(self.step_secs * step as i64 + self.substep_secs() * substep as i64)
    }

    /// Lead time of nowcast step `step` in minutes.
    pub fn lead_minutes(&self, step: usize) -> i64 {
        self.step_secs * (step as i64 + 1) / 60
    }

    /// Format a time as `YYYYMMDDHHMMSS`.
    pub fn stamp(time: DateTime<Utc>) -> String {
        time.format(STAMP_FORMAT).to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}
