//! Common test fixtures for nowcast interpolation tests.

use std::path::{Path, PathBuf};

/// Reference analysis times.
pub mod time {
    /// Analysis time as passed on the command line.
    pub const ANALYSIS: &str = "201906121200";

    /// Nowcast step length in seconds.
    pub const STEP_SECS: i64 = 300;
}

/// Area labels used in output file names.
pub mod area {
    pub const FINLAND: &str = "FIN";
    pub const TEST: &str = "TEST";
}

/// Code scales of common nowcast archives as `(gain, offset)`.
pub mod scale {
    /// 0.01 dBZ steps, the usual archive scale.
    pub const FINE: (f64, f64) = (0.01, -32.0);

    /// 0.1 dBZ steps.
    pub const DECI: (f64, f64) = (0.1, -32.0);

    /// 1 dBZ steps; keeps code tables small in tests.
    pub const COARSE: (f64, f64) = (1.0, -32.0);

    /// 0.5 dBZ steps, where 8-bit IRIS values equal codes.
    pub const IRIS: (f64, f64) = (0.5, -32.0);
}

/// Encodes an 8-bit binary PGM.
pub fn pgm_bytes_u8(width: usize, height: usize, data: &[u8], comment: Option<&str>) -> Vec<u8> {
    let mut out = pgm_header(width, height, 255, comment);
    out.extend_from_slice(data);
    out
}

/// Encodes a 16-bit big-endian binary PGM.
pub fn pgm_bytes_u16(width: usize, height: usize, data: &[u16], comment: Option<&str>) -> Vec<u8> {
    let mut out = pgm_header(width, height, 65535, comment);
    for value in data {
        out.extend_from_slice(&value.to_be_bytes());
    }
    out
}

fn pgm_header(width: usize, height: usize, maxval: u32, comment: Option<&str>) -> Vec<u8> {
    let mut header = String::from("P5\n");
    if let Some(comment) = comment {
        header.push_str(&format!("# {}\n", comment));
    }
    header.push_str(&format!("{} {}\n{}\n", width, height, maxval));
    header.into_bytes()
}

/// Writes `bytes` to `dir/name` and returns the path.
pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("Failed to write test fixture");
    path
}
