//! Test support for the nowcast interpolation workspace.
//!
//! Synthetic motion and code fields, PGM fixture bytes, reference
//! calibrations, and lookup of the optional sample archives.
//!
//! ```ignore
//! use test_utils::{require_samples, scratch_dir};
//! ```

pub mod fixtures;
pub mod generators;
pub mod samples;

pub use fixtures::*;
pub use generators::*;
pub use samples::*;

/// Resolve sample files by name, or return from the calling test.
///
/// Evaluates to a `Vec<PathBuf>` in argument order. When any sample is
/// missing the test logs which one and passes without running.
#[macro_export]
macro_rules! require_samples {
    ($($name:expr),+ $(,)?) => {{
        let mut found = Vec::new();
        $(
            match $crate::find_sample($name) {
                Some(path) => found.push(path),
                None => {
                    eprintln!(
                        "skipping: sample {} not available (searched {:?})",
                        $name,
                        $crate::sample_dirs()
                    );
                    return;
                }
            }
        )+
        found
    }};
}

/// Compare two fields pixel by pixel, `None` standing for nodata.
///
/// Panics naming the first pixel (column, row) whose values differ by more
/// than `tolerance` or whose nodata status differs.
pub fn assert_field_close(width: usize, actual: &[Option<f64>], expected: &[Option<f64>], tolerance: f64) {
    assert_eq!(actual.len(), expected.len(), "field lengths differ");
    for (n, (a, e)) in actual.iter().zip(expected).enumerate() {
        let close = match (a, e) {
            (Some(a), Some(e)) => (a - e).abs() <= tolerance,
            (None, None) => true,
            _ => false,
        };
        if !close {
            panic!(
                "pixel ({}, {}) differs: got {:?}, expected {:?} (tolerance {})",
                n % width.max(1),
                n / width.max(1),
                a,
                e,
                tolerance
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_close_within_tolerance() {
        assert_field_close(2, &[Some(1.0), None], &[Some(1.0 + 1e-9), None], 1e-6);
    }

    #[test]
    #[should_panic(expected = "pixel (1, 1)")]
    fn test_field_close_reports_pixel() {
        let expected = [Some(0.0); 4];
        let actual = [Some(0.0), Some(0.0), Some(0.0), None];
        assert_field_close(2, &actual, &expected, 1e-6);
    }
}
