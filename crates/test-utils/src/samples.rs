//! Locating optional sample archives and scratch output directories.
//!
//! Real nowcast archives are too large for the repository. Tests that need
//! one look in `$NOWCAST_TESTDATA` first, then in `testdata/` at the
//! workspace root, and skip when neither holds the file.

use std::path::{Path, PathBuf};

/// Environment variable naming an extra sample directory.
pub const TESTDATA_ENV: &str = "NOWCAST_TESTDATA";

/// Directories searched for samples, in priority order.
pub fn sample_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = std::env::var_os(TESTDATA_ENV) {
        dirs.push(PathBuf::from(dir));
    }
    // test-utils lives at <root>/crates/test-utils
    let root = Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap_or_else(|| Path::new(env!("CARGO_MANIFEST_DIR")));
    dirs.push(root.join("testdata"));
    dirs
}

/// Full path of the named sample, if any sample directory has it.
pub fn find_sample(name: &str) -> Option<PathBuf> {
    sample_dirs()
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

/// Fresh output directory, removed when the guard drops.
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix("nowcast-out-")
        .tempdir()
        .expect("cannot create scratch output directory")
}
