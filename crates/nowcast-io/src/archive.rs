//! HDF5 nowcast archive reader.
//!
//! The archive is opened through the netcdf library, which reads HDF5 files
//! natively. Layout:
//!
//! ```text
//! /meta/configuration          string attributes (ZR_A, ENSEMBLE_SIZE, ...)
//! /motion                      f64 [2, height, width]
//! /member-NN/motion            per-member motion (perturbed runs)
//! /deterministic/leadtime-NN   u16 codes
//! /member-NN/leadtime-NN       u16 codes, gain/offset/nodata on member-00/leadtime-00
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

use interp_core::{FieldSource, MotionField};
use nowcast_common::{GridSpec, NowcastError, NowcastResult};
use tracing::{debug, info};

use crate::metadata::{ArchiveConfiguration, FieldCalibration, CALIBRATION_DATASET};

/// Silence HDF5's automatic error printing to stderr.
///
/// Probing optional attributes makes the C library print `HDF5-DIAG`
/// traces even though the error is handled. Call early in `main`, before
/// the first archive is opened. Safe to call more than once.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: null handlers disable automatic error printing, a
        // documented use of H5Eset_auto2.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// An open nowcast archive.
pub struct NowcastArchive {
    path: PathBuf,
    file: netcdf::File,
    configuration: ArchiveConfiguration,
    calibration: FieldCalibration,
    grid: GridSpec,
}

impl NowcastArchive {
    /// Open an archive and read its configuration, calibration and grid.
    pub fn open(path: &Path) -> NowcastResult<Self> {
        let file = netcdf::open(path)
            .map_err(|e| NowcastError::ArchiveError(format!("{}: {}", path.display(), e)))?;

        let configuration = ArchiveConfiguration::from_attributes(&configuration_attributes(&file)?)?;
        let calibration = read_calibration(&file)?;
        let grid = read_grid(&file, &configuration)?;
        let archive = Self {
            path: path.to_path_buf(),
            file,
            configuration,
            calibration,
            grid,
        };

        info!(
            path = %path.display(),
            grid = %archive.grid,
            members = archive.configuration.members(),
            deterministic = archive.configuration.deterministic,
            motion_fields = archive.configuration.motion_fields,
            gain = archive.calibration.gain,
            offset = archive.calibration.offset,
            nodata = archive.calibration.nodata,
            "Opened nowcast archive"
        );

        Ok(archive)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn configuration(&self) -> &ArchiveConfiguration {
        &self.configuration
    }

    pub fn calibration(&self) -> FieldCalibration {
        self.calibration
    }

    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// Read every stored motion field, in member order when per-member.
    pub fn read_motion_fields(&self) -> NowcastResult<Vec<MotionField>> {
        (0..self.configuration.motion_fields)
            .map(|index| {
                let path = self.configuration.motion_path(index);
                let planes: Vec<f64> = with_variable(&self.file, &path, |var| {
                    var.get_values::<f64, _>(..)
                        .map_err(|e| NowcastError::DataReadError(format!("/{}: {}", path, e)))
                })?;
                debug!(dataset = %path, "Read motion field");
                MotionField::from_planes(self.grid, planes)
                    .map_err(|e| NowcastError::InvalidFormat(format!("/{}: {}", path, e)))
            })
            .collect()
    }
}

impl FieldSource for NowcastArchive {
    fn read_member_step(&mut self, member: usize, step: usize, out: &mut [u16]) -> NowcastResult<()> {
        let path = self.configuration.field_path(member, step);
        let values: Vec<u16> = with_variable(&self.file, &path, |var| {
            var.get_values::<u16, _>(..)
                .map_err(|e| NowcastError::DataReadError(format!("/{}: {}", path, e)))
        })?;

        if values.len() != out.len() {
            return Err(NowcastError::ShapeMismatch {
                expected: out.len(),
                actual: values.len(),
            });
        }
        out.copy_from_slice(&values);

        debug!(member, step, dataset = %path, "Read nowcast field");
        Ok(())
    }
}

fn configuration_attributes(file: &netcdf::File) -> NowcastResult<HashMap<String, String>> {
    let missing = || NowcastError::MissingData("/meta/configuration".to_string());
    let meta = file
        .group("meta")
        .map_err(|e| NowcastError::ArchiveError(e.to_string()))?
        .ok_or_else(missing)?;
    let configuration = meta.group("configuration").ok_or_else(missing)?;

    Ok(configuration
        .attributes()
        .filter_map(|attr| attribute_text(&attr).map(|value| (attr.name().to_string(), value)))
        .collect())
}

fn read_calibration(file: &netcdf::File) -> NowcastResult<FieldCalibration> {
    with_variable(file, CALIBRATION_DATASET, |var| {
        let attr = |name: &str| {
            get_f64_attr(var, name).ok_or_else(|| {
                NowcastError::MissingData(format!("/{} attribute '{}'", CALIBRATION_DATASET, name))
            })
        };
        FieldCalibration::from_attributes(attr("gain")?, attr("offset")?, attr("nodata")?)
    })
}

/// Grid of the first motion field, stored as `[2, height, width]`.
fn read_grid(file: &netcdf::File, configuration: &ArchiveConfiguration) -> NowcastResult<GridSpec> {
    let path = configuration.motion_path(0);
    with_variable(file, &path, |var| {
        let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        match dims.as_slice() {
            [2, height, width] => Ok(GridSpec::new(*width, *height)),
            other => Err(NowcastError::InvalidFormat(format!(
                "/{}: expected dimensions [2, height, width], found {:?}",
                path, other
            ))),
        }
    })
}

/// Look up a dataset given as `name` or `group/name` and hand it to `read`.
fn with_variable<T>(
    file: &netcdf::File,
    path: &str,
    read: impl FnOnce(&netcdf::Variable) -> NowcastResult<T>,
) -> NowcastResult<T> {
    let missing = || NowcastError::MissingData(format!("dataset /{}", path));
    match path.split_once('/') {
        None => {
            let var = file.variable(path).ok_or_else(missing)?;
            read(&var)
        }
        Some((group, name)) => {
            let group = file
                .group(group)
                .map_err(|e| NowcastError::ArchiveError(e.to_string()))?
                .ok_or_else(missing)?;
            let var = group.variable(name).ok_or_else(missing)?;
            read(&var)
        }
    }
}

/// Attribute value as text; single numbers are formatted.
fn attribute_text(attr: &netcdf::Attribute) -> Option<String> {
    match attr.value().ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        netcdf::AttributeValue::Strs(mut strs) if strs.len() == 1 => strs.pop(),
        other => f64::try_from(other).ok().map(|v| v.to_string()),
    }
}

/// Check if a variable has an attribute with the given name.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}
