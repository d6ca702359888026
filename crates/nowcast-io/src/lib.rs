//! Input and output collaborators of the interpolation engine.
//!
//! - [`metadata`]: run configuration stored in a nowcast archive and the
//!   dataset paths of members, lead times and motion fields
//! - [`archive`]: HDF5 archive reader implementing `FieldSource`
//!   (feature `hdf5`)
//! - [`pgm`]: binary PGM reading and writing
//! - [`writer`]: `FileSink`, the file-based `OutputSink`

#[cfg(feature = "hdf5")]
pub mod archive;
pub mod metadata;
pub mod pgm;
pub mod writer;

#[cfg(feature = "hdf5")]
pub use archive::{silence_hdf5_errors, NowcastArchive};
pub use metadata::{ArchiveConfiguration, FieldCalibration};
pub use pgm::{PgmImage, PgmSamples};
pub use writer::{FileSink, OutputNaming};
