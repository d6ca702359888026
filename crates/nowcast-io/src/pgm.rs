//! Binary PGM (P5) reading and writing on top of the `image` PNM codec.
//!
//! Observation rasters arrive as 8-bit or 16-bit graymaps. Header comment
//! lines (`#`) may appear between header fields.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::pnm::{PnmDecoder, PnmEncoder, PnmSubtype, SampleEncoding};
use image::{ColorType, ImageDecoder, ImageError};
use interp_core::ObservationScale;
use nowcast_common::{GridSpec, NowcastError, NowcastResult};
use tracing::debug;

const BINARY_GRAYMAP: PnmSubtype = PnmSubtype::Graymap(SampleEncoding::Binary);

/// Pixel samples of a PGM image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgmSamples {
    Gray8(Vec<u8>),
    Gray16(Vec<u16>),
}

/// A decoded binary PGM image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgmImage {
    pub width: usize,
    pub height: usize,
    /// 255 for 8-bit rasters, 65535 for 16-bit ones.
    pub maxval: u32,
    pub samples: PgmSamples,
}

impl PgmImage {
    /// Read a PGM file.
    pub fn read(path: &Path) -> NowcastResult<Self> {
        let bytes = std::fs::read(path)?;
        let image = Self::decode(&bytes).map_err(|e| match e {
            NowcastError::InvalidFormat(msg) => {
                NowcastError::InvalidFormat(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        debug!(
            path = %path.display(),
            width = image.width,
            height = image.height,
            maxval = image.maxval,
            "Read PGM"
        );
        Ok(image)
    }

    /// Decode a binary PGM from memory.
    pub fn decode(bytes: &[u8]) -> NowcastResult<Self> {
        let decoder = PnmDecoder::new(bytes).map_err(invalid)?;
        if !matches!(decoder.subtype(), PnmSubtype::Graymap(SampleEncoding::Binary)) {
            return Err(NowcastError::InvalidFormat(format!(
                "expected binary PGM (P5), found {:?}",
                decoder.subtype()
            )));
        }

        let (width, height) = decoder.dimensions();
        let pixels = width as usize * height as usize;
        let (maxval, samples) = match decoder.color_type() {
            ColorType::L8 => {
                let mut data = vec![0u8; pixels];
                decoder.read_image(&mut data).map_err(invalid)?;
                (u8::MAX as u32, PgmSamples::Gray8(data))
            }
            ColorType::L16 => {
                // the codec hands 16-bit samples back in native byte order
                let mut data = vec![0u16; pixels];
                decoder
                    .read_image(bytemuck::cast_slice_mut(&mut data))
                    .map_err(invalid)?;
                (u16::MAX as u32, PgmSamples::Gray16(data))
            }
            other => {
                return Err(NowcastError::InvalidFormat(format!(
                    "unsupported PGM colour type {:?}",
                    other
                )))
            }
        };

        Ok(Self {
            width: width as usize,
            height: height as usize,
            maxval,
            samples,
        })
    }

    pub fn grid(&self) -> GridSpec {
        GridSpec::new(self.width, self.height)
    }

    /// Dynamic range of the observation encoded in this image.
    pub fn observation_scale(&self) -> ObservationScale {
        ObservationScale::from_maxval(self.maxval)
    }

    /// Samples widened to 16 bits.
    pub fn to_u16(&self) -> Vec<u16> {
        match &self.samples {
            PgmSamples::Gray8(data) => data.iter().map(|&v| v as u16).collect(),
            PgmSamples::Gray16(data) => data.clone(),
        }
    }
}

/// Write an 8-bit PGM.
pub fn write_u8(path: &Path, grid: GridSpec, data: &[u8]) -> NowcastResult<()> {
    grid.check_len(data.len())?;
    let mut out = BufWriter::new(File::create(path)?);
    PnmEncoder::new(&mut out)
        .with_subtype(BINARY_GRAYMAP)
        .encode(data, grid.width as u32, grid.height as u32, ColorType::L8)
        .map_err(|e| write_failed(path, e))?;
    out.flush()?;
    Ok(())
}

/// Write a 16-bit PGM (big-endian samples, maxval 65535).
pub fn write_u16(path: &Path, grid: GridSpec, data: &[u16]) -> NowcastResult<()> {
    grid.check_len(data.len())?;
    let mut out = BufWriter::new(File::create(path)?);
    PnmEncoder::new(&mut out)
        .with_subtype(BINARY_GRAYMAP)
        .encode(data, grid.width as u32, grid.height as u32, ColorType::L16)
        .map_err(|e| write_failed(path, e))?;
    out.flush()?;
    Ok(())
}

fn write_failed(path: &Path, e: ImageError) -> NowcastError {
    NowcastError::WriteError(format!("{}: {}", path.display(), e))
}

fn invalid(e: ImageError) -> NowcastError {
    NowcastError::InvalidFormat(e.to_string())
}
