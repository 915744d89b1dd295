//! Decodes embedded images and re-encodes them into the requested format.

use crate::pipeline::CancelToken;
use docex_core::{
    AssetId, ColorSpace, Error, ErrorLog, ImageAsset, ImageAssets, ImageData, ImageFormat,
    RawSamples, Result,
};
use flate2::read::ZlibDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat as RasterFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Largest decoded sample buffer accepted for one image.
const MAX_SAMPLE_BYTES: usize = 256 * 1024 * 1024;

/// Why a single image was skipped.
#[derive(Error, Debug)]
pub enum ImageError {
    /// The reader could not hand out the asset.
    #[error(transparent)]
    Source(#[from] Error),

    #[error("not a recognizable raster image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to inflate samples: {0}")]
    Inflate(#[source] std::io::Error),

    #[error("unsupported raw samples: {0}")]
    Samples(String),

    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Counts and files produced by one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOutcome {
    pub written: usize,
    pub attempted: usize,
    /// Written files, in discovery order.
    pub files: Vec<PathBuf>,
}

/// Writes every decodable image of a document into one directory.
pub struct ImageExtractor {
    format: ImageFormat,
    quality: u8,
    log: Arc<dyn ErrorLog>,
}

impl ImageExtractor {
    /// `quality` (1 to 100) only matters for JPEG output.
    pub fn new(format: ImageFormat, quality: u8, log: Arc<dyn ErrorLog>) -> Self {
        if !format.is_lossy() && quality != 100 {
            log::debug!("Quality {} has no effect on {} output", quality, format);
        }
        Self {
            format,
            quality: quality.clamp(1, 100),
            log,
        }
    }

    /// Decode, re-encode and write each asset in discovery order.
    ///
    /// A bad asset is logged and skipped. Only a directory that cannot be
    /// created, or cancellation, ends the pass with an error.
    pub fn extract(
        &self,
        assets: ImageAssets<'_>,
        dir: &Path,
        cancel: &CancelToken,
    ) -> Result<ImageOutcome> {
        std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut outcome = ImageOutcome::default();

        for asset in assets {
            cancel.check()?;
            outcome.attempted += 1;
            let number = outcome.attempted;

            let (origin, result) = match asset {
                Ok(asset) => (origin(&asset.id), self.save(&asset, number, dir)),
                Err(e) => (String::new(), Err(ImageError::from(e))),
            };

            match result {
                Ok(path) => {
                    log::debug!("Saved image #{} to {}", number, path.display());
                    outcome.written += 1;
                    outcome.files.push(path);
                }
                Err(e) => {
                    self.log
                        .error(&format!("Failed to save image #{}{}: {}", number, origin, e));
                }
            }
        }

        log::debug!(
            "Wrote {} of {} images to {}",
            outcome.written,
            outcome.attempted,
            dir.display()
        );
        Ok(outcome)
    }

    fn save(
        &self,
        asset: &ImageAsset,
        number: usize,
        dir: &Path,
    ) -> std::result::Result<PathBuf, ImageError> {
        let image = decode(&asset.data)?;
        let bytes = self.encode(&image)?;

        let path = dir.join(file_name(&asset.id, number, self.format));
        std::fs::write(&path, bytes).map_err(|source| ImageError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn encode(&self, image: &DynamicImage) -> std::result::Result<Vec<u8>, ImageError> {
        let mut out = Vec::new();
        match self.format {
            ImageFormat::Jpeg => {
                // JPEG has no alpha channel.
                let rgb = image.to_rgb8();
                JpegEncoder::new_with_quality(&mut out, self.quality)
                    .encode_image(&rgb)
                    .map_err(ImageError::Encode)?;
            }
            ImageFormat::Png => {
                image
                    .write_to(&mut Cursor::new(&mut out), RasterFormat::Png)
                    .map_err(ImageError::Encode)?;
            }
            ImageFormat::Bmp => {
                let flat = if image.color().has_alpha() {
                    DynamicImage::ImageRgba8(image.to_rgba8())
                } else {
                    DynamicImage::ImageRgb8(image.to_rgb8())
                };
                flat.write_to(&mut Cursor::new(&mut out), RasterFormat::Bmp)
                    .map_err(ImageError::Encode)?;
            }
        }
        Ok(out)
    }
}

/// `image_007.png` for package images, `image_2_001.png` for page images.
pub fn file_name(id: &AssetId, number: usize, format: ImageFormat) -> String {
    match id {
        AssetId::PageObject { page, index, .. } => {
            format!("image_{}_{:03}.{}", page, index, format.extension())
        }
        AssetId::Relationship(_) => format!("image_{:03}.{}", number, format.extension()),
    }
}

/// Where an asset came from, for log lines.
fn origin(id: &AssetId) -> String {
    match id {
        AssetId::PageObject { page, .. } => format!(" on page {}", page),
        AssetId::Relationship(rel) => format!(" ({})", rel),
    }
}

fn decode(data: &ImageData) -> std::result::Result<DynamicImage, ImageError> {
    match data {
        ImageData::Encoded(bytes) => image::load_from_memory(bytes).map_err(ImageError::Decode),
        ImageData::Samples(samples) => decode_samples(samples),
    }
}

fn decode_samples(samples: &RawSamples) -> std::result::Result<DynamicImage, ImageError> {
    if samples.bits_per_component != 8 {
        return Err(ImageError::Samples(format!(
            "{} bits per component",
            samples.bits_per_component
        )));
    }
    let components = samples
        .color_space
        .components()
        .ok_or_else(|| ImageError::Samples(format!("color space {:?}", samples.color_space)))?;

    let (width, height) = (samples.width, samples.height);
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(components))
        .filter(|&n| n > 0 && n <= MAX_SAMPLE_BYTES)
        .ok_or_else(|| {
            ImageError::Samples(format!("{}x{} is not a usable image size", width, height))
        })?;

    // Trailing bytes past the last row are ignored.
    let bytes = if samples.deflated {
        let mut inflated = Vec::new();
        ZlibDecoder::new(&samples.bytes[..])
            .take(expected as u64)
            .read_to_end(&mut inflated)
            .map_err(ImageError::Inflate)?;
        inflated
    } else {
        samples.bytes[..expected.min(samples.bytes.len())].to_vec()
    };

    if bytes.len() < expected {
        return Err(ImageError::Samples(format!(
            "{}x{} needs {} bytes, got {}",
            width,
            height,
            expected,
            bytes.len()
        )));
    }

    let image = match samples.color_space {
        ColorSpace::Gray => GrayImage::from_raw(width, height, bytes).map(DynamicImage::ImageLuma8),
        ColorSpace::Rgb => RgbImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8),
        ColorSpace::Cmyk => {
            RgbImage::from_raw(width, height, cmyk_to_rgb(&bytes)).map(DynamicImage::ImageRgb8)
        }
        ColorSpace::Other(_) => None,
    };
    image.ok_or_else(|| ImageError::Samples("sample buffer does not match dimensions".to_string()))
}

fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(cmyk.len() / 4 * 3);
    for px in cmyk.chunks_exact(4) {
        let k = 255 - u16::from(px[3]);
        for &c in &px[..3] {
            rgb.push(((255 - u16::from(c)) * k / 255) as u8);
        }
    }
    rgb
}
