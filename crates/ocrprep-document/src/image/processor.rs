// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: decode, resample to a target resolution, and encode page
// rasters. Operates on in-memory images using the `image` crate.

use std::path::Path;

use image::{DynamicImage, ImageFormat};
use ocrprep_core::error::OcrprepError;
use ocrprep_core::RasterFormat;
use tracing::{debug, info, instrument};

/// Wraps a single decoded raster on its way between disk and the pipeline.
///
/// Transformations consume `self` and return a new `ImageProcessor`, so calls
/// chain:
///
/// ```ignore
/// ImageProcessor::open("scan.jpg")?
///     .resample(3400, 4400)
///     .save_as("scan_page_1.png", RasterFormat::Png)?;
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    ///
    /// A missing file and an undecodable file both surface as
    /// [`OcrprepError::ImageDecode`].
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OcrprepError> {
        let img = image::open(path.as_ref()).map_err(|err| {
            OcrprepError::ImageDecode(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        debug!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self { image: img })
    }

    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, OcrprepError> {
        let img = image::load_from_memory(data)
            .map_err(|err| OcrprepError::ImageDecode(format!("failed to decode image: {}", err)))?;
        debug!(width = img.width(), height = img.height(), "Image decoded from bytes");
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Consume the processor and return the underlying `DynamicImage`.
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations ------------------------------------------------------

    /// Resample to exactly `width` x `height` with Lanczos3 filtering.
    /// A no-op when the image already has that size.
    #[instrument(skip(self))]
    pub fn resample(self, width: u32, height: u32) -> Self {
        if self.image.width() == width && self.image.height() == height {
            return self;
        }
        info!(
            from_w = self.image.width(),
            from_h = self.image.height(),
            width,
            height,
            "Resampling image"
        );
        let resized = self
            .image
            .resize_exact(width, height, image::imageops::FilterType::Lanczos3);
        Self { image: resized }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image in `format`, returning the raw bytes.
    pub fn encode(&self, format: RasterFormat) -> Result<Vec<u8>, OcrprepError> {
        encode_with_format(&self.image, format.image_format())
    }

    /// Encode in the format a file at `path` would have, without writing it.
    pub fn encode_for_path(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, OcrprepError> {
        encode_with_format(&self.image, format_for_path(path.as_ref())?)
    }

    /// Write the image to `path` in `format`.
    pub fn save_as(&self, path: impl AsRef<Path>, format: RasterFormat) -> Result<(), OcrprepError> {
        save_with_format(&self.image, path.as_ref(), format.image_format())
    }

    /// Write the image to `path`, inferring the format from the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), OcrprepError> {
        let path = path.as_ref();
        save_with_format(&self.image, path, format_for_path(path)?)
    }
}

fn format_for_path(path: &Path) -> Result<ImageFormat, OcrprepError> {
    ImageFormat::from_path(path).map_err(|err| {
        OcrprepError::ImageEncode(format!(
            "cannot infer output format for {}: {}",
            path.display(),
            err
        ))
    })
}

fn encode_with_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, OcrprepError> {
    let prepared = prepare_for(image, format);
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    prepared
        .write_to(&mut cursor, format)
        .map_err(|err| OcrprepError::ImageEncode(format!("image encoding failed: {}", err)))?;
    Ok(buffer)
}

fn save_with_format(
    image: &DynamicImage,
    path: &Path,
    format: ImageFormat,
) -> Result<(), OcrprepError> {
    prepare_for(image, format)
        .save_with_format(path, format)
        .map_err(|err| {
            OcrprepError::ImageEncode(format!(
                "failed to save image to {}: {}",
                path.display(),
                err
            ))
        })
}

/// JPEG cannot carry alpha or 16-bit samples; narrow those before encoding.
fn prepare_for(image: &DynamicImage, format: ImageFormat) -> std::borrow::Cow<'_, DynamicImage> {
    match (format, image) {
        (ImageFormat::Jpeg, DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_)) => {
            std::borrow::Cow::Borrowed(image)
        }
        (ImageFormat::Jpeg, other) if other.color().channel_count() <= 2 => {
            std::borrow::Cow::Owned(DynamicImage::ImageLuma8(other.to_luma8()))
        }
        (ImageFormat::Jpeg, other) => std::borrow::Cow::Owned(DynamicImage::ImageRgb8(other.to_rgb8())),
        _ => std::borrow::Cow::Borrowed(image),
    }
}
