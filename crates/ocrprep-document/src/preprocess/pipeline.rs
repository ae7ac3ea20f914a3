// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The pre-processing pipeline: decode/validate, grayscale, morphology,
// Gaussian smoothing, Otsu binarization. Pure; performs no I/O beyond the
// optional decode helpers.

use std::path::Path;

use image::{DynamicImage, GrayImage};
use ocrprep_core::error::{OcrprepError, ProcessingFailure};
use ocrprep_core::PipelineConfig;
use tracing::{debug, info, instrument};

use super::binarize::binarize;
use super::morphology::{Kernel, apply_morphology};
use super::smooth::smooth;
use crate::image::processor::ImageProcessor;

/// A validated pipeline configuration together with its structuring element.
///
/// Holds no state between calls, so one `Preprocessor` can be shared across
/// worker threads.
///
/// ```ignore
/// let preprocessor = Preprocessor::new(PipelineConfig::default())?;
/// let cleaned = preprocessor.process_file("report_page_1.png")?;
/// ```
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PipelineConfig,
    kernel: Kernel,
}

impl Preprocessor {
    /// Validate `config` and build the kernel once.
    pub fn new(config: PipelineConfig) -> Result<Self, OcrprepError> {
        config.validate()?;
        let kernel = Kernel::square(config.kernel_size);
        Ok(Self { config, kernel })
    }

    /// Run every stage on a decoded image.
    ///
    /// On success the result is single-channel, every pixel is 0 or 255, and
    /// the dimensions equal the input's. An image with no pixels is reported
    /// as [`OcrprepError::ImageDecode`]. A stage that breaks the shape
    /// invariant yields [`OcrprepError::UnexpectedTransform`].
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn process(&self, image: DynamicImage) -> Result<GrayImage, ProcessingFailure> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(OcrprepError::ImageDecode(format!(
                "image has no pixels ({width}x{height})"
            )));
        }

        let gray = to_grayscale(image);
        ensure_shape("grayscale", &gray, width, height)?;

        let morphed = apply_morphology(gray, &self.config, self.kernel)?;
        ensure_shape("morphology", &morphed, width, height)?;

        let smoothed = if self.config.blur_active() {
            smooth(morphed, self.config.blur_kernel_size)
        } else {
            debug!("Smoothing disabled");
            morphed
        };
        ensure_shape("smooth", &smoothed, width, height)?;

        let binary = binarize(smoothed);
        ensure_shape("binarize", &binary, width, height)?;

        info!(width, height, "Page pre-processed");
        Ok(binary)
    }

    /// Decode `data` (PNG, JPEG, ...) and process it.
    pub fn process_encoded(&self, data: &[u8]) -> Result<GrayImage, ProcessingFailure> {
        let image = ImageProcessor::from_bytes(data)?.into_dynamic();
        self.process(image)
    }

    /// Load the image at `path` and process it. A missing or corrupt file is
    /// reported as [`OcrprepError::ImageDecode`].
    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<GrayImage, ProcessingFailure> {
        let image = ImageProcessor::open(path)?.into_dynamic();
        self.process(image)
    }
}

/// Process `image` with `config` in one call.
pub fn process(image: DynamicImage, config: &PipelineConfig) -> Result<GrayImage, ProcessingFailure> {
    Preprocessor::new(config.clone())?.process(image)
}

/// Collapse colour to one luminance channel; 8-bit grayscale passes through
/// untouched.
pub fn to_grayscale(image: DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray,
        other => other.to_luma8(),
    }
}

fn ensure_shape(
    stage: &'static str,
    image: &GrayImage,
    width: u32,
    height: u32,
) -> Result<(), OcrprepError> {
    if image.dimensions() != (width, height) {
        return Err(OcrprepError::UnexpectedTransform {
            stage,
            reason: format!(
                "expected {width}x{height}, got {}x{}",
                image.width(),
                image.height()
            ),
        });
    }
    Ok(())
}
