// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grayscale morphology with a square, uniform structuring element.
//
// Pages are dark text on a light background, so dilation here grows the dark
// regions (neighbourhood minimum) and erosion shrinks them (neighbourhood
// maximum).

use image::GrayImage;
use ocrprep_core::PipelineConfig;
use ocrprep_core::error::{OcrprepError, Result};
use tracing::{debug, instrument};

/// Square structuring element of uniform weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernel {
    size: u32,
}

impl Kernel {
    pub fn square(size: u32) -> Self {
        Self { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// A 0x0 or 1x1 kernel leaves every pixel unchanged.
    pub fn is_identity(&self) -> bool {
        self.size <= 1
    }

    /// Reach of the window (before, after) around its anchor. Even sizes
    /// anchor one pixel past the centre.
    fn reach(&self) -> (u32, u32) {
        let before = self.size / 2;
        (before, self.size - 1 - before)
    }
}

/// Run the configured morphology: dilation passes, then erosion passes.
#[instrument(skip_all, fields(kernel = kernel.size(), mode = ?config.morphology))]
pub fn apply_morphology(
    image: GrayImage,
    config: &PipelineConfig,
    kernel: Kernel,
) -> Result<GrayImage> {
    let (dilate_passes, erode_passes) = config.effective_iterations();
    debug!(dilate_passes, erode_passes, "Applying morphology");
    let dilated = dilate(image, kernel, dilate_passes)?;
    erode(dilated, kernel, erode_passes)
}

/// Expand dark regions by `iterations` passes of a minimum filter.
pub fn dilate(image: GrayImage, kernel: Kernel, iterations: u32) -> Result<GrayImage> {
    repeat(image, kernel, iterations, u8::min)
}

/// Shrink dark regions by `iterations` passes of a maximum filter.
pub fn erode(image: GrayImage, kernel: Kernel, iterations: u32) -> Result<GrayImage> {
    repeat(image, kernel, iterations, u8::max)
}

fn repeat(
    image: GrayImage,
    kernel: Kernel,
    iterations: u32,
    pick: fn(u8, u8) -> u8,
) -> Result<GrayImage> {
    if kernel.is_identity() || iterations == 0 {
        return Ok(image);
    }
    (0..iterations).try_fold(image, |current, _| rank_filter(&current, kernel, pick))
}

/// One pass of a separable rank filter over a square window. Window positions
/// outside the image are ignored.
fn rank_filter(image: &GrayImage, kernel: Kernel, pick: fn(u8, u8) -> u8) -> Result<GrayImage> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let (before, after) = kernel.reach();
    let (before, after) = (before as usize, after as usize);
    let src = image.as_raw();

    let mut rows = vec![0u8; src.len()];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            let lo = x.saturating_sub(before);
            let hi = (x + after).min(w - 1);
            rows[y * w + x] = row[lo..=hi].iter().copied().fold(row[x], pick);
        }
    }

    let mut out = vec![0u8; src.len()];
    for y in 0..h {
        let lo = y.saturating_sub(before);
        let hi = (y + after).min(h - 1);
        for x in 0..w {
            out[y * w + x] = (lo..=hi).map(|yy| rows[yy * w + x]).fold(rows[y * w + x], pick);
        }
    }

    // The buffer length always matches width * height.
    into_gray(width, height, out)
}

fn into_gray(width: u32, height: u32, samples: Vec<u8>) -> Result<GrayImage> {
    let len = samples.len();
    GrayImage::from_raw(width, height, samples).ok_or_else(|| OcrprepError::UnexpectedTransform {
        stage: "morphology",
        reason: format!("{len} samples do not fill a {width}x{height} image"),
    })
}
