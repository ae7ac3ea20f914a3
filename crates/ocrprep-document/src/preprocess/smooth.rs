// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Gaussian smoothing with a fixed, odd-sized kernel.

use image::GrayImage;
use imageproc::filter::separable_filter_equal;
use tracing::{debug, instrument};

/// Binomial taps used for small kernels when no sigma is given.
const SMALL_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
];

/// Sigma for a Gaussian of side `size` when none is given explicitly.
fn sigma_for(size: u32) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalised 1-D weights of length `size`.
///
/// Sizes 1, 3, 5 and 7 use fixed binomial taps (`[1, 4, 6, 4, 1] / 16` for
/// 5); larger sizes sample a Gaussian with `sigma = 0.3 * ((size - 1) / 2 - 1) + 0.8`.
pub fn gaussian_kernel(size: u32) -> Vec<f32> {
    if size % 2 == 1 {
        if let Some(taps) = SMALL_KERNELS.get((size / 2) as usize) {
            return taps.to_vec();
        }
    }
    let sigma = sigma_for(size);
    let half = (size / 2) as i32;
    let weights: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Blur with a `size` x `size` Gaussian. Sizes of 0 or 1 return the image
/// unchanged; callers validate that larger sizes are odd. Pixels past the
/// border repeat the edge pixel.
#[instrument(skip(image))]
pub fn smooth(image: GrayImage, size: u32) -> GrayImage {
    if size <= 1 {
        return image;
    }
    let kernel = gaussian_kernel(size);
    debug!(taps = kernel.len(), "Applying Gaussian blur");
    separable_filter_equal(&image, &kernel)
}
