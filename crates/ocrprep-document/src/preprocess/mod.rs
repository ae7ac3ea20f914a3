// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pre-processing pipeline: the fixed filter chain that prepares a page raster
// for text recognition.

pub mod binarize;
pub mod morphology;
pub mod pipeline;
pub mod smooth;

pub use binarize::{binarize, otsu_threshold};
pub use morphology::{Kernel, apply_morphology, dilate, erode};
pub use pipeline::{Preprocessor, process, to_grayscale};
pub use smooth::{gaussian_kernel, smooth};
