// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ocrprep-document: Turning documents into clean page rasters.
//
// Provides image loading and encoding, page-image extraction from PDFs, the
// rasterizer seam (with optional pdfium rendering), and the pre-processing
// pipeline (grayscale, morphology, Gaussian smoothing, Otsu binarization).

pub mod image;
pub mod pdf;
pub mod preprocess;
pub mod rasterize;

// Re-export the primary structs so callers can use `ocrprep_document::Preprocessor` etc.
pub use crate::image::processor::ImageProcessor;
pub use pdf::reader::PdfReader;
pub use preprocess::pipeline::{Preprocessor, process};
pub use rasterize::{DocumentRasterizer, ImageDocumentRasterizer, PdfImageRasterizer, Rasterizer};

#[cfg(feature = "pdfium")]
pub use rasterize::PdfiumRasterizer;
