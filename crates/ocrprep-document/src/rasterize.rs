// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rasterization: turning a paginated document into one raster per page.
//
// The `Rasterizer` trait is the seam the batch driver depends on. Concrete
// implementations:
//
// - `ImageDocumentRasterizer`: a PNG/JPEG/TIFF/BMP file is a one-page document.
// - `PdfImageRasterizer`: pure Rust, extracts the embedded page image of
//   scanned PDFs via lopdf and resamples it to the requested DPI.
// - `PdfiumRasterizer` (feature `pdfium`): full page rendering.
// - `DocumentRasterizer`: picks one of the above by file extension.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ocrprep_core::error::{OcrprepError, Result};
use ocrprep_core::{FileKind, RasterFormat, page_image_name};
use tracing::{debug, info, instrument};

use crate::image::processor::ImageProcessor;
use crate::pdf::reader::{MAX_PAGE_PIXELS, PdfReader};

/// Produces the page rasters of a document, in page order.
///
/// Fails with [`OcrprepError::DocumentRasterization`] when the document cannot
/// be parsed.
pub trait Rasterizer {
    fn rasterize(&self, document: &Path, dpi: u32) -> Result<Vec<DynamicImage>>;
}

fn rasterization_error(document: &Path, reason: impl Into<String>) -> OcrprepError {
    OcrprepError::DocumentRasterization {
        path: document.display().to_string(),
        reason: reason.into(),
    }
}

fn oversized_page(document: &Path, page: usize, width_pt: f32, height_pt: f32, dpi: u32) -> OcrprepError {
    rasterization_error(
        document,
        format!(
            "page {page} ({width_pt} x {height_pt} pt) exceeds {MAX_PAGE_PIXELS} pixels at {dpi} DPI"
        ),
    )
}

// -- Raster documents ---------------------------------------------------------

/// Treats a single raster file as a one-page document. The DPI is ignored;
/// the file already has a resolution.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDocumentRasterizer;

impl Rasterizer for ImageDocumentRasterizer {
    fn rasterize(&self, document: &Path, _dpi: u32) -> Result<Vec<DynamicImage>> {
        let image = ImageProcessor::open(document)
            .map_err(|err| rasterization_error(document, err.to_string()))?
            .into_dynamic();
        Ok(vec![image])
    }
}

// -- Scanned PDFs -------------------------------------------------------------

/// Extracts the full-page image of each page of a scanned PDF and resamples
/// it to the page's MediaBox at the requested DPI.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfImageRasterizer;

impl Rasterizer for PdfImageRasterizer {
    #[instrument(skip(self), fields(document = %document.display(), dpi))]
    fn rasterize(&self, document: &Path, dpi: u32) -> Result<Vec<DynamicImage>> {
        let reader = PdfReader::open(document)?;
        let pages = reader.page_images()?;
        debug!(pages = pages.len(), "Extracted page images");

        pages
            .into_iter()
            .enumerate()
            .map(|(index, page)| {
                let (width, height) = page
                    .target_size(dpi)
                    .ok_or_else(|| oversized_page(document, index + 1, page.width_pt, page.height_pt, dpi))?;
                Ok(ImageProcessor::from_dynamic(page.image)
                    .resample(width, height)
                    .into_dynamic())
            })
            .collect()
    }
}

// -- pdfium -------------------------------------------------------------------

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRasterizer;

#[cfg(feature = "pdfium")]
mod pdfium {
    use std::path::Path;

    use image::DynamicImage;
    use ocrprep_core::error::{OcrprepError, Result};
    use pdfium_render::prelude::*;
    use tracing::{debug, instrument};

    use super::{Rasterizer, oversized_page, rasterization_error};
    use crate::pdf::reader::page_pixel_size;

    /// Renders every page with pdfium. Handles vector and text content, not
    /// just embedded scans.
    pub struct PdfiumRasterizer {
        pdfium: Pdfium,
    }

    impl PdfiumRasterizer {
        /// Bind to a pdfium library next to the executable, falling back to
        /// the system library.
        pub fn new() -> Result<Self> {
            let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library())
                .map_err(|err| OcrprepError::Config(format!("failed to bind pdfium library: {err}")))?;
            Ok(Self {
                pdfium: Pdfium::new(bindings),
            })
        }
    }

    impl Rasterizer for PdfiumRasterizer {
        #[instrument(skip(self), fields(document = %document.display(), dpi))]
        fn rasterize(&self, document: &Path, dpi: u32) -> Result<Vec<DynamicImage>> {
            let pdf = self
                .pdfium
                .load_pdf_from_file(document, None)
                .map_err(|err| rasterization_error(document, format!("failed to load PDF: {err}")))?;

            let mut pages = Vec::new();
            for (index, page) in pdf.pages().iter().enumerate() {
                let (width_pt, height_pt) = (page.width().value, page.height().value);
                let (width, height) = page_pixel_size(width_pt, height_pt, dpi)
                    .ok_or_else(|| oversized_page(document, index + 1, width_pt, height_pt, dpi))?;
                // Bounded by MAX_PAGE_PIXELS, so each side fits in an i32.
                let (width, height) = (width as i32, height as i32);
                let bitmap = page
                    .render_with_config(
                        &PdfRenderConfig::new()
                            .set_target_width(width)
                            .set_target_height(height)
                            .render_form_data(true)
                            .render_annotations(true),
                    )
                    .map_err(|err| {
                        rasterization_error(document, format!("page {} failed to render: {err}", index + 1))
                    })?;
                debug!(page = index + 1, width, height, "Page rendered");
                pages.push(bitmap.as_image());
            }

            if pages.is_empty() {
                return Err(rasterization_error(document, "document has no pages"));
            }
            Ok(pages)
        }
    }
}

// -- Dispatch -----------------------------------------------------------------

/// Chooses a rasterizer from the document's file extension.
pub struct DocumentRasterizer {
    pdf: Box<dyn Rasterizer>,
    image: ImageDocumentRasterizer,
}

impl DocumentRasterizer {
    /// Use pdfium for PDFs when the feature is compiled in, otherwise the
    /// embedded-image extractor.
    pub fn new() -> Result<Self> {
        #[cfg(feature = "pdfium")]
        let pdf: Box<dyn Rasterizer> = Box::new(PdfiumRasterizer::new()?);
        #[cfg(not(feature = "pdfium"))]
        let pdf: Box<dyn Rasterizer> = Box::new(PdfImageRasterizer);

        Ok(Self::with_pdf_rasterizer(pdf))
    }

    /// Use a specific rasterizer for PDFs.
    pub fn with_pdf_rasterizer(pdf: Box<dyn Rasterizer>) -> Self {
        Self {
            pdf,
            image: ImageDocumentRasterizer,
        }
    }
}

impl Rasterizer for DocumentRasterizer {
    fn rasterize(&self, document: &Path, dpi: u32) -> Result<Vec<DynamicImage>> {
        match FileKind::from_path(document) {
            Some(FileKind::Pdf) => self.pdf.rasterize(document, dpi),
            Some(_) => self.image.rasterize(document, dpi),
            None => Err(rasterization_error(document, "unsupported document type")),
        }
    }
}

// -- Writing pages ------------------------------------------------------------

/// Rasterize `document` and write each page to `out_dir` as
/// `{stem}_page_{n}.{ext}`. Returns the written paths in page order.
#[instrument(skip(rasterizer), fields(document = %document.display(), dpi))]
pub fn rasterize_to_dir(
    rasterizer: &dyn Rasterizer,
    document: &Path,
    out_dir: &Path,
    dpi: u32,
    format: RasterFormat,
) -> Result<Vec<PathBuf>> {
    let stem = document
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| rasterization_error(document, "document name is not valid UTF-8"))?;

    let pages = rasterizer.rasterize(document, dpi)?;
    let mut written = Vec::with_capacity(pages.len());
    for (index, page) in pages.into_iter().enumerate() {
        let path = out_dir.join(page_image_name(stem, index + 1, format));
        ImageProcessor::from_dynamic(page).save_as(&path, format)?;
        debug!(path = %path.display(), "Page written");
        written.push(path);
    }

    info!(pages = written.len(), "Document rasterized");
    Ok(written)
}
