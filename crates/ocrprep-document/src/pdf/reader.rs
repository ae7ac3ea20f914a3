// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open a document with `lopdf`, inspect its page tree, and pull
// the full-page image out of each page of a scanned document.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use ocrprep_core::error::OcrprepError;
use tracing::{debug, info, instrument, warn};

/// US Letter in points, used when a page has no usable /MediaBox.
const DEFAULT_MEDIA_SIZE: (f32, f32) = (612.0, 792.0);

/// Guard against cyclic /Parent chains in malformed files.
const MAX_TREE_DEPTH: usize = 32;

/// Largest page raster a rasterizer may allocate, in pixels. A0 at 400 DPI
/// is about 248 million.
pub const MAX_PAGE_PIXELS: u64 = 250_000_000;

/// The dominant image of one page plus the page's physical size.
pub struct PageImage {
    /// Decoded image samples at their native resolution.
    pub image: DynamicImage,
    /// Page width in points (1/72 inch).
    pub width_pt: f32,
    /// Page height in points.
    pub height_pt: f32,
}

impl PageImage {
    /// Pixel size of this page rendered at `dpi`, or `None` when it exceeds
    /// [`MAX_PAGE_PIXELS`].
    pub fn target_size(&self, dpi: u32) -> Option<(u32, u32)> {
        page_pixel_size(self.width_pt, self.height_pt, dpi)
    }
}

/// Pixel size of a `width_pt` x `height_pt` page at `dpi`. Each side is at
/// least one pixel. Returns `None` when the page would exceed
/// [`MAX_PAGE_PIXELS`].
pub fn page_pixel_size(width_pt: f32, height_pt: f32, dpi: u32) -> Option<(u32, u32)> {
    let scale = f64::from(dpi) / 72.0;
    let side = |points: f32| {
        let pixels = (f64::from(points) * scale).round().max(1.0);
        (pixels.is_finite() && pixels <= MAX_PAGE_PIXELS as f64).then_some(pixels as u32)
    };
    let (width, height) = (side(width_pt)?, side(height_pt)?);
    (u64::from(width) * u64::from(height) <= MAX_PAGE_PIXELS).then_some((width, height))
}

/// Reads existing PDF files.
///
/// Wraps `lopdf::Document`. Every failure is reported as
/// [`OcrprepError::DocumentRasterization`] carrying the source path.
pub struct PdfReader {
    /// The underlying lopdf document.
    document: Document,
    /// Source path, if opened from a file (useful for diagnostics).
    source_path: Option<String>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OcrprepError> {
        let path_ref = path.as_ref();
        info!("Opening PDF: {}", path_ref.display());

        let document = Document::load(path_ref).map_err(|err| OcrprepError::DocumentRasterization {
            path: path_ref.display().to_string(),
            reason: format!("failed to parse PDF: {err}"),
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, OcrprepError> {
        let document = Document::load_mem(data).map_err(|err| OcrprepError::DocumentRasterization {
            path: "<memory>".into(),
            reason: format!("failed to parse PDF: {err}"),
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self {
            document,
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Return the source path if the reader was created via [`PdfReader::open`].
    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    // -- Extraction -----------------------------------------------------------

    /// Extract the largest image drawn on page `page_number` (1-indexed).
    #[instrument(skip(self), fields(page_number))]
    pub fn page_image(&self, page_number: u32) -> Result<PageImage, OcrprepError> {
        let pages = self.document.get_pages();
        let page_id = *pages.get(&page_number).ok_or_else(|| {
            self.error(format!(
                "page {} out of range (document has {} pages)",
                page_number,
                pages.len()
            ))
        })?;

        let (width_pt, height_pt) = self.media_size(page_id);
        let stream = self.largest_page_image(page_id).ok_or_else(|| {
            self.error(format!(
                "page {page_number} has no embedded raster image; rendering it needs the pdfium feature"
            ))
        })?;

        let image = self
            .components(stream)
            .and_then(|components| decode_image_stream(stream, components))
            .map_err(|reason| self.error(format!("page {page_number}: {reason}")))?;

        debug!(
            page_number,
            width = image.width(),
            height = image.height(),
            width_pt,
            height_pt,
            "Page image extracted"
        );
        Ok(PageImage {
            image,
            width_pt,
            height_pt,
        })
    }

    /// Extract the page image of every page, in page order.
    pub fn page_images(&self) -> Result<Vec<PageImage>, OcrprepError> {
        let count = self.page_count();
        if count == 0 {
            return Err(self.error("document has no pages".into()));
        }
        (1..=count as u32).map(|n| self.page_image(n)).collect()
    }

    // -- Helpers --------------------------------------------------------------

    fn error(&self, reason: String) -> OcrprepError {
        OcrprepError::DocumentRasterization {
            path: self.source_path.clone().unwrap_or_else(|| "<memory>".into()),
            reason,
        }
    }

    /// Resolve a possibly-indirect object.
    fn resolve<'a>(&'a self, object: &'a Object) -> Option<&'a Object> {
        self.document.dereference(object).ok().map(|(_, obj)| obj)
    }

    /// Look up a page attribute, following /Parent for inheritable keys.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<&Object> {
        let mut current = self.document.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_TREE_DEPTH {
            if let Ok(value) = current.get(key) {
                return self.resolve(value);
            }
            let parent = current.get(b"Parent").ok()?;
            current = self.resolve(parent)?.as_dict().ok()?;
        }
        warn!(?page_id, "Page tree deeper than expected; giving up on inheritance");
        None
    }

    fn media_size(&self, page_id: ObjectId) -> (f32, f32) {
        let Some(Object::Array(bounds)) = self.inherited(page_id, b"MediaBox") else {
            return DEFAULT_MEDIA_SIZE;
        };
        let values: Vec<f32> = bounds
            .iter()
            .filter_map(|v| self.resolve(v).and_then(number))
            .collect();
        match values.as_slice() {
            [x0, y0, x1, y1] if (x1 - x0).abs() > 0.0 && (y1 - y0).abs() > 0.0 => {
                ((x1 - x0).abs(), (y1 - y0).abs())
            }
            _ => DEFAULT_MEDIA_SIZE,
        }
    }

    /// The image XObject with the most pixels in the page's resources.
    fn largest_page_image(&self, page_id: ObjectId) -> Option<&Stream> {
        let resources = self.inherited(page_id, b"Resources")?.as_dict().ok()?;
        let xobjects = self.resolve(resources.get(b"XObject").ok()?)?.as_dict().ok()?;

        xobjects
            .iter()
            .filter_map(|(_, value)| self.resolve(value)?.as_stream().ok())
            .filter(|stream| is_name(stream.dict.get(b"Subtype").ok(), b"Image"))
            .max_by_key(|stream| {
                let w = dict_int(&stream.dict, b"Width").unwrap_or(0);
                let h = dict_int(&stream.dict, b"Height").unwrap_or(0);
                w.saturating_mul(h)
            })
    }

    /// Number of colour components in an image's /ColorSpace.
    fn components(&self, stream: &Stream) -> Result<u32, String> {
        if is_image_mask(stream) {
            return Ok(1);
        }
        let space = stream
            .dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|cs| self.resolve(cs))
            .ok_or("image has no /ColorSpace")?;
        match space {
            Object::Name(name) => match name.as_slice() {
                b"DeviceGray" | b"CalGray" => Ok(1),
                b"DeviceRGB" | b"CalRGB" => Ok(3),
                other => Err(format!(
                    "unsupported colour space {}",
                    String::from_utf8_lossy(other)
                )),
            },
            Object::Array(parts) if is_name(parts.first(), b"ICCBased") => {
                let profile = parts
                    .get(1)
                    .and_then(|p| self.resolve(p))
                    .and_then(|p| p.as_stream().ok())
                    .ok_or("ICCBased colour space without a profile stream")?;
                match dict_int(&profile.dict, b"N") {
                    Some(1) => Ok(1),
                    Some(3) => Ok(3),
                    other => Err(format!("unsupported ICC component count {other:?}")),
                }
            }
            _ => Err("unsupported colour space".into()),
        }
    }
}

// -- Stream decoding ----------------------------------------------------------

/// Names listed in a stream's /Filter entry, outermost first.
fn filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Object::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode an image XObject with `components` colour channels.
///
/// Handles JPEG (`DCTDecode`) streams and raw or Flate-compressed samples:
/// 8-bit gray or RGB, and 1-bit gray (bilevel scans and image masks).
fn decode_image_stream(stream: &Stream, components: u32) -> Result<DynamicImage, String> {
    let filters = filters(stream);
    let names: Vec<&[u8]> = filters.iter().map(|f| f.as_slice()).collect();

    match names.as_slice() {
        [b"DCTDecode"] => {
            return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|err| format!("JPEG image stream did not decode: {err}"));
        }
        [] | [b"FlateDecode"] => {}
        other => {
            let listed: Vec<String> = other
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect();
            return Err(format!("unsupported image filter chain {listed:?}"));
        }
    }

    let samples = if names.is_empty() {
        stream.content.clone()
    } else {
        stream
            .decompressed_content()
            .map_err(|err| format!("image stream did not inflate: {err}"))?
    };

    let width = dict_int(&stream.dict, b"Width").ok_or("image has no /Width")?;
    let height = dict_int(&stream.dict, b"Height").ok_or("image has no /Height")?;
    let width = u32::try_from(width).map_err(|_| "negative /Width")?;
    let height = u32::try_from(height).map_err(|_| "negative /Height")?;
    let bits = if is_image_mask(stream) {
        1
    } else {
        dict_int(&stream.dict, b"BitsPerComponent").unwrap_or(8)
    };

    match (bits, components) {
        (8, 1) => {
            let mut data = samples;
            data.truncate(width as usize * height as usize);
            GrayImage::from_raw(width, height, data)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| "gray image stream is shorter than its dimensions".into())
        }
        (8, 3) => {
            let mut data = samples;
            data.truncate(width as usize * height as usize * 3);
            RgbImage::from_raw(width, height, data)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| "RGB image stream is shorter than its dimensions".into())
        }
        (1, 1) => unpack_bilevel(&samples, width, height).map(DynamicImage::ImageLuma8),
        (bits, components) => Err(format!(
            "unsupported sample layout: {bits} bits x {components} components"
        )),
    }
}

/// Expand 1-bit rows (each padded to a whole byte) to 8-bit gray. A set bit
/// is white for both gray images and image masks with the default /Decode.
fn unpack_bilevel(samples: &[u8], width: u32, height: u32) -> Result<GrayImage, String> {
    let row_bytes = (width as usize).div_ceil(8);
    if samples.len() < row_bytes * height as usize {
        return Err("bilevel image stream is shorter than its dimensions".into());
    }
    Ok(GrayImage::from_fn(width, height, |x, y| {
        let byte = samples[y as usize * row_bytes + x as usize / 8];
        let bit = (byte >> (7 - (x % 8))) & 1;
        image::Luma([if bit == 1 { 255 } else { 0 }])
    }))
}

fn is_image_mask(stream: &Stream) -> bool {
    matches!(stream.dict.get(b"ImageMask"), Ok(Object::Boolean(true)))
}

// -- Object helpers -----------------------------------------------------------

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn dict_int(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match dict.get(key).ok()? {
        Object::Integer(i) => Some(*i),
        Object::Real(r) => Some(*r as i64),
        _ => None,
    }
}

fn is_name(object: Option<&Object>, expected: &[u8]) -> bool {
    matches!(object, Some(Object::Name(name)) if name.as_slice() == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use lopdf::dictionary;

    /// Build a scanned-style PDF: one full-page image per page, MediaBox on
    /// the /Pages node so every page inherits it.
    fn scanned_pdf(pages: &[DynamicImage], media: (i64, i64), compress: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();

        for page in pages {
            let (space, samples) = match page {
                DynamicImage::ImageRgb8(rgb) => ("DeviceRGB", rgb.as_raw().clone()),
                other => ("DeviceGray", other.to_luma8().into_raw()),
            };
            let mut stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => page.width() as i64,
                    "Height" => page.height() as i64,
                    "ColorSpace" => space,
                    "BitsPerComponent" => 8,
                },
                samples,
            );
            if compress {
                stream.compress().unwrap();
            }
            let image_id = doc.add_object(stream);
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im0" => image_id },
                },
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![0.into(), 0.into(), media.0.into(), media.1.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn gray_page(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, _| {
            Luma([if x % 4 == 0 { 0 } else { 230 }])
        }))
    }

    #[test]
    fn extracts_every_page_in_order() {
        let bytes = scanned_pdf(&[gray_page(20, 10), gray_page(30, 15)], (72, 36), false);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert_eq!(reader.page_count(), 2);
        assert!(reader.source_path().is_none());

        let pages = reader.page_images().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!((pages[0].image.width(), pages[0].image.height()), (20, 10));
        assert_eq!((pages[1].image.width(), pages[1].image.height()), (30, 15));
        assert_eq!(pages[0].image.to_luma8().get_pixel(0, 0).0[0], 0);
        assert_eq!(pages[0].image.to_luma8().get_pixel(1, 0).0[0], 230);
    }

    #[test]
    fn media_box_is_inherited_and_scaled_by_dpi() {
        let bytes = scanned_pdf(&[gray_page(10, 10)], (72, 36), false);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let page = reader.page_image(1).unwrap();
        assert_eq!((page.width_pt, page.height_pt), (72.0, 36.0));
        assert_eq!(page.target_size(144), Some((144, 72)));
        assert_eq!(page.target_size(400), Some((400, 200)));
    }

    #[test]
    fn oversized_media_box_has_no_target_size() {
        let bytes = scanned_pdf(&[gray_page(4, 4)], (1_000_000_000, 1_000_000_000), false);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let page = reader.page_image(1).unwrap();
        assert_eq!(page.target_size(400), None);
    }

    #[test]
    fn page_pixel_size_respects_the_cap() {
        // US Letter at 400 DPI.
        assert_eq!(page_pixel_size(612.0, 792.0, 400), Some((3400, 4400)));
        assert_eq!(page_pixel_size(0.0, 0.0, 300), Some((1, 1)));
        assert_eq!(page_pixel_size(f32::MAX, 10.0, 300), None);
        assert_eq!(page_pixel_size(72_000.0, 72_000.0, 400), None);
    }

    #[test]
    fn decodes_rgb_and_flate_streams() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, image::Rgb([200, 10, 10])));
        let bytes = scanned_pdf(&[rgb], (6, 4), true);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        let page = reader.page_image(1).unwrap();
        assert_eq!(page.image.to_rgb8().get_pixel(5, 3).0, [200, 10, 10]);
    }

    #[test]
    fn out_of_range_page_is_rasterization_error() {
        let bytes = scanned_pdf(&[gray_page(4, 4)], (4, 4), false);
        let reader = PdfReader::from_bytes(&bytes).unwrap();
        assert!(matches!(
            reader.page_image(2),
            Err(OcrprepError::DocumentRasterization { .. })
        ));
    }

    #[test]
    fn corrupt_pdf_is_rasterization_error() {
        let result = PdfReader::from_bytes(b"%PDF-1.5\nthis is not a real document");
        assert!(matches!(
            result,
            Err(OcrprepError::DocumentRasterization { .. })
        ));
    }

    #[test]
    fn missing_file_reports_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.pdf");
        match PdfReader::open(&path) {
            Err(OcrprepError::DocumentRasterization { path: reported, .. }) => {
                assert!(reported.ends_with("missing.pdf"));
            }
            other => panic!("expected rasterization error, got {:?}", other.err()),
        }
    }

    #[test]
    fn bilevel_rows_unpack_with_padding() {
        // Width 3 pads each row to one byte.
        let img = unpack_bilevel(&[0b1010_0000, 0b0100_0000], 3, 2).unwrap();
        let row0: Vec<u8> = (0..3).map(|x| img.get_pixel(x, 0).0[0]).collect();
        let row1: Vec<u8> = (0..3).map(|x| img.get_pixel(x, 1).0[0]).collect();
        assert_eq!(row0, vec![255, 0, 255]);
        assert_eq!(row1, vec![0, 255, 0]);
        assert!(unpack_bilevel(&[0xff], 3, 2).is_err());
    }
}
