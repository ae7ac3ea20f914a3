// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: file kinds, raster formats, and output naming rules.

use std::path::Path;

use image::ImageFormat;
use serde::{Deserialize, Serialize};

/// Prefix prepended to every pipeline output filename.
pub const PROCESSED_PREFIX: &str = "processed_";

/// Encoding used when writing rasterized page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    /// Lossless; keeps compression artifacts out of the pipeline.
    Png,
    /// Lossy.
    Jpeg,
}

impl RasterFormat {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }

    /// Matching `image` crate format.
    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
        }
    }
}

impl std::str::FromStr for RasterFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            other => Err(format!("unknown raster format '{other}' (expected png or jpeg)")),
        }
    }
}

/// Kinds of input file the batch driver recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    Pdf,
    Jpeg,
    Png,
    Tiff,
    Bmp,
}

impl FileKind {
    /// Infer the kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "tif" | "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }

    /// Infer the kind from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// True for single-image formats the pipeline can decode directly.
    pub fn is_raster(&self) -> bool {
        !matches!(self, Self::Pdf)
    }
}

/// Filename for page `index` (1-based) of the document `stem`.
pub fn page_image_name(stem: &str, index: usize, format: RasterFormat) -> String {
    format!("{stem}_page_{index}.{}", format.extension())
}

/// Filename for the processed version of `original`.
pub fn processed_image_name(original: &str) -> String {
    format!("{PROCESSED_PREFIX}{original}")
}
