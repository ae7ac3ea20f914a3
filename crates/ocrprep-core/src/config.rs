// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline and batch configuration, including the versioned presets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OcrprepError, Result};
use crate::types::RasterFormat;

/// Which morphological strategy the pipeline applies before smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MorphologyMode {
    /// Skip morphology entirely.
    Disabled,
    /// Dilation passes only; thickens faint strokes. `iterations_erode` is ignored.
    DilateOnly,
    /// Dilation passes followed by erosion passes.
    DilateThenErode,
}

impl std::str::FromStr for MorphologyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "none" => Ok(Self::Disabled),
            "dilate-only" => Ok(Self::DilateOnly),
            "dilate-then-erode" => Ok(Self::DilateThenErode),
            other => Err(format!(
                "unknown morphology mode '{other}' (expected disabled, dilate-only or dilate-then-erode)"
            )),
        }
    }
}

/// Tunable parameters of the pre-processing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Side length of the square structuring element. 0 or 1 disables morphology.
    pub kernel_size: u32,
    /// Morphological strategy.
    pub morphology: MorphologyMode,
    /// Number of dilation passes.
    pub iterations_dilate: u32,
    /// Number of erosion passes (only used by `DilateThenErode`).
    pub iterations_erode: u32,
    /// Side length of the Gaussian kernel. Must be odd; 0 or 1 disables smoothing.
    pub blur_kernel_size: u32,
    /// Whether the smoothing stage runs at all.
    pub blur_enabled: bool,
}

impl PipelineConfig {
    /// Check invariants that the type system cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.blur_kernel_size > 1 && self.blur_kernel_size % 2 == 0 {
            return Err(OcrprepError::Config(format!(
                "blur kernel size must be odd, got {}",
                self.blur_kernel_size
            )));
        }
        Ok(())
    }

    /// Effective (dilate, erode) pass counts after applying the mode and the
    /// kernel-size rule.
    pub fn effective_iterations(&self) -> (u32, u32) {
        if self.kernel_size <= 1 {
            return (0, 0);
        }
        match self.morphology {
            MorphologyMode::Disabled => (0, 0),
            MorphologyMode::DilateOnly => (self.iterations_dilate, 0),
            MorphologyMode::DilateThenErode => (self.iterations_dilate, self.iterations_erode),
        }
    }

    /// Whether the smoothing stage will modify the image.
    pub fn blur_active(&self) -> bool {
        self.blur_enabled && self.blur_kernel_size > 1
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Preset::default().pipeline()
    }
}

/// The two configurations observed in the field, kept side by side rather
/// than collapsed into one default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// 300 DPI JPEG pages, balanced 1x1 dilate + erode.
    V1,
    /// 400 DPI PNG pages, 3x3 dilate-only (two passes).
    #[default]
    V2,
}

impl Preset {
    pub fn pipeline(&self) -> PipelineConfig {
        match self {
            Self::V1 => PipelineConfig {
                kernel_size: 1,
                morphology: MorphologyMode::DilateThenErode,
                iterations_dilate: 1,
                iterations_erode: 1,
                blur_kernel_size: 5,
                blur_enabled: true,
            },
            Self::V2 => PipelineConfig {
                kernel_size: 3,
                morphology: MorphologyMode::DilateOnly,
                iterations_dilate: 2,
                iterations_erode: 0,
                blur_kernel_size: 5,
                blur_enabled: true,
            },
        }
    }

    pub fn dpi(&self) -> u32 {
        match self {
            Self::V1 => 300,
            Self::V2 => 400,
        }
    }

    pub fn page_format(&self) -> RasterFormat {
        match self {
            Self::V1 => RasterFormat::Jpeg,
            Self::V2 => RasterFormat::Png,
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            other => Err(format!("unknown preset '{other}' (expected v1 or v2)")),
        }
    }
}

/// Everything the batch driver needs. Passed explicitly at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Source documents (PDFs and single-page raster documents).
    pub documents_dir: PathBuf,
    /// Rasterized page images; also the pipeline's input directory.
    pub pages_dir: PathBuf,
    /// Pipeline output directory.
    pub processed_dir: PathBuf,
    /// Rasterization resolution in dots per inch.
    pub dpi: u32,
    /// Encoding for rasterized pages.
    pub page_format: RasterFormat,
    /// Pipeline parameters.
    pub pipeline: PipelineConfig,
    /// Maximum number of images processed concurrently.
    pub workers: usize,
    /// Per-image time limit in seconds; 0 means unbounded.
    pub item_timeout_secs: u64,
    /// Run the rasterize phase before the pipeline phase.
    pub rasterize_documents: bool,
}

impl BatchConfig {
    /// Build a config from a preset, with default directories.
    pub fn from_preset(preset: Preset) -> Self {
        Self {
            dpi: preset.dpi(),
            page_format: preset.page_format(),
            pipeline: preset.pipeline(),
            ..Self::default()
        }
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.dpi == 0 {
            return Err(OcrprepError::Config("dpi must be positive".into()));
        }
        if self.workers == 0 {
            return Err(OcrprepError::Config("workers must be at least 1".into()));
        }
        if self.pages_dir == self.processed_dir {
            return Err(OcrprepError::Config(
                "pages and processed directories must differ".into(),
            ));
        }
        self.pipeline.validate()
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        let preset = Preset::default();
        Self {
            documents_dir: PathBuf::from("pdfs"),
            pages_dir: PathBuf::from("images"),
            processed_dir: PathBuf::from("processed"),
            dpi: preset.dpi(),
            page_format: preset.page_format(),
            pipeline: preset.pipeline(),
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            item_timeout_secs: 120,
            rasterize_documents: true,
        }
    }
}
