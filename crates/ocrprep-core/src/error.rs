// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for ocrprep.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all ocrprep operations.
#[derive(Debug, Error)]
pub enum OcrprepError {
    // -- Per-item, skippable --
    #[error("could not rasterize {path}: {reason}")]
    DocumentRasterization { path: String, reason: String },

    #[error("image decode failed: {0}")]
    ImageDecode(String),

    // -- Per-item, fatal to that item --
    #[error("unexpected failure in {stage} stage: {reason}")]
    UnexpectedTransform { stage: &'static str, reason: String },

    #[error("image encoding failed: {0}")]
    ImageEncode(String),

    #[error("{item} did not finish within {limit:?}")]
    Timeout { item: String, limit: Duration },

    #[error("worker failed: {0}")]
    Worker(String),

    // -- Setup --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OcrprepError {
    /// Whether the batch driver should log this error and skip the item,
    /// as opposed to recording the item as failed.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::DocumentRasterization { .. } | Self::ImageDecode(_)
        )
    }
}

/// Failure returned by the pre-processing pipeline.
pub type ProcessingFailure = OcrprepError;

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OcrprepError>;
