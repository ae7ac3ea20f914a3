// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ocrprep-batch: Walks the document and page directories, runs the
// rasterizer and the pre-processing pipeline per item, and reports what was
// processed, skipped, or failed. Per-item errors never abort the batch.

pub mod driver;
pub mod report;

pub use driver::BatchDriver;
pub use report::{BatchReport, ItemOutcome, ItemStatus, Phase};
