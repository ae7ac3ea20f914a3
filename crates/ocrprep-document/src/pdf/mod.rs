// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: page inspection and embedded page-image extraction.

pub mod reader;

pub use reader::{MAX_PAGE_PIXELS, PageImage, PdfReader, page_pixel_size};
