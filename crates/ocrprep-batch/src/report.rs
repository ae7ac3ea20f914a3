// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch report: per-item outcomes and the end-of-run summary.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which half of the batch an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Document → page images.
    Rasterize,
    /// Page image → processed image.
    Process,
}

/// Final state of one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Completed and written.
    Processed,
    /// Unreadable input; logged and passed over.
    Skipped,
    /// Unexpected failure, timeout, or write error.
    Failed,
}

/// What happened to one document or page image.
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    /// Input file name.
    pub item: String,
    pub phase: Phase,
    pub status: ItemStatus,
    /// Error text for skipped and failed items.
    pub detail: Option<String>,
    /// Files written for this item.
    pub outputs: Vec<PathBuf>,
}

/// Summary of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub documents_rasterized: usize,
    pub documents_skipped: usize,
    pub documents_failed: usize,
    pub pages_written: usize,
    pub images_processed: usize,
    pub images_skipped: usize,
    pub images_failed: usize,
    pub items: Vec<ItemOutcome>,
}

impl Default for BatchReport {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            documents_rasterized: 0,
            documents_skipped: 0,
            documents_failed: 0,
            pages_written: 0,
            images_processed: 0,
            images_skipped: 0,
            images_failed: 0,
            items: Vec::new(),
        }
    }

    /// Record an item and update the counters.
    pub fn record(&mut self, outcome: ItemOutcome) {
        match (outcome.phase, outcome.status) {
            (Phase::Rasterize, ItemStatus::Processed) => {
                self.documents_rasterized += 1;
                self.pages_written += outcome.outputs.len();
            }
            (Phase::Rasterize, ItemStatus::Skipped) => self.documents_skipped += 1,
            (Phase::Rasterize, ItemStatus::Failed) => self.documents_failed += 1,
            (Phase::Process, ItemStatus::Processed) => self.images_processed += 1,
            (Phase::Process, ItemStatus::Skipped) => self.images_skipped += 1,
            (Phase::Process, ItemStatus::Failed) => self.images_failed += 1,
        }
        self.items.push(outcome);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// True when any item ended in [`ItemStatus::Failed`].
    pub fn has_failures(&self) -> bool {
        self.documents_failed > 0 || self.images_failed > 0
    }

    /// Outcomes with the given status, in recording order.
    pub fn with_status(&self, status: ItemStatus) -> impl Iterator<Item = &ItemOutcome> {
        self.items.iter().filter(move |item| item.status == status)
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        format!(
            "documents: {} rasterized, {} skipped, {} failed ({} pages); images: {} processed, {} skipped, {} failed",
            self.documents_rasterized,
            self.documents_skipped,
            self.documents_failed,
            self.pages_written,
            self.images_processed,
            self.images_skipped,
            self.images_failed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(phase: Phase, status: ItemStatus, outputs: usize) -> ItemOutcome {
        ItemOutcome {
            item: "x".into(),
            phase,
            status,
            detail: None,
            outputs: (0..outputs).map(|i| PathBuf::from(format!("p{i}.png"))).collect(),
        }
    }

    #[test]
    fn counters_follow_phase_and_status() {
        let mut report = BatchReport::new();
        report.record(outcome(Phase::Rasterize, ItemStatus::Processed, 3));
        report.record(outcome(Phase::Rasterize, ItemStatus::Skipped, 0));
        report.record(outcome(Phase::Process, ItemStatus::Processed, 1));
        report.record(outcome(Phase::Process, ItemStatus::Processed, 1));
        report.record(outcome(Phase::Process, ItemStatus::Skipped, 0));

        assert_eq!(report.documents_rasterized, 1);
        assert_eq!(report.pages_written, 3);
        assert_eq!(report.documents_skipped, 1);
        assert_eq!(report.images_processed, 2);
        assert_eq!(report.images_skipped, 1);
        assert!(!report.has_failures());
        assert_eq!(report.with_status(ItemStatus::Skipped).count(), 2);
        assert_eq!(
            report.summary(),
            "documents: 1 rasterized, 1 skipped, 0 failed (3 pages); images: 2 processed, 1 skipped, 0 failed"
        );
    }

    #[test]
    fn any_failure_is_flagged() {
        let mut report = BatchReport::new();
        report.record(outcome(Phase::Process, ItemStatus::Failed, 0));
        assert!(report.has_failures());
        report.finish();
        assert!(report.finished_at.is_some());
    }
}
