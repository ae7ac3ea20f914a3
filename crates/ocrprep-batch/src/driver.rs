// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch driver.
//
// Two phases over three flat directories:
//
// 1. Rasterize: every document in `documents_dir` becomes page images in
//    `pages_dir`. Runs sequentially on the driver task.
// 2. Process: every raster in `pages_dir` goes through the pre-processing
//    pipeline on the blocking pool, at most `workers` at a time, and lands in
//    `processed_dir` as `processed_{name}`.
//
// Unreadable inputs are skipped with a warning; anything else that goes wrong
// with an item marks that item failed. Neither stops the batch.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use ocrprep_core::error::{OcrprepError, Result};
use ocrprep_core::{BatchConfig, FileKind, processed_image_name};
use ocrprep_document::rasterize::rasterize_to_dir;
use ocrprep_document::{ImageProcessor, Preprocessor, Rasterizer};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::report::{BatchReport, ItemOutcome, ItemStatus, Phase};

/// Runs a batch described by a [`BatchConfig`].
pub struct BatchDriver {
    config: BatchConfig,
    preprocessor: Arc<Preprocessor>,
}

impl BatchDriver {
    /// Validate the configuration and prepare the shared pipeline.
    pub fn new(config: BatchConfig) -> Result<Self> {
        config.validate()?;
        let preprocessor = Arc::new(Preprocessor::new(config.pipeline.clone())?);
        Ok(Self {
            config,
            preprocessor,
        })
    }

    /// Run both phases and return the report.
    ///
    /// Only setup problems (unreadable directories, an output directory that
    /// cannot be created) return `Err`; per-item problems are in the report.
    #[instrument(skip_all, fields(documents = %self.config.documents_dir.display()))]
    pub async fn run(&self, rasterizer: &dyn Rasterizer) -> Result<BatchReport> {
        let mut report = BatchReport::new();
        std::fs::create_dir_all(&self.config.pages_dir)?;
        std::fs::create_dir_all(&self.config.processed_dir)?;

        if self.config.rasterize_documents {
            self.rasterize_documents(rasterizer, &mut report)?;
        }
        self.process_pages(&mut report).await?;

        report.finish();
        info!(summary = %report.summary(), "Batch complete");
        Ok(report)
    }

    /// Phase 1: rasterize every document into `pages_dir`.
    pub fn rasterize_documents(
        &self,
        rasterizer: &dyn Rasterizer,
        report: &mut BatchReport,
    ) -> Result<()> {
        let documents = list_files(&self.config.documents_dir, |_| true)?;
        info!(count = documents.len(), "Rasterizing documents");

        for document in documents {
            let item = file_name(&document);
            let outcome = match rasterize_to_dir(
                rasterizer,
                &document,
                &self.config.pages_dir,
                self.config.dpi,
                self.config.page_format,
            ) {
                Ok(written) => ItemOutcome {
                    item,
                    phase: Phase::Rasterize,
                    status: ItemStatus::Processed,
                    detail: None,
                    outputs: written,
                },
                Err(err) => unsuccessful(item, Phase::Rasterize, err),
            };
            report.record(outcome);
        }
        Ok(())
    }

    /// Phase 2: run the pipeline over every raster in `pages_dir`.
    pub async fn process_pages(&self, report: &mut BatchReport) -> Result<()> {
        let images = list_files(&self.config.pages_dir, |kind| kind.is_raster())?;
        info!(
            count = images.len(),
            workers = self.config.workers,
            "Pre-processing page images"
        );

        let limit = (self.config.item_timeout_secs > 0)
            .then(|| Duration::from_secs(self.config.item_timeout_secs));
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks = JoinSet::new();

        for input in images {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|err| OcrprepError::Worker(err.to_string()))?;
            let item = file_name(&input);
            let output = self.config.processed_dir.join(processed_image_name(&item));
            let preprocessor = Arc::clone(&self.preprocessor);
            let target = output.clone();

            tasks.spawn(async move {
                let result = process_into(&item, limit, permit, output, move || {
                    process_one(&preprocessor, &input, &target)
                })
                .await;
                (item, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (item, result) = joined.map_err(|err| OcrprepError::Worker(err.to_string()))?;
            let outcome = match result {
                Ok(written) => ItemOutcome {
                    item,
                    phase: Phase::Process,
                    status: ItemStatus::Processed,
                    detail: None,
                    outputs: vec![written],
                },
                Err(err) => unsuccessful(item, Phase::Process, err),
            };
            report.record(outcome);
        }
        Ok(())
    }
}

/// Run blocking `work` for `item` on the blocking pool, bounded by `limit`.
///
/// A timed-out item is abandoned rather than interrupted: its thread runs to
/// completion in the background and its result is discarded. A panic inside
/// `work` is reported as [`OcrprepError::Worker`].
pub async fn run_item<T, F>(item: &str, limit: Option<Duration>, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                return Err(OcrprepError::Timeout {
                    item: item.to_string(),
                    limit,
                });
            }
        },
        None => handle.await,
    };
    joined.map_err(|err| OcrprepError::Worker(format!("{item}: {err}")))?
}

/// Run `work` under `permit` and write its encoded result to `output`.
///
/// The permit moves into the blocking closure, so an abandoned item keeps its
/// worker slot until its thread actually finishes. Nothing is written unless
/// `work` completes within `limit`.
async fn process_into<F>(
    item: &str,
    limit: Option<Duration>,
    permit: OwnedSemaphorePermit,
    output: PathBuf,
    work: F,
) -> Result<PathBuf>
where
    F: FnOnce() -> Result<Vec<u8>> + Send + 'static,
{
    let encoded = run_item(item, limit, move || {
        let _permit = permit;
        work()
    })
    .await?;
    tokio::fs::write(&output, encoded).await?;
    debug!(output = %output.display(), "Processed image written");
    Ok(output)
}

/// Pre-process `input` and encode it in the format implied by `output`.
fn process_one(preprocessor: &Preprocessor, input: &Path, output: &Path) -> Result<Vec<u8>> {
    let processed = preprocessor.process_file(input)?;
    ImageProcessor::from_dynamic(DynamicImage::ImageLuma8(processed)).encode_for_path(output)
}

/// Log a per-item error and turn it into a skipped or failed outcome.
fn unsuccessful(item: String, phase: Phase, err: OcrprepError) -> ItemOutcome {
    let status = if err.is_skippable() {
        warn!(item = %item, ?phase, error = %err, "Skipping unreadable item");
        ItemStatus::Skipped
    } else {
        error!(item = %item, ?phase, error = ?err, "Item failed");
        ItemStatus::Failed
    };
    ItemOutcome {
        item,
        phase,
        status,
        detail: Some(err.to_string()),
        outputs: Vec::new(),
    }
}

/// Regular files in `dir` with a recognised kind accepted by `accept`,
/// sorted by name.
fn list_files(dir: &Path, accept: impl Fn(FileKind) -> bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        match FileKind::from_path(&path) {
            Some(kind) if accept(kind) => files.push(path),
            _ => debug!(path = %path.display(), "Ignoring unrecognised file"),
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use lopdf::{Document, Object, Stream, dictionary};
    use ocrprep_core::{Preset, RasterFormat};
    use ocrprep_document::DocumentRasterizer;
    use std::collections::BTreeSet;

    /// One-page scanned PDF whose page is `media` points in size.
    fn scanned_pdf(page: &GrayImage, media: (i64, i64)) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => page.width() as i64,
                "Height" => page.height() as i64,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            page.as_raw().clone(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), media.0.into(), media.1.into()],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
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

    /// Light page with thick dark bands.
    fn striped_page(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            Luma([if (x / 4) % 2 == 0 { 25 } else { 225 }])
        })
    }

    fn config_in(root: &Path) -> BatchConfig {
        BatchConfig {
            documents_dir: root.join("pdfs"),
            pages_dir: root.join("images"),
            processed_dir: root.join("processed"),
            workers: 2,
            item_timeout_secs: 60,
            ..BatchConfig::from_preset(Preset::V2)
        }
    }

    fn rasterizer() -> DocumentRasterizer {
        DocumentRasterizer::with_pdf_rasterizer(Box::new(ocrprep_document::PdfImageRasterizer))
    }

    #[tokio::test]
    async fn single_page_document_end_to_end() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        std::fs::create_dir_all(&config.documents_dir).unwrap();
        // 36x18 pt at 400 DPI is 200x100 px.
        std::fs::write(
            config.documents_dir.join("invoice.pdf"),
            scanned_pdf(&striped_page(20, 10), (36, 18)),
        )
        .unwrap();

        let driver = BatchDriver::new(config.clone()).unwrap();
        let report = driver.run(&rasterizer()).await.unwrap();

        assert_eq!(report.documents_rasterized, 1);
        assert_eq!(report.pages_written, 1);
        assert_eq!(report.images_processed, 1);
        assert!(!report.has_failures());

        let page_names: Vec<_> = std::fs::read_dir(&config.pages_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(page_names, vec!["invoice_page_1.png"]);

        let raster = image::open(config.pages_dir.join("invoice_page_1.png")).unwrap();
        assert_eq!((raster.width(), raster.height()), (200, 100));

        let processed = image::open(config.processed_dir.join("processed_invoice_page_1.png")).unwrap();
        assert_eq!(processed.color().channel_count(), 1);
        assert_eq!((processed.width(), processed.height()), (200, 100));
        let levels: BTreeSet<u8> = processed.to_luma8().pixels().map(|p| p.0[0]).collect();
        assert_eq!(levels, BTreeSet::from([0u8, 255u8]));
    }

    #[tokio::test]
    async fn corrupt_document_is_skipped_and_batch_continues() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        std::fs::create_dir_all(&config.documents_dir).unwrap();
        std::fs::write(
            config.documents_dir.join("a_report.pdf"),
            scanned_pdf(&striped_page(16, 16), (20, 20)),
        )
        .unwrap();
        std::fs::write(config.documents_dir.join("b_broken.pdf"), b"%PDF-1.4 garbage").unwrap();
        DynamicImage::ImageLuma8(striped_page(40, 30))
            .save(config.documents_dir.join("c_scan.png"))
            .unwrap();

        let driver = BatchDriver::new(config.clone()).unwrap();
        let report = driver.run(&rasterizer()).await.unwrap();

        assert_eq!(report.documents_rasterized, 2);
        assert_eq!(report.documents_skipped, 1);
        assert_eq!(report.images_processed, 2);
        assert!(!report.has_failures());

        let skipped: Vec<_> = report.with_status(ItemStatus::Skipped).collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].item, "b_broken.pdf");
        assert_eq!(skipped[0].phase, Phase::Rasterize);

        assert!(config.processed_dir.join("processed_a_report_page_1.png").exists());
        assert!(config.processed_dir.join("processed_c_scan_page_1.png").exists());
    }

    #[tokio::test]
    async fn undecodable_page_produces_no_output() {
        let root = tempfile::tempdir().unwrap();
        let config = BatchConfig {
            rasterize_documents: false,
            ..config_in(root.path())
        };
        std::fs::create_dir_all(&config.pages_dir).unwrap();
        std::fs::write(config.pages_dir.join("bad_page_1.png"), b"not a png").unwrap();
        DynamicImage::ImageLuma8(striped_page(24, 24))
            .save(config.pages_dir.join("good_page_1.png"))
            .unwrap();

        let driver = BatchDriver::new(config.clone()).unwrap();
        let report = driver.run(&rasterizer()).await.unwrap();

        assert_eq!(report.images_processed, 1);
        assert_eq!(report.images_skipped, 1);
        assert!(!config.processed_dir.join("processed_bad_page_1.png").exists());
        assert!(config.processed_dir.join("processed_good_page_1.png").exists());
    }

    #[tokio::test]
    async fn lossy_pages_keep_their_extension() {
        let root = tempfile::tempdir().unwrap();
        let config = BatchConfig {
            page_format: RasterFormat::Jpeg,
            ..config_in(root.path())
        };
        std::fs::create_dir_all(&config.documents_dir).unwrap();
        DynamicImage::ImageLuma8(striped_page(32, 32))
            .save(config.documents_dir.join("memo.png"))
            .unwrap();

        let driver = BatchDriver::new(config.clone()).unwrap();
        let report = driver.run(&rasterizer()).await.unwrap();

        assert_eq!(report.images_processed, 1);
        assert!(config.pages_dir.join("memo_page_1.jpg").exists());
        assert!(config.processed_dir.join("processed_memo_page_1.jpg").exists());
    }

    #[tokio::test]
    async fn missing_documents_dir_is_a_setup_error() {
        let root = tempfile::tempdir().unwrap();
        let driver = BatchDriver::new(config_in(root.path())).unwrap();
        let result = driver.run(&rasterizer()).await;
        assert!(matches!(result, Err(OcrprepError::Io(_))));
    }

    #[test]
    fn invalid_pipeline_config_is_rejected() {
        let mut config = BatchConfig::default();
        config.pipeline.blur_kernel_size = 2;
        assert!(matches!(
            BatchDriver::new(config),
            Err(OcrprepError::Config(_))
        ));
    }

    #[tokio::test]
    async fn slow_item_times_out() {
        let result = run_item("slow.png", Some(Duration::from_millis(20)), || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(OcrprepError::Timeout { .. })));
    }

    #[tokio::test]
    async fn timed_out_item_writes_nothing_and_keeps_its_slot() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("processed_x.png");
        let semaphore = Arc::new(Semaphore::new(1));
        let permit = Arc::clone(&semaphore).acquire_owned().await.unwrap();

        let result = process_into(
            "x.png",
            Some(Duration::from_millis(20)),
            permit,
            output.clone(),
            || {
                std::thread::sleep(Duration::from_millis(200));
                Ok(b"late".to_vec())
            },
        )
        .await;
        assert!(matches!(result, Err(OcrprepError::Timeout { .. })));
        // The abandoned thread still occupies the only worker slot.
        assert_eq!(semaphore.available_permits(), 0);

        let _permit = semaphore.acquire().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn finished_item_is_written_and_releases_its_slot() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("processed_y.png");
        let semaphore = Arc::new(Semaphore::new(1));
        let permit = Arc::clone(&semaphore).acquire_owned().await.unwrap();

        let written = process_into("y.png", Some(Duration::from_secs(5)), permit, output.clone(), || {
            Ok(b"encoded".to_vec())
        })
        .await
        .unwrap();
        assert_eq!(written, output);
        assert_eq!(std::fs::read(&output).unwrap(), b"encoded");
        assert_eq!(semaphore.available_permits(), 1);
    }

    #[tokio::test]
    async fn oversized_page_is_skipped_and_batch_continues() {
        let root = tempfile::tempdir().unwrap();
        let config = config_in(root.path());
        std::fs::create_dir_all(&config.documents_dir).unwrap();
        std::fs::write(
            config.documents_dir.join("a_huge.pdf"),
            scanned_pdf(&striped_page(4, 4), (1_000_000_000, 1_000_000_000)),
        )
        .unwrap();
        std::fs::write(
            config.documents_dir.join("b_letter.pdf"),
            scanned_pdf(&striped_page(16, 16), (20, 20)),
        )
        .unwrap();

        let driver = BatchDriver::new(config.clone()).unwrap();
        let report = driver.run(&rasterizer()).await.unwrap();

        assert_eq!(report.documents_skipped, 1);
        assert_eq!(report.documents_rasterized, 1);
        assert_eq!(report.images_processed, 1);
        let skipped: Vec<_> = report.with_status(ItemStatus::Skipped).collect();
        assert_eq!(skipped[0].item, "a_huge.pdf");
        assert!(!config.pages_dir.join("a_huge_page_1.png").exists());
        assert!(config.processed_dir.join("processed_b_letter_page_1.png").exists());
    }

    #[tokio::test]
    async fn panicking_item_is_reported_not_propagated() {
        let result: Result<()> = run_item("boom.png", None, || panic!("stage invariant broken")).await;
        match result {
            Err(OcrprepError::Worker(detail)) => assert!(detail.starts_with("boom.png")),
            other => panic!("expected worker error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn item_errors_pass_through_unchanged() {
        let result: Result<()> = run_item("x.png", None, || {
            Err(OcrprepError::UnexpectedTransform {
                stage: "smooth",
                reason: "dimensions changed".into(),
            })
        })
        .await;
        let err = result.unwrap_err();
        assert!(!err.is_skippable());
        let outcome = unsuccessful("x.png".into(), Phase::Process, err);
        assert_eq!(outcome.status, ItemStatus::Failed);
        assert!(outcome.detail.unwrap().contains("smooth"));
    }
}
