// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ocrprep: document rasterization and OCR pre-processing.
//
// Entry point. Initialises logging, resolves the configuration (preset, then
// config file, then command-line overrides) and runs the requested command.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use image::DynamicImage;
use ocrprep_batch::BatchDriver;
use ocrprep_core::error::Result;
use ocrprep_core::{BatchConfig, MorphologyMode, PipelineConfig, Preset, RasterFormat};
use ocrprep_document::rasterize::rasterize_to_dir;
use ocrprep_document::{DocumentRasterizer, ImageProcessor, Preprocessor};

// -- CLI structure ------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "ocrprep")]
#[command(version, about = "Rasterize documents and prepare page images for OCR", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rasterize every document, then pre-process every page image
    Run(RunArgs),
    /// Rasterize a single document into a directory of page images
    Rasterize {
        /// PDF or raster document
        document: PathBuf,
        /// Directory for the page images
        out_dir: PathBuf,
        /// Resolution in dots per inch
        #[arg(long)]
        dpi: Option<u32>,
        /// Page image encoding: png or jpeg
        #[arg(long)]
        format: Option<RasterFormat>,
        /// Preset supplying the defaults for dpi and format
        #[arg(long, default_value = "v2")]
        preset: Preset,
    },
    /// Pre-process a single image
    Process(ProcessArgs),
    /// Print the effective batch configuration as JSON
    Config {
        #[arg(long, default_value = "v2")]
        preset: Preset,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// JSON configuration file; replaces the preset defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Preset used when no configuration file is given
    #[arg(long, default_value = "v2")]
    preset: Preset,
    /// Source documents directory
    #[arg(long)]
    documents: Option<PathBuf>,
    /// Page images directory
    #[arg(long)]
    pages: Option<PathBuf>,
    /// Processed images directory
    #[arg(long)]
    processed: Option<PathBuf>,
    #[arg(long)]
    dpi: Option<u32>,
    /// Page image encoding: png or jpeg
    #[arg(long)]
    format: Option<RasterFormat>,
    /// Images processed concurrently
    #[arg(short, long)]
    workers: Option<usize>,
    /// Per-image time limit in seconds (0 disables)
    #[arg(long)]
    timeout: Option<u64>,
    /// Only process images already in the pages directory
    #[arg(long)]
    skip_rasterize: bool,
    /// Also write the batch report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ProcessArgs {
    /// Input image
    input: PathBuf,
    /// Output image; the encoding follows the extension
    output: PathBuf,
    #[arg(long, default_value = "v2")]
    preset: Preset,
    /// Morphology structuring element size
    #[arg(long)]
    kernel: Option<u32>,
    /// Dilation passes
    #[arg(long)]
    dilate: Option<u32>,
    /// Erosion passes
    #[arg(long)]
    erode: Option<u32>,
    /// Gaussian blur kernel size (odd; 0 or 1 disables)
    #[arg(long)]
    blur: Option<u32>,
    /// disabled, dilate-only or dilate-then-erode
    #[arg(long)]
    morphology: Option<MorphologyMode>,
}

// -- Configuration ------------------------------------------------------------

fn batch_config(args: &RunArgs) -> Result<BatchConfig> {
    let mut config = match &args.config {
        Some(path) => BatchConfig::load(path)?,
        None => BatchConfig::from_preset(args.preset),
    };

    if let Some(dir) = &args.documents {
        config.documents_dir = dir.clone();
    }
    if let Some(dir) = &args.pages {
        config.pages_dir = dir.clone();
    }
    if let Some(dir) = &args.processed {
        config.processed_dir = dir.clone();
    }
    if let Some(dpi) = args.dpi {
        config.dpi = dpi;
    }
    if let Some(format) = args.format {
        config.page_format = format;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(secs) = args.timeout {
        config.item_timeout_secs = secs;
    }
    if args.skip_rasterize {
        config.rasterize_documents = false;
    }

    config.validate()?;
    Ok(config)
}

fn pipeline_config(args: &ProcessArgs) -> PipelineConfig {
    let mut config = args.preset.pipeline();
    if let Some(kernel) = args.kernel {
        config.kernel_size = kernel;
    }
    if let Some(dilate) = args.dilate {
        config.iterations_dilate = dilate;
    }
    if let Some(erode) = args.erode {
        config.iterations_erode = erode;
    }
    if let Some(blur) = args.blur {
        config.blur_kernel_size = blur;
        config.blur_enabled = blur > 1;
    }
    if let Some(mode) = args.morphology {
        config.morphology = mode;
    }
    config
}

// -- Commands -----------------------------------------------------------------

/// Returns whether the command succeeded; `Err` means it could not start.
async fn run(args: RunArgs) -> Result<bool> {
    let config = batch_config(&args)?;
    let driver = BatchDriver::new(config)?;
    let rasterizer = DocumentRasterizer::new()?;

    let report = driver.run(&rasterizer).await?;
    println!("{}", report.summary());

    if let Some(path) = &args.report {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!(path = %path.display(), "Report written");
    }
    Ok(!report.has_failures())
}

fn rasterize(
    document: &Path,
    out_dir: &Path,
    dpi: u32,
    format: RasterFormat,
) -> Result<bool> {
    std::fs::create_dir_all(out_dir)?;
    let rasterizer = DocumentRasterizer::new()?;
    let written = rasterize_to_dir(&rasterizer, document, out_dir, dpi, format)?;
    for path in &written {
        println!("{}", path.display());
    }
    Ok(true)
}

fn process(args: &ProcessArgs) -> Result<bool> {
    let preprocessor = Preprocessor::new(pipeline_config(args))?;
    let processed = preprocessor.process_file(&args.input)?;
    ImageProcessor::from_dynamic(DynamicImage::ImageLuma8(processed)).save(&args.output)?;
    println!("{}", args.output.display());
    Ok(true)
}

fn print_config(preset: Preset) -> Result<bool> {
    println!("{}", serde_json::to_string_pretty(&BatchConfig::from_preset(preset))?);
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Rasterize {
            document,
            out_dir,
            dpi,
            format,
            preset,
        } => rasterize(
            &document,
            &out_dir,
            dpi.unwrap_or_else(|| preset.dpi()),
            format.unwrap_or_else(|| preset.page_format()),
        ),
        Commands::Process(args) => process(&args),
        Commands::Config { preset } => print_config(preset),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "ocrprep failed");
            ExitCode::FAILURE
        }
    }
}
