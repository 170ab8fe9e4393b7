//! cardscan CLI
//!
//! Usage:
//!   cardscan scan <image> [--dry-run] [--no-ai] [--json]
//!   cardscan batch <dir> [--concurrency N]
//!   cardscan extract <textfile>

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cardscan_ai::create_ai_parser;
use cardscan_core::{AppConfig, OcrOptions, ProcessingResult};
use cardscan_extract::{normalize, LocalExtractor};
use cardscan_ocr::OcrManager;
use cardscan_pipeline::{BatchItem, CardPipeline, ProcessOptions};

#[derive(Parser)]
#[command(name = "cardscan")]
#[command(about = "Business card scanning pipeline CLI")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file; environment variables apply otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan one card image through the full pipeline
    Scan {
        /// Path to the card image
        image: PathBuf,

        /// Run every stage but do not persist the card
        #[arg(long)]
        dry_run: bool,

        /// Skip the AI parser even when one is configured
        #[arg(long)]
        no_ai: bool,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,

        /// Collect a per-stage timing breakdown
        #[arg(long)]
        metrics: bool,
    },
    /// Scan every image in a directory
    Batch {
        /// Directory with card images
        dir: PathBuf,

        /// Bound on in-flight items; defaults to the configured value
        #[arg(long)]
        concurrency: Option<usize>,

        /// Run every stage but do not persist any card
        #[arg(long)]
        dry_run: bool,

        /// Skip the AI parser
        #[arg(long)]
        no_ai: bool,
    },
    /// Run local heuristic extraction over a text file, no OCR or AI
    Extract {
        /// Path to a text file with card contents
        file: PathBuf,

        /// Print the candidate as JSON
        #[arg(long)]
        json: bool,
    },
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(p) => AppConfig::from_file(p)?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn build_pipeline(config: AppConfig, no_ai: bool) -> CardPipeline {
    let ai = if no_ai {
        None
    } else {
        match create_ai_parser(&config.ai) {
            Ok(parser) => Some(parser),
            Err(err) => {
                warn!(error = %err, "AI parser unavailable, running local-only");
                None
            }
        }
    };

    let mut pipeline =
        CardPipeline::new(config).with_ocr(Arc::new(OcrManager::with_defaults()));
    if let Some(parser) = ai {
        pipeline = pipeline.with_ai(parser);
    }
    pipeline
}

fn print_result(result: &ProcessingResult, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    let card = &result.card;
    println!("Card: {} ({})", card.name, card.id);
    for (label, value) in [
        ("Company", &card.company),
        ("Title", &card.job_title),
        ("Email", &card.email),
        ("Phone", &card.phone),
        ("Mobile", &card.mobile),
        ("Address", &card.address),
        ("Website", &card.website),
    ] {
        if let Some(v) = value {
            println!("  {label}: {v}");
        }
    }
    println!(
        "Source: {} (confidence {:.2})",
        result.parsed.source, result.parsed.confidence
    );
    for warning in &result.warnings {
        println!("warning: {warning}");
    }
    if let Some(metrics) = &result.metrics {
        println!("Total: {}ms", metrics.total_ms);
        for stage in &metrics.stages {
            println!("  {}: {}ms", stage.name, stage.duration_ms);
        }
    }
    Ok(())
}

fn collect_images(dir: &Path) -> anyhow::Result<Vec<(PathBuf, Vec<u8>)>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_image {
            let bytes =
                std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            images.push((path, bytes));
        }
    }
    images.sort_by(|(a, _), (b, _)| a.cmp(b));
    Ok(images)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    if config.logging.json_format {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    match cli.command {
        Commands::Scan {
            image,
            dry_run,
            no_ai,
            json,
            metrics,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("reading {}", image.display()))?;

            let opts = ProcessOptions {
                confidence_threshold: config.pipeline.confidence_threshold,
                dry_run,
                track_metrics: metrics,
                use_ai: !no_ai,
                ocr: OcrOptions::default().with_language(config.ocr.language.clone()),
                ..Default::default()
            };
            let pipeline = build_pipeline(config, no_ai);

            let result = pipeline.process_image(&bytes, None, &opts).await?;
            print_result(&result, json)?;
        }
        Commands::Batch {
            dir,
            concurrency,
            dry_run,
            no_ai,
        } => {
            let images = collect_images(&dir)?;
            if images.is_empty() {
                anyhow::bail!("no images found in {}", dir.display());
            }
            let paths: Vec<PathBuf> = images.iter().map(|(p, _)| p.clone()).collect();
            let items: Vec<BatchItem> =
                images.into_iter().map(|(_, b)| BatchItem::Image(b)).collect();

            let opts = ProcessOptions {
                confidence_threshold: config.pipeline.confidence_threshold,
                dry_run,
                use_ai: !no_ai,
                ocr: OcrOptions::default().with_language(config.ocr.language.clone()),
                ..Default::default()
            };
            let concurrency = concurrency.unwrap_or(config.pipeline.batch_concurrency);
            let pipeline = build_pipeline(config, no_ai);

            let result = pipeline.process_batch(items, None, &opts, concurrency).await;

            println!(
                "{} succeeded, {} failed",
                result.successful.len(),
                result.failed.len()
            );
            for card in result.successful.iter().map(|r| &r.card) {
                println!("  {} ({})", card.name, card.id);
            }
            for failure in &result.failed {
                eprintln!("  {}: {}", paths[failure.index].display(), failure.error);
            }
            if !result.failed.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Extract { file, json } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;

            let candidate = LocalExtractor::new().extract(&normalize(&text));
            if json {
                println!("{}", serde_json::to_string_pretty(&candidate)?);
            } else {
                println!(
                    "{} fields, confidence {:.2}",
                    candidate.populated_field_count(),
                    candidate.confidence
                );
                for (label, value) in [
                    ("Name", &candidate.name),
                    ("Company", &candidate.company),
                    ("Title", &candidate.job_title),
                    ("Email", &candidate.email),
                    ("Phone", &candidate.phone),
                    ("Mobile", &candidate.mobile),
                    ("Address", &candidate.address),
                    ("Website", &candidate.website),
                ] {
                    if let Some(v) = value {
                        println!("  {label}: {v}");
                    }
                }
            }
        }
    }

    Ok(())
}
