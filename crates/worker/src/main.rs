use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use stickerkit_core::grid_spec::Variant;
use stickerkit_core::slicer::OversizePolicy;
use stickerkit_synthesis::api::SynthesisApi;
use stickerkit_worker::commands::{self, GenerateInput, GenerateOptions, SliceSettings};
use stickerkit_worker::WorkerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Generate and slice chroma-key sticker sheets.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Slice a local sheet image into keyed PNG files.
    Slice {
        /// Sheet image (PNG, JPEG or WebP).
        input: PathBuf,
        /// Number of cells actually holding a subject (default: all).
        #[arg(long)]
        occupied: Option<usize>,
        #[command(flatten)]
        grid: GridArgs,
    },
    /// Plan, synthesize, slice and export a batch of items.
    Generate {
        /// JSON file with `items`, and optional `package`, `style_prompt`, `font`.
        #[arg(long)]
        items: PathBuf,
        /// Character reference image every sheet is conditioned on.
        #[arg(long)]
        base: PathBuf,
        /// Leave captions off every item.
        #[arg(long, default_value_t = false)]
        no_text: bool,
        /// Regenerate items whose cell came back empty.
        #[arg(long, default_value_t = false)]
        retry_missing: bool,
        #[command(flatten)]
        grid: GridArgs,
    },
}

/// Overrides for the environment configuration.
#[derive(Args, Debug)]
struct GridArgs {
    /// `sticker` or `emoji` (overrides STICKER_VARIANT).
    #[arg(long)]
    variant: Option<Variant>,
    /// Grid item count (overrides STICKER_COUNT).
    #[arg(long)]
    count: Option<u32>,
    /// Per-channel chroma-key tolerance (overrides CHROMA_TOLERANCE).
    #[arg(long)]
    tolerance: Option<u8>,
    /// Scale oversized subjects down instead of clipping them.
    #[arg(long, default_value_t = false)]
    fit: bool,
    /// Output directory (overrides OUTPUT_DIR).
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl GridArgs {
    fn resolve(&self, config: &WorkerConfig) -> (SliceSettings, PathBuf) {
        let settings = SliceSettings {
            variant: self.variant.unwrap_or(config.variant),
            item_count: self.count.unwrap_or(config.item_count),
            tolerance: self.tolerance.unwrap_or(config.chroma_tolerance),
            oversize: if self.fit {
                OversizePolicy::Fit
            } else {
                OversizePolicy::Clip
            },
        };
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| config.output_dir.clone());
        (settings, output)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stickerkit_worker=info,stickerkit_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env();

    match cli.command {
        Command::Slice {
            input,
            occupied,
            grid,
        } => {
            let (settings, output) = grid.resolve(&config);
            let result = commands::slice_file(&input, &output, &settings, occupied)?;
            if !result.report.is_complete() {
                tracing::warn!(
                    expected = result.report.expected,
                    produced = result.report.produced,
                    "Some cells yielded no foreground",
                );
            }
        }
        Command::Generate {
            items,
            base,
            no_text,
            retry_missing,
            grid,
        } => {
            let (settings, output_dir) = grid.resolve(&config);
            let input = GenerateInput::load(&items)?;
            let base_image =
                std::fs::read(&base).with_context(|| format!("reading {}", base.display()))?;

            tracing::info!(
                api_url = %config.api_url,
                items = input.items.len(),
                variant = %settings.variant,
                "Worker starting generation",
            );
            let api = SynthesisApi::new(config.api_url.clone(), config.api_key.clone());
            let options = GenerateOptions {
                base_image,
                output_dir,
                settings,
                include_text: !no_text,
                retry_missing,
                retry_cooldown: config.retry_cooldown,
            };
            let result = commands::generate(api.clone(), api, &input, &options).await?;
            tracing::info!(
                expected = result.digest.counts.expected,
                produced = result.digest.counts.produced,
                written = result.manifest.items.len(),
                "Generation finished",
            );
        }
    }
    Ok(())
}
