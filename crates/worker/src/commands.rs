//! The worker's two commands: slicing a local sheet and running a full
//! generation against the synthesis service.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use stickerkit_core::chroma::ChromaKey;
use stickerkit_core::grid_spec::{lookup, GridSpec, Variant};
use stickerkit_core::item::{FontConfig, ItemConfig, PackageInfo};
use stickerkit_core::lifecycle::ItemStatus;
use stickerkit_core::slicer::{DetectionReport, GridSlicer, OversizePolicy, RawSheet};
use stickerkit_pipeline::production::ProductionDigest;
use stickerkit_pipeline::{ItemBoard, ItemRetrier, RetryPolicy, RunRequest, StickerPipeline};
use stickerkit_synthesis::{ItemEditor, SheetSynthesizer};

use crate::output::{self, Manifest, ManifestEntry};

/// Grid and keying settings shared by both commands.
#[derive(Debug, Clone, Copy)]
pub struct SliceSettings {
    pub variant: Variant,
    pub item_count: u32,
    pub tolerance: u8,
    pub oversize: OversizePolicy,
}

impl SliceSettings {
    pub fn geometry(&self) -> GridSpec {
        lookup(self.item_count, self.variant)
    }

    pub fn slicer(&self) -> GridSlicer {
        GridSlicer::new(ChromaKey::green(self.tolerance)).with_oversize_policy(self.oversize)
    }
}

// ---------------------------------------------------------------------------
// slice
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SliceResult {
    pub written: Vec<PathBuf>,
    pub report: DetectionReport,
}

/// Slice one sheet image from disk and write each detected item as PNG.
///
/// Files are named by absolute cell index, so an empty cell leaves a gap
/// in the numbering.
pub fn slice_file(
    input: &Path,
    output_dir: &Path,
    settings: &SliceSettings,
    occupied: Option<usize>,
) -> anyhow::Result<SliceResult> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let geometry = settings.geometry();
    let mut sheet = RawSheet::from_bytes(0, &bytes, geometry)?;
    if let Some(occupied) = occupied {
        sheet = sheet.with_occupied(occupied);
    }

    let outcome = settings.slicer().slice(&sheet);
    if outcome.no_objects_detected() {
        tracing::warn!(
            input = %input.display(),
            "No objects detected; is the background chroma green?",
        );
    }

    output::ensure_dir(output_dir)?;
    let mut written = Vec::with_capacity(outcome.items.len());
    for item in &outcome.items {
        written.push(output::write_png(
            output_dir,
            settings.variant,
            item.absolute_index,
            &item.image,
        )?);
    }

    tracing::info!(
        written = written.len(),
        expected = outcome.report.expected,
        missing = ?outcome.report.missing_cells,
        "Sheet sliced",
    );
    Ok(SliceResult {
        written,
        report: outcome.report,
    })
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

/// Contents of the items file passed to `generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateInput {
    #[serde(default)]
    pub package: PackageInfo,
    #[serde(default)]
    pub style_prompt: String,
    #[serde(default)]
    pub font: FontConfig,
    pub items: Vec<ItemConfig>,
}

impl GenerateInput {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub base_image: Vec<u8>,
    pub output_dir: PathBuf,
    pub settings: SliceSettings,
    pub include_text: bool,
    /// Retry items whose cell came back empty, one at a time.
    ///
    /// An empty cell has no image of its own to edit, so each retry
    /// regenerates the item from the character reference in `base_image`
    /// rather than retouching a previous result.
    pub retry_missing: bool,
    pub retry_cooldown: Duration,
}

#[derive(Debug)]
pub struct GenerateResult {
    pub manifest: Manifest,
    pub digest: ProductionDigest,
}

/// Plan, synthesize, slice and export a whole batch.
pub async fn generate<S, E>(
    synthesizer: S,
    editor: E,
    input: &GenerateInput,
    options: &GenerateOptions,
) -> anyhow::Result<GenerateResult>
where
    S: SheetSynthesizer,
    E: ItemEditor,
{
    let settings = options.settings;
    let board = ItemBoard::new(&input.items)?;
    let pipeline = StickerPipeline::new(synthesizer, settings.slicer());
    let request = RunRequest {
        base_image: options.base_image.clone(),
        style_prompt: input.style_prompt.clone(),
        font: input.font.clone(),
        variant: settings.variant,
        geometry: settings.geometry(),
        include_text: options.include_text,
    };

    let output = pipeline
        .produce(&input.items, &board, &request, |progress| {
            tracing::info!(
                sheet = progress.sheet_index + 1,
                total = progress.total,
                "Generating sheet",
            );
        })
        .await?;
    let digest = output.digest();

    if options.retry_missing && !output.assignment.missing.is_empty() {
        let retrier = ItemRetrier::new(
            editor,
            ChromaKey::green(settings.tolerance),
            RetryPolicy::with_cooldown(options.retry_cooldown),
        );
        for item_id in &output.assignment.missing {
            let Some(config) = input.items.iter().find(|c| &c.id == item_id) else {
                continue;
            };
            let instruction = retry_instruction(config, options.include_text);
            if let Err(e) = retrier
                .retry(&board, item_id, &options.base_image, &instruction)
                .await
            {
                tracing::warn!(item_id = %item_id, error = %e, "Retry of missing item failed");
            }
        }
    }

    let manifest = export(&board, &input.package, settings.variant, &options.output_dir).await?;
    Ok(GenerateResult { manifest, digest })
}

/// Edit instruction used to regenerate one item on its own.
///
/// Paired with the character reference image, not an earlier rendering
/// of the item: the prompt describes the whole subject from scratch.
pub fn retry_instruction(config: &ItemConfig, include_text: bool) -> String {
    let subject = if config.visual_prompt_en.is_empty() {
        &config.display_text
    } else {
        &config.visual_prompt_en
    };
    let mut instruction = format!(
        "Redraw a single sticker of {subject}, centred on a pure green (#00FF00) background"
    );
    if config.effective_show_text(include_text) && !config.display_text.is_empty() {
        instruction.push_str(&format!(", captioned \"{}\"", config.display_text));
    }
    instruction
}

/// Write every successful item in source order, then the manifest.
async fn export(
    board: &ItemBoard,
    package: &PackageInfo,
    variant: Variant,
    dir: &Path,
) -> anyhow::Result<Manifest> {
    output::ensure_dir(dir)?;

    let exported = board.export().await;
    let mut items = Vec::with_capacity(exported.len());
    for (position, item) in exported.iter().enumerate() {
        let path = output::write_png(dir, variant, position, &item.image)?;
        items.push(ManifestEntry {
            item_id: item.item_id.clone(),
            file: output::file_name(variant, position),
        });
        tracing::debug!(item_id = %item.item_id, path = %path.display(), "Wrote item");
    }

    let failed = board
        .snapshot()
        .await
        .into_iter()
        .filter(|s| s.status == ItemStatus::Error)
        .map(|s| s.item_id)
        .collect();

    let manifest = Manifest {
        variant,
        package: package.clone(),
        main_item: board.main_item().await,
        items,
        failed,
    };
    output::write_manifest(dir, &manifest)?;
    tracing::info!(
        written = manifest.items.len(),
        failed = manifest.failed.len(),
        dir = %dir.display(),
        "Export complete",
    );
    Ok(manifest)
}
