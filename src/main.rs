use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wardrobe_fx::avatar::{AvatarRenderer, PlacedLayer};
use wardrobe_fx::segmentation::{MaskPolarity, Normalization, SegmenterConfig, SegmenterService};
use wardrobe_fx::trim::{Padding, TrimCache, TrimOptions, Trimmed};
use wardrobe_fx::wardrobe::migrate_record;
use wardrobe_fx::{
    AnchorRegistry, Category, CutoutOptions, CutoutQueue, GarmentAsset, ImageCutout, ImageSource,
    LayerCompositor, OutfitSelection,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn garment photos into transparent PNG cutouts
    Cutout(CutoutArgs),
    /// Crop transparent margins from PNG assets
    Trim(TrimArgs),
    /// Draw an outfit over the base avatar
    Compose(ComposeArgs),
}

#[derive(ClapArgs, Debug)]
struct CutoutArgs {
    /// Path to segmentation model (ONNX file)
    #[arg(long)]
    model: PathBuf,

    /// Garment photos (file paths or data: URLs)
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Directory the cutouts are written to
    #[arg(short, long, default_value = "cutouts")]
    output: PathBuf,

    /// Which side of the mask is the garment: foreground or background
    #[arg(long, default_value = "background")]
    polarity: MaskPolarity,

    /// Longer side of the image handed to the model
    #[arg(long, default_value_t = 512)]
    max_dim: u32,

    /// Side of the square output asset
    #[arg(long, default_value_t = 400)]
    asset_size: u32,

    /// Model input resolution (square)
    #[arg(long, default_value_t = 320)]
    model_size: u32,

    /// Normalize model input with ImageNet mean/std instead of [0, 1]
    #[arg(long)]
    imagenet: bool,

    /// Photos processed at once. Decoding and compositing overlap; inference
    /// still runs one photo at a time on the shared model
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Inference timeout in seconds, counted from when the model picks the
    /// photo up
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Also write original / mask / composed images here
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct TrimArgs {
    /// PNG assets to trim
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Directory the trimmed assets are written to
    #[arg(short, long, default_value = "trimmed")]
    output: PathBuf,

    /// Alpha at or below which a pixel counts as empty
    #[arg(long, default_value_t = 10)]
    threshold: u8,

    /// Fixed padding in pixels (overrides --padding-percent)
    #[arg(long)]
    padding: Option<u32>,

    /// Padding as a percentage of the content's longer side
    #[arg(long, default_value_t = 3.5)]
    padding_percent: f32,
}

#[derive(ClapArgs, Debug)]
struct ComposeArgs {
    /// Base avatar image
    #[arg(long)]
    base: PathBuf,

    /// Occlusion mask drawn over the garments
    #[arg(long)]
    mask: PathBuf,

    /// Garment as category=path, repeatable
    #[arg(long = "garment", value_parser = parse_garment)]
    garments: Vec<(Category, String)>,

    /// JSON array of stored garment records; later entries win per category
    #[arg(long)]
    wardrobe: Option<PathBuf>,

    /// JSON anchor table replacing the built-in defaults
    #[arg(long)]
    anchors: Option<PathBuf>,

    /// Tuck the top into the bottom
    #[arg(long)]
    tucked_in: bool,

    #[arg(long, default_value_t = 400)]
    width: u32,

    #[arg(long, default_value_t = 800)]
    height: u32,

    /// Rendered avatar PNG
    #[arg(short, long, default_value = "outfit.png")]
    output: PathBuf,
}

fn parse_garment(value: &str) -> Result<(Category, String), String> {
    let (category, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected category=path, got `{value}`"))?;
    let category = category.parse::<Category>().map_err(|e| e.to_string())?;
    if path.trim().is_empty() {
        return Err(format!("missing image path for {category}"));
    }
    Ok((category, path.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Ctrl+C abandons in-flight work
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    match args.command {
        Command::Cutout(args) => run_cutout(args, &cancel).await,
        Command::Trim(args) => run_trim(args, &cancel).await,
        Command::Compose(args) => run_compose(args, &cancel).await,
    }
}

async fn run_cutout(args: CutoutArgs, cancel: &CancellationToken) -> Result<()> {
    let sources = args
        .inputs
        .iter()
        .map(|input| ImageSource::parse(input).with_context(|| format!("Bad input {input}")))
        .collect::<Result<Vec<_>>>()?;

    let normalization = if args.imagenet {
        Normalization::IMAGENET
    } else {
        Normalization::UNIT
    };
    let config = SegmenterConfig {
        inference_timeout: Duration::from_secs(args.timeout),
        ..SegmenterConfig::default()
    };
    let segmenter = Arc::new(SegmenterService::onnx(
        &args.model,
        (args.model_size, args.model_size),
        normalization,
        config,
    ));

    let options = CutoutOptions {
        max_working_dimension: args.max_dim,
        polarity: args.polarity,
        target_asset_size: args.asset_size,
        diagnostics: args.debug_dir.is_some(),
        ..CutoutOptions::default()
    };
    let queue = CutoutQueue::new(ImageCutout::new(segmenter, options), args.concurrency);

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    if let Some(dir) = &args.debug_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    tracing::info!(
        "Cutting out {} photo(s), polarity={:?}, concurrency={}",
        sources.len(),
        args.polarity,
        queue.concurrency()
    );

    let start = Instant::now();
    let results = queue.run(sources, cancel).await;

    let names = output_names(&args.inputs);
    let mut failures = 0;
    for ((input, name), result) in args.inputs.iter().zip(names).zip(results) {
        match result {
            Ok(cutout) => {
                let path = args.output.join(format!("{name}.png"));
                std::fs::write(&path, &cutout.png)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!("{} -> {} ({}x{})", input, path.display(), cutout.width, cutout.height);

                if let (Some(dir), Some(diagnostics)) = (&args.debug_dir, &cutout.diagnostics) {
                    diagnostics
                        .original
                        .save(dir.join(format!("{name}.original.png")))
                        .context("Failed to write original")?;
                    diagnostics
                        .mask
                        .save(dir.join(format!("{name}.mask.png")))
                        .context("Failed to write mask")?;
                    diagnostics
                        .composed
                        .save(dir.join(format!("{name}.composed.png")))
                        .context("Failed to write composed")?;
                }
            }
            Err(e) => {
                failures += 1;
                tracing::error!("{}: {}", input, e);
            }
        }
    }

    tracing::info!(
        "Done in {:.1}s, {} failed",
        start.elapsed().as_secs_f64(),
        failures
    );
    if failures > 0 {
        bail!("{failures} cutout(s) failed");
    }
    Ok(())
}

async fn run_trim(args: TrimArgs, cancel: &CancellationToken) -> Result<()> {
    let padding = match args.padding {
        Some(pixels) => Padding::Pixels(pixels),
        None => Padding::Relative(args.padding_percent / 100.0),
    };
    let cache = TrimCache::new(TrimOptions {
        alpha_threshold: args.threshold,
        padding,
        ..TrimOptions::default()
    });

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    for (input, name) in args.inputs.iter().zip(output_names(&args.inputs)) {
        let source = ImageSource::parse(input).with_context(|| format!("Bad input {input}"))?;
        let trimmed = cache
            .trim(&source, cancel)
            .await
            .with_context(|| format!("Failed to trim {input}"))?;

        let path = args.output.join(format!("{name}.png"));
        match trimmed.as_ref() {
            Trimmed::Cropped {
                png, width, height, ..
            } => {
                std::fs::write(&path, png)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!("{} -> {} ({}x{})", input, path.display(), width, height);
            }
            Trimmed::Original(original) => {
                tracing::warn!("{} has no visible content, copying as is", input);
                std::fs::write(&path, original.bytes()?)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
    }

    Ok(())
}

async fn run_compose(args: ComposeArgs, cancel: &CancellationToken) -> Result<()> {
    let registry = match &args.anchors {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            AnchorRegistry::from_json(&json).context("Failed to load anchor table")?
        }
        None => AnchorRegistry::default(),
    };

    let mut selection = OutfitSelection::new();
    if let Some(path) = &args.wardrobe {
        for garment in load_wardrobe(path)? {
            selection.select(garment);
        }
    }
    for (category, image) in &args.garments {
        selection.select(GarmentAsset::create(*category, image.clone()));
    }
    if selection.is_empty() {
        tracing::warn!("No garments selected, rendering the bare avatar");
    }

    let compositor = LayerCompositor::new(registry);
    let instructions = compositor.compose(&selection, args.tucked_in);

    let cache = TrimCache::default();
    let mut images = Vec::with_capacity(instructions.len());
    for instruction in &instructions {
        tracing::debug!("{}: {}", instruction.garment_id, instruction.to_css());
        let source = ImageSource::parse(&instruction.image_source)
            .with_context(|| format!("Bad image for {}", instruction.garment_id))?;
        let trimmed = cache
            .trim(&source, cancel)
            .await
            .with_context(|| format!("Failed to trim {}", instruction.garment_id))?;
        let image = trimmed
            .source(&source.key())
            .decode()
            .with_context(|| format!("Failed to decode {}", instruction.garment_id))?
            .to_rgba8();
        images.push(image);
    }

    let base = load_rgba(&args.base)?;
    let mask = load_rgba(&args.mask)?;
    let renderer = AvatarRenderer::new(base, mask);

    let layers: Vec<PlacedLayer<'_>> = instructions
        .iter()
        .zip(&images)
        .map(|(instruction, image)| PlacedLayer { instruction, image })
        .collect();
    let canvas = renderer.render((args.width, args.height), &layers);

    canvas
        .save(&args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    tracing::info!(
        "Rendered {} layer(s), tucked_in={} -> {}",
        layers.len(),
        args.tucked_in,
        args.output.display()
    );

    Ok(())
}

fn load_wardrobe(path: &Path) -> Result<Vec<GarmentAsset>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records: Vec<serde_json::Value> =
        serde_json::from_str(&json).context("Wardrobe must be a JSON array")?;

    let now = chrono::Utc::now();
    let mut garments = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match migrate_record(record, now) {
            Ok(migrated) => garments.push(migrated.asset),
            Err(e) => tracing::warn!("Skipping wardrobe record {}: {}", index, e),
        }
    }
    Ok(garments)
}

fn load_rgba(path: &Path) -> Result<image::RgbaImage> {
    Ok(image::open(path)
        .with_context(|| format!("Failed to load {}", path.display()))?
        .to_rgba8())
}

/// Output file stem for an input; data URLs are named by a hash of their content
fn output_name(input: &str) -> String {
    if input.starts_with("data:") {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        input.hash(&mut hasher);
        return format!("inline-{:016x}", hasher.finish());
    }
    Path::new(input.trim_start_matches("file://"))
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

/// One distinct output stem per input, in input order.
///
/// Inputs sharing a file stem (`a/shirt.png`, `b/shirt.png`) get `-2`,
/// `-3`, ... suffixes instead of overwriting each other.
fn output_names(inputs: &[String]) -> Vec<String> {
    let mut used = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let stem = output_name(input);
            let mut name = stem.clone();
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{stem}-{n}");
                n += 1;
            }
            if name != stem {
                tracing::warn!("{} shares its name with an earlier input, writing {}", input, name);
            }
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(inputs: &[&str]) -> Vec<String> {
        let inputs: Vec<String> = inputs.iter().map(|s| s.to_string()).collect();
        output_names(&inputs)
    }

    #[test]
    fn same_stem_in_different_directories_gets_a_suffix() {
        assert_eq!(
            names(&["a/shirt.png", "b/shirt.png", "c/shirt.jpg", "jeans.png"]),
            vec!["shirt", "shirt-2", "shirt-3", "jeans"]
        );
    }

    #[test]
    fn suffix_skips_names_already_taken() {
        assert_eq!(
            names(&["shirt-2.png", "a/shirt.png", "b/shirt.png"]),
            vec!["shirt-2", "shirt", "shirt-3"]
        );
    }

    #[test]
    fn garment_argument_needs_category_and_path() {
        assert_eq!(
            parse_garment("tops=/w/a.png"),
            Ok((Category::Tops, "/w/a.png".to_string()))
        );
        assert!(parse_garment("hats=/w/a.png").is_err());
        assert!(parse_garment("tops=").is_err());
        assert!(parse_garment("tops").is_err());
    }
}
