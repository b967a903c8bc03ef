//! panel-cleaner - text removal for comic and manga pages
//!
//! CLI entry point

use anyhow::Context;
use clap::Parser;
use panel_cleaner::{
    exit_codes,
    // CLI
    CleanArgs, Cli, Commands, ValidateConfigArgs,
    // Config
    CleanerConfig,
    // Pipeline
    render_debug_overlay, render_mask_layers, save_page_output, BatchCleaner, BatchSummary, PageCleaner,
    PageJob, PageOutput, PageSource, PrecomputedDetector,
    // Progress tracking
    CleaningStage, OutputMode, ProgressCallback, ProgressTracker,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Clean(args) => run_clean(&args),
        Commands::DefaultConfig => run_default_config(),
        Commands::ValidateConfig(args) => run_validate_config(&args),
    };

    std::process::exit(match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_codes::GENERAL_ERROR
        }
    });
}

// ============ Logging ============

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ============ Clean Command ============

fn run_clean(args: &CleanArgs) -> anyhow::Result<i32> {
    init_tracing(args.verbose);

    let threads = args.threads.unwrap_or_else(num_cpus::get).max(1);
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        warn!(error = %e, "could not size the worker pool");
    }

    // Validate inputs
    for image in &args.images {
        if !image.is_file() {
            eprintln!("Error: Input image does not exist: {}", image.display());
            return Ok(exit_codes::INPUT_NOT_FOUND);
        }
    }
    if !args.detections.is_dir() {
        eprintln!("Error: Detection directory does not exist: {}", args.detections.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }

    // Config file, then CLI overrides on top
    let file_config = match &args.config {
        Some(path) => match CleanerConfig::load_from_path(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: Invalid config {}: {}", path.display(), e);
                return Ok(exit_codes::INVALID_CONFIG);
            }
        },
        None => CleanerConfig::load().unwrap_or_else(|e| {
            warn!(error = %e, "ignoring unreadable user config");
            CleanerConfig::default()
        }),
    };
    let config = file_config.merge_with_cli(&args.overrides());
    let cleaner = match PageCleaner::new(config) {
        Ok(cleaner) => cleaner,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(exit_codes::INVALID_CONFIG);
        }
    };
    let general = cleaner.config().general.clone();
    let mask_color = cleaner.config().masker.debug_mask_color;
    info!(pages = args.images.len(), threads, replicas = cleaner.model_pool().replicas(), "starting");

    let mode = if args.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::from_verbosity(args.verbose)
    };
    let tracker = ProgressTracker::new(args.images.len(), mode);
    tracker.set_stage(CleaningStage::Loading);

    // One job per page, each with its own detection file
    let mut jobs = Vec::with_capacity(args.images.len());
    let mut sources: Vec<PathBuf> = Vec::with_capacity(args.images.len());
    let mut early_failures = 0usize;
    for image in &args.images {
        let name = page_name(image);
        let detection_path = args.detections.join(format!("{name}.json"));
        match PrecomputedDetector::load(&detection_path) {
            Ok(detector) => {
                jobs.push(PageJob::new(name, PageSource::Path(image.clone()), Arc::new(detector)));
                sources.push(image.clone());
            }
            Err(e) => {
                tracker.on_page_complete(&name, false);
                eprintln!("Error: {}: {}", detection_path.display(), e);
                early_failures += 1;
            }
        }
    }

    tracker.set_stage(CleaningStage::Cleaning);

    let batch = BatchCleaner::new(cleaner);
    let results = batch.run_with_progress(jobs, &tracker);

    tracker.set_stage(CleaningStage::Saving);
    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating output directory {}", args.output.display()))?;

    let mut save_failures = 0usize;
    for (page, source) in results.iter().zip(&sources) {
        let output = match &page.result {
            Ok(output) => output,
            Err(e) => {
                eprintln!("Error processing {}: {}", page.name, e);
                continue;
            }
        };
        if let Some(error) = &output.report.detection_error {
            eprintln!("Warning: detection failed for {}, written unchanged: {}", page.name, error);
        }
        if let Err(e) = save_page_output(output, &args.output, source, &general) {
            eprintln!("Error saving {}: {}", page.name, e);
            save_failures += 1;
            continue;
        }
        if args.debug {
            if let Err(e) = save_debug_images(output, source, &args.output, mask_color) {
                eprintln!("Error writing debug overlay for {}: {:#}", page.name, e);
            }
        }
    }
    tracker.finish();

    let summary = BatchSummary::from_results(&results);
    let failed = summary.pages_failed + summary.pages_cancelled + early_failures + save_failures;
    if !args.quiet {
        tracker.print_summary(
            summary.pages_ok.saturating_sub(save_failures),
            failed,
            summary.boxes.masked,
            summary.boxes.total_boxes,
        );
    }

    Ok(if failed > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::SUCCESS
    })
}

fn page_name(image: &Path) -> String {
    image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string())
}

/// Box overlay and growth-step layers
fn save_debug_images(
    output: &PageOutput,
    source: &Path,
    dir: &Path,
    mask_color: [u8; 4],
) -> anyhow::Result<()> {
    let original = image::open(source)
        .with_context(|| format!("reading {}", source.display()))?
        .to_rgb8();
    let page = &output.report.page;

    let overlay_path = dir.join(format!("{page}_debug.png"));
    render_debug_overlay(&original, output, mask_color)
        .save(&overlay_path)
        .with_context(|| format!("writing {}", overlay_path.display()))?;

    let layers_path = dir.join(format!("{page}_layers.png"));
    render_mask_layers(&original, output)
        .save(&layers_path)
        .with_context(|| format!("writing {}", layers_path.display()))?;
    Ok(())
}

// ============ Config Commands ============

fn run_default_config() -> anyhow::Result<i32> {
    let toml = CleanerConfig::default().to_toml()?;
    print!("{}", toml);
    Ok(exit_codes::SUCCESS)
}

fn run_validate_config(args: &ValidateConfigArgs) -> anyhow::Result<i32> {
    if !args.path.exists() {
        eprintln!("Error: Config file does not exist: {}", args.path.display());
        return Ok(exit_codes::INPUT_NOT_FOUND);
    }
    match CleanerConfig::load_from_path(&args.path) {
        Ok(_) => {
            println!("{}: OK", args.path.display());
            Ok(exit_codes::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}: {}", args.path.display(), e);
            Ok(exit_codes::INVALID_CONFIG)
        }
    }
}
