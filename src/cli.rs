//! Command-line interface definitions

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliOverrides;

/// Process exit codes
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_CONFIG: i32 = 2;
    pub const INPUT_NOT_FOUND: i32 = 3;
    /// At least one page could not be cleaned
    pub const PARTIAL_FAILURE: i32 = 4;
}

/// Remove text from comic and manga pages
#[derive(Debug, Parser)]
#[command(name = "panel-cleaner", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clean pages using precomputed detections
    Clean(CleanArgs),
    /// Print the default configuration as TOML
    DefaultConfig,
    /// Load and validate a configuration file
    ValidateConfig(ValidateConfigArgs),
}

#[derive(Debug, Args)]
pub struct CleanArgs {
    /// Page images to clean
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Directory holding `<page stem>.json` detection files
    #[arg(short, long)]
    pub detections: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "cleaned")]
    pub output: PathBuf,

    /// Config file (defaults to the user config)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Also write a debug overlay per page
    #[arg(long)]
    pub debug: bool,

    /// Skip band denoising
    #[arg(long)]
    pub no_denoise: bool,

    /// Accept the first mask under the deviation limit
    #[arg(long)]
    pub fast_selection: bool,

    /// Also write the removed text as `<stem>_text` on a transparent layer
    #[arg(long)]
    pub extract_text: bool,

    /// Write denoised pixels to `<stem>_noise` instead of the mask image
    #[arg(long)]
    pub separate_noise_mask: bool,

    /// Downscale factor for detection and mask fitting, in (0, 1]
    #[arg(long)]
    pub scale: Option<f32>,

    /// Concurrent model invocations
    #[arg(long)]
    pub replicas: Option<usize>,

    /// Output format of cleaned images (e.g. png, jpg)
    #[arg(long)]
    pub format: Option<String>,

    /// Worker threads (defaults to the number of CPUs)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// No progress bar or summary
    #[arg(short, long)]
    pub quiet: bool,
}

impl CleanArgs {
    /// Config overrides for the flags that were actually given
    pub fn overrides(&self) -> CliOverrides {
        let mut overrides = CliOverrides {
            input_size_scale: self.scale,
            model_replicas: self.replicas,
            preferred_file_type: self.format.clone(),
            ..Default::default()
        };
        if self.no_denoise {
            overrides.denoising_enabled = Some(false);
        }
        if self.fast_selection {
            overrides.mask_selection_fast = Some(true);
        }
        if self.extract_text {
            overrides.extract_text = Some(true);
        }
        if self.separate_noise_mask {
            overrides.separate_noise_mask = Some(true);
        }
        overrides
    }
}

#[derive(Debug, Args)]
pub struct ValidateConfigArgs {
    /// Config file to check
    pub path: PathBuf,
}
