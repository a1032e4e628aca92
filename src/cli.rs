use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use scansort_core::{MergeStrategy, OrientationStrategy};

use crate::config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "scansort", version, about = "Sort scanned reports into one PDF per identifier")]
pub struct Cli {
    /// Configuration file [default: <config dir>/scansort/config.json]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// -v debug, -vv trace; RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process files; type `q` or `stop` and Enter to stop early
    Run(RunArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// PDFs and images, processed in the order given
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Export root; family sub-folders are created inside
    #[arg(short, long)]
    pub export: Option<PathBuf>,

    /// batch: write each document at the end; eager: grow documents page by page
    #[arg(long)]
    pub mode: Option<MergeStrategy>,

    /// full: try all four rotations; single: trust the orientation classifier
    #[arg(long)]
    pub orientation: Option<OrientationStrategy>,

    #[arg(long)]
    pub det_model: Option<PathBuf>,

    #[arg(long)]
    pub rec_model: Option<PathBuf>,

    #[arg(long)]
    pub dict: Option<PathBuf>,

    #[arg(long)]
    pub cls_model: Option<PathBuf>,

    /// Directory containing the pdfium library
    #[arg(long)]
    pub pdfium_dir: Option<PathBuf>,

    #[arg(long)]
    pub dpi: Option<u32>,

    /// Persist the effective configuration before running
    #[arg(long)]
    pub save_config: bool,

    /// No progress bar and no stop prompt
    #[arg(short, long)]
    pub quiet: bool,
}

impl RunArgs {
    /// Flags override file values.
    pub fn apply(&self, config: &mut AppConfig) {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        set(&mut config.export_dir, &self.export);
        set(&mut config.det_model_path, &self.det_model);
        set(&mut config.rec_model_path, &self.rec_model);
        set(&mut config.dict_path, &self.dict);
        set(&mut config.cls_model_path, &self.cls_model);
        set(&mut config.pdfium_dir, &self.pdfium_dir);
        if let Some(mode) = self.mode {
            config.merge = mode;
        }
        if let Some(orientation) = self.orientation {
            config.orientation = orientation;
        }
        if let Some(dpi) = self.dpi {
            config.dpi = dpi;
        }
    }
}
