//! CNN Pipeline CLI
//!
//! Entry point for the dataset preparation steps and the two training tasks.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use cnn_pipeline::backend::{backend_name, default_device, TrainingBackend};
use cnn_pipeline::dataset::{
    consolidate_splits, normalize_filenames, remove_invalid_images_in, ConsolidateConfig,
    ImageFolder, NormalizeConfig, LUNG_CLASSES,
};
use cnn_pipeline::training::{run_training, Task, TrainingConfig};
use cnn_pipeline::utils::format_duration;
use cnn_pipeline::utils::logging::{init_logging, LogConfig};

/// Dataset preparation and CNN training with Burn
#[derive(Parser, Debug)]
#[command(name = "cnn_pipeline")]
#[command(version = "0.1.0")]
#[command(about = "Image dataset preparation and CNN training with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge <source>/<split>/<class> folders into <dest>/<class>
    Consolidate {
        #[arg(long, default_value = "data_j")]
        source: PathBuf,

        #[arg(long, default_value = "dataset_j")]
        dest: PathBuf,

        /// Split folder names, in copy order
        #[arg(long, value_delimiter = ',', default_value = "train,valid,test")]
        splits: Vec<String>,

        /// Class folder names (defaults to the lung classes)
        #[arg(long, value_delimiter = ',')]
        classes: Vec<String>,
    },

    /// Rename images in each class folder to their numeric ID
    Normalize {
        #[arg(long, default_value = "dataset_j")]
        root: PathBuf,

        /// Class folder names (defaults to the lung classes)
        #[arg(long, value_delimiter = ',')]
        classes: Vec<String>,
    },

    /// Delete JPEG/PNG files that fail to decode
    Clean {
        /// Directories to scan recursively
        #[arg(required = true)]
        dirs: Vec<PathBuf>,
    },

    /// Train the CNN for one of the two tasks
    Train {
        /// Task preset
        #[arg(short, long, value_enum, default_value = "binary")]
        task: Task,

        /// TOML file overriding preset values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        #[arg(long)]
        train_dir: Option<PathBuf>,

        #[arg(long)]
        val_dir: Option<PathBuf>,

        /// Directory for history files and model artifacts
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Keep undecodable images instead of deleting them first
        #[arg(long, default_value = "false")]
        no_clean: bool,
    },

    /// Show per-class image counts of a class-folder tree
    Stats {
        /// Path to the dataset directory
        #[arg(short, long)]
        data_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Consolidate {
            source,
            dest,
            splits,
            classes,
        } => {
            let config = ConsolidateConfig {
                source_root: source,
                dest_root: dest,
                splits,
                classes: classes_or_default(classes),
            };
            let report = consolidate_splits(&config).context("Consolidation failed")?;

            println!("{}", "Consolidation Complete!".green().bold());
            println!("  📁 Files copied:         {}", report.copied);
            println!("  🔀 Renamed on collision: {}", report.renamed_on_collision);
            println!("  ⚠️  Missing folders:      {}", report.missing_dirs.len());
        }

        Commands::Normalize { root, classes } => {
            let config = NormalizeConfig {
                root,
                classes: classes_or_default(classes),
            };
            let report = normalize_filenames(&config).context("Normalization failed")?;

            println!("{}", "Normalization Complete!".green().bold());
            for (class, count) in &report.renamed_per_class {
                println!("  {:15} {} renamed", class, count);
            }
            println!("  Total renamed: {}", report.total_renamed());
            if !report.collisions.is_empty() {
                println!(
                    "  {} {} files kept their name because the target existed",
                    "Warning:".yellow(),
                    report.collisions.len()
                );
            }
            if !report.skipped_non_utf8.is_empty() {
                println!(
                    "  {} {} files skipped for non UTF-8 names",
                    "Warning:".yellow(),
                    report.skipped_non_utf8.len()
                );
            }
            if !report.failures.is_empty() {
                println!(
                    "  {} {} renames failed",
                    "Error:".red(),
                    report.failures.len()
                );
            }
        }

        Commands::Clean { dirs } => {
            let report = remove_invalid_images_in(&dirs).context("Corrupted image scan failed")?;

            println!("{}", "Scan Complete!".green().bold());
            println!("  🔍 Images checked: {}", report.scanned);
            for (dir, count) in &report.deleted_per_dir {
                println!("  🗑️  {}: {} deleted", dir.display(), count);
            }
            println!("  Total deleted: {}", report.total_deleted());
        }

        Commands::Train {
            task,
            config,
            epochs,
            batch_size,
            train_dir,
            val_dir,
            output_dir,
            seed,
            no_clean,
        } => {
            let mut training_config = match config {
                Some(path) => TrainingConfig::load_toml(task, &path)?,
                None => task.preset(),
            };

            if let Some(epochs) = epochs {
                training_config.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                training_config.batch_size = batch_size;
            }
            if let Some(dir) = train_dir {
                training_config.train_dir = dir;
            }
            if let Some(dir) = val_dir {
                training_config.val_dir = dir;
            }
            if let Some(dir) = output_dir {
                training_config.output_dir = dir;
            }
            if let Some(seed) = seed {
                training_config.seed = seed;
            }
            if no_clean {
                training_config.clean_corrupted = false;
            }

            info!("Backend: {}", backend_name());
            let start = std::time::Instant::now();

            let outcome = run_training::<TrainingBackend>(&training_config, &default_device())
                .context("Training failed")?;

            outcome.print();
            println!(
                "  ⏱️  Total time: {}",
                format_duration(start.elapsed().as_secs_f64())
            );
        }

        Commands::Stats { data_dir } => {
            let folder = ImageFolder::new(&data_dir)?;
            folder.get_stats().print();
        }
    }

    Ok(())
}

fn classes_or_default(classes: Vec<String>) -> Vec<String> {
    if classes.is_empty() {
        LUNG_CLASSES.iter().map(|c| c.to_string()).collect()
    } else {
        classes
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   🧠 CNN Pipeline                                                ║
 ║   Dataset preparation and image classification with Burn + Rust  ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}
