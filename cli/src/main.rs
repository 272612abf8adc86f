//! synthgen CLI – generate synthetic detection datasets.
//!
//! Three subcommands: `generate` for full split-wise runs, `preview` for a
//! quick handful of images, and `visualize` to draw label files back over
//! an existing dataset. Configuration comes from a YAML file, CLI flags, or
//! both (flags win).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use synthgen_engine::HeadlessEngine;
use synthgen_pipeline::{
    report, visualize_dataset, GenerationConfig, Generator, OutputLayout,
};

#[derive(Parser)]
#[command(
    name = "synthgen",
    about = "Generate synthetic labeled images for artifact detection training"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a full train/val/test dataset
    Generate {
        /// Directory containing 3D models organized by class
        #[arg(long)]
        models: Option<PathBuf>,

        /// Output directory for the dataset
        #[arg(long)]
        output: Option<PathBuf>,

        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Total number of images to generate
        #[arg(long)]
        num_images: Option<u32>,

        /// Number of camera orbit positions
        #[arg(long)]
        camera_angles: Option<u32>,

        /// Maximum objects per scene
        #[arg(long)]
        max_objects: Option<u32>,

        /// Image resolution
        #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
        resolution: Option<Vec<u32>>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Disable physics simulation
        #[arg(long)]
        no_physics: bool,

        /// Render samples per image
        #[arg(long)]
        samples: Option<u32>,

        /// Create annotated visualization images after generation
        #[arg(long)]
        visualize: bool,
    },

    /// Generate a few preview images for checking settings
    Preview {
        /// Directory containing 3D models organized by class
        #[arg(long)]
        models: PathBuf,

        /// Output directory for the preview
        #[arg(long)]
        output: PathBuf,

        /// Number of preview images
        #[arg(long, default_value = "5")]
        num_images: u32,

        /// Number of camera orbit positions
        #[arg(long)]
        camera_angles: Option<u32>,
    },

    /// Draw annotations over an already generated dataset
    Visualize {
        /// Dataset output directory
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Generate {
            models,
            output,
            config,
            num_images,
            camera_angles,
            max_objects,
            resolution,
            seed,
            no_physics,
            samples,
            visualize,
        } => {
            let mut config = match config {
                Some(path) => GenerationConfig::from_yaml(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => {
                    let (Some(models), Some(output)) = (models.clone(), output.clone()) else {
                        bail!("--models and --output are required when not using --config");
                    };
                    GenerationConfig::new(models, output)
                }
            };

            // Explicit flags override whatever the file said.
            if let Some(models) = models {
                config.model_dir = models;
            }
            if let Some(output) = output {
                config.output_dir = output;
            }
            if let Some(n) = num_images {
                config.num_images = n;
            }
            if let Some(angles) = camera_angles {
                config.camera.orbit_angles = angles;
            }
            if let Some(max) = max_objects {
                config.models.max_per_scene = max;
            }
            if let Some(res) = resolution {
                config.camera.resolution = (res[0], res[1]);
            }
            if let Some(seed) = seed {
                config.random_seed = Some(seed);
            }
            if no_physics {
                config.physics.enabled = false;
            }
            if let Some(samples) = samples {
                config.rendering.samples = samples;
            }
            if visualize {
                config.create_visualizations = true;
            }

            let (width, height) = config.camera.resolution;
            let layout = OutputLayout::new(&config.output_dir);
            std::fs::create_dir_all(layout.root())
                .with_context(|| format!("creating {}", layout.root().display()))?;
            let log_dir = report::create_log_directory(&layout.logs_dir(), "generation")?;
            info!("Logging run artifacts to {}", log_dir.display());

            let mut generator =
                Generator::new(config, HeadlessEngine::new(width, height))?;
            let summary = generator.generate(Some(&log_dir))?;
            info!(
                "Done: {} images ({} unrecoverable) in {:.1}s",
                summary.total_images, summary.failed_images, summary.elapsed_seconds
            );
            Ok(())
        }

        Command::Preview {
            models,
            output,
            num_images,
            camera_angles,
        } => {
            let mut config = GenerationConfig::new(models, output);
            if let Some(angles) = camera_angles {
                config.camera.orbit_angles = angles;
            }

            let (width, height) = config.camera.resolution;
            let mut generator =
                Generator::new(config, HeadlessEngine::new(width, height))?;
            generator.preview(num_images)?;
            Ok(())
        }

        Command::Visualize { output } => {
            let layout = OutputLayout::new(&output);
            let class_names = match std::fs::read_to_string(layout.classes_path()) {
                Ok(text) => Some(
                    text.lines()
                        .map(|l| l.trim().to_string())
                        .filter(|l| !l.is_empty())
                        .collect::<Vec<_>>(),
                ),
                Err(_) => None,
            };
            visualize_dataset(&layout, class_names.as_deref())?;
            Ok(())
        }
    }
}
