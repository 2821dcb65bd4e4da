use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use framecull::calibrate::{CalibratedParams, calibrate};
use framecull::config::SweepConfig;
use framecull::detect::PixelDiffDetector;
use framecull::history::read_history;
use framecull::sweep::Deduplicator;

#[derive(Parser, Debug)]
#[command(
    name = "framecull",
    version,
    about = "Remove near-duplicate frames from camera image folders"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct TuningArgs {
    /// Width frames are resized to before comparison
    #[arg(long, value_name = "PX")]
    resize_w: Option<u32>,

    /// Height frames are resized to before comparison
    #[arg(long, value_name = "PX")]
    resize_h: Option<u32>,

    /// Following frames compared against each anchor
    #[arg(long, value_name = "N")]
    window: Option<usize>,

    /// Multiplier applied to the mean sample score
    #[arg(long, value_name = "X")]
    threshold_scale: Option<f64>,

    /// Multiplier applied to the mean contour area
    #[arg(long, value_name = "X")]
    area_scale: Option<f64>,
}

impl TuningArgs {
    fn into_config(self) -> SweepConfig {
        let defaults = SweepConfig::default();
        SweepConfig {
            resize_width: self.resize_w.unwrap_or(defaults.resize_width),
            resize_height: self.resize_h.unwrap_or(defaults.resize_height),
            window: self.window.unwrap_or(defaults.window),
            threshold_scale: self.threshold_scale.unwrap_or(defaults.threshold_scale),
            area_scale: self.area_scale.unwrap_or(defaults.area_scale),
            ..defaults
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive the similarity threshold and contour-area floor from a folder
    Calibrate {
        /// Folder of sample frames
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// Calibrate, then delete near-duplicate frames in place
    Sweep {
        /// Folder to sweep
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,

        /// Calibration folder (defaults to the swept folder)
        #[arg(long, value_name = "DIR")]
        sample: Option<PathBuf>,

        /// Skip calibration and use this similarity threshold
        #[arg(long, value_name = "X", requires = "min_area")]
        threshold: Option<f64>,

        /// Skip calibration and use this contour-area floor
        #[arg(long, value_name = "X", requires = "threshold")]
        min_area: Option<f64>,

        /// Only report what would be removed
        #[arg(long)]
        dry_run: bool,

        /// Do not ask for confirmation before deleting
        #[arg(short = 'y', long)]
        yes: bool,

        #[command(flatten)]
        tuning: TuningArgs,
    },

    /// List the removal history of a folder
    History {
        /// Folder previously swept
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Calibrate { path, tuning } => {
            let config = tuning.into_config();
            let detector = PixelDiffDetector::default();
            let params = calibrate(&path, &config, &detector)
                .with_context(|| format!("calibration failed for {}", path.display()))?;

            println!("▶ Calibrated from {}", path.display());
            println!("  threshold:          {:.3}", params.threshold);
            println!("  contour-area floor: {:.3}", params.min_contour_area);
        }

        Commands::Sweep {
            path,
            sample,
            threshold,
            min_area,
            dry_run,
            yes,
            tuning,
        } => {
            let config = tuning.into_config();
            let detector = PixelDiffDetector::default();

            let params = match (threshold, min_area) {
                (Some(threshold), Some(min_contour_area)) => CalibratedParams {
                    threshold,
                    min_contour_area,
                },
                _ => {
                    let sample_dir = sample.as_deref().unwrap_or(&path);
                    println!("▶ Calibrating from {}", sample_dir.display());
                    calibrate(sample_dir, &config, &detector).with_context(|| {
                        format!("calibration failed for {}", sample_dir.display())
                    })?
                }
            };
            println!(
                "▶ Sweeping {} (threshold {:.3}, contour-area floor {:.3}, window {})",
                path.display(),
                params.threshold,
                params.min_contour_area,
                config.window
            );

            if !dry_run && !yes {
                let proceed = Confirm::new()
                    .with_prompt(format!(
                        "Permanently delete near-duplicate frames in {}?",
                        path.display()
                    ))
                    .default(false)
                    .interact()?;
                if !proceed {
                    println!("Aborted; nothing deleted.");
                    return Ok(());
                }
            }

            let progress = ProgressBar::no_length();
            progress.set_style(ProgressStyle::with_template(
                "{bar:40.green} {pos}/{len} {msg}",
            )?);
            let report = Deduplicator::new(config, &detector)
                .dry_run(dry_run)
                .with_progress(progress)
                .sweep(&path, params)
                .with_context(|| format!("sweep failed for {}", path.display()))?;

            for removed in &report.removed {
                println!("   🗑  {}", removed.display());
            }
            if report.dry_run {
                println!("\n⚠️  Dry-run only; no files were changed.");
            }
            println!(
                "✅ {} removed, {} comparisons, {} undecodable skipped, {} removal failures",
                report.removed.len(),
                report.comparisons,
                report.skipped_decode,
                report.failed_removals
            );
        }

        Commands::History { path } => {
            let records = read_history(&path)
                .with_context(|| format!("could not read removal history in {}", path.display()))?;

            println!("🗂  Removal history:");
            for (index, record) in records.iter().enumerate() {
                println!(
                    "[{}] {}\n     removed: {}\n     kept:    {}\n     score {:.3} < threshold {:.3}\n",
                    index,
                    record.timestamp,
                    record.removed,
                    record.kept,
                    record.score,
                    record.threshold
                );
            }
        }
    }

    Ok(())
}
