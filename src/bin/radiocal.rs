use anyhow::Context;
use clap::{Parser, Subcommand};
use radiocal::config::{BuildLutJob, CalibrateJob, CompositeJob, PipelineJob};
use radiocal::core::orchestrator::{BatchReport, SceneState};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about = "UAVSAR look-angle and range-slope radiometric calibration")]
struct Args {
    #[command(subcommand)]
    command: Command,
    /// Write the run report as YAML to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Calibrate and geocode every scene of a data directory
    Calibrate {
        /// YAML job file
        job: PathBuf,
        /// Only process annotation files containing this string
        #[arg(long)]
        scene: Option<String>,
        /// Re-run polarizations whose output already exists
        #[arg(long, default_value_t = false)]
        overwrite: bool,
        /// Log the planned program calls without running them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Build correction tables from area-corrected scenes
    BuildLut {
        job: PathBuf,
    },
    /// Correct the complex cross products with the real-channel factors
    Composite {
        job: PathBuf,
    },
    /// Area-only calibration, table creation and table-informed calibration in one go
    Pipeline {
        job: PathBuf,
    },
}

fn write_report<T: Serialize>(path: Option<&Path>, report: &T) -> anyhow::Result<()> {
    if let Some(path) = path {
        let text = serde_yaml::to_string(report).context("serializing run report")?;
        fs::write(path, text).with_context(|| format!("writing report {}", path.display()))?;
        log::info!("Report written to {}", path.display());
    }
    Ok(())
}

fn summarize(label: &str, report: &BatchReport) {
    println!(
        "{}: {} done, {} skipped, {} failed ({:.1}s)",
        label,
        report.count(SceneState::Done),
        report.count(SceneState::Skipped),
        report.count(SceneState::Failed),
        (report.window.finished - report.window.started).num_milliseconds() as f64 / 1000.0
    );
    for scene in report.scenes.iter().filter(|s| s.outcome() == SceneState::Failed) {
        println!("  {} failed: {}", scene.root, scene.error.as_deref().unwrap_or("unknown error"));
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let report_path = args.report.as_deref();

    match args.command {
        Command::Calibrate {
            job,
            scene,
            overwrite,
            dry_run,
        } => {
            let mut job = CalibrateJob::load(&job)?;
            if scene.is_some() {
                job.batch.scene_filter = scene;
            }
            job.batch.overwrite |= overwrite;
            if dry_run {
                job.batch.run_correction = false;
            }
            let report = job.run().context("batch calibration")?;
            summarize("calibrate", &report);
            write_report(report_path, &report)?;
        }
        Command::BuildLut { job } => {
            let job = BuildLutJob::load(&job)?;
            let tables = job.run().context("correction table creation")?;
            for table in &tables {
                println!("{}", table.display());
            }
            write_report(report_path, &tables)?;
        }
        Command::Composite { job } => {
            let job = CompositeJob::load(&job)?;
            let written = job.run().context("cross-product correction")?;
            println!("composite: {} raster(s) written", written.len());
            write_report(report_path, &written)?;
        }
        Command::Pipeline { job } => {
            let job = PipelineJob::load(&job)?;
            let report = job.run().context("calibration pipeline")?;
            summarize("area-only", &report.area_only);
            println!("tables: {}", report.tables.len());
            summarize("lut-informed", &report.lut_informed);
            if !report.composites.is_empty() {
                println!("composite: {} raster(s) written", report.composites.len());
            }
            write_report(report_path, &report)?;
        }
    }

    Ok(())
}
