mod cli;
mod pipeline;
mod run_artifacts;
mod run_config;
mod video;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use pipeline::convert::FfmpegConverter;
use pipeline::counter::ObjectCounter;
use pipeline::detection::ObjectDetector;
use pipeline::orchestrator::{Orchestrator, RunPlan};
use pipeline::overlay::OverlayRenderer;
use run_artifacts::RunSummary;
use run_config::RunConfig;
use std::process::ExitCode;
use video::LocalMedia;

fn main() -> ExitCode {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let args = Args::parse_args();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    let converter = FfmpegConverter::new(config.transcoder.clone());
    if !converter.probe() {
        tracing::warn!(
            "Transcoder {:?} is not runnable; the conversion stage will fail",
            config.transcoder.program
        );
    }

    let detector = ObjectDetector::new(&config.model_path)
        .with_context(|| format!("Failed to load detection model {}", config.model_path))?;
    let mut counter = ObjectCounter::new(detector, config.counter_settings());
    let media = LocalMedia::new(config.backend);

    let plan = RunPlan {
        input_path: config.input_path.clone(),
        intermediate_path: config.output_path.clone(),
        intermediate_codec: config.intermediate_codec.clone(),
        final_output_path: config.final_output_path.clone(),
        region: config.region_points.clone(),
    };
    let renderer = OverlayRenderer::new(config.overlay_box, config.overlay_style());
    let mut orchestrator = Orchestrator::new(plan, renderer).with_progress(!args.no_progress);

    let started_at = Utc::now();
    let report = match orchestrator.run(&media, &mut counter, &converter) {
        Ok(report) => report,
        Err(err) => {
            if err.is_conversion() {
                tracing::warn!(
                    "Annotated video was kept at {:?} (transcoder exit code {:?})",
                    config.output_path,
                    err.exit_code()
                );
            }
            return Err(err.into());
        }
    };
    let finished_at = Utc::now();

    let counts = counter.counts();
    tracing::info!(
        "Final counts: in={}, out={} over {} frames",
        counts.in_count,
        counts.out_count,
        report.frames_written
    );

    if let Some(summary_path) = &config.summary_path {
        RunSummary {
            input_path: config.input_path.clone(),
            intermediate_path: report.intermediate_path.clone(),
            final_output_path: report.final_output_path.clone(),
            properties: report.properties,
            frames_written: report.frames_written,
            in_count: report.final_counts.in_count,
            out_count: report.final_counts.out_count,
            started_at,
            finished_at,
        }
        .write(summary_path)?;
    }

    Ok(())
}
