// src/main.rs

mod chart;
mod config;
mod congestion;
mod detector;
mod features;
mod ingest;
mod pipeline;
mod server;
mod types;
mod vehicle_counter;
mod video_processor;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use detector::YoloCliDetector;
use features::FeatureStatus;
use pipeline::{AnalysisReport, Pipeline};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};
use types::{Config, MessageLevel};

#[derive(Parser, Debug)]
#[command(name = "traffic-congestion", about = "Vehicle counting and congestion alerts for traffic video")]
struct Cli {
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the upload page and analysis API
    Serve,
    /// Analyze one video file and exit
    Analyze {
        video: PathBuf,
        /// Print the full report as JSON on stdout
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging goes up before the config load so its warnings are visible;
    // the configured level is applied once the config is known.
    let (filter, filter_handle) = reload::Layer::new(EnvFilter::new(log_filter("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let config = Config::load(&cli.config)?;
    filter_handle
        .reload(EnvFilter::new(log_filter(&config.logging.level)))
        .context("Failed to apply logging level")?;

    info!("🚦 Traffic Congestion Detector starting");
    info!(
        "Congestion threshold: {} vehicles, vehicle classes: {:?}",
        config.congestion.threshold, config.congestion.vehicle_classes
    );

    match cli.command {
        Command::Serve => server::start_server(config).await,
        Command::Analyze { video, json } => {
            let report = tokio::task::spawn_blocking(move || analyze_file(config, video))
                .await
                .context("Analysis task failed")??;

            log_report(&report);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
    }
}

fn log_filter(level: &str) -> String {
    format!("traffic_congestion={},tower_http=info", level)
}

/// Ingest a local file exactly as an upload would be, then run the pipeline.
fn analyze_file(config: Config, video: PathBuf) -> Result<AnalysisReport> {
    let bytes = std::fs::read(&video)
        .with_context(|| format!("Failed to read video {}", video.display()))?;
    let stored = ingest::save_upload(&bytes, &config.video.upload_dir)?;
    Pipeline::new(config, YoloCliDetector).run(&stored)
}

fn log_report(report: &AnalysisReport) {
    for message in &report.messages {
        match message.level {
            MessageLevel::Warning | MessageLevel::Error => warn!("{}", message.text),
            MessageLevel::Info | MessageLevel::Success => info!("{}", message.text),
        }
    }

    info!("\n✓ Analysis finished");
    info!("  Frames with labels: {}", report.counts.len());
    info!(
        "  Congested frames: {} (threshold {})",
        report.congestion.congested_frames, report.congestion.threshold
    );
    if let Some(chart) = &report.chart {
        info!("  Chart: {}", chart.display());
    }
    if let Some(overlay) = &report.overlay {
        info!(
            "  Overlay video: {} ({} frames, {} flagged)",
            overlay.output.display(),
            overlay.frames_written,
            overlay.frames_flagged
        );
    }
    match &report.features {
        FeatureStatus::Available { record } => info!(
            "  Features: count={} occupancy={:.6}% hour={} speed=n/a",
            record.vehicle_count, record.occupancy_ratio, record.hour
        ),
        FeatureStatus::Unavailable { reason } => info!("  Features unavailable: {}", reason),
    }
}
