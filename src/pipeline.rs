// src/pipeline.rs
//
// Runs one uploaded video through detection, counting, congestion analysis,
// charting, overlay and feature extraction, strictly in that order.

use crate::chart;
use crate::congestion::{self, CongestionReport};
use crate::detector::{DetectionRun, Detector, DetectorExit};
use crate::features::{self, FeatureStatus};
use crate::types::{Config, StatusMessage};
use crate::vehicle_counter::{self, FrameCount, LabelScan};
use crate::video_processor::{FrameLookup, OverlaySummary, VideoProcessor};
use anyhow::Result;
use chrono::Timelike;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Everything the presentation layer shows for one run.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub source: PathBuf,
    pub detection: DetectionRun,
    pub messages: Vec<StatusMessage>,
    pub counts: Vec<u32>,
    pub frames: Vec<FrameCount>,
    pub congestion: CongestionReport,
    pub chart: Option<PathBuf>,
    pub overlay: Option<OverlaySummary>,
    pub features: FeatureStatus,
}

pub struct Pipeline<D: Detector> {
    config: Config,
    detector: D,
}

impl<D: Detector> Pipeline<D> {
    pub fn new(config: Config, detector: D) -> Self {
        Self { config, detector }
    }

    pub fn run(&self, video: &Path) -> Result<AnalysisReport> {
        let mut messages = vec![StatusMessage::info("🔍 Analyzing traffic...")];
        let threshold = self.config.congestion.threshold;

        // 1. Detection. Failures are reported, then we carry on with whatever
        //    labels are on disk.
        let detection = self.detector.detect(video, &self.config.detector);
        debug!("Detector output:\n{}", detection.stdout);
        match &detection.exit {
            DetectorExit::Success => {}
            DetectorExit::Failed { code, stderr_tail } => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                messages.push(StatusMessage::error(format!(
                    "Detector failed (exit {}): {}",
                    code, stderr_tail
                )));
            }
            DetectorExit::LaunchFailed { reason } => {
                messages.push(StatusMessage::error(format!(
                    "Detector could not be started: {}",
                    reason
                )));
            }
        }

        // 2. Counting. The labels dir is shared between uploads; only this
        //    video's files are read.
        let source_stem = video.file_stem().and_then(|s| s.to_str());
        let scan = vehicle_counter::count_vehicles(
            &detection.labels_dir,
            source_stem,
            &self.config.congestion.vehicle_classes,
        );
        let counts = scan.counts();
        let frames = match scan {
            LabelScan::NoDetectionOutput => {
                messages.push(StatusMessage::warning(format!(
                    "No detection output found in {}",
                    detection.labels_dir.display()
                )));
                Vec::new()
            }
            LabelScan::Counted(frames) => frames,
        };
        info!("Per-frame vehicle counts: {} frames", counts.len());

        // 3. Congestion
        let congestion = congestion::analyze(&counts, threshold);
        info!(
            "Congestion: {:?} (peak {:?}, threshold {})",
            congestion.classification, congestion.peak, threshold
        );

        // 4. Chart
        let chart = if counts.is_empty() {
            None
        } else {
            let path = self.config.video.chart_path();
            match chart::save_chart(&counts, threshold, &path) {
                Ok(()) => Some(path),
                Err(e) => {
                    error!("Chart rendering failed: {:#}", e);
                    messages.push(StatusMessage::error(format!(
                        "Could not render chart: {:#}",
                        e
                    )));
                    None
                }
            }
        };

        // 5. Overlay
        let processor = VideoProcessor::new(self.config.video.clone());
        let lookup = FrameLookup::from_frames(&frames);
        let overlay = match processor.write_overlay(video, &lookup, threshold) {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!("Overlay failed: {:#}", e);
                messages.push(StatusMessage::error(format!(
                    "Could not process video: {:#}",
                    e
                )));
                None
            }
        };

        // 6. Features
        let frame_size = match &overlay {
            Some(summary) => Some((summary.video.width, summary.video.height)),
            None => processor
                .video_info(video)
                .map(|info| (info.width, info.height))
                .ok(),
        };
        let features = features::extract(&counts, frame_size, chrono::Local::now().hour());
        if let FeatureStatus::Unavailable { reason } = &features {
            warn!("Features unavailable: {}", reason);
        }

        messages.push(congestion.status_message());

        Ok(AnalysisReport {
            source: video.to_path_buf(),
            detection,
            messages,
            counts,
            frames,
            congestion,
            chart,
            overlay,
            features,
        })
    }
}
