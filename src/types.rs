// src/types.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub congestion: CongestionConfig,
    pub video: VideoConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// How the external detector process is launched and where it writes labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub program: String,
    pub script: String,
    pub weights: String,
    pub img_size: u32,
    pub confidence: f32,
    pub working_dir: PathBuf,
    pub project: String,
    pub name: String,
    /// Remove the labels directory before each run so stale labels from an
    /// earlier invocation are never counted.
    pub clean_before_run: bool,
}

impl DetectorConfig {
    /// Directory the detector writes one `.txt` per frame into.
    pub fn labels_dir(&self) -> PathBuf {
        self.working_dir
            .join(&self.project)
            .join(&self.name)
            .join("labels")
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            program: "python".to_string(),
            script: "detect.py".to_string(),
            weights: "yolov5s.pt".to_string(),
            img_size: 640,
            confidence: 0.25,
            working_dir: PathBuf::from("."),
            project: "runs/detect".to_string(),
            name: "exp".to_string(),
            clean_before_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionConfig {
    /// Frames with strictly more vehicles than this are congested.
    pub threshold: u32,
    pub vehicle_classes: Vec<i64>,
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            threshold: 15,
            // COCO: car, motorcycle, bus, truck
            vehicle_classes: vec![2, 3, 5, 7],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_name: String,
    pub chart_name: String,
}

impl VideoConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_name)
    }

    pub fn chart_path(&self) -> PathBuf {
        self.output_dir.join(&self.chart_name)
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("output"),
            output_name: "output.mp4".to_string(),
            chart_name: "vehicle_counts.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
            max_upload_mb: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Severity of a user-facing status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMessage {
    pub level: MessageLevel,
    pub text: String,
}

impl StatusMessage {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: MessageLevel::Error,
            text: text.into(),
        }
    }
}

/// Resolution and frame rate of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoInfo {
    pub width: i32,
    pub height: i32,
    pub fps: f64,
    pub total_frames: i32,
}
