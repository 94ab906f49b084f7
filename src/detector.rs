// src/detector.rs

use crate::types::DetectorConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, error, info, warn};

/// Lines of detector stderr kept for the failure report.
const STDERR_TAIL_LINES: usize = 10;

/// How the detector process ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectorExit {
    Success,
    Failed {
        code: Option<i32>,
        stderr_tail: String,
    },
    /// The process could not be started at all.
    LaunchFailed { reason: String },
}

/// Result of one detector invocation.
///
/// `labels_dir` is where labels are expected, regardless of outcome: a failed
/// run may leave partial or stale files there and callers read whatever exists.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionRun {
    pub labels_dir: PathBuf,
    pub exit: DetectorExit,
    #[serde(skip)]
    pub stdout: String,
}

/// Object detection backend producing one label file per frame.
pub trait Detector {
    fn detect(&self, video: &Path, config: &DetectorConfig) -> DetectionRun;
}

/// Runs a YOLO `detect.py` style script as a child process.
#[derive(Debug, Clone, Copy, Default)]
pub struct YoloCliDetector;

impl YoloCliDetector {
    /// Arguments passed after the program name.
    ///
    /// `--exist-ok` keeps the output in `<project>/<name>` instead of letting
    /// the detector create `exp2`, `exp3`, ... on every run.
    pub fn command_args(video: &Path, config: &DetectorConfig) -> Vec<String> {
        vec![
            config.script.clone(),
            "--weights".to_string(),
            config.weights.clone(),
            "--source".to_string(),
            video.to_string_lossy().to_string(),
            "--img".to_string(),
            config.img_size.to_string(),
            "--conf".to_string(),
            config.confidence.to_string(),
            "--save-txt".to_string(),
            "--project".to_string(),
            config.project.clone(),
            "--name".to_string(),
            config.name.clone(),
            "--exist-ok".to_string(),
        ]
    }
}

impl Detector for YoloCliDetector {
    fn detect(&self, video: &Path, config: &DetectorConfig) -> DetectionRun {
        let labels_dir = config.labels_dir();

        if config.clean_before_run && labels_dir.exists() {
            info!("Removing previous labels in {}", labels_dir.display());
            if let Err(e) = std::fs::remove_dir_all(&labels_dir) {
                warn!("Could not clear {}: {}", labels_dir.display(), e);
            }
        }

        // The detector resolves --source relative to its own working dir.
        let source = std::fs::canonicalize(video).unwrap_or_else(|_| video.to_path_buf());
        let args = Self::command_args(&source, config);

        info!(
            "Running detector: {} {} (cwd {})",
            config.program,
            args.join(" "),
            config.working_dir.display()
        );

        let output = match Command::new(&config.program)
            .args(&args)
            .current_dir(&config.working_dir)
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                error!("Failed to launch detector '{}': {}", config.program, e);
                return DetectionRun {
                    labels_dir,
                    exit: DetectorExit::LaunchFailed {
                        reason: e.to_string(),
                    },
                    stdout: String::new(),
                };
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        debug!("Detector stdout: {} bytes", stdout.len());

        let exit = if output.status.success() {
            info!("✓ Detector finished, labels in {}", labels_dir.display());
            DetectorExit::Success
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr_tail = tail_lines(&stderr, STDERR_TAIL_LINES);
            error!(
                "Detector exited with {:?}: {}",
                output.status.code(),
                stderr_tail
            );
            DetectorExit::Failed {
                code: output.status.code(),
                stderr_tail,
            }
        };

        DetectionRun {
            labels_dir,
            exit,
            stdout,
        }
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
