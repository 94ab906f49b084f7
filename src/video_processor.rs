// src/video_processor.rs

use crate::types::{VideoConfig, VideoInfo};
use crate::vehicle_counter::FrameCount;
use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTraitConst, VideoWriter},
};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ALERT_TEXT: &str = "CONGESTION ALERT";

const ALERT_ORIGIN: (i32, i32) = (5, 5);
const ALERT_HEIGHT: i32 = 40;
pub const ALERT_BACKGROUND: core::Scalar = core::Scalar::new(40.0, 40.0, 40.0, 0.0);
const ALERT_TEXT_COLOR: core::Scalar = core::Scalar::new(0.0, 0.0, 255.0, 0.0);

/// What the overlay pass produced.
#[derive(Debug, Clone, Serialize)]
pub struct OverlaySummary {
    pub output: PathBuf,
    pub video: VideoInfo,
    pub frames_written: usize,
    pub frames_flagged: usize,
}

pub struct VideoProcessor {
    config: VideoConfig,
}

impl VideoProcessor {
    pub fn new(config: VideoConfig) -> Self {
        Self { config }
    }

    pub fn open_video(&self, path: &Path) -> Result<VideoReader> {
        info!("Opening video: {}", path.display());

        let path_str = path
            .to_str()
            .with_context(|| format!("Non UTF-8 video path {}", path.display()))?;
        let cap = VideoCapture::from_file(path_str, videoio::CAP_ANY)?;

        if !cap.is_opened()? {
            anyhow::bail!("Failed to open video file {}", path.display());
        }

        let fps = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FPS)?;
        let total_frames = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_COUNT)? as i32;
        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)? as i32;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)? as i32;

        info!(
            "Video properties: {}x{} @ {:.1} FPS, {} frames",
            width, height, fps, total_frames
        );

        Ok(VideoReader {
            cap,
            info: VideoInfo {
                width,
                height,
                fps,
                total_frames,
            },
            current_frame: 0,
        })
    }

    /// Resolution and frame rate without decoding any frame.
    pub fn video_info(&self, path: &Path) -> Result<VideoInfo> {
        Ok(self.open_video(path)?.info)
    }

    pub fn create_writer(&self, info: &VideoInfo) -> Result<VideoWriter> {
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!(
                "Failed to create output dir {}",
                self.config.output_dir.display()
            )
        })?;

        let output_path = self.config.output_path();
        info!("Output video: {}", output_path.display());

        let output_str = output_path
            .to_str()
            .with_context(|| format!("Non UTF-8 output path {}", output_path.display()))?;

        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
        let writer = VideoWriter::new(
            output_str,
            fourcc,
            info.fps,
            core::Size::new(info.width, info.height),
            true,
        )?;

        if !writer.is_opened()? {
            anyhow::bail!("Failed to open video writer {}", output_path.display());
        }

        Ok(writer)
    }

    /// Re-encode `source`, burning the alert into every congested frame.
    ///
    /// Frames with no count in `lookup` are copied unchanged.
    pub fn write_overlay(
        &self,
        source: &Path,
        lookup: &FrameLookup,
        threshold: u32,
    ) -> Result<OverlaySummary> {
        let mut reader = self.open_video(source)?;
        let mut writer = self.create_writer(&reader.info)?;

        let mut frames_written = 0;
        let mut frames_flagged = 0;

        while let Some(mut frame) = reader.read_frame()? {
            let index = reader.current_frame - 1;
            if should_flag(lookup, index, threshold) {
                draw_congestion_alert(&mut frame)?;
                frames_flagged += 1;
            }
            writer.write(&frame)?;
            frames_written += 1;

            if frames_written % 100 == 0 {
                debug!("Overlay progress: {:.1}%", reader.progress());
            }
        }

        writer.release()?;

        info!(
            "✓ Overlay written: {} frames, {} flagged",
            frames_written, frames_flagged
        );

        Ok(OverlaySummary {
            output: self.config.output_path(),
            video: reader.info,
            frames_written,
            frames_flagged,
        })
    }
}

pub struct VideoReader {
    pub cap: VideoCapture,
    pub info: VideoInfo,
    pub current_frame: usize,
}

impl VideoReader {
    /// Next BGR frame, or `None` at end of stream.
    pub fn read_frame(&mut self) -> Result<Option<Mat>> {
        use opencv::videoio::VideoCaptureTrait;

        let mut mat = Mat::default();

        if !VideoCaptureTrait::read(&mut self.cap, &mut mat)? || mat.empty() {
            return Ok(None);
        }

        self.current_frame += 1;
        Ok(Some(mat))
    }

    pub fn progress(&self) -> f32 {
        if self.info.total_frames <= 0 {
            return 0.0;
        }
        (self.current_frame as f32 / self.info.total_frames as f32) * 100.0
    }
}

/// Vehicle count for each decoded video frame.
///
/// The detector writes no label file for frames without detections, so the
/// n-th label file is not necessarily the n-th frame. When every label file
/// carries a frame number the counts are keyed by it; otherwise they are
/// matched by position.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameLookup {
    /// Keyed by 0-based video frame.
    ByFrame(HashMap<usize, u32>),
    ByPosition(Vec<u32>),
}

impl FrameLookup {
    pub fn from_counts(counts: &[u32]) -> Self {
        FrameLookup::ByPosition(counts.to_vec())
    }

    /// Label frame numbers are 1-based unless a frame 0 shows up.
    pub fn from_frames(frames: &[FrameCount]) -> Self {
        let indices: Option<Vec<u64>> = frames.iter().map(|f| f.frame_index).collect();
        let Some(indices) = indices.filter(|i| !i.is_empty()) else {
            return FrameLookup::ByPosition(frames.iter().map(|f| f.vehicles).collect());
        };

        let first = if indices.contains(&0) { 0 } else { 1 };
        FrameLookup::ByFrame(
            indices
                .iter()
                .zip(frames)
                .map(|(&index, f)| ((index - first) as usize, f.vehicles))
                .collect(),
        )
    }

    pub fn count_for(&self, video_frame: usize) -> Option<u32> {
        match self {
            FrameLookup::ByFrame(counts) => counts.get(&video_frame).copied(),
            FrameLookup::ByPosition(counts) => counts.get(video_frame).copied(),
        }
    }
}

/// Whether frame `index` gets the alert. No count means no alert.
pub fn should_flag(lookup: &FrameLookup, index: usize, threshold: u32) -> bool {
    lookup.count_for(index).is_some_and(|c| c > threshold)
}

/// Dark banner with red warning text in the top-left corner.
pub fn draw_congestion_alert(frame: &mut Mat) -> Result<()> {
    let mut baseline = 0;
    let text_size = imgproc::get_text_size(
        ALERT_TEXT,
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.9,
        2,
        &mut baseline,
    )?;

    let (x, y) = ALERT_ORIGIN;
    imgproc::rectangle(
        frame,
        core::Rect::new(x, y, text_size.width + 20, ALERT_HEIGHT),
        ALERT_BACKGROUND,
        -1,
        imgproc::LINE_8,
        0,
    )?;

    imgproc::put_text(
        frame,
        ALERT_TEXT,
        core::Point::new(x + 10, y + ALERT_HEIGHT - 12),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.9,
        ALERT_TEXT_COLOR,
        2,
        imgproc::LINE_8,
        false,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame() -> Mat {
        Mat::new_rows_cols_with_default(240, 320, core::CV_8UC3, core::Scalar::all(128.0))
            .unwrap()
    }

    fn pixel(mat: &Mat, row: i32, col: i32) -> [u8; 3] {
        let px = mat.at_2d::<core::Vec3b>(row, col).unwrap();
        [px[0], px[1], px[2]]
    }

    fn frame(file_name: &str, frame_index: Option<u64>, vehicles: u32) -> FrameCount {
        FrameCount {
            file_name: file_name.to_string(),
            frame_index,
            vehicles,
        }
    }

    #[test]
    fn test_only_frames_above_threshold_are_flagged() {
        let lookup = FrameLookup::from_counts(&[20, 5]);
        let plan: Vec<bool> = (0..2).map(|i| should_flag(&lookup, i, 15)).collect();
        assert_eq!(plan, vec![true, false]);
    }

    #[test]
    fn test_frames_beyond_counts_are_not_flagged() {
        assert!(!should_flag(&FrameLookup::from_counts(&[20]), 1, 15));
        assert!(!should_flag(&FrameLookup::from_counts(&[]), 0, 15));
    }

    #[test]
    fn test_gaps_in_frame_numbers_keep_counts_on_their_frame() {
        // Frames 2 and 3 had no detections and therefore no label file.
        let frames = [
            frame("clip_1.txt", Some(1), 3),
            frame("clip_4.txt", Some(4), 20),
            frame("clip_5.txt", Some(5), 2),
        ];
        let lookup = FrameLookup::from_frames(&frames);

        let plan: Vec<bool> = (0..6).map(|i| should_flag(&lookup, i, 15)).collect();
        assert_eq!(plan, vec![false, false, false, true, false, false]);
        assert_eq!(lookup.count_for(1), None);
        assert_eq!(lookup.count_for(4), Some(2));
    }

    #[test]
    fn test_zero_based_frame_numbers() {
        let frames = [frame("f_0.txt", Some(0), 16), frame("f_2.txt", Some(2), 1)];
        let lookup = FrameLookup::from_frames(&frames);

        assert_eq!(lookup.count_for(0), Some(16));
        assert_eq!(lookup.count_for(2), Some(1));
    }

    #[test]
    fn test_unnumbered_labels_fall_back_to_position() {
        let frames = [frame("a.txt", None, 20), frame("clip_7.txt", Some(7), 5)];
        let lookup = FrameLookup::from_frames(&frames);

        assert_eq!(lookup, FrameLookup::ByPosition(vec![20, 5]));
    }

    fn write_gray_video(path: &Path, width: i32, height: i32, frames: usize) {
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v').unwrap();
        let mut writer = VideoWriter::new(
            path.to_str().unwrap(),
            fourcc,
            25.0,
            core::Size::new(width, height),
            true,
        )
        .unwrap();
        assert!(writer.is_opened().unwrap());

        let gray = Mat::new_rows_cols_with_default(height, width, core::CV_8UC3, core::Scalar::all(128.0))
            .unwrap();
        for _ in 0..frames {
            writer.write(&gray).unwrap();
        }
        writer.release().unwrap();
    }

    /// Mean over all channels of a square patch, to ride out codec noise.
    fn patch_mean(mat: &Mat, top: i32, left: i32, size: i32) -> f64 {
        let mut sum = 0.0;
        for row in top..top + size {
            for col in left..left + size {
                sum += pixel(mat, row, col).iter().map(|&c| c as f64).sum::<f64>();
            }
        }
        sum / (size * size * 3) as f64
    }

    #[test]
    fn test_overlay_marks_congested_frame_only() {
        let dir = std::env::temp_dir().join(format!("overlay-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("source.mp4");
        write_gray_video(&source, 320, 240, 2);

        let processor = VideoProcessor::new(VideoConfig {
            output_dir: dir.join("out"),
            ..VideoConfig::default()
        });
        let summary = processor
            .write_overlay(&source, &FrameLookup::from_counts(&[20, 5]), 15)
            .unwrap();

        assert_eq!(summary.frames_written, 2);
        assert_eq!(summary.frames_flagged, 1);

        let mut reader = processor.open_video(&summary.output).unwrap();
        assert_eq!((reader.info.width, reader.info.height), (320, 240));

        let first = reader.read_frame().unwrap().unwrap();
        let second = reader.read_frame().unwrap().unwrap();
        assert_eq!((first.cols(), first.rows()), (320, 240));
        // Banner corner, left of and above the text.
        assert!((patch_mean(&first, 6, 6, 5) - 40.0).abs() < 25.0);
        assert!((patch_mean(&second, 6, 6, 5) - 128.0).abs() < 25.0);
        // Outside the banner both frames keep the source content.
        assert!((patch_mean(&first, 200, 280, 8) - 128.0).abs() < 25.0);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_alert_is_drawn_in_top_left_and_keeps_size() {
        let mut frame = gray_frame();
        draw_congestion_alert(&mut frame).unwrap();

        assert_eq!(frame.rows(), 240);
        assert_eq!(frame.cols(), 320);
        assert_eq!(pixel(&frame, 8, 8), [40, 40, 40]);
        // Bottom-right stays untouched.
        assert_eq!(pixel(&frame, 230, 310), [128, 128, 128]);
    }

    #[test]
    fn test_alert_text_uses_red() {
        let mut frame = gray_frame();
        draw_congestion_alert(&mut frame).unwrap();

        let mut red_pixels = 0;
        for row in 5..45 {
            for col in 5..300 {
                if pixel(&frame, row, col) == [0, 0, 255] {
                    red_pixels += 1;
                }
            }
        }
        assert!(red_pixels > 0);
    }

    #[test]
    fn test_unreadable_source_is_an_error() {
        let processor = VideoProcessor::new(VideoConfig {
            output_dir: std::env::temp_dir().join(format!("overlay-{}", uuid::Uuid::new_v4())),
            ..VideoConfig::default()
        });
        let missing = std::env::temp_dir().join(format!("missing-{}.mp4", uuid::Uuid::new_v4()));

        assert!(processor
            .write_overlay(&missing, &FrameLookup::from_counts(&[20]), 15)
            .is_err());
        assert!(processor.video_info(&missing).is_err());
    }
}
