// src/chart.rs
//
// Line chart of per-frame vehicle counts, drawn with OpenCV primitives and
// written as PNG.

use anyhow::{Context, Result};
use opencv::{
    core::{self, Mat, Vector},
    imgcodecs, imgproc,
    prelude::*,
};
use std::path::Path;
use tracing::info;

pub const CHART_WIDTH: i32 = 800;
pub const CHART_HEIGHT: i32 = 450;

const MARGIN_LEFT: i32 = 60;
const MARGIN_RIGHT: i32 = 20;
const MARGIN_TOP: i32 = 50;
const MARGIN_BOTTOM: i32 = 50;

const DASH_LEN: i32 = 10;
const DASH_GAP: i32 = 8;
const Y_TICKS: u32 = 5;

pub mod colors {
    use opencv::core::Scalar;

    pub const BACKGROUND: Scalar = Scalar::new(255.0, 255.0, 255.0, 0.0);
    pub const AXIS: Scalar = Scalar::new(0.0, 0.0, 0.0, 0.0);
    pub const GRID_TEXT: Scalar = Scalar::new(80.0, 80.0, 80.0, 0.0);
    pub const SERIES: Scalar = Scalar::new(180.0, 119.0, 31.0, 0.0);
    pub const THRESHOLD: Scalar = Scalar::new(0.0, 0.0, 255.0, 0.0);
}

/// Maps (frame index, count) to canvas pixels.
#[derive(Debug, Clone, Copy)]
pub struct PlotArea {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub x_max: usize,
    pub y_max: f64,
}

impl PlotArea {
    pub fn new(num_frames: usize, peak: u32, threshold: u32) -> Self {
        // Headroom so neither the peak nor the threshold sits on the frame.
        let top_value = peak.max(threshold) as f64;
        Self {
            left: MARGIN_LEFT,
            top: MARGIN_TOP,
            width: CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT,
            height: CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM,
            x_max: num_frames.saturating_sub(1).max(1),
            y_max: (top_value * 1.15).ceil().max(1.0),
        }
    }

    pub fn x(&self, frame: usize) -> i32 {
        self.left + ((frame as f64 / self.x_max as f64) * self.width as f64).round() as i32
    }

    pub fn y(&self, value: f64) -> i32 {
        let bottom = self.top + self.height;
        bottom - ((value / self.y_max) * self.height as f64).round() as i32
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }
}

/// Render the count sequence with a dashed threshold line.
pub fn render_chart(counts: &[u32], threshold: u32) -> Result<Mat> {
    let peak = counts
        .iter()
        .copied()
        .max()
        .context("No vehicle counts to plot")?;

    let area = PlotArea::new(counts.len(), peak, threshold);
    let mut canvas = Mat::new_rows_cols_with_default(
        CHART_HEIGHT,
        CHART_WIDTH,
        core::CV_8UC3,
        colors::BACKGROUND,
    )?;

    draw_axes(&mut canvas, &area, counts.len())?;

    // Count series
    let points: Vec<core::Point> = counts
        .iter()
        .enumerate()
        .map(|(i, &c)| core::Point::new(area.x(i), area.y(c as f64)))
        .collect();
    if points.len() == 1 {
        imgproc::circle(&mut canvas, points[0], 3, colors::SERIES, -1, imgproc::LINE_8, 0)?;
    }
    for window in points.windows(2) {
        imgproc::line(
            &mut canvas,
            window[0],
            window[1],
            colors::SERIES,
            2,
            imgproc::LINE_AA,
            0,
        )?;
    }

    draw_dashed_hline(
        &mut canvas,
        area.y(threshold as f64),
        area.left,
        area.right(),
        colors::THRESHOLD,
    )?;

    imgproc::put_text(
        &mut canvas,
        &format!("Vehicle count per frame (peak: {})", peak),
        core::Point::new(MARGIN_LEFT, 32),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.7,
        colors::AXIS,
        2,
        imgproc::LINE_AA,
        false,
    )?;

    imgproc::put_text(
        &mut canvas,
        &format!("threshold {}", threshold),
        core::Point::new(area.right() - 110, area.y(threshold as f64) - 6),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.45,
        colors::THRESHOLD,
        1,
        imgproc::LINE_AA,
        false,
    )?;

    Ok(canvas)
}

pub fn save_chart(counts: &[u32], threshold: u32, path: &Path) -> Result<()> {
    let canvas = render_chart(counts, threshold)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create chart dir {}", parent.display()))?;
    }

    let path_str = path
        .to_str()
        .with_context(|| format!("Non UTF-8 chart path {}", path.display()))?;
    if !imgcodecs::imwrite(path_str, &canvas, &Vector::new())? {
        anyhow::bail!("Failed to write chart {}", path.display());
    }

    info!("✓ Chart written to {}", path.display());
    Ok(())
}

fn draw_axes(canvas: &mut Mat, area: &PlotArea, num_frames: usize) -> Result<()> {
    let origin = core::Point::new(area.left, area.bottom());

    imgproc::line(
        canvas,
        origin,
        core::Point::new(area.right(), area.bottom()),
        colors::AXIS,
        1,
        imgproc::LINE_8,
        0,
    )?;
    imgproc::line(
        canvas,
        origin,
        core::Point::new(area.left, area.top),
        colors::AXIS,
        1,
        imgproc::LINE_8,
        0,
    )?;

    for step in 0..=Y_TICKS {
        let value = area.y_max * step as f64 / Y_TICKS as f64;
        let y = area.y(value);
        imgproc::line(
            canvas,
            core::Point::new(area.left - 5, y),
            core::Point::new(area.left, y),
            colors::AXIS,
            1,
            imgproc::LINE_8,
            0,
        )?;
        put_small_text(canvas, &format!("{:.0}", value), area.left - 45, y + 4)?;
    }

    let last = num_frames.saturating_sub(1);
    let mut x_ticks = vec![0, last / 2, last];
    x_ticks.dedup();
    for frame in x_ticks {
        let x = area.x(frame);
        imgproc::line(
            canvas,
            core::Point::new(x, area.bottom()),
            core::Point::new(x, area.bottom() + 5),
            colors::AXIS,
            1,
            imgproc::LINE_8,
            0,
        )?;
        put_small_text(canvas, &frame.to_string(), x - 8, area.bottom() + 20)?;
    }

    put_small_text(canvas, "frame", area.right() - 40, area.bottom() + 40)?;
    put_small_text(canvas, "vehicles", 5, area.top - 10)?;
    Ok(())
}

fn draw_dashed_hline(canvas: &mut Mat, y: i32, x0: i32, x1: i32, color: core::Scalar) -> Result<()> {
    let mut x = x0;
    while x < x1 {
        let end = (x + DASH_LEN).min(x1);
        imgproc::line(
            canvas,
            core::Point::new(x, y),
            core::Point::new(end, y),
            color,
            2,
            imgproc::LINE_8,
            0,
        )?;
        x += DASH_LEN + DASH_GAP;
    }
    Ok(())
}

fn put_small_text(canvas: &mut Mat, text: &str, x: i32, y: i32) -> Result<()> {
    imgproc::put_text(
        canvas,
        text,
        core::Point::new(x, y),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.4,
        colors::GRID_TEXT,
        1,
        imgproc::LINE_AA,
        false,
    )?;
    Ok(())
}
