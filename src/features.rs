// src/features.rs

use serde::Serialize;

/// Snapshot of the last analysed frame for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub vehicle_count: u32,
    /// No speed estimator exists yet; always `None`.
    pub avg_speed: Option<f32>,
    /// Wall-clock hour at extraction time, not a video timestamp.
    pub hour: u32,
    /// Vehicles per frame pixel, as a percentage.
    pub occupancy_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeatureStatus {
    Available { record: FeatureRecord },
    Unavailable { reason: String },
}

/// Build the feature record from the last count and the frame size.
///
/// `frame_size` is `None` when the source video could not be opened.
pub fn extract(counts: &[u32], frame_size: Option<(i32, i32)>, hour: u32) -> FeatureStatus {
    let Some(&last) = counts.last() else {
        return FeatureStatus::Unavailable {
            reason: "no vehicle counts".to_string(),
        };
    };

    let Some((width, height)) = frame_size else {
        return FeatureStatus::Unavailable {
            reason: "frame size unknown".to_string(),
        };
    };

    let area = width as f64 * height as f64;
    if area <= 0.0 {
        return FeatureStatus::Unavailable {
            reason: format!("invalid frame size {}x{}", width, height),
        };
    }

    FeatureStatus::Available {
        record: FeatureRecord {
            vehicle_count: last,
            avg_speed: None,
            hour,
            occupancy_ratio: last as f64 / area * 100.0,
        },
    }
}
