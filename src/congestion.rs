// src/congestion.rs

use crate::types::StatusMessage;
use serde::Serialize;

/// Classification of a whole run.
///
/// `NoData` is distinct from `Normal`: an empty sequence says nothing about
/// the traffic, it only says the detector produced no labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Congestion {
    NoData,
    Normal,
    Congested,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CongestionReport {
    pub classification: Congestion,
    pub peak: Option<u32>,
    pub threshold: u32,
    /// Frames whose count is strictly above the threshold.
    pub congested_frames: usize,
}

impl CongestionReport {
    pub fn status_message(&self) -> StatusMessage {
        match (self.classification, self.peak) {
            (Congestion::Congested, Some(peak)) => {
                StatusMessage::error(format!("🚨 Peak congestion: {} vehicles", peak))
            }
            (Congestion::Normal, _) => StatusMessage::success("✅ Traffic normal"),
            _ => StatusMessage::warning("No vehicle counts available, congestion unknown"),
        }
    }
}

pub fn analyze(counts: &[u32], threshold: u32) -> CongestionReport {
    let peak = counts.iter().copied().max();

    let classification = match peak {
        None => Congestion::NoData,
        Some(p) if p > threshold => Congestion::Congested,
        Some(_) => Congestion::Normal,
    };

    CongestionReport {
        classification,
        peak,
        threshold,
        congested_frames: counts.iter().filter(|&&c| c > threshold).count(),
    }
}
