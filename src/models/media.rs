use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::category::CategoryScores;

/// Probe result for one source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
    pub file_size: u64,
}

impl VideoMetadata {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// One sampled instant of the video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameSample {
    pub index: u32,
    pub timestamp: f64,
    pub image_ref: PathBuf,
    /// Size of the extracted image in bytes; seeds the local simulator.
    pub byte_size: u64,
    /// Populated once by the vision provider.
    pub signals: Option<FrameSignals>,
}

impl FrameSample {
    pub fn new(index: u32, timestamp: f64, image_ref: PathBuf, byte_size: u64) -> Self {
        Self {
            index,
            timestamp,
            image_ref,
            byte_size,
            signals: None,
        }
    }

    pub fn scored(self, signals: FrameSignals) -> Self {
        Self {
            signals: Some(signals),
            ..self
        }
    }

    /// Scores for this frame, all-zero if it was never scored.
    pub fn scores(&self) -> CategoryScores {
        self.signals.as_ref().map(|s| s.scores).unwrap_or_default()
    }
}

/// What a vision provider reports for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameSignals {
    pub scores: CategoryScores,
    pub objects: Vec<String>,
    pub faces: u32,
    pub scene_label: String,
    pub confidence: f64,
    /// Which provider produced the values, e.g. `remote` or `simulator-v1`.
    pub source: String,
}
