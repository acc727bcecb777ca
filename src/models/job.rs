use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Metadata,
    Frames,
    Audio,
    Vision,
    Transcription,
    TextAnalysis,
    Aggregation,
    Report,
    Persist,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Metadata => "metadata",
            Stage::Frames => "frames",
            Stage::Audio => "audio",
            Stage::Vision => "vision",
            Stage::Transcription => "transcription",
            Stage::TextAnalysis => "text_analysis",
            Stage::Aggregation => "aggregation",
            Stage::Report => "report",
            Stage::Persist => "persist",
            Stage::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Stage::Queued),
            "metadata" => Some(Stage::Metadata),
            "frames" => Some(Stage::Frames),
            "audio" => Some(Stage::Audio),
            "vision" => Some(Stage::Vision),
            "transcription" => Some(Stage::Transcription),
            "text_analysis" => Some(Stage::TextAnalysis),
            "aggregation" => Some(Stage::Aggregation),
            "report" => Some(Stage::Report),
            "persist" => Some(Stage::Persist),
            "done" => Some(Stage::Done),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Queued => "Queued",
            Stage::Metadata => "Reading video metadata",
            Stage::Frames => "Extracting frames",
            Stage::Audio => "Extracting audio",
            Stage::Vision => "Scoring frames",
            Stage::Transcription => "Transcribing audio",
            Stage::TextAnalysis => "Analyzing transcript",
            Stage::Aggregation => "Aggregating scores",
            Stage::Report => "Generating report",
            Stage::Persist => "Saving results",
            Stage::Done => "Analysis complete",
        }
    }

    /// Progress percent window `[start, end]` this stage covers.
    /// Extraction (metadata, frames, audio) owns 0–25%.
    pub fn progress_range(&self) -> (u8, u8) {
        match self {
            Stage::Queued => (0, 0),
            Stage::Metadata => (0, 5),
            Stage::Frames => (5, 20),
            Stage::Audio => (20, 25),
            Stage::Vision => (25, 60),
            Stage::Transcription => (60, 75),
            Stage::TextAnalysis => (75, 80),
            Stage::Aggregation => (80, 85),
            Stage::Report => (85, 95),
            Stage::Persist => (95, 100),
            Stage::Done => (100, 100),
        }
    }

    /// Overall percent for a fraction (0..=1) of this stage's work.
    pub fn progress_at(&self, fraction: f64) -> u8 {
        let (lo, hi) = self.progress_range();
        let f = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
        lo + ((hi - lo) as f64 * f).round() as u8
    }
}

/// One video's pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: String,
    pub owner: String,
    pub source_path: String,
    pub file_size: Option<u64>,
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_audio: Option<bool>,
    pub stage: Stage,
    pub progress: u8,
    pub stage_message: String,
    pub status: JobStatus,
    pub failure_reason: Option<String>,
    pub supersedes: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl AnalysisJob {
    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{w}x{h}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_stages_stay_within_first_quarter() {
        assert_eq!(Stage::Metadata.progress_at(0.0), 0);
        assert_eq!(Stage::Frames.progress_at(0.5), 13);
        assert_eq!(Stage::Audio.progress_at(1.0), 25);
    }

    #[test]
    fn stage_names_round_trip() {
        for s in [
            Stage::Queued,
            Stage::Metadata,
            Stage::Frames,
            Stage::Audio,
            Stage::Vision,
            Stage::Transcription,
            Stage::TextAnalysis,
            Stage::Aggregation,
            Stage::Report,
            Stage::Persist,
            Stage::Done,
        ] {
            assert_eq!(Stage::from_str(s.as_str()), Some(s));
        }
    }
}
