use serde::{Deserialize, Serialize};

use super::category::{Category, CategoryScores};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Sentiment::Positive),
            "neutral" => Some(Sentiment::Neutral),
            "negative" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

/// One timed piece of speech. Created unscored by the transcriber and
/// completed by the text analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: Option<f64>,
    pub text: String,
    #[serde(default)]
    pub scores: CategoryScores,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub primary_category: Option<Category>,
    #[serde(default)]
    pub sentiment: Sentiment,
}

impl TranscriptSegment {
    pub fn unscored(start: f64, end: Option<f64>, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            scores: CategoryScores::default(),
            flagged: false,
            primary_category: None,
            sentiment: Sentiment::Neutral,
        }
    }
}

/// Where a transcript came from. Simulated transcripts keep the pipeline
/// moving but must never be presented as real speech recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptSource {
    /// The video has no audio track.
    None,
    Remote { model: String },
    SimulatedFallback,
}

impl TranscriptSource {
    pub fn tag(&self) -> String {
        match self {
            TranscriptSource::None => "none".to_string(),
            TranscriptSource::Remote { model } => format!("remote:{model}"),
            TranscriptSource::SimulatedFallback => "simulated-fallback".to_string(),
        }
    }

    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "none" => TranscriptSource::None,
            "simulated-fallback" => TranscriptSource::SimulatedFallback,
            other => TranscriptSource::Remote {
                model: other.strip_prefix("remote:").unwrap_or(other).to_string(),
            },
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, TranscriptSource::SimulatedFallback)
    }
}

impl Serialize for TranscriptSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.tag())
    }
}

impl<'de> Deserialize<'de> for TranscriptSource {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(TranscriptSource::from_tag(&tag))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub full_text: String,
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
    pub source: TranscriptSource,
}

impl Transcript {
    /// Transcript for a video without an audio track.
    pub fn empty() -> Self {
        Self {
            full_text: String::new(),
            language: String::new(),
            segments: Vec::new(),
            source: TranscriptSource::None,
        }
    }

    pub fn flagged_segments(&self) -> impl Iterator<Item = &TranscriptSegment> {
        self.segments.iter().filter(|s| s.flagged)
    }
}
