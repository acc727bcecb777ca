//! Domain types shared by every pipeline stage.

pub mod category;
pub mod job;
pub mod media;
pub mod timeline;
pub mod transcript;
pub mod verdict;

pub use category::{Category, CategoryScores, ScoreVector};
pub use job::{AnalysisJob, JobStatus, Stage};
pub use media::{FrameSample, FrameSignals, VideoMetadata};
pub use timeline::TimelineEvent;
pub use transcript::{Sentiment, Transcript, TranscriptSegment, TranscriptSource};
pub use verdict::{Action, Label, ModelTags, Verdict};
