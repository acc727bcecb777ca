use serde::{Deserialize, Serialize};

use crate::models::{FrameSample, JobStatus, ScoreVector, TimelineEvent, Verdict};

/// Data needed to queue a new job (no auto-generated fields).
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner: String,
    pub source_path: String,
    pub supersedes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub owner: Option<String>,
    pub limit: usize,
}

/// Everything written in the final transaction of a run.
#[derive(Debug, Clone)]
pub struct AnalysisResults<'a> {
    pub frames: &'a [FrameSample],
    pub scores: &'a ScoreVector,
    pub timeline: &'a [TimelineEvent],
    pub verdict: &'a Verdict,
}

/// Stats returned by `vmod stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    pub jobs: i64,
    pub frames: i64,
    pub transcript_segments: i64,
    pub timeline_events: i64,
    pub statuses: Vec<NamedCount>,
    pub labels: Vec<NamedCount>,
    pub db_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}
