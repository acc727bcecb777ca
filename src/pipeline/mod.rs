//! Stage sequencing for one analysis job.

pub mod batch;
pub mod progress;
pub mod setup;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::analysis::{aggregate, aggregate_text_scores, TextAnalyzer, TimelineBuilder, TimelineConfig};
use crate::config::PipelineConfig;
use crate::db::models::{AnalysisResults, NewJob};
use crate::db::Database;
use crate::error::{PipelineError, PipelineResult};
use crate::media::{expected_frames, sampling_fps, MediaExtractor};
use crate::models::{AnalysisJob, JobStatus, ScoreVector, Stage, Transcript, Verdict};
use crate::signals::{FallbackTranscriber, FallbackVision};
use crate::verdict::classify::Classifier;
use crate::verdict::{ReportInput, VerdictRenderer};

pub use progress::{PipelineEvent, ProgressBus};

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub job_id: String,
    pub verdict: Verdict,
    pub scores: ScoreVector,
    pub frames: usize,
    pub timeline_events: usize,
    pub flagged_segments: usize,
    pub transcript_source: String,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub work_dir: PathBuf,
    pub max_frames: u32,
    pub progress_every_frames: u32,
    pub keep_artifacts: bool,
}

impl PipelineOptions {
    pub fn new(work_dir: PathBuf, config: &PipelineConfig) -> Self {
        Self {
            work_dir,
            max_frames: config.max_frames,
            progress_every_frames: config.progress_every_frames.max(1),
            keep_artifacts: config.keep_artifacts,
        }
    }
}

/// Persistence failures end the run.
fn persist<T>(result: anyhow::Result<T>) -> PipelineResult<T> {
    result.map_err(PipelineError::Persistence)
}

/// Orchestrates extraction, scoring, aggregation and reporting for a job.
/// Shareable across threads; each run takes its own store connection.
pub struct Pipeline {
    extractor: Box<dyn MediaExtractor>,
    vision: FallbackVision,
    transcriber: FallbackTranscriber,
    text: TextAnalyzer,
    timeline: TimelineBuilder,
    renderer: VerdictRenderer,
    bus: ProgressBus,
    options: PipelineOptions,
}

impl Pipeline {
    /// A pipeline using the local simulators and default thresholds.
    pub fn new(extractor: Box<dyn MediaExtractor>, options: PipelineOptions) -> Self {
        Self {
            extractor,
            vision: FallbackVision::local(),
            transcriber: FallbackTranscriber::local(),
            text: TextAnalyzer::new(),
            timeline: TimelineBuilder::new(TimelineConfig::default()),
            renderer: VerdictRenderer::new(Classifier::default(), None),
            bus: ProgressBus::new(),
            options,
        }
    }

    pub fn with_vision(mut self, vision: FallbackVision) -> Self {
        self.vision = vision;
        self
    }

    pub fn with_transcriber(mut self, transcriber: FallbackTranscriber) -> Self {
        self.transcriber = transcriber;
        self
    }

    pub fn with_timeline(mut self, config: TimelineConfig) -> Self {
        self.timeline = TimelineBuilder::new(config);
        self
    }

    pub fn with_renderer(mut self, renderer: VerdictRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_bus(mut self, bus: ProgressBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    /// Run a queued job to completion. A job that is already running is
    /// rejected without touching its record.
    pub fn run(&self, db: &Database, job_id: &str) -> PipelineResult<RunSummary> {
        if !persist(db.try_mark_running(job_id))? {
            return Err(match persist(db.get_job(job_id))? {
                None => PipelineError::JobNotFound(job_id.to_string()),
                Some(job) if job.status == JobStatus::Completed => {
                    PipelineError::AlreadyCompleted(job_id.to_string())
                }
                Some(_) => PipelineError::AlreadyRunning(job_id.to_string()),
            });
        }

        let job = persist(db.get_job(job_id))?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;
        info!("Starting job {} ({})", job.id, job.source_path);

        let work = self.options.work_dir.join(&job.id);
        let outcome = self.execute(db, &job, &work);

        if !self.options.keep_artifacts {
            if let Err(e) = std::fs::remove_dir_all(&work) {
                debug!("Could not remove {}: {e}", work.display());
            }
        }

        match outcome {
            Ok(summary) => {
                info!(
                    "Job {} completed: {} / {}",
                    job.id, summary.verdict.label, summary.verdict.recommended_action
                );
                self.bus.publish(PipelineEvent::Completed {
                    job_id: job.id.clone(),
                    owner: job.owner.clone(),
                    label: summary.verdict.label,
                    recommended_action: summary.verdict.recommended_action,
                    score_vector: summary.scores,
                    report_text: summary.verdict.report_text.clone(),
                    timeline_event_count: summary.timeline_events,
                });
                Ok(summary)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("Job {} failed: {reason}", job.id);
                if let Err(mark_err) = db.mark_failed(&job.id, &reason) {
                    warn!("Could not record failure of job {}: {mark_err:#}", job.id);
                }
                self.bus.publish(PipelineEvent::Failed {
                    job_id: job.id.clone(),
                    owner: job.owner.clone(),
                    error_message: reason,
                });
                Err(e)
            }
        }
    }

    fn execute(&self, db: &Database, job: &AnalysisJob, work: &Path) -> PipelineResult<RunSummary> {
        let source = Path::new(&job.source_path);

        // Metadata
        self.advance(db, job, Stage::Metadata, 0.0, Stage::Metadata.display_name())?;
        let meta = self.extractor.extract_metadata(source)?;
        persist(db.save_metadata(&job.id, &meta))?;
        self.advance(
            db,
            job,
            Stage::Metadata,
            1.0,
            &format!("{:.1}s, {}", meta.duration_seconds, meta.resolution()),
        )?;

        // Frames
        let fps = sampling_fps(meta.duration_seconds, self.options.max_frames);
        self.advance(
            db,
            job,
            Stage::Frames,
            0.0,
            &format!(
                "Sampling ~{} frames at {fps:.3} fps",
                expected_frames(meta.duration_seconds, fps)
            ),
        )?;
        let mut flush_error = None;
        let mut last_pct = Stage::Frames.progress_at(0.0);
        let mut on_progress = |fraction: f64| {
            let pct = Stage::Frames.progress_at(fraction);
            if pct > last_pct && flush_error.is_none() {
                last_pct = pct;
                if let Err(e) = self.advance(db, job, Stage::Frames, fraction, Stage::Frames.display_name()) {
                    flush_error = Some(e);
                }
            }
        };
        let frames = self.extractor.extract_frames(
            source,
            meta.duration_seconds,
            &work.join("frames"),
            fps,
            &mut on_progress,
        )?;
        if let Some(e) = flush_error {
            return Err(e);
        }

        // Audio
        self.advance(db, job, Stage::Audio, 0.0, Stage::Audio.display_name())?;
        let audio = if meta.has_audio {
            self.extractor.extract_audio(source, &work.join("audio.wav"))?
        } else {
            None
        };
        self.advance(
            db,
            job,
            Stage::Audio,
            1.0,
            if audio.is_some() { "Audio extracted" } else { "No audio track" },
        )?;

        // Vision
        let total = frames.len();
        let every = self.options.progress_every_frames as usize;
        let mut scored = Vec::with_capacity(total);
        for (i, frame) in frames.into_iter().enumerate() {
            let signals = self.vision.score(&frame, meta.file_size);
            debug!("Frame {} @ {:.2}s scored by {}", frame.index, frame.timestamp, signals.source);
            scored.push(frame.scored(signals));

            let done = i + 1;
            if done % every == 0 || done == total {
                self.advance(
                    db,
                    job,
                    Stage::Vision,
                    done as f64 / total.max(1) as f64,
                    &format!("Scored {done}/{total} frames"),
                )?;
            }
        }
        let frames = scored;

        // Transcription
        self.advance(db, job, Stage::Transcription, 0.0, Stage::Transcription.display_name())?;
        let mut transcript = match audio {
            Some(ref path) => self.transcriber.transcribe(path),
            None => Transcript::empty(),
        };
        persist(db.save_transcript(&job.id, &transcript))?;
        self.advance(
            db,
            job,
            Stage::Transcription,
            1.0,
            &format!("{} segments ({})", transcript.segments.len(), transcript.source.tag()),
        )?;

        // Text analysis
        self.advance(db, job, Stage::TextAnalysis, 0.0, Stage::TextAnalysis.display_name())?;
        transcript.segments = self.text.analyze(&transcript.segments);
        let flagged_segments = transcript.flagged_segments().count();
        persist(db.save_transcript(&job.id, &transcript))?;

        // Aggregation and timeline
        self.advance(db, job, Stage::Aggregation, 0.0, Stage::Aggregation.display_name())?;
        let text_scores = aggregate_text_scores(&transcript.segments);
        let scores = aggregate(&frames, &text_scores, flagged_segments);
        let timeline = self.timeline.build(&frames, &transcript.segments);

        // Report
        self.advance(db, job, Stage::Report, 0.0, Stage::Report.display_name())?;
        let input = ReportInput {
            scores: &scores,
            timeline: &timeline,
            frames: &frames,
            transcript: &transcript,
            duration_seconds: meta.duration_seconds,
        };
        let verdict = self.renderer.render(&input, vision_tag(&frames));

        // Persist
        self.advance(db, job, Stage::Persist, 0.0, Stage::Persist.display_name())?;
        persist(db.save_results(
            &job.id,
            &AnalysisResults {
                frames: &frames,
                scores: &scores,
                timeline: &timeline,
                verdict: &verdict,
            },
        ))?;
        self.bus.publish(PipelineEvent::Progress {
            job_id: job.id.clone(),
            owner: job.owner.clone(),
            stage: Stage::Done,
            progress: 100,
            message: Stage::Done.display_name().to_string(),
        });

        Ok(RunSummary {
            job_id: job.id.clone(),
            scores,
            frames: frames.len(),
            timeline_events: timeline.len(),
            flagged_segments,
            transcript_source: transcript.source.tag(),
            verdict,
        })
    }

    /// Persist stage/progress on the job record, then publish it.
    fn advance(
        &self,
        db: &Database,
        job: &AnalysisJob,
        stage: Stage,
        fraction: f64,
        message: &str,
    ) -> PipelineResult<()> {
        let progress = stage.progress_at(fraction);
        persist(db.update_progress(&job.id, stage, progress, message))?;
        if fraction == 0.0 {
            info!("Job {}: {}", job.id, stage.display_name());
        }
        self.bus.publish(PipelineEvent::Progress {
            job_id: job.id.clone(),
            owner: job.owner.clone(),
            stage,
            progress,
            message: message.to_string(),
        });
        Ok(())
    }
}

/// Distinct signal sources across frames, e.g. `yolo+simulator-v1` when
/// some remote calls fell back.
fn vision_tag(frames: &[crate::models::FrameSample]) -> String {
    let sources: BTreeSet<&str> = frames
        .iter()
        .filter_map(|f| f.signals.as_ref())
        .map(|s| s.source.as_str())
        .collect();
    if sources.is_empty() {
        "none".to_string()
    } else {
        sources.into_iter().collect::<Vec<_>>().join("+")
    }
}

/// Queue a video for analysis. The path must point at an existing file.
pub fn queue_video(db: &Database, path: &Path, owner: &str) -> PipelineResult<AnalysisJob> {
    let source = path
        .canonicalize()
        .map_err(|e| PipelineError::media_read(path, e.to_string()))?;
    if !source.is_file() {
        return Err(PipelineError::media_read(path, "not a regular file"));
    }
    persist(db.create_job(&NewJob {
        owner: owner.to_string(),
        source_path: source.to_string_lossy().into_owned(),
        supersedes: None,
    }))
}

/// Queue a fresh job for the same video. The original stays as history.
pub fn reprocess(db: &Database, job_id: &str) -> PipelineResult<AnalysisJob> {
    let original = persist(db.get_job(job_id))?
        .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;
    if original.status == JobStatus::Running {
        return Err(PipelineError::AlreadyRunning(job_id.to_string()));
    }
    persist(db.create_job(&NewJob {
        owner: original.owner,
        source_path: original.source_path,
        supersedes: Some(original.id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FrameSample, FrameSignals};

    #[test]
    fn vision_tag_lists_distinct_sources() {
        let signals = |source: &str| FrameSignals {
            scores: Default::default(),
            objects: vec![],
            faces: 0,
            scene_label: String::new(),
            confidence: 0.5,
            source: source.into(),
        };
        let frames = vec![
            FrameSample::new(0, 0.0, PathBuf::from("a"), 1).scored(signals("yolo")),
            FrameSample::new(1, 0.5, PathBuf::from("b"), 1).scored(signals("simulator-v1")),
            FrameSample::new(2, 1.0, PathBuf::from("c"), 1).scored(signals("yolo")),
        ];
        assert_eq!(vision_tag(&frames), "simulator-v1+yolo");
        assert_eq!(vision_tag(&[]), "none");
    }
}
