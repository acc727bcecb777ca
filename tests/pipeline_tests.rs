use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use vmod::db::Database;
use vmod::error::{PipelineError, PipelineResult, ProviderError};
use vmod::media::MediaExtractor;
use vmod::models::{
    Action, Category, FrameSample, JobStatus, Label, Stage, Transcript, TranscriptSegment, TranscriptSource,
    VideoMetadata,
};
use vmod::pipeline::batch::run_batch;
use vmod::pipeline::{self, Pipeline, PipelineEvent, PipelineOptions};
use vmod::signals::{FallbackTranscriber, FallbackVision, RemoteVision, Transcriber};

/// Writes `count` frame files of `frame_bytes` each, one every half second.
struct FakeExtractor {
    duration: f64,
    has_audio: bool,
    frame_bytes: usize,
    fail_frames: bool,
}

impl FakeExtractor {
    fn blank(duration: f64) -> Self {
        Self {
            duration,
            has_audio: false,
            frame_bytes: 512,
            fail_frames: false,
        }
    }
}

impl MediaExtractor for FakeExtractor {
    fn extract_metadata(&self, _path: &Path) -> PipelineResult<VideoMetadata> {
        Ok(VideoMetadata {
            duration_seconds: self.duration,
            width: 1280,
            height: 720,
            has_audio: self.has_audio,
            file_size: 3_500_000,
        })
    }

    fn extract_frames(
        &self,
        path: &Path,
        duration_seconds: f64,
        out_dir: &Path,
        fps: f64,
        progress: &mut dyn FnMut(f64),
    ) -> PipelineResult<Vec<FrameSample>> {
        if self.fail_frames {
            return Err(PipelineError::media_read(path, "corrupt stream"));
        }
        std::fs::create_dir_all(out_dir)?;
        let count = (duration_seconds * fps).ceil() as u32;
        let mut frames = Vec::new();
        for i in 0..count {
            let image = out_dir.join(format!("frame_{:05}.jpg", i + 1));
            std::fs::write(&image, vec![0x5a; self.frame_bytes])?;
            frames.push(FrameSample::new(i, i as f64 / fps, image, self.frame_bytes as u64));
            progress((i + 1) as f64 / count as f64);
        }
        Ok(frames)
    }

    fn extract_audio(&self, _path: &Path, out_path: &Path) -> PipelineResult<Option<PathBuf>> {
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(out_path, b"RIFF")?;
        Ok(Some(out_path.to_path_buf()))
    }
}

struct ScriptedTranscriber {
    segments: Vec<(f64, &'static str)>,
}

impl Transcriber for ScriptedTranscriber {
    fn name(&self) -> String {
        "scripted".into()
    }

    fn transcribe(&self, _audio: &Path) -> Result<Transcript, ProviderError> {
        let segments: Vec<TranscriptSegment> = self
            .segments
            .iter()
            .map(|&(start, text)| TranscriptSegment::unscored(start, Some(start + 3.0), text))
            .collect();
        Ok(Transcript {
            full_text: self.segments.iter().map(|s| s.1).collect::<Vec<_>>().join(" "),
            language: "en".into(),
            segments,
            source: TranscriptSource::Remote {
                model: "scripted".into(),
            },
        })
    }
}

struct Fixture {
    _dir: TempDir,
    db: Database,
    video: PathBuf,
    work: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        let work = dir.path().join("work");
        Self {
            db: Database::open_in_memory().unwrap(),
            video,
            work,
            _dir: dir,
        }
    }

    fn pipeline(&self, extractor: FakeExtractor) -> Pipeline {
        Pipeline::new(
            Box::new(extractor),
            PipelineOptions {
                work_dir: self.work.clone(),
                max_frames: 300,
                progress_every_frames: 5,
                keep_artifacts: false,
            },
        )
    }

    fn queue(&self) -> String {
        pipeline::queue_video(&self.db, &self.video, "alice").unwrap().id
    }
}

#[test]
fn blank_silent_video_is_safe_to_publish() {
    let fx = Fixture::new();
    let p = fx.pipeline(FakeExtractor::blank(10.0));
    let id = fx.queue();

    let summary = p.run(&fx.db, &id).unwrap();

    assert_eq!(summary.frames, 20);
    assert_eq!(summary.verdict.label, Label::Safe);
    assert_eq!(summary.verdict.recommended_action, Action::Publish);
    assert_eq!(summary.timeline_events, 0);
    assert_eq!(summary.transcript_source, "none");
    assert!(summary.verdict.report_text.contains("No concerning content"));

    let job = fx.db.get_job(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.has_audio, Some(false));
    assert!(fx.db.get_verdict(&id).unwrap().is_some());
    assert!(!fx.work.join(&id).exists());
}

#[test]
fn hateful_segment_lands_on_timeline() {
    let fx = Fixture::new();
    let p = fx
        .pipeline(FakeExtractor {
            has_audio: true,
            ..FakeExtractor::blank(20.0)
        })
        .with_transcriber(FallbackTranscriber::new(Some(Box::new(ScriptedTranscriber {
            segments: vec![
                (0.0, "Welcome back to the channel"),
                (12.0, "Those people are vermin and do not belong here"),
            ],
        }))));
    let id = fx.queue();

    let summary = p.run(&fx.db, &id).unwrap();

    assert_eq!(summary.flagged_segments, 1);
    assert!((summary.scores.get(Category::HateSpeech) - 0.4).abs() < 1e-9);
    assert_eq!(summary.verdict.label, Label::Review);
    assert_eq!(summary.verdict.recommended_action, Action::AgeRestrict);
    assert_eq!(summary.verdict.models.transcript, "remote:scripted");

    let timeline = fx.db.get_timeline(&id).unwrap();
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].category, Category::HateSpeech);
    assert_eq!(timeline[0].start, 12.0);
    assert_eq!(timeline[0].end, 15.0);

    let transcript = fx.db.get_transcript(&id).unwrap().unwrap();
    assert_eq!(transcript.segments.len(), 2);
    assert!(transcript.segments[1].flagged);
}

#[test]
fn frame_failure_fails_job_but_keeps_metadata() {
    let fx = Fixture::new();
    let p = fx.pipeline(FakeExtractor {
        fail_frames: true,
        ..FakeExtractor::blank(10.0)
    });
    let id = fx.queue();
    let events = p.bus().subscribe_job(&id);

    let err = p.run(&fx.db, &id).unwrap_err();
    assert!(matches!(err, PipelineError::MediaRead { .. }));

    let job = fx.db.get_job(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.duration_seconds, Some(10.0));
    assert!(job.failure_reason.unwrap().contains("corrupt stream"));
    assert!(fx.db.get_verdict(&id).unwrap().is_none());

    let received: Vec<PipelineEvent> = events.try_iter().collect();
    assert!(matches!(received.last(), Some(PipelineEvent::Failed { .. })));
    assert!(received
        .iter()
        .any(|e| matches!(e, PipelineEvent::Progress { stage: Stage::Metadata, .. })));
}

#[test]
fn running_job_cannot_be_started_twice() {
    let fx = Fixture::new();
    let p = fx.pipeline(FakeExtractor::blank(5.0));
    let id = fx.queue();

    assert!(fx.db.try_mark_running(&id).unwrap());
    let err = p.run(&fx.db, &id).unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyRunning(_)));
    assert_eq!(fx.db.get_job(&id).unwrap().unwrap().status, JobStatus::Running);
}

#[test]
fn completed_job_is_reprocessed_as_new_job() {
    let fx = Fixture::new();
    let p = fx.pipeline(FakeExtractor::blank(5.0));
    let id = fx.queue();
    p.run(&fx.db, &id).unwrap();

    let err = p.run(&fx.db, &id).unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyCompleted(_)));

    let again = pipeline::reprocess(&fx.db, &id).unwrap();
    assert_ne!(again.id, id);
    assert_eq!(again.supersedes.as_deref(), Some(id.as_str()));
    assert_eq!(again.status, JobStatus::Pending);
    p.run(&fx.db, &again.id).unwrap();
    assert!(fx.db.get_verdict(&id).unwrap().is_some());
}

#[test]
fn simulated_scores_are_reproducible() {
    let fx = Fixture::new();
    let textured = || FakeExtractor {
        frame_bytes: 60_000,
        ..FakeExtractor::blank(12.0)
    };

    let first = fx.queue();
    let second = fx.queue();
    let a = fx.pipeline(textured()).run(&fx.db, &first).unwrap();
    let b = fx.pipeline(textured()).run(&fx.db, &second).unwrap();

    assert_eq!(a.scores, b.scores);
    assert_eq!(a.verdict.label, b.verdict.label);
    assert_eq!(fx.db.get_timeline(&first).unwrap(), fx.db.get_timeline(&second).unwrap());
}

#[test]
fn unreachable_vision_falls_back_to_simulator() {
    let fx = Fixture::new();
    let textured = || FakeExtractor {
        frame_bytes: 60_000,
        ..FakeExtractor::blank(3.0)
    };
    let remote = RemoteVision::new("http://127.0.0.1:9", None, Duration::from_millis(500)).unwrap();

    let local_id = fx.queue();
    let remote_id = fx.queue();
    let local = fx.pipeline(textured()).run(&fx.db, &local_id).unwrap();
    let fallback = fx
        .pipeline(textured())
        .with_vision(FallbackVision::new(Some(Box::new(remote))))
        .run(&fx.db, &remote_id)
        .unwrap();

    assert_eq!(fallback.verdict.models.vision, "simulator-v1");
    assert_eq!(fallback.scores, local.scores);
}

#[test]
fn completion_event_carries_verdict() {
    let fx = Fixture::new();
    let p = fx.pipeline(FakeExtractor::blank(4.0));
    let id = fx.queue();
    let by_owner = p.bus().subscribe_owner("alice");

    p.run(&fx.db, &id).unwrap();

    let events: Vec<PipelineEvent> = by_owner.try_iter().collect();
    let mut last_progress = 0;
    for e in &events {
        if let PipelineEvent::Progress { progress, .. } = e {
            assert!(*progress >= last_progress);
            last_progress = *progress;
        }
    }
    assert_eq!(last_progress, 100);
    match events.last() {
        Some(PipelineEvent::Completed {
            label,
            timeline_event_count,
            ..
        }) => {
            assert_eq!(*label, Label::Safe);
            assert_eq!(*timeline_event_count, 0);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[test]
fn batch_runs_jobs_concurrently_on_a_shared_file() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("vmod.db");
    let video = dir.path().join("clip.mp4");
    std::fs::write(&video, b"not really a video").unwrap();
    let db = Database::open(&db_path).unwrap();

    let ids: Vec<String> = (0..6)
        .map(|_| pipeline::queue_video(&db, &video, "alice").unwrap().id)
        .collect();
    let p = Pipeline::new(
        Box::new(FakeExtractor {
            frame_bytes: 60_000,
            ..FakeExtractor::blank(8.0)
        }),
        PipelineOptions {
            work_dir: dir.path().join("work"),
            max_frames: 300,
            progress_every_frames: 1,
            keep_artifacts: false,
        },
    );

    let outcomes = run_batch(&p, &db_path, &ids, 4);

    assert_eq!(outcomes.len(), ids.len());
    for (outcome, id) in outcomes.iter().zip(&ids) {
        assert_eq!(&outcome.job_id, id);
        let summary = outcome.result.as_ref().unwrap();
        assert_eq!(summary.frames, 16);
        let job = db.get_job(id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(db.get_verdict(id).unwrap().is_some());
    }
}
