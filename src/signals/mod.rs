//! Per-frame vision scoring and speech transcription, each a remote
//! provider with a local fallback that never fails the job.

pub mod simulator;
pub mod transcription;
pub mod vision;

use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::ProviderError;
use crate::models::{FrameSample, FrameSignals, Transcript};

pub use simulator::FrameSimulator;
pub use transcription::{simulated_transcript, RemoteTranscriber};
pub use vision::RemoteVision;

/// Scores one sampled frame.
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> String;

    fn score_frame(&self, frame: &FrameSample) -> Result<FrameSignals, ProviderError>;
}

/// Turns an extracted audio file into timed, unscored segments.
pub trait Transcriber: Send + Sync {
    fn name(&self) -> String;

    fn transcribe(&self, audio: &Path) -> Result<Transcript, ProviderError>;
}

/// Remote vision when configured, the seeded simulator otherwise or on any failure.
pub struct FallbackVision {
    remote: Option<Box<dyn VisionProvider>>,
    simulator: FrameSimulator,
}

impl FallbackVision {
    pub fn new(remote: Option<Box<dyn VisionProvider>>) -> Self {
        Self {
            remote,
            simulator: FrameSimulator::new(),
        }
    }

    pub fn local() -> Self {
        Self::new(None)
    }

    /// `file_size` is the source video's size; it seeds the simulator.
    pub fn score(&self, frame: &FrameSample, file_size: u64) -> FrameSignals {
        if let Some(ref remote) = self.remote {
            match remote.score_frame(frame) {
                Ok(signals) => return signals,
                Err(e) => warn!("Frame {}: {e}; using simulator", frame.index),
            }
        }
        self.simulator.score(frame, file_size)
    }
}

/// Remote transcription when configured, otherwise a fixed placeholder
/// transcript tagged as simulated.
pub struct FallbackTranscriber {
    remote: Option<Box<dyn Transcriber>>,
}

impl FallbackTranscriber {
    pub fn new(remote: Option<Box<dyn Transcriber>>) -> Self {
        Self { remote }
    }

    pub fn local() -> Self {
        Self::new(None)
    }

    pub fn transcribe(&self, audio: &Path) -> Transcript {
        if let Some(ref remote) = self.remote {
            match remote.transcribe(audio) {
                Ok(transcript) => return transcript,
                Err(e) => warn!("{e}; using simulated transcript"),
            }
        }
        simulated_transcript()
    }
}

/// GET `<base_url>/health`, bounded by `timeout`.
pub fn check_health(base_url: &str, timeout: Duration) -> Result<(), ProviderError> {
    const PROVIDER: &str = "health check";
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Transport {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

    let resp = client
        .get(format!("{}/health", base_url.trim_end_matches('/')))
        .send()
        .map_err(|e| ProviderError::from_reqwest(PROVIDER, timeout.as_secs(), e))?;

    if !resp.status().is_success() {
        return Err(ProviderError::Status {
            provider: PROVIDER,
            status: resp.status().as_u16(),
            body: resp.text().unwrap_or_default(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TranscriptSource;
    use std::path::PathBuf;

    struct DownVision;

    impl VisionProvider for DownVision {
        fn name(&self) -> String {
            "down".into()
        }

        fn score_frame(&self, _frame: &FrameSample) -> Result<FrameSignals, ProviderError> {
            Err(ProviderError::Transport {
                provider: "vision",
                message: "connection refused".into(),
            })
        }
    }

    struct DownTranscriber;

    impl Transcriber for DownTranscriber {
        fn name(&self) -> String {
            "down".into()
        }

        fn transcribe(&self, _audio: &Path) -> Result<Transcript, ProviderError> {
            Err(ProviderError::Timeout {
                provider: "transcription",
                secs: 1,
            })
        }
    }

    #[test]
    fn failing_vision_matches_local_simulator() {
        let frame = FrameSample::new(4, 2.0, PathBuf::from("f.jpg"), 55_000);
        let with_remote = FallbackVision::new(Some(Box::new(DownVision)));
        let local = FallbackVision::local();
        assert_eq!(with_remote.score(&frame, 4_096_000), local.score(&frame, 4_096_000));
        assert_eq!(local.score(&frame, 4_096_000).source, simulator::SIMULATOR_VERSION);
    }

    #[test]
    fn failing_transcriber_is_marked_simulated() {
        let t = FallbackTranscriber::new(Some(Box::new(DownTranscriber)));
        let transcript = t.transcribe(Path::new("audio.wav"));
        assert_eq!(transcript.source, TranscriptSource::SimulatedFallback);
        assert!(!transcript.segments.is_empty());
    }
}
