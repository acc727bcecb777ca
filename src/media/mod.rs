//! Container probing plus frame and audio extraction.

pub mod ffmpeg;

use std::path::{Path, PathBuf};

use crate::error::PipelineResult;
use crate::models::{FrameSample, VideoMetadata};

pub use ffmpeg::FfmpegExtractor;

/// Reads a video file. Every call is an owned subprocess run; implementations
/// must not leave partial output behind on error other than in `out_dir`.
pub trait MediaExtractor: Send + Sync {
    fn extract_metadata(&self, path: &Path) -> PipelineResult<VideoMetadata>;

    /// Sample frames at `fps` into `out_dir`. `progress` receives the
    /// fraction of the video decoded so far (0.0..=1.0).
    fn extract_frames(
        &self,
        path: &Path,
        duration_seconds: f64,
        out_dir: &Path,
        fps: f64,
        progress: &mut dyn FnMut(f64),
    ) -> PipelineResult<Vec<FrameSample>>;

    /// Extract a mono 16 kHz track. `Ok(None)` when the video has no audio.
    fn extract_audio(&self, path: &Path, out_path: &Path) -> PipelineResult<Option<PathBuf>>;
}

/// Adaptive sampling rate: denser for short clips, never more than
/// `max_frames` samples in total.
pub fn sampling_fps(duration_seconds: f64, max_frames: u32) -> f64 {
    let base = if duration_seconds < 30.0 {
        2.0
    } else if duration_seconds < 120.0 {
        1.0
    } else {
        0.5
    };
    if duration_seconds <= 0.0 || max_frames == 0 {
        return base;
    }
    base.min(max_frames as f64 / duration_seconds)
}

/// Number of samples `sampling_fps` yields for a video.
pub fn expected_frames(duration_seconds: f64, fps: f64) -> u32 {
    // Tolerate float noise so a capped rate never rounds up past the cap.
    (duration_seconds.max(0.0) * fps - 1e-6).ceil().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_clips_get_two_fps() {
        assert_eq!(sampling_fps(10.0, 300), 2.0);
        assert_eq!(expected_frames(10.0, 2.0), 20);
    }

    #[test]
    fn medium_and_long_videos_slow_down() {
        assert_eq!(sampling_fps(30.0, 300), 1.0);
        assert_eq!(sampling_fps(119.0, 300), 1.0);
        assert_eq!(sampling_fps(120.0, 300), 0.5);
    }

    #[test]
    fn frame_cap_is_honored() {
        let fps = sampling_fps(3600.0, 300);
        assert!((fps - 300.0 / 3600.0).abs() < 1e-12);
    }
}
