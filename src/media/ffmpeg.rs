//! ffprobe/ffmpeg subprocess implementation of [`MediaExtractor`].

use serde::Deserialize;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{FrameSample, VideoMetadata};

use super::MediaExtractor;

/// Extracted frames are scaled to this width.
const FRAME_WIDTH: u32 = 640;
/// How much of a failing tool's stderr ends up in the error message.
const STDERR_TAIL_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

pub struct FfmpegExtractor {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegExtractor {
    /// Locate ffmpeg and ffprobe on PATH.
    pub fn new() -> PipelineResult<Self> {
        let ffmpeg = which::which("ffmpeg")
            .map_err(|_| PipelineError::configuration("ffmpeg not found on PATH"))?;
        let ffprobe = which::which("ffprobe")
            .map_err(|_| PipelineError::configuration("ffprobe not found on PATH"))?;
        Ok(Self { ffmpeg, ffprobe })
    }

    /// `(tool, resolved path)` for each required binary.
    pub fn tool_status() -> Vec<(&'static str, Option<PathBuf>)> {
        ["ffmpeg", "ffprobe"]
            .into_iter()
            .map(|tool| (tool, which::which(tool).ok()))
            .collect()
    }
}

impl MediaExtractor for FfmpegExtractor {
    fn extract_metadata(&self, path: &Path) -> PipelineResult<VideoMetadata> {
        let file_size = std::fs::metadata(path)
            .map_err(|e| PipelineError::media_read(path, e.to_string()))?
            .len();

        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            return Err(PipelineError::media_read(
                path,
                format!("ffprobe failed: {}", tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_CHARS)),
            ));
        }

        let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| PipelineError::media_read(path, format!("unreadable ffprobe output: {e}")))?;
        parse_probe(path, probe, file_size)
    }

    fn extract_frames(
        &self,
        path: &Path,
        duration_seconds: f64,
        out_dir: &Path,
        fps: f64,
        progress: &mut dyn FnMut(f64),
    ) -> PipelineResult<Vec<FrameSample>> {
        std::fs::create_dir_all(out_dir)?;
        let pattern = out_dir.join("frame_%05d.jpg");

        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostats", "-y", "-i"])
            .arg(path)
            .args([
                "-vf",
                format!("fps={fps},scale={FRAME_WIDTH}:-2").as_str(),
                "-q:v",
                "3",
                "-progress",
                "pipe:1",
            ])
            .arg(&pattern);

        let (success, stderr) = run_with_progress(&mut cmd, |line| {
            if let Some(secs) = parse_out_time(line) {
                if duration_seconds > 0.0 {
                    progress((secs / duration_seconds).min(1.0));
                }
            }
        })?;
        if !success {
            return Err(PipelineError::media_read(
                path,
                format!("frame extraction failed: {}", tail(&stderr, STDERR_TAIL_CHARS)),
            ));
        }

        let frames = collect_frames(out_dir, fps)?;
        if frames.is_empty() {
            return Err(PipelineError::media_read(path, "no frames could be decoded"));
        }
        progress(1.0);
        debug!("Extracted {} frames at {fps} fps", frames.len());
        Ok(frames)
    }

    fn extract_audio(&self, path: &Path, out_path: &Path) -> PipelineResult<Option<PathBuf>> {
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(path)
            .args(["-vn", "-ac", "1", "-ar", "16000", "-f", "wav"])
            .arg(out_path)
            .stdin(Stdio::null())
            .output()?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            if stderr.contains("does not contain any stream") {
                return Ok(None);
            }
            return Err(PipelineError::media_read(
                path,
                format!("audio extraction failed: {}", tail(&stderr, STDERR_TAIL_CHARS)),
            ));
        }

        match std::fs::metadata(out_path) {
            Ok(meta) if meta.len() > 0 => Ok(Some(out_path.to_path_buf())),
            _ => Ok(None),
        }
    }
}

fn parse_probe(path: &Path, probe: FfprobeOutput, file_size: u64) -> PipelineResult<VideoMetadata> {
    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PipelineError::media_read(path, "no video stream"))?;

    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let duration_seconds = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| PipelineError::media_read(path, "unknown duration"))?;

    Ok(VideoMetadata {
        duration_seconds,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        has_audio,
        file_size,
    })
}

/// Seconds from an `-progress` line. `out_time_ms` is reported in microseconds
/// just like `out_time_us`.
fn parse_out_time(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => value.parse::<i64>().ok().map(|us| us.max(0) as f64 / 1_000_000.0),
        _ => None,
    }
}

/// Run `cmd` with stdout piped to `on_line`. Stderr is drained on its own
/// thread so a chatty failure cannot fill the pipe and stall stdout.
fn run_with_progress(cmd: &mut Command, mut on_line: impl FnMut(&str)) -> PipelineResult<(bool, String)> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stderr_reader = child.stderr.take().map(|mut err| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    });

    let mut read_error = None;
    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) => on_line(&line),
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            }
        }
    }

    if read_error.is_some() {
        let _ = child.kill();
    }
    let status = child.wait()?;
    let stderr = stderr_reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();
    if let Some(e) = read_error {
        return Err(e.into());
    }
    Ok((status.success(), stderr))
}

/// Last `max_chars` characters of tool output, trimmed.
fn tail(output: &str, max_chars: usize) -> String {
    let trimmed = output.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    let rest: String = trimmed.chars().skip(count - max_chars).collect();
    format!("...{rest}")
}

/// Frames in extraction order. Sample `i` sits at `i / fps` seconds.
fn collect_frames(out_dir: &Path, fps: f64) -> PipelineResult<Vec<FrameSample>> {
    let pattern = out_dir.join("frame_*.jpg");
    let pattern = pattern.to_string_lossy();
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| PipelineError::Internal(format!("bad frame pattern: {e}")))?
        .filter_map(|entry| entry.ok())
        .collect();
    paths.sort();

    paths
        .into_iter()
        .enumerate()
        .map(|(i, p)| -> PipelineResult<FrameSample> {
            let size = std::fs::metadata(&p)?.len();
            Ok(FrameSample::new(i as u32, i as f64 / fps, p, size))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(json: &str) -> FfprobeOutput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn probe_reads_video_and_audio_streams() {
        let p = probe(
            r#"{"format": {"duration": "10.500000"},
                "streams": [{"codec_type": "video", "width": 1280, "height": 720},
                            {"codec_type": "audio"}]}"#,
        );
        let meta = parse_probe(Path::new("a.mp4"), p, 1234).unwrap();
        assert_eq!(meta.duration_seconds, 10.5);
        assert_eq!(meta.resolution(), "1280x720");
        assert!(meta.has_audio);
        assert_eq!(meta.file_size, 1234);
    }

    #[test]
    fn missing_video_stream_is_a_read_error() {
        let p = probe(r#"{"format": {"duration": "3.0"}, "streams": [{"codec_type": "audio"}]}"#);
        assert!(matches!(
            parse_probe(Path::new("a.mp3"), p, 1),
            Err(PipelineError::MediaRead { .. })
        ));
    }

    #[test]
    fn progress_lines_are_microseconds() {
        assert_eq!(parse_out_time("out_time_us=2500000"), Some(2.5));
        assert_eq!(parse_out_time("out_time_ms=1000000"), Some(1.0));
        assert_eq!(parse_out_time("speed=1.5x"), None);
    }

    #[test]
    fn frames_are_timestamped_by_index() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=3 {
            std::fs::write(dir.path().join(format!("frame_{i:05}.jpg")), vec![0u8; i * 10]).unwrap();
        }
        let frames = collect_frames(dir.path(), 2.0).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].timestamp, 1.0);
        assert_eq!(frames[2].byte_size, 30);
    }

    #[cfg(unix)]
    #[test]
    fn noisy_failure_does_not_hang() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("ffmpeg");
        std::fs::write(
            &script,
            "#!/bin/sh\nhead -c 300000 /dev/zero | tr '\\0' e >&2\necho out_time_us=500000\necho 'decode error' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let extractor = FfmpegExtractor {
            ffmpeg: script.clone(),
            ffprobe: script,
        };
        let out_dir = dir.path().join("frames");
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let mut seen = Vec::new();
            let result = extractor.extract_frames(Path::new("broken.mp4"), 1.0, &out_dir, 2.0, &mut |f| seen.push(f));
            let _ = tx.send((result, seen));
        });

        let (result, seen) = rx.recv_timeout(std::time::Duration::from_secs(20)).unwrap();
        match result {
            Err(PipelineError::MediaRead { reason, .. }) => {
                assert!(reason.ends_with("decode error"));
                assert!(reason.chars().count() < 600);
            }
            other => panic!("expected a media read error, got {other:?}"),
        }
        assert_eq!(seen, vec![0.5]);
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("  short \n", 10), "short");
        assert_eq!(tail("abcdefghij", 4), "...ghij");
    }
}
