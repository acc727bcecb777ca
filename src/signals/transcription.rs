use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;
use crate::models::{Transcript, TranscriptSegment, TranscriptSource};

use super::Transcriber;

const PROVIDER: &str = "transcription provider";

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<RawSegment>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    start: f64,
    #[serde(default)]
    end: Option<f64>,
    #[serde(default)]
    text: String,
}

/// Speech recognition reached over HTTP: the whole audio file in one upload.
pub struct RemoteTranscriber {
    url: String,
    model: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl RemoteTranscriber {
    pub fn new(base_url: &str, model: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
        Ok(Self {
            url: format!("{}/transcribe", base_url.trim_end_matches('/')),
            model: model.unwrap_or_else(|| "whisper".to_string()),
            timeout_secs: timeout.as_secs(),
            client,
        })
    }
}

impl Transcriber for RemoteTranscriber {
    fn name(&self) -> String {
        self.model.clone()
    }

    fn transcribe(&self, audio: &Path) -> Result<Transcript, ProviderError> {
        let form = reqwest::blocking::multipart::Form::new()
            .file("audio", audio)
            .map_err(|e| ProviderError::Transport {
                provider: PROVIDER,
                message: format!("cannot read {}: {e}", audio.display()),
            })?;

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.timeout_secs, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }

        let body: TranscribeResponse = resp
            .json()
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.timeout_secs, e))?;

        let transcript = to_transcript(body, &self.model)?;
        debug!("Transcribed {} segments", transcript.segments.len());
        Ok(transcript)
    }
}

fn to_transcript(body: TranscribeResponse, model: &str) -> Result<Transcript, ProviderError> {
    let mut segments = Vec::with_capacity(body.segments.len());
    for raw in body.segments {
        if !raw.start.is_finite() || raw.start < 0.0 {
            return Err(ProviderError::Malformed {
                provider: PROVIDER,
                message: format!("segment start {} is invalid", raw.start),
            });
        }
        let end = raw.end.filter(|e| e.is_finite() && *e >= raw.start);
        segments.push(TranscriptSegment::unscored(raw.start, end, raw.text.trim()));
    }
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    let full_text = if body.text.trim().is_empty() {
        segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        body.text.trim().to_string()
    };

    Ok(Transcript {
        full_text,
        language: body.language.unwrap_or_default(),
        segments,
        source: TranscriptSource::Remote {
            model: model.to_string(),
        },
    })
}

/// Placeholder used when speech recognition is unavailable. Tagged so that
/// reports never present it as real transcription.
pub fn simulated_transcript() -> Transcript {
    let segments = vec![
        TranscriptSegment::unscored(0.0, Some(5.0), "This is a simulated transcription."),
        TranscriptSegment::unscored(5.0, Some(10.0), "Speech recognition was not available for this video."),
    ];
    Transcript {
        full_text: segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        language: "en".to_string(),
        segments,
        source: TranscriptSource::SimulatedFallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_sorted_and_text_is_joined() {
        let body: TranscribeResponse = serde_json::from_str(
            r#"{"segments": [{"start": 5.0, "end": 7.5, "text": " second "}, {"start": 0.0, "text": "first"}], "language": "en"}"#,
        )
        .unwrap();
        let t = to_transcript(body, "whisper-base").unwrap();
        assert_eq!(t.segments[0].text, "first");
        assert_eq!(t.segments[0].end, None);
        assert_eq!(t.segments[1].end, Some(7.5));
        assert_eq!(t.full_text, "first second");
        assert_eq!(t.source.tag(), "remote:whisper-base");
    }

    #[test]
    fn negative_start_is_malformed() {
        let body: TranscribeResponse =
            serde_json::from_str(r#"{"segments": [{"start": -1.0, "text": "x"}]}"#).unwrap();
        assert!(to_transcript(body, "w").is_err());
    }

    #[test]
    fn simulated_transcript_is_clean_and_tagged() {
        let t = simulated_transcript();
        assert!(t.source.is_simulated());
        assert_eq!(t.segments.len(), 2);
        let analyzed = crate::analysis::TextAnalyzer::new().analyze(&t.segments);
        assert!(analyzed.iter().all(|s| !s.flagged));
    }
}
