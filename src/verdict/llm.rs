use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::ProviderError;
use crate::models::{Action, Label, ScoreVector, TimelineEvent};

use super::{ReportDraft, ReportWriter};

const PROVIDER: &str = "report writer";
const PROMPT_TIMELINE_EVENTS: usize = 10;

const INSTRUCTIONS: &str = "You are a content moderation analyst. Using the category scores, \
timeline and flagged transcript excerpts, write a concise moderation report. Respond with JSON: \
{\"label\": safe|neutral|review|flagged, \"description\": string, \
\"recommended_action\": publish|age_restrict|manual_review|remove}.";

#[derive(Debug, Serialize)]
pub struct FlaggedExcerpt {
    pub start: f64,
    pub category: Option<String>,
    pub score: f64,
    pub text: String,
}

/// Structured prompt sent to the report endpoint.
#[derive(Debug, Serialize)]
pub struct ReportPrompt {
    pub instructions: &'static str,
    pub duration_seconds: f64,
    pub scores: ScoreVector,
    pub timeline: Vec<TimelineEvent>,
    pub flagged_transcript: Vec<FlaggedExcerpt>,
    pub transcript_source: String,
}

impl ReportPrompt {
    pub fn new(input: &super::ReportInput<'_>) -> Self {
        Self {
            instructions: INSTRUCTIONS,
            duration_seconds: input.duration_seconds,
            scores: *input.scores,
            timeline: input
                .timeline
                .iter()
                .take(PROMPT_TIMELINE_EVENTS)
                .cloned()
                .collect(),
            flagged_transcript: input
                .transcript
                .flagged_segments()
                .map(|s| FlaggedExcerpt {
                    start: s.start,
                    category: s.primary_category.map(|c| c.as_str().to_string()),
                    score: s.scores.max_value(),
                    text: s.text.clone(),
                })
                .collect(),
            transcript_source: input.transcript.source.tag(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    label: Option<String>,
    description: Option<String>,
    recommended_action: Option<String>,
}

/// Report writer backed by a remote text-generation endpoint.
pub struct RemoteReportWriter {
    url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

impl RemoteReportWriter {
    pub fn new(
        url: String,
        api_key: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
        Ok(Self {
            url,
            api_key,
            model: model.unwrap_or_else(|| "default".to_string()),
            timeout_secs: timeout.as_secs(),
            client,
        })
    }
}

impl ReportWriter for RemoteReportWriter {
    fn model_tag(&self) -> String {
        format!("llm:{}", self.model)
    }

    fn write_report(&self, prompt: &ReportPrompt) -> Result<ReportDraft, ProviderError> {
        let body = serde_json::json!({ "model": self.model, "prompt": prompt });
        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let resp = req
            .send()
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.timeout_secs, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        let text = resp
            .text()
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, self.timeout_secs, e))?;
        parse_draft(&text)
    }
}

/// Structured JSON when possible; otherwise the raw text becomes the
/// description and label/action are left to the classifier.
pub fn parse_draft(text: &str) -> Result<ReportDraft, ProviderError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ProviderError::Malformed {
            provider: PROVIDER,
            message: "empty response body".to_string(),
        });
    }

    match serde_json::from_str::<RawDraft>(trimmed) {
        Ok(raw) if raw.description.as_deref().is_some_and(|d| !d.trim().is_empty()) => {
            Ok(ReportDraft {
                label: raw.label.as_deref().and_then(Label::from_str),
                recommended_action: raw.recommended_action.as_deref().and_then(Action::from_str),
                description: raw.description.unwrap_or_default(),
            })
        }
        _ => {
            debug!("Report response is not structured JSON, using raw text");
            Ok(ReportDraft {
                label: None,
                recommended_action: None,
                description: trimmed.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_response_is_parsed() {
        let draft = parse_draft(
            r#"{"label": "review", "description": "Some profanity.", "recommended_action": "age-restrict"}"#,
        )
        .unwrap();
        assert_eq!(draft.label, Some(Label::Review));
        assert_eq!(draft.recommended_action, Some(Action::AgeRestrict));
        assert_eq!(draft.description, "Some profanity.");
    }

    #[test]
    fn raw_text_becomes_description() {
        let draft = parse_draft("The video looks fine overall.").unwrap();
        assert_eq!(draft.label, None);
        assert_eq!(draft.recommended_action, None);
        assert_eq!(draft.description, "The video looks fine overall.");
    }

    #[test]
    fn unknown_label_is_dropped() {
        let draft = parse_draft(r#"{"label": "spicy", "description": "x"}"#).unwrap();
        assert_eq!(draft.label, None);
    }

    #[test]
    fn empty_body_is_an_error() {
        assert!(matches!(
            parse_draft("   "),
            Err(ProviderError::Malformed { .. })
        ));
    }
}
