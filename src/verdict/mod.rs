pub mod classify;
pub mod llm;
pub mod template;

use tracing::{info, warn};

use crate::error::ProviderError;
use crate::models::{Action, FrameSample, Label, ModelTags, ScoreVector, TimelineEvent, Transcript, Verdict};

use classify::Classifier;
use llm::ReportPrompt;

pub const TEMPLATE_VERSION: &str = "template-v1";

/// Everything the renderer looks at.
pub struct ReportInput<'a> {
    pub scores: &'a ScoreVector,
    pub timeline: &'a [TimelineEvent],
    pub frames: &'a [FrameSample],
    pub transcript: &'a Transcript,
    pub duration_seconds: f64,
}

/// What a report writer returns. Missing label/action are filled in by the classifier.
#[derive(Debug, Clone)]
pub struct ReportDraft {
    pub label: Option<Label>,
    pub recommended_action: Option<Action>,
    pub description: String,
}

/// A remote narrative generator. Implementations must be timeout-bounded.
pub trait ReportWriter: Send + Sync {
    fn model_tag(&self) -> String;

    fn write_report(&self, prompt: &ReportPrompt) -> Result<ReportDraft, ProviderError>;
}

/// Single transition: score vector + timeline → verdict.
pub struct VerdictRenderer {
    classifier: Classifier,
    writer: Option<Box<dyn ReportWriter>>,
}

impl VerdictRenderer {
    pub fn new(classifier: Classifier, writer: Option<Box<dyn ReportWriter>>) -> Self {
        Self { classifier, writer }
    }

    /// Try the remote writer, falling back to the template on any failure.
    /// Both paths produce the same verdict shape.
    pub fn render(&self, input: &ReportInput<'_>, vision_tag: String) -> Verdict {
        let label = self.classifier.label(input.scores);
        let action = self.classifier.action(input.scores, input.timeline);
        let transcript_tag = input.transcript.source.tag();

        if let Some(ref writer) = self.writer {
            match writer.write_report(&ReportPrompt::new(input)) {
                Ok(draft) => {
                    info!("Report generated by {}", writer.model_tag());
                    return Verdict {
                        label: draft.label.unwrap_or(label),
                        recommended_action: draft.recommended_action.unwrap_or(action),
                        report_text: draft.description,
                        models: ModelTags {
                            vision: vision_tag,
                            transcript: transcript_tag,
                            report: writer.model_tag(),
                        },
                    };
                }
                Err(e) => warn!("{e}; using report template"),
            }
        }

        Verdict {
            label,
            recommended_action: action,
            report_text: template::render(input, label, action, &self.classifier),
            models: ModelTags {
                vision: vision_tag,
                transcript: transcript_tag,
                report: TEMPLATE_VERSION.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, CategoryScores};

    struct FailingWriter;

    impl ReportWriter for FailingWriter {
        fn model_tag(&self) -> String {
            "llm:failing".into()
        }

        fn write_report(&self, _prompt: &ReportPrompt) -> Result<ReportDraft, ProviderError> {
            Err(ProviderError::Timeout {
                provider: "report writer",
                secs: 30,
            })
        }
    }

    struct RawTextWriter;

    impl ReportWriter for RawTextWriter {
        fn model_tag(&self) -> String {
            "llm:raw".into()
        }

        fn write_report(&self, _prompt: &ReportPrompt) -> Result<ReportDraft, ProviderError> {
            llm::parse_draft("Looks like a cooking video with some swearing.")
        }
    }

    fn profanity_vector() -> ScoreVector {
        let mut scores = CategoryScores::default();
        scores.set(Category::Profanity, 0.35);
        ScoreVector {
            scores,
            overall_confidence: 0.6,
        }
    }

    #[test]
    fn failing_writer_degrades_to_template() {
        let scores = profanity_vector();
        let transcript = Transcript::empty();
        let input = ReportInput {
            scores: &scores,
            timeline: &[],
            frames: &[],
            transcript: &transcript,
            duration_seconds: 10.0,
        };
        let renderer = VerdictRenderer::new(Classifier::default(), Some(Box::new(FailingWriter)));
        let verdict = renderer.render(&input, "simulator-v1".into());
        assert_eq!(verdict.label, Label::Review);
        assert_eq!(verdict.recommended_action, Action::AgeRestrict);
        assert_eq!(verdict.models.report, TEMPLATE_VERSION);
        assert!(verdict.report_text.contains("REVIEW"));
        assert!(verdict.report_text.contains("Overall confidence: 60%"));
    }

    #[test]
    fn raw_text_keeps_classifier_label() {
        let scores = profanity_vector();
        let transcript = Transcript::empty();
        let input = ReportInput {
            scores: &scores,
            timeline: &[],
            frames: &[],
            transcript: &transcript,
            duration_seconds: 10.0,
        };
        let renderer = VerdictRenderer::new(Classifier::default(), Some(Box::new(RawTextWriter)));
        let verdict = renderer.render(&input, "remote".into());
        assert_eq!(verdict.label, Label::Review);
        assert_eq!(verdict.recommended_action, Action::AgeRestrict);
        assert_eq!(verdict.report_text, "Looks like a cooking video with some swearing.");
        assert_eq!(verdict.models.report, "llm:raw");
        assert_eq!(verdict.models.transcript, "none");
    }
}
