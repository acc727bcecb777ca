//! Score vector + timeline → label and recommended action.

use serde::{Deserialize, Serialize};

use crate::models::{Action, Category, Label, ScoreVector, TimelineEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    pub flag_nudity: f64,
    pub flag_violence: f64,
    pub flag_weapons: f64,
    pub flag_hate_speech: f64,
    pub flag_sexual_content: f64,
    /// Any category above this is at least `review`.
    pub review: f64,
    pub neutral_profanity: f64,

    pub remove_nudity: f64,
    pub remove_violence: f64,
    pub remove_weapons: f64,
    pub remove_hate_speech: f64,
    pub remove_sexual_content: f64,
    pub remove_drug_use: f64,
    pub remove_profanity: f64,

    /// One category above this sends the video to a human.
    pub manual_review_single: f64,
    /// "Moderate" signal; two of these also send the video to a human.
    pub moderate: f64,
    pub manual_review_events: usize,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            flag_nudity: 0.6,
            flag_violence: 0.7,
            flag_weapons: 0.7,
            flag_hate_speech: 0.5,
            flag_sexual_content: 0.6,
            review: 0.3,
            neutral_profanity: 0.2,
            remove_nudity: 0.85,
            remove_violence: 0.9,
            remove_weapons: 0.9,
            remove_hate_speech: 0.8,
            remove_sexual_content: 0.85,
            remove_drug_use: 0.9,
            remove_profanity: 0.95,
            manual_review_single: 0.5,
            moderate: 0.3,
            manual_review_events: 10,
        }
    }
}

impl ClassifierThresholds {
    /// Hard "flagged" threshold; profanity and drug use have none.
    pub fn flag_threshold(&self, category: Category) -> Option<f64> {
        match category {
            Category::Nudity => Some(self.flag_nudity),
            Category::Violence => Some(self.flag_violence),
            Category::Weapons => Some(self.flag_weapons),
            Category::HateSpeech => Some(self.flag_hate_speech),
            Category::SexualContent => Some(self.flag_sexual_content),
            Category::Profanity | Category::DrugUse => None,
        }
    }

    pub fn remove_threshold(&self, category: Category) -> f64 {
        match category {
            Category::Nudity => self.remove_nudity,
            Category::Violence => self.remove_violence,
            Category::Weapons => self.remove_weapons,
            Category::HateSpeech => self.remove_hate_speech,
            Category::SexualContent => self.remove_sexual_content,
            Category::DrugUse => self.remove_drug_use,
            Category::Profanity => self.remove_profanity,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    thresholds: ClassifierThresholds,
}

impl Classifier {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ClassifierThresholds {
        &self.thresholds
    }

    /// First match wins: flagged, review, neutral, safe.
    pub fn label(&self, scores: &ScoreVector) -> Label {
        let t = &self.thresholds;

        let hard_flag = Category::ALL.iter().any(|&c| {
            t.flag_threshold(c)
                .map(|limit| scores.get(c) > limit)
                .unwrap_or(false)
        });
        if hard_flag {
            return Label::Flagged;
        }

        if scores.scores.count_above(t.review) > 0 {
            return Label::Review;
        }

        if scores.get(Category::Profanity) > t.neutral_profanity || scores.scores.any_nonzero() {
            return Label::Neutral;
        }

        Label::Safe
    }

    pub fn action(&self, scores: &ScoreVector, timeline: &[TimelineEvent]) -> Action {
        let t = &self.thresholds;

        if Category::ALL
            .iter()
            .any(|&c| scores.get(c) > t.remove_threshold(c))
        {
            return Action::Remove;
        }

        let moderate = scores.scores.count_above(t.moderate);
        if scores.scores.count_above(t.manual_review_single) >= 1
            || moderate >= 2
            || timeline.len() > t.manual_review_events
        {
            return Action::ManualReview;
        }

        if moderate == 1 {
            return Action::AgeRestrict;
        }

        Action::Publish
    }

    /// One-sentence justification for the recommended action.
    pub fn action_rationale(&self, action: Action, scores: &ScoreVector, timeline: &[TimelineEvent]) -> String {
        let t = &self.thresholds;
        let top = scores
            .scores
            .max_category()
            .map(|(c, v)| format!("{} ({:.2})", c.display_name(), v))
            .unwrap_or_else(|| "none".to_string());

        match action {
            Action::Remove => format!(
                "At least one category exceeded its removal threshold; strongest signal: {top}."
            ),
            Action::ManualReview => {
                let mut reasons = Vec::new();
                let strong = scores.scores.count_above(t.manual_review_single);
                if strong > 0 {
                    reasons.push(format!(
                        "{strong} categor{} above {:.1}",
                        if strong == 1 { "y" } else { "ies" },
                        t.manual_review_single
                    ));
                }
                let moderate = scores.scores.count_above(t.moderate);
                if moderate >= 2 {
                    reasons.push(format!("{moderate} categories above {:.1}", t.moderate));
                }
                if timeline.len() > t.manual_review_events {
                    reasons.push(format!("{} flagged moments on the timeline", timeline.len()));
                }
                format!("A moderator should review this video: {}.", reasons.join(", "))
            }
            Action::AgeRestrict => format!(
                "A single moderate signal was found ({top}); restricting to adult audiences is sufficient."
            ),
            Action::Publish => {
                if scores.scores.any_nonzero() {
                    format!("Only minor signals were found (strongest: {top}); safe to publish.")
                } else {
                    "No concerning signals were found; safe to publish.".to_string()
                }
            }
        }
    }
}
