use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Safe,
    Neutral,
    Review,
    Flagged,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Safe => "safe",
            Label::Neutral => "neutral",
            Label::Review => "review",
            Label::Flagged => "flagged",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Some(Label::Safe),
            "neutral" => Some(Label::Neutral),
            "review" => Some(Label::Review),
            "flagged" => Some(Label::Flagged),
            _ => None,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Publish,
    AgeRestrict,
    ManualReview,
    Remove,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Publish => "publish",
            Action::AgeRestrict => "age_restrict",
            Action::ManualReview => "manual_review",
            Action::Remove => "remove",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "publish" => Some(Action::Publish),
            "age_restrict" => Some(Action::AgeRestrict),
            "manual_review" => Some(Action::ManualReview),
            "remove" => Some(Action::Remove),
            _ => None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Versions of whatever produced each part of a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTags {
    pub vision: String,
    pub transcript: String,
    pub report: String,
}

/// Final label, action and report for one completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub label: Label,
    pub recommended_action: Action,
    pub report_text: String,
    pub models: ModelTags,
}
