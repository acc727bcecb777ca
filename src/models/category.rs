use serde::{Deserialize, Serialize};

/// One fixed content-risk dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Nudity,
    Violence,
    Weapons,
    Profanity,
    HateSpeech,
    SexualContent,
    DrugUse,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Nudity,
        Category::Violence,
        Category::Weapons,
        Category::Profanity,
        Category::HateSpeech,
        Category::SexualContent,
        Category::DrugUse,
    ];

    /// Categories a vision provider scores per frame.
    pub const VISION: [Category; 5] = [
        Category::Nudity,
        Category::Violence,
        Category::Weapons,
        Category::SexualContent,
        Category::DrugUse,
    ];

    /// Categories the text analyzer scores per transcript segment.
    pub const TEXT: [Category; 5] = [
        Category::Profanity,
        Category::HateSpeech,
        Category::Violence,
        Category::DrugUse,
        Category::SexualContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Nudity => "nudity",
            Category::Violence => "violence",
            Category::Weapons => "weapons",
            Category::Profanity => "profanity",
            Category::HateSpeech => "hate_speech",
            Category::SexualContent => "sexual_content",
            Category::DrugUse => "drug_use",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "nudity" => Some(Category::Nudity),
            "violence" => Some(Category::Violence),
            "weapons" => Some(Category::Weapons),
            "profanity" => Some(Category::Profanity),
            "hate_speech" | "hate-speech" => Some(Category::HateSpeech),
            "sexual_content" | "sexual-content" => Some(Category::SexualContent),
            "drug_use" | "drug-use" => Some(Category::DrugUse),
            _ => None,
        }
    }

    /// Human-readable name for reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Nudity => "Nudity",
            Category::Violence => "Violence",
            Category::Weapons => "Weapons",
            Category::Profanity => "Profanity",
            Category::HateSpeech => "Hate speech",
            Category::SexualContent => "Sexual content",
            Category::DrugUse => "Drug use",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value in [0,1] for every category. Being a struct, no key can be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScores {
    #[serde(default)]
    pub nudity: f64,
    #[serde(default)]
    pub violence: f64,
    #[serde(default)]
    pub weapons: f64,
    #[serde(default)]
    pub profanity: f64,
    #[serde(default)]
    pub hate_speech: f64,
    #[serde(default)]
    pub sexual_content: f64,
    #[serde(default)]
    pub drug_use: f64,
}

impl CategoryScores {
    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Nudity => self.nudity,
            Category::Violence => self.violence,
            Category::Weapons => self.weapons,
            Category::Profanity => self.profanity,
            Category::HateSpeech => self.hate_speech,
            Category::SexualContent => self.sexual_content,
            Category::DrugUse => self.drug_use,
        }
    }

    /// Set a score, clamped to [0,1]. NaN is stored as 0.
    pub fn set(&mut self, category: Category, value: f64) {
        let value = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        let slot = match category {
            Category::Nudity => &mut self.nudity,
            Category::Violence => &mut self.violence,
            Category::Weapons => &mut self.weapons,
            Category::Profanity => &mut self.profanity,
            Category::HateSpeech => &mut self.hate_speech,
            Category::SexualContent => &mut self.sexual_content,
            Category::DrugUse => &mut self.drug_use,
        };
        *slot = value;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL.iter().map(move |&c| (c, self.get(c)))
    }

    /// Highest-scoring category, if any score is nonzero. Ties go to the
    /// category listed first in `Category::ALL`.
    pub fn max_category(&self) -> Option<(Category, f64)> {
        self.iter()
            .filter(|(_, v)| *v > 0.0)
            .fold(None, |best: Option<(Category, f64)>, (c, v)| match best {
                Some((_, bv)) if bv >= v => best,
                _ => Some((c, v)),
            })
    }

    pub fn max_value(&self) -> f64 {
        self.iter().map(|(_, v)| v).fold(0.0, f64::max)
    }

    pub fn any_nonzero(&self) -> bool {
        self.iter().any(|(_, v)| v > 0.0)
    }

    /// Number of categories strictly above `threshold`.
    pub fn count_above(&self, threshold: f64) -> usize {
        self.iter().filter(|(_, v)| *v > threshold).count()
    }
}

/// Final per-job category scores plus how much material backed them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreVector {
    #[serde(flatten)]
    pub scores: CategoryScores,
    pub overall_confidence: f64,
}

impl Default for ScoreVector {
    fn default() -> Self {
        Self {
            scores: CategoryScores::default(),
            overall_confidence: 0.5,
        }
    }
}

impl ScoreVector {
    pub fn get(&self, category: Category) -> f64 {
        self.scores.get(category)
    }
}
