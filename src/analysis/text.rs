//! Lexicon-based transcript scoring.

use regex::Regex;

use crate::models::{Category, CategoryScores, Sentiment, TranscriptSegment};

const PROFANITY_HIGH: &[&str] = &[
    r"fuck\w*", r"shit\w*", r"bitch\w*", r"bastards?", r"assholes?", r"cunts?", r"motherfuck\w*",
    r"dickheads?",
];
const PROFANITY_MILD: &[&str] = &[
    "damn", "damned", "hell", "crap", "crappy", "bloody", "piss", "pissed", "jerk", "sucks",
];
const HATE_SPEECH: &[&str] = &[
    "subhuman", "vermin", "inferior race", "ethnic cleansing", "white power", "master race",
    "go back to your country", "exterminate them", "race traitor", "untermensch",
];
const VIOLENCE: &[&str] = &[
    r"kill\w*", r"murder\w*", r"shoot\w*", r"shot", r"stab\w*", r"blood\w*", r"attack\w*",
    r"beat (?:him|her|them|you) up", r"punch\w*", r"bomb\w*", r"strangl\w*", r"torture\w*",
];
const DRUG_USE: &[&str] = &[
    "cocaine", "heroin", "meth", "crack pipe", "weed", "marijuana", "overdose", "overdosed",
    "get high", "getting high", "snort", "snorting", "fentanyl", "ecstasy",
];
const SEXUAL_CONTENT: &[&str] = &[
    "sex", "sexy", "naked", "nude", "porn", "porno", "orgasm", "stripper", "horny", "intercourse",
];
const POSITIVE: &[&str] = &[
    "good", "great", "love", "happy", "thanks", "thank you", "awesome", "wonderful", "nice",
    "beautiful", "enjoy",
];
const NEGATIVE: &[&str] = &[
    "bad", "hate", "angry", "terrible", "awful", "sad", "worst", "horrible", "ugly", "disgusting",
];

/// Per-keyword weight for the linearly scored categories.
const HATE_SPEECH_WEIGHT: f64 = 0.4;
const VIOLENCE_WEIGHT: f64 = 0.25;
const DRUG_USE_WEIGHT: f64 = 0.3;
const SEXUAL_CONTENT_WEIGHT: f64 = 0.3;

/// High-severity profanity counts this many times a mild hit.
const PROFANITY_HIGH_MULTIPLIER: f64 = 3.0;
const PROFANITY_DENSITY_AMPLIFIER: f64 = 2.0;

/// Flag thresholds per text category (score must exceed).
pub fn flag_threshold(category: Category) -> f64 {
    match category {
        Category::Profanity | Category::HateSpeech => 0.1,
        Category::Violence => 0.3,
        Category::DrugUse | Category::SexualContent => 0.2,
        Category::Nudity | Category::Weapons => 1.0,
    }
}

/// Whole-word, case-insensitive matcher for one lexicon.
struct Lexicon {
    pattern: Regex,
}

impl Lexicon {
    fn new(terms: &[&str]) -> Self {
        let alternation = terms
            .iter()
            .map(|t| t.replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        // Static term lists; a failure here is a programming error caught by the tests.
        let pattern = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
            .unwrap_or_else(|e| panic!("invalid lexicon pattern: {e}"));
        Self { pattern }
    }

    fn count(&self, text: &str) -> usize {
        self.pattern.find_iter(text).count()
    }
}

/// Stateless scorer for transcript segments. Construct once and reuse.
pub struct TextAnalyzer {
    profanity_high: Lexicon,
    profanity_mild: Lexicon,
    hate_speech: Lexicon,
    violence: Lexicon,
    drug_use: Lexicon,
    sexual_content: Lexicon,
    positive: Lexicon,
    negative: Lexicon,
}

impl Default for TextAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextAnalyzer {
    pub fn new() -> Self {
        Self {
            profanity_high: Lexicon::new(PROFANITY_HIGH),
            profanity_mild: Lexicon::new(PROFANITY_MILD),
            hate_speech: Lexicon::new(HATE_SPEECH),
            violence: Lexicon::new(VIOLENCE),
            drug_use: Lexicon::new(DRUG_USE),
            sexual_content: Lexicon::new(SEXUAL_CONTENT),
            positive: Lexicon::new(POSITIVE),
            negative: Lexicon::new(NEGATIVE),
        }
    }

    /// Score one piece of text across the five text categories.
    pub fn score_text(&self, text: &str) -> CategoryScores {
        let mut scores = CategoryScores::default();
        let word_count = text.split_whitespace().count().max(1) as f64;

        let high = self.profanity_high.count(text) as f64;
        let mild = self.profanity_mild.count(text) as f64;
        scores.set(
            Category::Profanity,
            (high * PROFANITY_HIGH_MULTIPLIER + mild) / word_count * PROFANITY_DENSITY_AMPLIFIER,
        );

        scores.set(
            Category::HateSpeech,
            self.hate_speech.count(text) as f64 * HATE_SPEECH_WEIGHT,
        );
        scores.set(
            Category::Violence,
            self.violence.count(text) as f64 * VIOLENCE_WEIGHT,
        );
        scores.set(
            Category::DrugUse,
            self.drug_use.count(text) as f64 * DRUG_USE_WEIGHT,
        );
        scores.set(
            Category::SexualContent,
            self.sexual_content.count(text) as f64 * SEXUAL_CONTENT_WEIGHT,
        );
        scores
    }

    /// Complete one unscored segment.
    pub fn analyze_segment(&self, segment: &TranscriptSegment) -> TranscriptSegment {
        let scores = self.score_text(&segment.text);

        let flagged = Category::TEXT
            .iter()
            .any(|&c| scores.get(c) > flag_threshold(c));

        let primary_category = if flagged {
            scores.max_category().map(|(c, _)| c)
        } else {
            None
        };

        let sentiment = if flagged {
            Sentiment::Negative
        } else {
            let pos = self.positive.count(&segment.text);
            let neg = self.negative.count(&segment.text);
            match pos.cmp(&neg) {
                std::cmp::Ordering::Greater => Sentiment::Positive,
                std::cmp::Ordering::Less => Sentiment::Negative,
                std::cmp::Ordering::Equal => Sentiment::Neutral,
            }
        };

        TranscriptSegment {
            scores,
            flagged,
            primary_category,
            sentiment,
            ..segment.clone()
        }
    }

    pub fn analyze(&self, segments: &[TranscriptSegment]) -> Vec<TranscriptSegment> {
        segments.iter().map(|s| self.analyze_segment(s)).collect()
    }
}

/// Worst case across segments: a single severe utterance is never averaged away.
pub fn aggregate_text_scores(segments: &[TranscriptSegment]) -> CategoryScores {
    let mut out = CategoryScores::default();
    for seg in segments {
        for c in Category::TEXT {
            if seg.scores.get(c) > out.get(c) {
                out.set(c, seg.scores.get(c));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment::unscored(start, None, text)
    }

    #[test]
    fn hate_keyword_flags_segment_with_fixed_weight() {
        let analyzer = TextAnalyzer::new();
        let out = analyzer.analyze_segment(&seg(12.0, "Those people are vermin and do not belong here"));
        assert!(out.flagged);
        assert_eq!(out.primary_category, Some(Category::HateSpeech));
        assert!((out.scores.hate_speech - 0.4).abs() < 1e-9);
        assert_eq!(out.scores.violence, 0.0);
        assert_eq!(out.sentiment, Sentiment::Negative);
    }

    #[test]
    fn benign_text_is_not_flagged() {
        let analyzer = TextAnalyzer::new();
        let out = analyzer.analyze_segment(&seg(0.0, "Thanks for watching, have a great day"));
        assert!(!out.flagged);
        assert_eq!(out.primary_category, None);
        assert!(!out.scores.any_nonzero());
        assert_eq!(out.sentiment, Sentiment::Positive);
    }

    #[test]
    fn whole_words_only() {
        let analyzer = TextAnalyzer::new();
        // "hello" must not match "hell", "skill" must not match "kill"
        let s = analyzer.score_text("hello there, what a skill");
        assert_eq!(s.profanity, 0.0);
        assert_eq!(s.violence, 0.0);
    }

    #[test]
    fn profanity_weighs_severity_against_length() {
        let analyzer = TextAnalyzer::new();
        let mild = analyzer.score_text("oh damn that was close we nearly missed the bus");
        let high = analyzer.score_text("oh fuck that was close we nearly missed the bus");
        assert!((mild.profanity - 0.2).abs() < 1e-9);
        assert!((high.profanity - 0.6).abs() < 1e-9);

        let diluted = analyzer.score_text(&format!("damn {}", "word ".repeat(39)));
        assert!((diluted.profanity - 0.05).abs() < 1e-9);
    }

    #[test]
    fn single_violence_word_stays_below_flag() {
        let analyzer = TextAnalyzer::new();
        let one = analyzer.analyze_segment(&seg(0.0, "they will attack at dawn"));
        assert!(!one.flagged);
        let two = analyzer.analyze_segment(&seg(0.0, "they will attack and kill everyone"));
        assert!(two.flagged);
        assert_eq!(two.primary_category, Some(Category::Violence));
    }

    #[test]
    fn linear_scores_cap_at_one() {
        let analyzer = TextAnalyzer::new();
        let s = analyzer.score_text("vermin vermin vermin subhuman subhuman");
        assert_eq!(s.hate_speech, 1.0);
    }

    #[test]
    fn aggregation_uses_worst_case() {
        let analyzer = TextAnalyzer::new();
        let mut segments = vec![seg(0.0, "a nice calm day")];
        for i in 0..20 {
            segments.push(seg(i as f64, "nothing to see here"));
        }
        segments.push(seg(30.0, "cocaine and heroin"));
        let scored = analyzer.analyze(&segments);
        let agg = aggregate_text_scores(&scored);
        assert!((agg.drug_use - 0.6).abs() < 1e-9);
        assert_eq!(agg.nudity, 0.0);
    }
}
