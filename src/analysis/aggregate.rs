//! Combine per-frame vision scores and per-segment text scores into one
//! score vector per job.

use crate::models::{Category, CategoryScores, FrameSample, ScoreVector};

const PEAK_WEIGHT: f64 = 0.6;
const MEAN_WEIGHT: f64 = 0.3;
const FREQUENCY_WEIGHT: f64 = 0.1;

/// Weak corroboration of nudity from transcript sexual-content scores.
const TEXT_SEXUAL_TO_NUDITY: f64 = 0.5;

const CONFIDENCE_FLOOR: f64 = 0.5;
const CONFIDENCE_CAP: f64 = 0.98;
const STRONG_SIGNAL: f64 = 0.5;

/// Vision score for one category over all sampled frames.
///
/// Only frames with a nonzero value contribute to max and mean; frequency is
/// the fraction of all sampled frames that were nonzero. No nonzero frames
/// means exactly zero.
pub fn vision_category_score(frames: &[FrameSample], category: Category) -> f64 {
    let nonzero: Vec<f64> = frames
        .iter()
        .map(|f| f.scores().get(category))
        .filter(|v| *v > 0.0)
        .collect();

    if nonzero.is_empty() {
        return 0.0;
    }

    let max = nonzero.iter().cloned().fold(0.0, f64::max);
    let mean = nonzero.iter().sum::<f64>() / nonzero.len() as f64;
    let frequency = nonzero.len() as f64 / frames.len() as f64;

    (PEAK_WEIGHT * max + MEAN_WEIGHT * mean + FREQUENCY_WEIGHT * frequency).clamp(0.0, 1.0)
}

pub fn vision_scores(frames: &[FrameSample]) -> CategoryScores {
    let mut out = CategoryScores::default();
    for c in Category::VISION {
        out.set(c, vision_category_score(frames, c));
    }
    out
}

/// How much analyzed material backs the verdict, not how right it is.
pub fn overall_confidence(
    frame_count: usize,
    detections: usize,
    strongest_signal: f64,
) -> f64 {
    let mut confidence = CONFIDENCE_FLOOR;
    confidence += (frame_count as f64 / 200.0).min(0.25);
    confidence += (detections as f64 * 0.01).min(0.15);
    if strongest_signal > STRONG_SIGNAL {
        confidence += 0.08;
    }
    confidence.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CAP)
}

/// Final per-category scores: `max(vision, text)`, with nudity also
/// considering half the text sexual-content score.
pub fn aggregate(frames: &[FrameSample], text: &CategoryScores, flagged_segments: usize) -> ScoreVector {
    let vision = vision_scores(frames);

    let mut scores = CategoryScores::default();
    for c in Category::ALL {
        scores.set(c, vision.get(c).max(text.get(c)));
    }
    let corroborated = scores
        .nudity
        .max(TEXT_SEXUAL_TO_NUDITY * text.sexual_content);
    scores.set(Category::Nudity, corroborated);

    let frame_detections: usize = frames
        .iter()
        .map(|f| f.scores().count_above(0.0))
        .sum();

    let strongest = vision.max_value().max(text.max_value());

    ScoreVector {
        scores,
        overall_confidence: overall_confidence(
            frames.len(),
            frame_detections + flagged_segments,
            strongest,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FrameSignals;
    use std::path::PathBuf;

    fn frame(index: u32, ts: f64, scores: CategoryScores) -> FrameSample {
        FrameSample::new(index, ts, PathBuf::from(format!("f{index}.jpg")), 1000).scored(
            FrameSignals {
                scores,
                objects: vec![],
                faces: 0,
                scene_label: String::new(),
                confidence: 0.8,
                source: "test".into(),
            },
        )
    }

    fn with(category: Category, value: f64) -> CategoryScores {
        let mut s = CategoryScores::default();
        s.set(category, value);
        s
    }

    #[test]
    fn all_zero_category_is_exactly_zero() {
        let frames: Vec<_> = (0..10)
            .map(|i| frame(i, i as f64, CategoryScores::default()))
            .collect();
        assert_eq!(vision_category_score(&frames, Category::Violence), 0.0);
        let v = aggregate(&frames, &CategoryScores::default(), 0);
        for c in Category::ALL {
            assert_eq!(v.get(c), 0.0);
        }
    }

    #[test]
    fn weighting_uses_only_nonzero_frames() {
        // 4 frames, two nonzero at 0.8 and 0.4
        let frames = vec![
            frame(0, 0.0, with(Category::Weapons, 0.8)),
            frame(1, 1.0, CategoryScores::default()),
            frame(2, 2.0, with(Category::Weapons, 0.4)),
            frame(3, 3.0, CategoryScores::default()),
        ];
        let got = vision_category_score(&frames, Category::Weapons);
        let expected = 0.6 * 0.8 + 0.3 * 0.6 + 0.1 * 0.5;
        assert!((got - expected).abs() < 1e-9);
    }

    #[test]
    fn text_wins_when_higher() {
        let frames = vec![frame(0, 0.0, with(Category::Violence, 0.2))];
        let text = with(Category::Violence, 0.5);
        let v = aggregate(&frames, &text, 1);
        assert_eq!(v.scores.violence, 0.5);
    }

    #[test]
    fn nudity_is_corroborated_by_half_text_sexual_content() {
        let text = with(Category::SexualContent, 0.6);
        let v = aggregate(&[], &text, 1);
        assert!((v.scores.nudity - 0.3).abs() < 1e-9);
        assert_eq!(v.scores.sexual_content, 0.6);
    }

    #[test]
    fn confidence_is_bounded() {
        assert_eq!(overall_confidence(0, 0, 0.0), 0.5);
        assert_eq!(overall_confidence(10_000, 10_000, 1.0), 0.98);
        let mid = overall_confidence(20, 3, 0.2);
        assert!((mid - 0.63).abs() < 1e-9);
    }

    #[test]
    fn every_category_present_and_bounded() {
        let frames: Vec<_> = (0..5)
            .map(|i| frame(i, i as f64, with(Category::Nudity, 1.0)))
            .collect();
        let v = aggregate(&frames, &with(Category::Profanity, 1.0), 3);
        let json = serde_json::to_value(v).unwrap();
        for c in Category::ALL {
            let value = json[c.as_str()].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&value));
        }
        assert!((0.5..=0.98).contains(&v.overall_confidence));
    }
}
