//! Merge flagged frames and transcript segments into timeline events.

use serde::{Deserialize, Serialize};

use crate::models::{Category, FrameSample, TimelineEvent, TranscriptSegment};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// A frame scoring above this opens or extends an event.
    pub flag_threshold: f64,
    /// Gap (seconds) under which consecutive flagged frames share an event.
    pub merge_gap_secs: f64,
    /// Length given to each flagged transcript segment.
    pub text_span_secs: f64,
    pub max_events: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            flag_threshold: 0.25,
            merge_gap_secs: 2.0,
            text_span_secs: 3.0,
            max_events: 100,
        }
    }
}

struct OpenEvent {
    start: f64,
    end: f64,
    max_score: f64,
    frames: usize,
}

impl OpenEvent {
    fn close(self, category: Category) -> TimelineEvent {
        TimelineEvent {
            start: self.start,
            end: self.end,
            category,
            score: self.max_score,
            note: format!(
                "{} detected in {} frame{}",
                category.display_name(),
                self.frames,
                if self.frames == 1 { "" } else { "s" }
            ),
        }
    }
}

pub struct TimelineBuilder {
    config: TimelineConfig,
}

impl TimelineBuilder {
    pub fn new(config: TimelineConfig) -> Self {
        Self { config }
    }

    /// Vision events: one scan per category over frames in timestamp order.
    pub fn vision_events(&self, frames: &[FrameSample]) -> Vec<TimelineEvent> {
        let mut ordered: Vec<&FrameSample> = frames.iter().collect();
        ordered.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        let mut events = Vec::new();
        for category in Category::VISION {
            let mut open: Option<OpenEvent> = None;

            for frame in &ordered {
                let score = frame.scores().get(category);
                if score <= self.config.flag_threshold {
                    continue;
                }

                match open.as_mut() {
                    Some(ev) if frame.timestamp - ev.end < self.config.merge_gap_secs => {
                        ev.end = frame.timestamp;
                        ev.max_score = ev.max_score.max(score);
                        ev.frames += 1;
                    }
                    _ => {
                        if let Some(done) = open.take() {
                            events.push(done.close(category));
                        }
                        open = Some(OpenEvent {
                            start: frame.timestamp,
                            end: frame.timestamp,
                            max_score: score,
                            frames: 1,
                        });
                    }
                }
            }

            if let Some(done) = open.take() {
                events.push(done.close(category));
            }
        }
        events
    }

    /// Text events: each flagged segment spans `[start, start + text_span]`.
    pub fn text_events(&self, segments: &[TranscriptSegment]) -> Vec<TimelineEvent> {
        segments
            .iter()
            .filter(|s| s.flagged)
            .filter_map(|s| {
                let category = s.primary_category?;
                Some(TimelineEvent {
                    start: s.start,
                    end: s.start + self.config.text_span_secs,
                    category,
                    score: s.scores.max_value(),
                    note: format!("\"{}\"", excerpt(&s.text, 80)),
                })
            })
            .collect()
    }

    /// Concatenate, sort by start, drop exact duplicates, keep the earliest `max_events`.
    pub fn build(&self, frames: &[FrameSample], segments: &[TranscriptSegment]) -> Vec<TimelineEvent> {
        let mut events = self.vision_events(frames);
        events.extend(self.text_events(segments));

        events.sort_by(|a, b| {
            a.start
                .total_cmp(&b.start)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.end.total_cmp(&b.end))
        });
        events.dedup_by(|b, a| a.start == b.start && a.end == b.end && a.category == b.category);
        events.truncate(self.config.max_events);
        events
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryScores, FrameSignals, Sentiment};
    use std::path::PathBuf;

    fn frame(index: u32, ts: f64, category: Category, value: f64) -> FrameSample {
        let mut scores = CategoryScores::default();
        scores.set(category, value);
        FrameSample::new(index, ts, PathBuf::from("f.jpg"), 1000).scored(FrameSignals {
            scores,
            objects: vec![],
            faces: 0,
            scene_label: String::new(),
            confidence: 0.8,
            source: "test".into(),
        })
    }

    fn flagged_segment(start: f64, category: Category, value: f64) -> TranscriptSegment {
        let mut scores = CategoryScores::default();
        scores.set(category, value);
        TranscriptSegment {
            start,
            end: None,
            text: "flagged words".into(),
            scores,
            flagged: true,
            primary_category: Some(category),
            sentiment: Sentiment::Negative,
        }
    }

    fn builder() -> TimelineBuilder {
        TimelineBuilder::new(TimelineConfig::default())
    }

    #[test]
    fn frames_under_two_seconds_apart_merge() {
        let frames = vec![
            frame(0, 10.0, Category::Violence, 0.4),
            frame(1, 11.5, Category::Violence, 0.9),
        ];
        let events = builder().build(&frames, &[]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, 10.0);
        assert_eq!(events[0].end, 11.5);
        assert_eq!(events[0].score, 0.9);
    }

    #[test]
    fn frames_three_seconds_apart_split() {
        let frames = vec![
            frame(0, 10.0, Category::Violence, 0.4),
            frame(1, 13.0, Category::Violence, 0.5),
        ];
        let events = builder().build(&frames, &[]);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.end >= e.start));
        assert_eq!(events[0].score, 0.4);
        assert_eq!(events[1].start, 13.0);
    }

    #[test]
    fn scores_at_threshold_do_not_open_events() {
        let frames = vec![frame(0, 0.0, Category::Nudity, 0.25)];
        assert!(builder().build(&frames, &[]).is_empty());
    }

    #[test]
    fn text_event_spans_three_seconds() {
        let events = builder().build(&[], &[flagged_segment(12.0, Category::HateSpeech, 0.4)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, Category::HateSpeech);
        assert_eq!((events[0].start, events[0].end), (12.0, 15.0));
        assert_eq!(events[0].score, 0.4);
    }

    #[test]
    fn merged_list_is_sorted_and_deduplicated() {
        let frames = vec![frame(0, 20.0, Category::Violence, 0.6)];
        let segments = vec![
            flagged_segment(5.0, Category::Profanity, 0.3),
            flagged_segment(5.0, Category::Profanity, 0.3),
        ];
        let events = builder().build(&frames, &segments);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start, 5.0);
        assert_eq!(events[1].start, 20.0);
    }

    #[test]
    fn truncates_to_earliest_events() {
        let segments: Vec<_> = (0..150)
            .rev()
            .map(|i| flagged_segment(i as f64 * 10.0, Category::Profanity, 0.9))
            .collect();
        let events = builder().build(&[], &segments);
        assert_eq!(events.len(), 100);
        assert_eq!(events[0].start, 0.0);
        assert_eq!(events[99].start, 990.0);
    }
}
