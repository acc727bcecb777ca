//! Deterministic report template, used whenever no report writer is
//! configured or the remote writer fails.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::models::{Action, Category, Label, TimelineEvent, TranscriptSource};

use super::classify::Classifier;
use super::ReportInput;

const BAR_WIDTH: usize = 20;
const MAX_EXCERPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityTier {
    Minimal,
    Low,
    Medium,
    High,
}

impl SeverityTier {
    pub fn for_score(score: f64) -> Self {
        if score < 0.15 {
            SeverityTier::Minimal
        } else if score < 0.4 {
            SeverityTier::Low
        } else if score < 0.7 {
            SeverityTier::Medium
        } else {
            SeverityTier::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityTier::Minimal => "MINIMAL",
            SeverityTier::Low => "LOW",
            SeverityTier::Medium => "MEDIUM",
            SeverityTier::High => "HIGH",
        }
    }
}

pub fn score_bar(score: f64) -> String {
    let filled = ((score.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let m = total / 60;
    let s = total % 60;
    format!("{m:02}:{s:02}")
}

fn banner(label: Label) -> &'static str {
    match label {
        Label::Safe => "SAFE: no concerning content",
        Label::Neutral => "NEUTRAL: minor signals only",
        Label::Review => "REVIEW: moderate signals need attention",
        Label::Flagged => "FLAGGED: content exceeds policy thresholds",
    }
}

/// Render the full text report.
pub fn render(input: &ReportInput<'_>, label: Label, action: Action, classifier: &Classifier) -> String {
    let mut out = String::new();
    let scores = input.scores;

    // Writing to a String cannot fail.
    let _ = writeln!(out, "=== CONTENT MODERATION REPORT ===");
    let _ = writeln!(out, "Classification: {}", banner(label));
    let _ = writeln!(
        out,
        "Video duration: {}  |  Frames analyzed: {}  |  Transcript segments: {}",
        format_timestamp(input.duration_seconds),
        input.frames.len(),
        input.transcript.segments.len()
    );

    let _ = writeln!(out, "\n--- Category scores ---");
    for c in Category::ALL {
        let v = scores.get(c);
        let _ = writeln!(
            out,
            "  {:<15} {} {:.2}  {}",
            c.display_name(),
            score_bar(v),
            v,
            SeverityTier::for_score(v).as_str()
        );
    }

    let _ = writeln!(out, "\n--- Timeline ---");
    write_timeline_summary(&mut out, input.timeline);

    let _ = writeln!(out, "\n--- Scenes and objects ---");
    write_scene_listing(&mut out, input);

    let _ = writeln!(out, "\n--- Transcript ---");
    write_transcript_excerpts(&mut out, input);

    let _ = writeln!(out, "\n--- Reasoning ---");
    let _ = writeln!(out, "{}", reasoning(input, label, classifier));

    let _ = writeln!(out, "\n--- Recommended action ---");
    let _ = writeln!(
        out,
        "{}: {}",
        action.as_str().to_uppercase(),
        classifier.action_rationale(action, scores, input.timeline)
    );

    let _ = writeln!(
        out,
        "\nOverall confidence: {:.0}%",
        scores.overall_confidence * 100.0
    );
    out
}

fn write_timeline_summary(out: &mut String, timeline: &[TimelineEvent]) {
    if timeline.is_empty() {
        let _ = writeln!(out, "  No flagged moments.");
        return;
    }

    let mut groups: BTreeMap<Category, Vec<&TimelineEvent>> = BTreeMap::new();
    for ev in timeline {
        groups.entry(ev.category).or_default().push(ev);
    }

    for (category, events) in groups {
        let first = events.iter().map(|e| e.start).fold(f64::INFINITY, f64::min);
        let last = events.iter().map(|e| e.end).fold(0.0, f64::max);
        let peak = events.iter().map(|e| e.score).fold(0.0, f64::max);
        let _ = writeln!(
            out,
            "  {:<15} {} event{} between {} and {} (peak {:.2})",
            category.display_name(),
            events.len(),
            if events.len() == 1 { "" } else { "s" },
            format_timestamp(first),
            format_timestamp(last),
            peak
        );
    }
}

fn write_scene_listing(out: &mut String, input: &ReportInput<'_>) {
    let mut scenes: BTreeMap<&str, usize> = BTreeMap::new();
    let mut objects: BTreeMap<&str, usize> = BTreeMap::new();
    let mut max_faces = 0;

    for signals in input.frames.iter().filter_map(|f| f.signals.as_ref()) {
        if !signals.scene_label.is_empty() {
            *scenes.entry(signals.scene_label.as_str()).or_default() += 1;
        }
        for obj in &signals.objects {
            *objects.entry(obj.as_str()).or_default() += 1;
        }
        max_faces = max_faces.max(signals.faces);
    }

    if scenes.is_empty() && objects.is_empty() {
        let _ = writeln!(out, "  No scenes or objects recognized.");
        return;
    }

    if !scenes.is_empty() {
        let _ = writeln!(out, "  Scenes:  {}", top_counts(&scenes, 5));
    }
    if !objects.is_empty() {
        let _ = writeln!(out, "  Objects: {}", top_counts(&objects, 10));
    }
    if max_faces > 0 {
        let _ = writeln!(out, "  Faces:   up to {max_faces} per frame");
    }
}

fn top_counts(counts: &BTreeMap<&str, usize>, limit: usize) -> String {
    let mut sorted: Vec<(&&str, &usize)> = counts.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    sorted
        .into_iter()
        .take(limit)
        .map(|(name, n)| format!("{name} ({n})"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_transcript_excerpts(out: &mut String, input: &ReportInput<'_>) {
    let transcript = input.transcript;
    match transcript.source {
        TranscriptSource::None => {
            let _ = writeln!(out, "  No audio track.");
            return;
        }
        TranscriptSource::SimulatedFallback => {
            let _ = writeln!(
                out,
                "  NOTE: speech recognition was unavailable. The transcript below is a simulated placeholder, not real transcription."
            );
        }
        TranscriptSource::Remote { ref model } => {
            let _ = writeln!(
                out,
                "  Transcribed by {model} ({} segments, language: {}).",
                transcript.segments.len(),
                if transcript.language.is_empty() { "unknown" } else { transcript.language.as_str() }
            );
        }
    }

    let flagged: Vec<_> = transcript.flagged_segments().collect();
    if flagged.is_empty() {
        let _ = writeln!(out, "  No flagged speech.");
        return;
    }

    for seg in flagged.iter().take(MAX_EXCERPTS) {
        let category = seg
            .primary_category
            .map(|c| c.display_name())
            .unwrap_or("Flagged");
        let _ = writeln!(
            out,
            "  [{}] {} {:.2}: \"{}\"",
            format_timestamp(seg.start),
            category,
            seg.scores.max_value(),
            seg.text.trim()
        );
    }
    if flagged.len() > MAX_EXCERPTS {
        let _ = writeln!(out, "  ... and {} more", flagged.len() - MAX_EXCERPTS);
    }
}

fn reasoning(input: &ReportInput<'_>, label: Label, classifier: &Classifier) -> String {
    let scores = input.scores;
    let Some((top, top_score)) = scores.scores.max_category() else {
        return format!(
            "No concerning content was detected. All categories scored zero across {} sampled frame{} and {} transcript segment{}.",
            input.frames.len(),
            if input.frames.len() == 1 { "" } else { "s" },
            input.transcript.segments.len(),
            if input.transcript.segments.len() == 1 { "" } else { "s" },
        );
    };

    let t = classifier.thresholds();
    let mut parts = vec![format!(
        "The strongest signal was {} at {:.2} ({}).",
        top.display_name(),
        top_score,
        SeverityTier::for_score(top_score).as_str()
    )];

    let above_review: Vec<&str> = Category::ALL
        .iter()
        .filter(|&&c| scores.get(c) > t.review)
        .map(|c| c.display_name())
        .collect();
    if !above_review.is_empty() {
        parts.push(format!(
            "Categories above the review threshold: {}.",
            above_review.join(", ")
        ));
    }

    if !input.timeline.is_empty() {
        parts.push(format!(
            "{} flagged moment{} were placed on the timeline.",
            input.timeline.len(),
            if input.timeline.len() == 1 { "" } else { "s" }
        ));
    }

    if input.transcript.source.is_simulated() {
        parts.push("Transcript-based scores come from a simulated transcript and carry no weight.".to_string());
    }

    parts.push(match label {
        Label::Flagged => "The content exceeds at least one hard policy threshold.".to_string(),
        Label::Review => "The content is not clearly violating but warrants attention.".to_string(),
        Label::Neutral => "Signals are weak and likely incidental.".to_string(),
        Label::Safe => "No concerning content was detected.".to_string(),
    });

    parts.join(" ")
}
