use unicode_width::UnicodeWidthStr;

use crate::db::models::*;
use crate::models::{AnalysisJob, Category, ScoreVector, TimelineEvent, Transcript, Verdict};
use crate::pipeline::batch::BatchOutcome;
use crate::verdict::template::{format_timestamp, score_bar, SeverityTier};

/// Format duration in seconds to human-readable string.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h{m:02}m")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Truncate a string to fit within max_width (respecting unicode width).
fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + cw + 3 > max_width {
            result.push_str("...");
            break;
        }
        result.push(ch);
        width += cw;
    }
    result
}

/// Keep the tail of a path, which is the informative part.
fn truncate_path(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let tail: String = s.chars().rev().take(max_width.saturating_sub(3)).collect();
    format!("...{}", tail.chars().rev().collect::<String>())
}

/// Format job list as a table.
pub fn print_job_list(jobs: &[AnalysisJob]) {
    if jobs.is_empty() {
        println!("No jobs found.");
        return;
    }

    println!("{} job{}:\n", jobs.len(), if jobs.len() == 1 { "" } else { "s" });

    println!(
        "  {:<36} {:<10} {:>4} {:<12} {:<34}",
        "ID", "STATUS", "%", "CREATED", "SOURCE"
    );
    println!("  {}", "-".repeat(100));

    for j in jobs {
        let date_short = j.created_at.get(..10).unwrap_or(&j.created_at);
        println!(
            "  {:<36} {:<10} {:>4} {:<12} {:<34}",
            j.id,
            j.status.as_str(),
            j.progress,
            date_short,
            truncate_path(&j.source_path, 34),
        );
    }
}

/// Format a single job's details for `vmod show`.
pub fn print_job_detail(
    job: &AnalysisJob,
    scores: Option<&ScoreVector>,
    verdict: Option<&Verdict>,
    transcript: Option<&Transcript>,
    timeline_events: usize,
) {
    println!("Job: {}", job.id);
    println!("  Source:   {}", job.source_path);
    println!("  Owner:    {}", job.owner);
    println!("  Status:   {} ({}%, {})", job.status.as_str(), job.progress, job.stage_message);
    if let Some(d) = job.duration_seconds {
        println!("  Duration: {}", format_duration(d));
    }
    if let Some(res) = job.resolution() {
        println!("  Size:     {res}");
    }
    if let Some(bytes) = job.file_size {
        println!("  File:     {}", format_bytes(bytes));
    }
    if let Some(audio) = job.has_audio {
        println!("  Audio:    {}", if audio { "yes" } else { "no" });
    }
    if let Some(ref prev) = job.supersedes {
        println!("  Replaces: {prev}");
    }
    println!("  Created:  {}", job.created_at);
    if let Some(ref t) = job.completed_at {
        println!("  Finished: {t}");
    }
    if let Some(ref reason) = job.failure_reason {
        println!("\nFailure: {reason}");
    }

    if let Some(v) = verdict {
        println!("\nVerdict:  {} -> {}", v.label.as_str().to_uppercase(), v.recommended_action);
        println!(
            "  Models:   vision={} transcript={} report={}",
            v.models.vision, v.models.transcript, v.models.report
        );
    }

    if let Some(s) = scores {
        println!("\nScores:");
        for c in Category::ALL {
            let value = s.get(c);
            println!(
                "  {:<15} {} {:.2} {}",
                c.display_name(),
                score_bar(value),
                value,
                SeverityTier::for_score(value).as_str()
            );
        }
        println!("  Confidence: {:.0}%", s.overall_confidence * 100.0);
        println!("  Timeline:   {timeline_events} event{}", if timeline_events == 1 { "" } else { "s" });
    }

    if let Some(t) = transcript {
        let flagged = t.flagged_segments().count();
        println!(
            "\nTranscript: {} segment{}, {} flagged ({})",
            t.segments.len(),
            if t.segments.len() == 1 { "" } else { "s" },
            flagged,
            t.source.tag()
        );
    }
}

/// Format timeline events for `vmod timeline`.
pub fn print_timeline(events: &[TimelineEvent]) {
    if events.is_empty() {
        println!("No flagged moments.");
        return;
    }

    println!("{} event{}:\n", events.len(), if events.len() == 1 { "" } else { "s" });
    println!("  {:<13} {:<15} {:>5}  NOTE", "TIME", "CATEGORY", "SCORE");
    println!("  {}", "-".repeat(76));
    for ev in events {
        println!(
            "  {}-{} {:<15} {:>5.2}  {}",
            format_timestamp(ev.start),
            format_timestamp(ev.end),
            ev.category.display_name(),
            ev.score,
            truncate(&ev.note.replace('\n', " "), 40),
        );
    }
}

/// One line per job of an `analyze` run.
pub fn print_batch_outcomes(outcomes: &[BatchOutcome]) {
    for o in outcomes {
        match o.result {
            Ok(ref s) => println!(
                "  {}  {:<8} {:<14} {} frames, {} events, transcript {}",
                o.job_id,
                s.verdict.label.as_str(),
                s.verdict.recommended_action.as_str(),
                s.frames,
                s.timeline_events,
                s.transcript_source
            ),
            Err(ref e) => println!("  {}  FAILED   {}", o.job_id, truncate(e, 80)),
        }
    }
}

/// Print database stats.
pub fn print_stats(stats: &DbStats) {
    println!("Database Statistics:");
    println!("  Jobs:                {}", stats.jobs);
    println!("  Frames:              {}", stats.frames);
    println!("  Transcript segments: {}", stats.transcript_segments);
    println!("  Timeline events:     {}", stats.timeline_events);
    println!("  DB Size:             {}", format_bytes(stats.db_size_bytes));
    if !stats.statuses.is_empty() {
        println!("\n  Status:");
        for sc in &stats.statuses {
            println!("    {:<16} {}", sc.name, sc.count);
        }
    }
    if !stats.labels.is_empty() {
        println!("\n  Labels:");
        for lc in &stats.labels {
            println!("    {:<16} {}", lc.name, lc.count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(9.0), "9s");
        assert_eq!(format_duration(125.0), "2m05s");
        assert_eq!(format_duration(3720.0), "1h02m");
    }

    #[test]
    fn long_paths_keep_their_tail() {
        let p = "/very/long/directory/structure/holding/clip.mp4";
        let t = truncate_path(p, 20);
        assert!(t.starts_with("..."));
        assert!(t.ends_with("clip.mp4"));
        assert_eq!(t.chars().count(), 20);
    }

    #[test]
    fn truncate_respects_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }
}
