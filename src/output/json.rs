use anyhow::Result;
use serde::Serialize;

use crate::pipeline::batch::BatchOutcome;

/// Pretty-print any serializable value as JSON to stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

/// JSON view of an `analyze` run.
pub fn batch_json(outcomes: &[BatchOutcome]) -> serde_json::Value {
    let jobs: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|o| match o.result {
            Ok(ref s) => serde_json::json!({
                "job_id": o.job_id,
                "status": "completed",
                "label": s.verdict.label,
                "recommended_action": s.verdict.recommended_action,
                "scores": s.scores,
                "frames": s.frames,
                "timeline_events": s.timeline_events,
                "flagged_segments": s.flagged_segments,
                "models": s.verdict.models,
            }),
            Err(ref e) => serde_json::json!({
                "job_id": o.job_id,
                "status": "failed",
                "error": e,
            }),
        })
        .collect();
    serde_json::json!({ "total": outcomes.len(), "jobs": jobs })
}
