//! Run several jobs concurrently, one store connection per worker thread.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use tracing::warn;

use crate::db::Database;

use super::{Pipeline, RunSummary};

/// Result of one job in a batch. Errors are flattened to strings so
/// outcomes can cross threads and be printed uniformly.
#[derive(Debug)]
pub struct BatchOutcome {
    pub job_id: String,
    pub result: Result<RunSummary, String>,
}

/// Process `job_ids` with up to `workers` threads. Outcomes come back in
/// input order.
pub fn run_batch(pipeline: &Pipeline, db_path: &Path, job_ids: &[String], workers: usize) -> Vec<BatchOutcome> {
    let workers = workers.clamp(1, job_ids.len().max(1));
    let next = AtomicUsize::new(0);
    let (tx, rx) = channel::<(usize, BatchOutcome)>();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || {
                let db = match Database::open(db_path) {
                    Ok(db) => Some(db),
                    Err(e) => {
                        warn!("Worker could not open database: {e:#}");
                        None
                    }
                };
                loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let Some(job_id) = job_ids.get(i) else {
                        break;
                    };
                    let result = match db {
                        Some(ref db) => pipeline.run(db, job_id).map_err(|e| e.to_string()),
                        None => Err(format!("Failed to open database: {}", db_path.display())),
                    };
                    let outcome = BatchOutcome {
                        job_id: job_id.clone(),
                        result,
                    };
                    if tx.send((i, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(tx);

    let mut outcomes: Vec<(usize, BatchOutcome)> = rx.into_iter().collect();
    outcomes.sort_by_key(|(i, _)| *i);
    outcomes.into_iter().map(|(_, o)| o).collect()
}
