pub mod migrations;
pub mod models;
pub mod schema;

use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{
    Action, AnalysisJob, Category, CategoryScores, FrameSample, FrameSignals, JobStatus, Label,
    ModelTags, ScoreVector, Sentiment, Stage, TimelineEvent, Transcript, TranscriptSegment,
    TranscriptSource, Verdict, VideoMetadata,
};
use models::*;

const JOB_COLUMNS: &str = "id, owner, source_path, file_size, duration_seconds, width, height, has_audio,
     stage, progress, stage_message, status, failure_reason, supersedes, created_at, started_at, completed_at";

pub struct Database {
    pub conn: Connection,
    pub path: PathBuf,
}

/// UTC timestamp in the same shape SQLite's column defaults produce.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn conversion_error(idx: usize, what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, format!("unknown {what}: {value}").into())
}

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisJob> {
    let stage: String = row.get(8)?;
    let status: String = row.get(11)?;
    let progress: i64 = row.get(9)?;
    Ok(AnalysisJob {
        id: row.get(0)?,
        owner: row.get(1)?,
        source_path: row.get(2)?,
        file_size: row.get::<_, Option<i64>>(3)?.map(|v| v as u64),
        duration_seconds: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        has_audio: row.get(7)?,
        stage: Stage::from_str(&stage).ok_or_else(|| conversion_error(8, "stage", &stage))?,
        progress: progress.clamp(0, 100) as u8,
        stage_message: row.get(10)?,
        status: JobStatus::from_str(&status).ok_or_else(|| conversion_error(11, "status", &status))?,
        failure_reason: row.get(12)?,
        supersedes: row.get(13)?,
        created_at: row.get(14)?,
        started_at: row.get(15)?,
        completed_at: row.get(16)?,
    })
}

fn json_column<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // Performance pragmas
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA cache_size = -64000;",
        )?;

        schema::create_schema(&conn)?;
        migrations::run_migrations(&conn)?;

        info!("Opened database: {}", path.display());

        Ok(Database {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::create_schema(&conn)?;
        migrations::run_migrations(&conn)?;
        Ok(Database {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Transaction that takes the write lock up front. A deferred one that
    /// reads first fails with `SQLITE_BUSY_SNAPSHOT` if another connection
    /// commits before its first write, and the busy timeout does not retry that.
    fn write_transaction(&self) -> Result<Transaction<'_>> {
        Ok(Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?)
    }

    /// Default database path: ~/.vmod/vmod.db
    pub fn default_db_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".vmod").join("vmod.db"))
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM vmod_meta WHERE key = 'schema_version'",
                [],
                |r| r.get(0),
            )
            .optional()?)
    }

    // ---- jobs -------------------------------------------------------------

    /// Queue a new job in `pending`.
    pub fn create_job(&self, new: &NewJob) -> Result<AnalysisJob> {
        if let Some(ref prev) = new.supersedes {
            if !self.job_exists(prev)? {
                bail!("Superseded job not found: {prev}");
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO jobs (id, owner, source_path, supersedes, stage, progress, stage_message, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'queued', 0, 'Queued', 'pending', ?5)",
            rusqlite::params![id, new.owner, new.source_path, new.supersedes, now_timestamp()],
        )?;

        self.get_job(&id)?
            .with_context(|| format!("Job {id} vanished after insert"))
    }

    /// Get a single job by ID.
    pub fn get_job(&self, id: &str) -> Result<Option<AnalysisJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let job = self.conn.query_row(&sql, [id], job_from_row).optional()?;
        Ok(job)
    }

    pub fn job_exists(&self, id: &str) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM jobs WHERE id = ?1", [id], |r| r.get(0))?;
        Ok(count > 0)
    }

    /// Jobs, newest first.
    pub fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<AnalysisJob>> {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            params.push(Box::new(status.as_str()));
            conditions.push(format!("status = ?{}", params.len()));
        }
        if let Some(ref owner) = filter.owner {
            params.push(Box::new(owner.clone()));
            conditions.push(format!("owner = ?{}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let limit = if filter.limit == 0 { -1 } else { filter.limit as i64 };
        params.push(Box::new(limit));

        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs {where_clause}
             ORDER BY created_at DESC, rowid DESC LIMIT ?{}",
            params.len()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), job_from_row)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?);
        }
        Ok(jobs)
    }

    /// Atomically move a pending (or previously failed) job to `running`.
    /// Returns false when the job is missing, already running, or completed.
    pub fn try_mark_running(&self, id: &str) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE jobs
             SET status = 'running', stage = 'queued', progress = 0, stage_message = 'Starting',
                 failure_reason = NULL, started_at = ?2, completed_at = NULL
             WHERE id = ?1 AND status IN ('pending', 'failed')",
            rusqlite::params![id, now_timestamp()],
        )?;
        Ok(updated == 1)
    }

    pub fn update_progress(&self, id: &str, stage: Stage, progress: u8, message: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE jobs SET stage = ?2, progress = ?3, stage_message = ?4 WHERE id = ?1",
            rusqlite::params![id, stage.as_str(), progress.min(100), message],
        )?;
        Ok(())
    }

    pub fn save_metadata(&self, id: &str, meta: &VideoMetadata) -> Result<()> {
        self.conn.execute(
            "UPDATE jobs SET file_size = ?2, duration_seconds = ?3, width = ?4, height = ?5, has_audio = ?6
             WHERE id = ?1",
            rusqlite::params![
                id,
                meta.file_size as i64,
                meta.duration_seconds,
                meta.width,
                meta.height,
                meta.has_audio,
            ],
        )?;
        Ok(())
    }

    pub fn mark_failed(&self, id: &str, reason: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE jobs SET status = 'failed', failure_reason = ?2, completed_at = ?3 WHERE id = ?1",
            rusqlite::params![id, reason, now_timestamp()],
        )?;
        Ok(())
    }

    /// Delete a job and all derived data (cascading). Jobs that superseded it
    /// keep running history but lose the link.
    pub fn delete_job(&self, id: &str) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    // ---- transcript -------------------------------------------------------

    /// Replace the job's transcript and segments.
    pub fn save_transcript(&self, id: &str, transcript: &Transcript) -> Result<()> {
        let tx = self.write_transaction()?;

        tx.execute("DELETE FROM transcript_segments WHERE job_id = ?1", [id])?;
        tx.execute(
            "INSERT OR REPLACE INTO transcripts (job_id, full_text, language, source) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id, transcript.full_text, transcript.language, transcript.source.tag()],
        )?;

        for (i, seg) in transcript.segments.iter().enumerate() {
            tx.execute(
                "INSERT INTO transcript_segments
                 (job_id, segment_index, start_time, end_time, text, scores, flagged, primary_category, sentiment)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    id,
                    i as i64,
                    seg.start,
                    seg.end,
                    seg.text,
                    serde_json::to_string(&seg.scores)?,
                    seg.flagged,
                    seg.primary_category.map(|c| c.as_str()),
                    seg.sentiment.as_str(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    pub fn get_transcript(&self, id: &str) -> Result<Option<Transcript>> {
        let head = self
            .conn
            .query_row(
                "SELECT full_text, language, source FROM transcripts WHERE job_id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((full_text, language, source)) = head else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT start_time, end_time, text, scores, flagged, primary_category, sentiment
             FROM transcript_segments WHERE job_id = ?1 ORDER BY segment_index",
        )?;
        let rows = stmt.query_map([id], |row| {
            let scores: String = row.get(3)?;
            let primary: Option<String> = row.get(5)?;
            let sentiment: String = row.get(6)?;
            Ok(TranscriptSegment {
                start: row.get(0)?,
                end: row.get(1)?,
                text: row.get(2)?,
                scores: json_column(3, &scores)?,
                flagged: row.get(4)?,
                primary_category: primary.as_deref().and_then(Category::from_str),
                sentiment: Sentiment::from_str(&sentiment).unwrap_or_default(),
            })
        })?;

        let mut segments = Vec::new();
        for row in rows {
            segments.push(row?);
        }

        Ok(Some(Transcript {
            full_text,
            language,
            segments,
            source: TranscriptSource::from_tag(&source),
        }))
    }

    // ---- results ----------------------------------------------------------

    /// Write frames, scores, timeline and verdict and complete the job, all in
    /// one transaction. Fails if the job already has a verdict.
    pub fn save_results(&self, id: &str, results: &AnalysisResults<'_>) -> Result<()> {
        let tx = self.write_transaction()?;

        let has_verdict: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM verdicts WHERE job_id = ?1",
            [id],
            |r| r.get(0),
        )?;
        if has_verdict {
            bail!("Job {id} already has a verdict");
        }

        // Frames
        tx.execute("DELETE FROM frames WHERE job_id = ?1", [id])?;
        for frame in results.frames {
            let signals = frame.signals.as_ref();
            tx.execute(
                "INSERT INTO frames
                 (job_id, frame_index, timestamp, image_ref, byte_size, scores, objects, faces, scene_label, confidence, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    id,
                    frame.index,
                    frame.timestamp,
                    frame.image_ref.to_string_lossy(),
                    frame.byte_size as i64,
                    serde_json::to_string(&frame.scores())?,
                    serde_json::to_string(&signals.map(|s| s.objects.as_slice()).unwrap_or_default())?,
                    signals.map(|s| s.faces).unwrap_or(0),
                    signals.map(|s| s.scene_label.as_str()).unwrap_or(""),
                    signals.map(|s| s.confidence).unwrap_or(0.0),
                    signals.map(|s| s.source.as_str()).unwrap_or(""),
                ],
            )?;
        }

        // Scores
        let s = &results.scores.scores;
        tx.execute(
            "INSERT OR REPLACE INTO scores
             (job_id, nudity, violence, weapons, profanity, hate_speech, sexual_content, drug_use, overall_confidence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                id,
                s.nudity,
                s.violence,
                s.weapons,
                s.profanity,
                s.hate_speech,
                s.sexual_content,
                s.drug_use,
                results.scores.overall_confidence,
            ],
        )?;

        // Timeline
        tx.execute("DELETE FROM timeline_events WHERE job_id = ?1", [id])?;
        for ev in results.timeline {
            tx.execute(
                "INSERT OR IGNORE INTO timeline_events (job_id, start_time, end_time, category, score, note)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, ev.start, ev.end, ev.category.as_str(), ev.score, ev.note],
            )?;
        }

        // Verdict
        let v = results.verdict;
        tx.execute(
            "INSERT INTO verdicts
             (job_id, label, recommended_action, report_text, vision_model, transcript_model, report_model, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                id,
                v.label.as_str(),
                v.recommended_action.as_str(),
                v.report_text,
                v.models.vision,
                v.models.transcript,
                v.models.report,
                now_timestamp(),
            ],
        )?;

        tx.execute(
            "UPDATE jobs SET status = 'completed', stage = 'done', progress = 100,
                 stage_message = ?2, completed_at = ?3
             WHERE id = ?1",
            rusqlite::params![id, Stage::Done.display_name(), now_timestamp()],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn get_frames(&self, id: &str) -> Result<Vec<FrameSample>> {
        let mut stmt = self.conn.prepare(
            "SELECT frame_index, timestamp, image_ref, byte_size, scores, objects, faces, scene_label, confidence, source
             FROM frames WHERE job_id = ?1 ORDER BY frame_index",
        )?;
        let rows = stmt.query_map([id], |row| {
            let scores: String = row.get(4)?;
            let objects: String = row.get(5)?;
            let image_ref: String = row.get(2)?;
            let byte_size: i64 = row.get(3)?;
            let signals = FrameSignals {
                scores: json_column(4, &scores)?,
                objects: json_column(5, &objects)?,
                faces: row.get(6)?,
                scene_label: row.get(7)?,
                confidence: row.get(8)?,
                source: row.get(9)?,
            };
            Ok(FrameSample::new(row.get(0)?, row.get(1)?, PathBuf::from(image_ref), byte_size as u64).scored(signals))
        })?;

        let mut frames = Vec::new();
        for row in rows {
            frames.push(row?);
        }
        Ok(frames)
    }

    pub fn get_scores(&self, id: &str) -> Result<Option<ScoreVector>> {
        let scores = self
            .conn
            .query_row(
                "SELECT nudity, violence, weapons, profanity, hate_speech, sexual_content, drug_use, overall_confidence
                 FROM scores WHERE job_id = ?1",
                [id],
                |row| {
                    Ok(ScoreVector {
                        scores: CategoryScores {
                            nudity: row.get(0)?,
                            violence: row.get(1)?,
                            weapons: row.get(2)?,
                            profanity: row.get(3)?,
                            hate_speech: row.get(4)?,
                            sexual_content: row.get(5)?,
                            drug_use: row.get(6)?,
                        },
                        overall_confidence: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(scores)
    }

    pub fn get_timeline(&self, id: &str) -> Result<Vec<TimelineEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT start_time, end_time, category, score, note FROM timeline_events
             WHERE job_id = ?1 ORDER BY start_time, category, end_time",
        )?;
        let rows = stmt.query_map([id], |row| {
            let category: String = row.get(2)?;
            Ok(TimelineEvent {
                start: row.get(0)?,
                end: row.get(1)?,
                category: Category::from_str(&category)
                    .ok_or_else(|| conversion_error(2, "category", &category))?,
                score: row.get(3)?,
                note: row.get(4)?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    pub fn get_verdict(&self, id: &str) -> Result<Option<Verdict>> {
        let verdict = self
            .conn
            .query_row(
                "SELECT label, recommended_action, report_text, vision_model, transcript_model, report_model
                 FROM verdicts WHERE job_id = ?1",
                [id],
                |row| {
                    let label: String = row.get(0)?;
                    let action: String = row.get(1)?;
                    Ok(Verdict {
                        label: Label::from_str(&label).ok_or_else(|| conversion_error(0, "label", &label))?,
                        recommended_action: Action::from_str(&action)
                            .ok_or_else(|| conversion_error(1, "action", &action))?,
                        report_text: row.get(2)?,
                        models: ModelTags {
                            vision: row.get(3)?,
                            transcript: row.get(4)?,
                            report: row.get(5)?,
                        },
                    })
                },
            )
            .optional()?;
        Ok(verdict)
    }

    /// Get database statistics.
    pub fn stats(&self) -> Result<DbStats> {
        let jobs: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0))?;
        let frames: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM frames", [], |r| r.get(0))?;
        let transcript_segments: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM transcript_segments", [], |r| r.get(0))?;
        let timeline_events: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM timeline_events", [], |r| r.get(0))?;

        let statuses = self.named_counts("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")?;
        let labels = self.named_counts("SELECT label, COUNT(*) FROM verdicts GROUP BY label ORDER BY label")?;

        let db_size_bytes = std::fs::metadata(&self.path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(DbStats {
            jobs,
            frames,
            transcript_segments,
            timeline_events,
            statuses,
            labels,
            db_size_bytes,
        })
    }

    fn named_counts(&self, sql: &str) -> Result<Vec<NamedCount>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(NamedCount {
                name: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }
}
