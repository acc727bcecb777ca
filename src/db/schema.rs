use anyhow::Result;
use rusqlite::Connection;

pub const SCHEMA_VERSION: &str = "1";

pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Version tracking
        CREATE TABLE IF NOT EXISTS vmod_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- One row per pipeline run
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            source_path TEXT NOT NULL,
            file_size INTEGER,
            duration_seconds REAL,
            width INTEGER,
            height INTEGER,
            has_audio INTEGER,
            stage TEXT NOT NULL DEFAULT 'queued',
            progress INTEGER NOT NULL DEFAULT 0,
            stage_message TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            failure_reason TEXT,
            supersedes TEXT REFERENCES jobs(id) ON DELETE SET NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
            started_at TEXT,
            completed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS frames (
            job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            frame_index INTEGER NOT NULL,
            timestamp REAL NOT NULL,
            image_ref TEXT NOT NULL,
            byte_size INTEGER NOT NULL DEFAULT 0,
            scores TEXT NOT NULL DEFAULT '{}',
            objects TEXT NOT NULL DEFAULT '[]',
            faces INTEGER NOT NULL DEFAULT 0,
            scene_label TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL DEFAULT 0,
            source TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (job_id, frame_index)
        );

        CREATE TABLE IF NOT EXISTS transcripts (
            job_id TEXT PRIMARY KEY REFERENCES jobs(id) ON DELETE CASCADE,
            full_text TEXT NOT NULL DEFAULT '',
            language TEXT NOT NULL DEFAULT '',
            source TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transcript_segments (
            job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            segment_index INTEGER NOT NULL,
            start_time REAL NOT NULL,
            end_time REAL,
            text TEXT NOT NULL DEFAULT '',
            scores TEXT NOT NULL DEFAULT '{}',
            flagged INTEGER NOT NULL DEFAULT 0,
            primary_category TEXT,
            sentiment TEXT NOT NULL DEFAULT 'neutral',
            PRIMARY KEY (job_id, segment_index)
        );

        CREATE TABLE IF NOT EXISTS scores (
            job_id TEXT PRIMARY KEY REFERENCES jobs(id) ON DELETE CASCADE,
            nudity REAL NOT NULL DEFAULT 0,
            violence REAL NOT NULL DEFAULT 0,
            weapons REAL NOT NULL DEFAULT 0,
            profanity REAL NOT NULL DEFAULT 0,
            hate_speech REAL NOT NULL DEFAULT 0,
            sexual_content REAL NOT NULL DEFAULT 0,
            drug_use REAL NOT NULL DEFAULT 0,
            overall_confidence REAL NOT NULL DEFAULT 0.5
        );

        CREATE TABLE IF NOT EXISTS timeline_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            start_time REAL NOT NULL,
            end_time REAL NOT NULL,
            category TEXT NOT NULL,
            score REAL NOT NULL,
            note TEXT NOT NULL DEFAULT '',
            UNIQUE(job_id, start_time, end_time, category),
            CHECK (end_time >= start_time)
        );

        CREATE TABLE IF NOT EXISTS verdicts (
            job_id TEXT PRIMARY KEY REFERENCES jobs(id) ON DELETE CASCADE,
            label TEXT NOT NULL,
            recommended_action TEXT NOT NULL,
            report_text TEXT NOT NULL,
            vision_model TEXT NOT NULL,
            transcript_model TEXT NOT NULL,
            report_model TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );

        -- Verdicts are written once
        CREATE TRIGGER IF NOT EXISTS verdicts_immutable BEFORE UPDATE ON verdicts BEGIN
            SELECT RAISE(ABORT, 'verdicts are immutable');
        END;

        -- Indexes for common filters
        CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
        CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner);
        CREATE INDEX IF NOT EXISTS idx_jobs_created ON jobs(created_at);
        CREATE INDEX IF NOT EXISTS idx_timeline_job ON timeline_events(job_id, start_time);
        ",
    )?;

    // Set schema version
    conn.execute(
        "INSERT OR REPLACE INTO vmod_meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}
