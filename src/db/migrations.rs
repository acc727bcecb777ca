use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Run all pending migrations in id order. The v1 schema is created fresh by
/// schema.rs; later changes are appended to `MIGRATIONS`.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS vmod_migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        );",
    )?;

    for &(id, name, sql) in MIGRATIONS {
        run_migration(conn, id, name, |c| {
            c.execute_batch(sql)?;
            Ok(())
        })?;
    }

    Ok(())
}

/// `(id, name, sql)`; ids are never reused.
const MIGRATIONS: &[(i64, &str, &str)] = &[(
    1,
    "index_jobs_supersedes",
    "CREATE INDEX IF NOT EXISTS idx_jobs_supersedes ON jobs(supersedes);",
)];

fn run_migration<F>(conn: &Connection, id: i64, name: &str, f: F) -> Result<()>
where
    F: FnOnce(&Connection) -> Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM vmod_migrations WHERE id = ?1",
        [id],
        |row| row.get(0),
    )?;

    if already_applied {
        return Ok(());
    }

    f(conn)?;

    conn.execute(
        "INSERT INTO vmod_migrations (id, name) VALUES (?1, ?2)",
        rusqlite::params![id, name],
    )?;

    info!("Applied migration {id}: {name}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_once() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::create_schema(&conn).unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM vmod_migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }
}
