/*!
 * SQLite layout of the chapter store.
 *
 * Chapters live in `chapters`, their paragraphs in `paragraphs`, one row per
 * paragraph keyed by the chapter and the stable paragraph id. The layout
 * version is kept in SQLite's `user_version` pragma.
 */

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use rusqlite::Connection;

/// Layout version written by this build
pub const SCHEMA_VERSION: i32 = 1;

const CREATE_TABLES: &str = r#"
    CREATE TABLE IF NOT EXISTS chapters (
        project_id TEXT NOT NULL,
        id TEXT NOT NULL,
        number INTEGER NOT NULL,
        title TEXT,
        source_text TEXT NOT NULL,
        source_hash TEXT NOT NULL,
        translated_text TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        error_message TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (project_id, id)
    );

    CREATE INDEX IF NOT EXISTS idx_chapters_number ON chapters(project_id, number);
    CREATE INDEX IF NOT EXISTS idx_chapters_status ON chapters(status);

    CREATE TABLE IF NOT EXISTS paragraphs (
        project_id TEXT NOT NULL,
        chapter_id TEXT NOT NULL,
        id TEXT NOT NULL,
        position INTEGER NOT NULL,
        original_text TEXT NOT NULL,
        translated_text TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        edited_at TEXT,
        edited_by TEXT,
        PRIMARY KEY (project_id, chapter_id, id),
        FOREIGN KEY (project_id, chapter_id)
            REFERENCES chapters(project_id, id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_paragraphs_position ON paragraphs(project_id, chapter_id, position);
"#;

/// Prepare a freshly opened connection: pragmas, then tables when missing.
///
/// Fails on a database written by a newer build.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Foreign keys are a per-connection setting
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    match schema_version(conn)? {
        0 => {
            info!("Creating chapter store tables (layout v{})", SCHEMA_VERSION);
            // WAL keeps readers unblocked while a run writes its result
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            conn.execute_batch(CREATE_TABLES)
                .context("Failed to create chapter store tables")?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        SCHEMA_VERSION => debug!("Chapter store layout is current (v{})", SCHEMA_VERSION),
        newer => {
            return Err(anyhow!(
                "Database layout v{} is newer than this build supports (v{})",
                newer,
                SCHEMA_VERSION
            ));
        }
    }

    Ok(())
}

/// Layout version recorded in the database; 0 for an empty file
pub fn schema_version(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("Failed to read database layout version")
}
