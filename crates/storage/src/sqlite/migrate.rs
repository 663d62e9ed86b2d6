use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs the versioned schema migrations.
///
/// Version 1 creates the content catalog (campaigns, sections, questions,
/// answers) and per-user progress (top-level record plus section and
/// campaign completion rows).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS campaigns (
                    id INTEGER PRIMARY KEY,
                    title TEXT NOT NULL,
                    description TEXT,
                    sort_order INTEGER NOT NULL,
                    thumbnail_key TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS sections (
                    id INTEGER PRIMARY KEY,
                    campaign_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    sort_order INTEGER NOT NULL,
                    FOREIGN KEY (campaign_id) REFERENCES campaigns(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    section_id INTEGER NOT NULL,
                    prompt TEXT NOT NULL,
                    sort_order INTEGER NOT NULL,
                    xp_value INTEGER NOT NULL CHECK (xp_value >= 0),
                    FOREIGN KEY (section_id) REFERENCES sections(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS answers (
                    id INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    PRIMARY KEY (question_id, id),
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // Id arrays are JSON text; elements may be null in rows written by
        // older clients and are filtered on read.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS user_progress (
                    user_id TEXT PRIMARY KEY,
                    total_xp INTEGER NOT NULL CHECK (total_xp >= 0),
                    streak INTEGER NOT NULL CHECK (streak >= 0),
                    last_activity_at TEXT,
                    answered_questions TEXT NOT NULL DEFAULT '[]',
                    completed_sections TEXT NOT NULL DEFAULT '[]',
                    completed_campaigns TEXT NOT NULL DEFAULT '[]',
                    merged_guest_sessions TEXT NOT NULL DEFAULT '[]',
                    version INTEGER NOT NULL CHECK (version >= 1),
                    updated_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS section_progress (
                    user_id TEXT NOT NULL,
                    section_id INTEGER NOT NULL,
                    answered_question_ids TEXT NOT NULL DEFAULT '[]',
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, section_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS campaign_progress (
                    user_id TEXT NOT NULL,
                    campaign_id INTEGER NOT NULL,
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, campaign_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_sections_campaign_order
                    ON sections (campaign_id, sort_order, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_section_order
                    ON questions (section_id, sort_order, id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied sqlite migration");
    }

    Ok(())
}
