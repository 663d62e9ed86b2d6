use chrono::Utc;
use raccoon_core::model::{CampaignId, ProgressState, QuestionId, SectionId, UserId};

use super::SqliteRepository;
use super::mapping::{
    conn, encode_sets, id_i64, map_campaign_row, map_progress_row, map_section_row,
};
use crate::repository::{
    CampaignCompletionRow, ProgressRecord, ProgressRepository, SectionCompletionDelta,
    SectionCompletionRow, StorageError, VersionCheck, check_version,
};
use crate::sanitize::encode_id_array;

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn load_progress(&self, user: &UserId) -> Result<ProgressRecord, StorageError> {
        let row = sqlx::query(
            r"
            SELECT total_xp, streak, last_activity_at, answered_questions, completed_sections,
                   completed_campaigns, merged_guest_sessions, version
            FROM user_progress
            WHERE user_id = ?1
            ",
        )
        .bind(user.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        let (state, version) = map_progress_row(&row)?;
        Ok(ProgressRecord {
            user_id: user.clone(),
            state,
            version,
        })
    }

    async fn save_progress(
        &self,
        user: &UserId,
        state: &ProgressState,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        let sets = encode_sets(state)?;
        let total_xp = i64::try_from(state.total_xp())
            .map_err(|_| StorageError::Serialization("total_xp overflow".into()))?;
        let streak = i64::from(state.streak());

        let mut tx = self.pool.begin().await.map_err(conn)?;

        let existing = sqlx::query(
            r"
            SELECT total_xp, streak, last_activity_at, answered_questions, completed_sections,
                   completed_campaigns, merged_guest_sessions, version
            FROM user_progress
            WHERE user_id = ?1
            ",
        )
        .bind(user.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?;
        let stored = existing.as_ref().map(map_progress_row).transpose()?;

        let version = match check_version(
            stored.as_ref().map(|(s, v)| (s, *v)),
            state,
            expected_version,
        )? {
            VersionCheck::AlreadyApplied(v) => {
                tracing::debug!(user = user.as_str(), version = v, "progress write already applied");
                return Ok(v);
            }
            VersionCheck::Write(v) => v,
        };
        let version_i64 = id_i64("version", version)?;

        if stored.is_some() {
            let res = sqlx::query(
                r"
                UPDATE user_progress SET
                    total_xp = ?2,
                    streak = ?3,
                    last_activity_at = ?4,
                    answered_questions = ?5,
                    completed_sections = ?6,
                    completed_campaigns = ?7,
                    merged_guest_sessions = ?8,
                    version = ?9,
                    updated_at = ?10
                WHERE user_id = ?1 AND version = ?11
                ",
            )
            .bind(user.as_str())
            .bind(total_xp)
            .bind(streak)
            .bind(state.last_activity_at())
            .bind(&sets.answered_questions)
            .bind(&sets.completed_sections)
            .bind(&sets.completed_campaigns)
            .bind(&sets.merged_guest_sessions)
            .bind(version_i64)
            .bind(Utc::now())
            .bind(version_i64 - 1)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
            if res.rows_affected() != 1 {
                return Err(StorageError::Conflict);
            }
        } else {
            sqlx::query(
                r"
                INSERT INTO user_progress (
                    user_id, total_xp, streak, last_activity_at, answered_questions,
                    completed_sections, completed_campaigns, merged_guest_sessions,
                    version, updated_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
            )
            .bind(user.as_str())
            .bind(total_xp)
            .bind(streak)
            .bind(state.last_activity_at())
            .bind(&sets.answered_questions)
            .bind(&sets.completed_sections)
            .bind(&sets.completed_campaigns)
            .bind(&sets.merged_guest_sessions)
            .bind(version_i64)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(version)
    }

    async fn load_section_completion_rows(
        &self,
        user: &UserId,
    ) -> Result<Vec<SectionCompletionRow>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT section_id, answered_question_ids, correct_count, completed
            FROM section_progress
            WHERE user_id = ?1
            ORDER BY section_id ASC
            ",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_section_row).collect()
    }

    async fn load_campaign_completion_rows(
        &self,
        user: &UserId,
    ) -> Result<Vec<CampaignCompletionRow>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT campaign_id, completed
            FROM campaign_progress
            WHERE user_id = ?1
            ORDER BY campaign_id ASC
            ",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_campaign_row).collect()
    }

    async fn upsert_section_completion(
        &self,
        user: &UserId,
        section: SectionId,
        delta: &SectionCompletionDelta,
    ) -> Result<SectionCompletionRow, StorageError> {
        let section_i64 = id_i64("section_id", section.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let existing = sqlx::query(
            r"
            SELECT section_id, answered_question_ids, correct_count, completed
            FROM section_progress
            WHERE user_id = ?1 AND section_id = ?2
            ",
        )
        .bind(user.as_str())
        .bind(section_i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?
        .as_ref()
        .map(map_section_row)
        .transpose()?;

        let row = SectionCompletionRow::merge(existing.as_ref(), section, delta);

        sqlx::query(
            r"
            INSERT INTO section_progress (
                user_id, section_id, answered_question_ids, correct_count, completed, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id, section_id) DO UPDATE SET
                answered_question_ids = excluded.answered_question_ids,
                correct_count = excluded.correct_count,
                completed = excluded.completed,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user.as_str())
        .bind(section_i64)
        .bind(encode_id_array(
            row.answered_question_ids.iter().map(QuestionId::value),
        )?)
        .bind(i64::from(row.correct_count))
        .bind(row.completed)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        Ok(row)
    }

    async fn upsert_campaign_completion(
        &self,
        user: &UserId,
        campaign: CampaignId,
    ) -> Result<CampaignCompletionRow, StorageError> {
        sqlx::query(
            r"
            INSERT INTO campaign_progress (user_id, campaign_id, completed, updated_at)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT(user_id, campaign_id) DO UPDATE SET
                completed = 1,
                updated_at = excluded.updated_at
            ",
        )
        .bind(user.as_str())
        .bind(id_i64("campaign_id", campaign.value())?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(CampaignCompletionRow {
            campaign_id: campaign,
            completed: true,
        })
    }
}
