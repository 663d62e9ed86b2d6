use raccoon_core::model::{Campaign, CampaignId, Catalog, Question, Section, SectionId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_answer, map_campaign, map_question, map_section};
use crate::repository::{ContentCatalog, StorageError};

impl SqliteRepository {
    /// Replace all stored content with `catalog` in one transaction.
    ///
    /// Learner progress is left alone; ids that disappear from the catalog
    /// simply stop matching anything.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any write fails; nothing is committed then.
    pub async fn import_catalog(&self, catalog: &Catalog) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Children cascade from campaigns.
        sqlx::query("DELETE FROM campaigns")
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        let document = catalog.to_document();

        for campaign in &document.campaigns {
            sqlx::query(
                r"
                INSERT INTO campaigns (id, title, description, sort_order, thumbnail_key)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(id_i64("campaign_id", campaign.id.value())?)
            .bind(&campaign.title)
            .bind(&campaign.description)
            .bind(campaign.order)
            .bind(&campaign.thumbnail_key)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        for section in &document.sections {
            sqlx::query(
                r"
                INSERT INTO sections (id, campaign_id, title, sort_order)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(id_i64("section_id", section.id.value())?)
            .bind(id_i64("campaign_id", section.campaign_id.value())?)
            .bind(&section.title)
            .bind(section.order)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        for question in &document.questions {
            let question_id = id_i64("question_id", question.id.value())?;
            sqlx::query(
                r"
                INSERT INTO questions (id, section_id, prompt, sort_order, xp_value)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(question_id)
            .bind(id_i64("section_id", question.section_id.value())?)
            .bind(&question.prompt)
            .bind(question.order)
            .bind(id_i64("xp_value", question.xp_value)?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for answer in &question.answers {
                sqlx::query(
                    r"
                    INSERT INTO answers (id, question_id, text, is_correct)
                    VALUES (?1, ?2, ?3, ?4)
                    ",
                )
                .bind(id_i64("answer_id", answer.id.value())?)
                .bind(question_id)
                .bind(&answer.text)
                .bind(answer.is_correct)
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        tracing::info!(
            campaigns = document.campaigns.len(),
            sections = document.sections.len(),
            questions = document.questions.len(),
            "imported catalog"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContentCatalog for SqliteRepository {
    async fn list_campaigns(&self) -> Result<Vec<Campaign>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, title, description, sort_order, thumbnail_key
            FROM campaigns
            ORDER BY sort_order ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_campaign).collect()
    }

    async fn list_sections(&self, campaign: CampaignId) -> Result<Vec<Section>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, campaign_id, title, sort_order
            FROM sections
            WHERE campaign_id = ?1
            ORDER BY sort_order ASC, id ASC
            ",
        )
        .bind(id_i64("campaign_id", campaign.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_section).collect()
    }

    async fn list_questions(&self, section: SectionId) -> Result<Vec<Question>, StorageError> {
        let section_i64 = id_i64("section_id", section.value())?;
        let rows = sqlx::query(
            r"
            SELECT id, section_id, prompt, sort_order, xp_value
            FROM questions
            WHERE section_id = ?1
            ORDER BY sort_order ASC, id ASC
            ",
        )
        .bind(section_i64)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut question = map_question(row)?;
            let answers = sqlx::query(
                r"
                SELECT id, text, is_correct
                FROM answers
                WHERE question_id = ?1
                ORDER BY id ASC
                ",
            )
            .bind(id_i64("question_id", question.id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
            question.answers = answers.iter().map(map_answer).collect::<Result<_, _>>()?;
            questions.push(question);
        }
        Ok(questions)
    }
}
