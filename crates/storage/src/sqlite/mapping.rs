use raccoon_core::model::{
    Answer, AnswerId, Campaign, CampaignId, ProgressState, Question, QuestionId, Section,
    SectionId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{CampaignCompletionRow, SectionCompletionRow, StorageError};
use crate::sanitize::{RawProgressRecord, RawSectionCompletionRow, encode_id_array, parse_id_array};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn campaign_id_from_i64(v: i64) -> Result<CampaignId, StorageError> {
    Ok(CampaignId::new(i64_to_u64("campaign_id", v)?))
}

pub(crate) fn section_id_from_i64(v: i64) -> Result<SectionId, StorageError> {
    Ok(SectionId::new(i64_to_u64("section_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

/// JSON columns for the id sets of a progress record.
pub(crate) struct EncodedSets {
    pub answered_questions: String,
    pub completed_sections: String,
    pub completed_campaigns: String,
    pub merged_guest_sessions: String,
}

pub(crate) fn encode_sets(state: &ProgressState) -> Result<EncodedSets, StorageError> {
    let guests: Vec<String> = state
        .merged_guest_sessions()
        .iter()
        .map(ToString::to_string)
        .collect();
    Ok(EncodedSets {
        answered_questions: encode_id_array(state.answered_questions().iter().map(QuestionId::value))?,
        completed_sections: encode_id_array(state.completed_sections().iter().map(SectionId::value))?,
        completed_campaigns: encode_id_array(
            state.completed_campaigns().iter().map(CampaignId::value),
        )?,
        merged_guest_sessions: serde_json::to_string(&guests).map_err(ser)?,
    })
}

/// Map a `user_progress` row to its state and version.
pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<(ProgressState, u64), StorageError> {
    let guests_text: String = row.try_get("merged_guest_sessions").map_err(ser)?;
    let merged_guest_sessions: Vec<Option<String>> = if guests_text.trim().is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&guests_text)
            .map_err(|e| StorageError::Serialization(format!("merged_guest_sessions: {e}")))?
    };

    let raw = RawProgressRecord {
        total_xp: row.try_get("total_xp").map_err(ser)?,
        streak: row.try_get("streak").map_err(ser)?,
        last_activity_at: row.try_get("last_activity_at").map_err(ser)?,
        answered_questions: parse_id_array(
            "answered_questions",
            &row.try_get::<String, _>("answered_questions").map_err(ser)?,
        )?,
        completed_sections: parse_id_array(
            "completed_sections",
            &row.try_get::<String, _>("completed_sections").map_err(ser)?,
        )?,
        completed_campaigns: parse_id_array(
            "completed_campaigns",
            &row.try_get::<String, _>("completed_campaigns").map_err(ser)?,
        )?,
        merged_guest_sessions,
    };
    let version = i64_to_u64("version", row.try_get::<i64, _>("version").map_err(ser)?)?;
    Ok((raw.into_state()?, version))
}

pub(crate) fn map_section_row(row: &SqliteRow) -> Result<SectionCompletionRow, StorageError> {
    RawSectionCompletionRow {
        section_id: row.try_get("section_id").map_err(ser)?,
        answered_question_ids: parse_id_array(
            "answered_question_ids",
            &row.try_get::<String, _>("answered_question_ids").map_err(ser)?,
        )?,
        correct_count: row.try_get("correct_count").map_err(ser)?,
        completed: row.try_get("completed").map_err(ser)?,
    }
    .into_row()
}

pub(crate) fn map_campaign_row(row: &SqliteRow) -> Result<CampaignCompletionRow, StorageError> {
    Ok(CampaignCompletionRow {
        campaign_id: campaign_id_from_i64(row.try_get::<i64, _>("campaign_id").map_err(ser)?)?,
        completed: row.try_get::<bool, _>("completed").map_err(ser)?,
    })
}

pub(crate) fn map_campaign(row: &SqliteRow) -> Result<Campaign, StorageError> {
    Ok(Campaign {
        id: campaign_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        title: row.try_get("title").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        order: row.try_get("sort_order").map_err(ser)?,
        thumbnail_key: row.try_get("thumbnail_key").map_err(ser)?,
    })
}

pub(crate) fn map_section(row: &SqliteRow) -> Result<Section, StorageError> {
    Ok(Section {
        id: section_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        campaign_id: campaign_id_from_i64(row.try_get::<i64, _>("campaign_id").map_err(ser)?)?,
        title: row.try_get("title").map_err(ser)?,
        order: row.try_get("sort_order").map_err(ser)?,
    })
}

/// Question columns only; answers are attached by the caller.
pub(crate) fn map_question(row: &SqliteRow) -> Result<Question, StorageError> {
    Ok(Question {
        id: question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        section_id: section_id_from_i64(row.try_get::<i64, _>("section_id").map_err(ser)?)?,
        prompt: row.try_get("prompt").map_err(ser)?,
        order: row.try_get("sort_order").map_err(ser)?,
        xp_value: i64_to_u64("xp_value", row.try_get::<i64, _>("xp_value").map_err(ser)?)?,
        answers: Vec::new(),
    })
}

pub(crate) fn map_answer(row: &SqliteRow) -> Result<Answer, StorageError> {
    Ok(Answer {
        id: AnswerId::new(i64_to_u64("answer_id", row.try_get::<i64, _>("id").map_err(ser)?)?),
        text: row.try_get("text").map_err(ser)?,
        is_correct: row.try_get::<bool, _>("is_correct").map_err(ser)?,
    })
}
