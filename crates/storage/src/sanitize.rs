//! Boundary between loosely typed stored rows and the strongly typed domain.
//!
//! The record store may hand back id arrays containing `null` (or ids that
//! do not fit the domain type). Those elements are dropped here and counted;
//! nothing past this module ever sees an optional element.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use raccoon_core::model::{CampaignId, GuestSessionId, ProgressState, QuestionId, SectionId};
use serde::{Deserialize, Serialize};

use crate::repository::{SectionCompletionRow, StorageError};

/// Filter `null`s out of an id array, converting the rest.
///
/// Returns the typed set and how many elements were discarded.
pub fn sanitize_ids<T, F>(raw: &[Option<i64>], make: F) -> (BTreeSet<T>, usize)
where
    T: Ord,
    F: Fn(u64) -> T,
{
    let mut dropped = 0;
    let mut out = BTreeSet::new();
    for value in raw {
        match value.and_then(|v| u64::try_from(v).ok()) {
            Some(v) => {
                out.insert(make(v));
            }
            None => dropped += 1,
        }
    }
    (out, dropped)
}

/// Parse a JSON id array that may contain `null`s.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the text is not a JSON array of
/// integers or nulls.
pub fn parse_id_array(field: &'static str, text: &str) -> Result<Vec<Option<i64>>, StorageError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text)
        .map_err(|e| StorageError::Serialization(format!("{field}: {e}")))
}

/// Encode a typed set as a JSON array for storage.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if encoding fails.
pub fn encode_id_array<I>(ids: I) -> Result<String, StorageError>
where
    I: IntoIterator<Item = u64>,
{
    let values: Vec<u64> = ids.into_iter().collect();
    serde_json::to_string(&values).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn report(field: &'static str, dropped: usize) {
    if dropped > 0 {
        tracing::warn!(field, dropped, "discarded null or invalid ids from stored row");
    }
}

/// Progress record exactly as a loosely typed store returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawProgressRecord {
    pub total_xp: Option<i64>,
    pub streak: Option<i64>,
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub answered_questions: Vec<Option<i64>>,
    #[serde(default)]
    pub completed_sections: Vec<Option<i64>>,
    #[serde(default)]
    pub completed_campaigns: Vec<Option<i64>>,
    #[serde(default)]
    pub merged_guest_sessions: Vec<Option<String>>,
}

impl RawProgressRecord {
    /// Validate into a domain `ProgressState`.
    ///
    /// Missing counters read as zero; negative counters are corrupt and rejected.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for negative XP or streak.
    pub fn into_state(self) -> Result<ProgressState, StorageError> {
        let total_xp = u64::try_from(self.total_xp.unwrap_or(0)).map_err(|_| {
            StorageError::Serialization(format!("negative total_xp: {:?}", self.total_xp))
        })?;
        let streak = u32::try_from(self.streak.unwrap_or(0)).map_err(|_| {
            StorageError::Serialization(format!("invalid streak: {:?}", self.streak))
        })?;

        let (answered, d1) = sanitize_ids(&self.answered_questions, QuestionId::new);
        report("answered_questions", d1);
        let (sections, d2) = sanitize_ids(&self.completed_sections, SectionId::new);
        report("completed_sections", d2);
        let (campaigns, d3) = sanitize_ids(&self.completed_campaigns, CampaignId::new);
        report("completed_campaigns", d3);

        let mut guests = BTreeSet::new();
        let mut d4 = 0;
        for raw in &self.merged_guest_sessions {
            match raw.as_deref().map(|s| s.parse::<GuestSessionId>()) {
                Some(Ok(id)) => {
                    guests.insert(id);
                }
                _ => d4 += 1,
            }
        }
        report("merged_guest_sessions", d4);

        Ok(ProgressState::from_persisted(
            total_xp,
            streak,
            self.last_activity_at,
            answered,
            sections,
            campaigns,
            guests,
        ))
    }
}

/// Section row as stored, before validation.
#[derive(Debug, Clone, Default)]
pub struct RawSectionCompletionRow {
    pub section_id: i64,
    pub answered_question_ids: Vec<Option<i64>>,
    pub correct_count: Option<i64>,
    pub completed: Option<bool>,
}

impl RawSectionCompletionRow {
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the section id is negative.
    pub fn into_row(self) -> Result<SectionCompletionRow, StorageError> {
        let section_id = u64::try_from(self.section_id)
            .map(SectionId::new)
            .map_err(|_| StorageError::Serialization("section_id sign overflow".into()))?;
        let (answered, dropped) = sanitize_ids(&self.answered_question_ids, QuestionId::new);
        report("answered_question_ids", dropped);
        // The union size is authoritative; a stale counter is repaired here.
        let correct_count = u32::try_from(answered.len()).unwrap_or(u32::MAX);
        if self.correct_count.is_some_and(|c| c != i64::from(correct_count)) {
            tracing::debug!(%section_id, stored = ?self.correct_count, correct_count, "repaired correct_count");
        }
        Ok(SectionCompletionRow {
            section_id,
            answered_question_ids: answered,
            correct_count,
            completed: self.completed.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_and_negatives_are_dropped() {
        let (ids, dropped) = sanitize_ids(&[Some(1), None, Some(-4), Some(2), Some(1)], QuestionId::new);
        assert_eq!(dropped, 2);
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec![QuestionId::new(1), QuestionId::new(2)]
        );
    }

    #[test]
    fn json_arrays_with_nulls_parse() {
        let raw = parse_id_array("answered", "[1,null,3]").unwrap();
        assert_eq!(raw, vec![Some(1), None, Some(3)]);
        assert!(parse_id_array("answered", "").unwrap().is_empty());
        assert!(parse_id_array("answered", "{\"a\":1}").is_err());
    }

    #[test]
    fn raw_progress_becomes_clean_state() {
        let raw: RawProgressRecord = serde_json::from_str(
            r#"{
                "total_xp": 120,
                "streak": null,
                "last_activity_at": null,
                "answered_questions": [1, null, 2],
                "completed_sections": [null],
                "merged_guest_sessions": ["not-a-uuid", null]
            }"#,
        )
        .unwrap();
        let state = raw.into_state().unwrap();
        assert_eq!(state.total_xp(), 120);
        assert_eq!(state.streak(), 0);
        assert_eq!(state.answered_questions().len(), 2);
        assert!(state.completed_sections().is_empty());
        assert!(state.completed_campaigns().is_empty());
        assert!(state.merged_guest_sessions().is_empty());
    }

    #[test]
    fn negative_xp_is_corrupt() {
        let raw = RawProgressRecord {
            total_xp: Some(-1),
            ..RawProgressRecord::default()
        };
        assert!(matches!(raw.into_state(), Err(StorageError::Serialization(_))));
    }

    #[test]
    fn section_row_count_follows_sanitized_ids() {
        let row = RawSectionCompletionRow {
            section_id: 5,
            answered_question_ids: vec![Some(1), None, Some(1), Some(2)],
            correct_count: Some(4),
            completed: None,
        }
        .into_row()
        .unwrap();
        assert_eq!(row.correct_count, 2);
        assert!(!row.completed);
    }

    #[test]
    fn encode_round_trips_through_parse() {
        let text = encode_id_array([3_u64, 1, 2]).unwrap();
        assert_eq!(text, "[3,1,2]");
        assert_eq!(parse_id_array("x", &text).unwrap(), vec![Some(3), Some(1), Some(2)]);
    }
}
