use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CampaignId, GuestSessionId, QuestionId, SectionId};

/// A learner's accumulated progress.
///
/// Mutated only through `ProgressionEngine` transitions and the guest merge;
/// everything else reads it. Sets are ordered so persisted snapshots are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    total_xp: u64,
    streak: u32,
    last_activity_at: Option<DateTime<Utc>>,
    answered_questions: BTreeSet<QuestionId>,
    completed_sections: BTreeSet<SectionId>,
    completed_campaigns: BTreeSet<CampaignId>,
    #[serde(default)]
    merged_guest_sessions: BTreeSet<GuestSessionId>,
}

impl ProgressState {
    /// Fresh progress for a first-time learner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate progress from persisted storage.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        total_xp: u64,
        streak: u32,
        last_activity_at: Option<DateTime<Utc>>,
        answered_questions: BTreeSet<QuestionId>,
        completed_sections: BTreeSet<SectionId>,
        completed_campaigns: BTreeSet<CampaignId>,
        merged_guest_sessions: BTreeSet<GuestSessionId>,
    ) -> Self {
        Self {
            total_xp,
            streak,
            last_activity_at,
            answered_questions,
            completed_sections,
            completed_campaigns,
            merged_guest_sessions,
        }
    }

    // Accessors
    #[must_use]
    pub fn total_xp(&self) -> u64 {
        self.total_xp
    }

    #[must_use]
    pub fn streak(&self) -> u32 {
        self.streak
    }

    #[must_use]
    pub fn last_activity_at(&self) -> Option<DateTime<Utc>> {
        self.last_activity_at
    }

    #[must_use]
    pub fn answered_questions(&self) -> &BTreeSet<QuestionId> {
        &self.answered_questions
    }

    #[must_use]
    pub fn completed_sections(&self) -> &BTreeSet<SectionId> {
        &self.completed_sections
    }

    #[must_use]
    pub fn completed_campaigns(&self) -> &BTreeSet<CampaignId> {
        &self.completed_campaigns
    }

    /// Guest sessions already folded into this record.
    #[must_use]
    pub fn merged_guest_sessions(&self) -> &BTreeSet<GuestSessionId> {
        &self.merged_guest_sessions
    }

    #[must_use]
    pub fn has_answered(&self, id: QuestionId) -> bool {
        self.answered_questions.contains(&id)
    }

    #[must_use]
    pub fn is_section_completed(&self, id: SectionId) -> bool {
        self.completed_sections.contains(&id)
    }

    #[must_use]
    pub fn is_campaign_completed(&self, id: CampaignId) -> bool {
        self.completed_campaigns.contains(&id)
    }

    /// True for a state nobody has interacted with yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_xp == 0
            && self.last_activity_at.is_none()
            && self.answered_questions.is_empty()
            && self.completed_sections.is_empty()
            && self.completed_campaigns.is_empty()
    }

    // Mutation is crate-private so transitions stay the only way in.

    pub(crate) fn award(&mut self, xp: u64, streak: u32, now: DateTime<Utc>) {
        self.total_xp = self.total_xp.saturating_add(xp);
        self.streak = streak;
        self.last_activity_at = Some(now);
    }

    pub(crate) fn insert_answered(&mut self, id: QuestionId) -> bool {
        self.answered_questions.insert(id)
    }

    pub(crate) fn insert_section(&mut self, id: SectionId) -> bool {
        self.completed_sections.insert(id)
    }

    pub(crate) fn insert_campaign(&mut self, id: CampaignId) -> bool {
        self.completed_campaigns.insert(id)
    }

    pub(crate) fn set_total_xp(&mut self, xp: u64) {
        self.total_xp = xp;
    }

    pub(crate) fn set_streak(&mut self, streak: u32, last_activity_at: Option<DateTime<Utc>>) {
        self.streak = streak;
        self.last_activity_at = last_activity_at;
    }

    pub(crate) fn union_with(&mut self, other: &ProgressState) {
        self.answered_questions
            .extend(other.answered_questions.iter().copied());
        self.completed_sections
            .extend(other.completed_sections.iter().copied());
        self.completed_campaigns
            .extend(other.completed_campaigns.iter().copied());
        self.merged_guest_sessions
            .extend(other.merged_guest_sessions.iter().copied());
    }

    pub(crate) fn record_guest_session(&mut self, id: GuestSessionId) -> bool {
        self.merged_guest_sessions.insert(id)
    }
}
