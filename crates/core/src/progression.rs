//! State transitions that turn "a question was answered" into new progress.
//!
//! Every operation takes the current state by reference and returns a new
//! one; the input is never touched, so callers can keep it as a rollback
//! snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CampaignId, Catalog, ProgressState, QuestionId, SectionId};
use crate::settings::ProgressionSettings;
use crate::streak::StreakTracker;

//
// ─── TRANSITIONS ───────────────────────────────────────────────────────────────
//

/// Why a transition did or did not award XP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    Awarded,
    /// Wrong answer: nothing recorded, nothing penalised.
    Incorrect,
    /// Question was already credited earlier.
    AlreadyCredited,
    /// Section or campaign was already completed earlier.
    AlreadyCompleted,
    /// Some prerequisite question or section is still missing.
    Incomplete,
    /// Input contradicts itself (e.g. question not in the stated section).
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: ProgressState,
    pub xp_awarded: u64,
    pub kind: TransitionKind,
}

impl Transition {
    fn unchanged(state: &ProgressState, kind: TransitionKind) -> Self {
        Self {
            state: state.clone(),
            xp_awarded: 0,
            kind,
        }
    }

    #[must_use]
    pub fn awarded(&self) -> bool {
        self.kind == TransitionKind::Awarded
    }
}

/// Everything the cascade needs to know about where a question sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerContext {
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub xp_value: u64,
    pub section_id: SectionId,
    pub section_question_ids: Vec<QuestionId>,
    pub campaign_id: CampaignId,
    pub campaign_section_ids: Vec<SectionId>,
}

impl AnswerContext {
    /// Resolve a question's section and campaign from the catalog.
    ///
    /// Returns `None` if the question, or its parents, are not in the catalog.
    #[must_use]
    pub fn from_catalog(catalog: &Catalog, question_id: QuestionId, is_correct: bool) -> Option<Self> {
        let question = catalog.question(question_id)?;
        let section_id = question.section_id;
        let campaign_id = catalog.campaign_of(section_id)?;
        Some(Self {
            question_id,
            is_correct,
            xp_value: question.xp_value,
            section_id,
            section_question_ids: catalog.question_ids_of(section_id),
            campaign_id,
            campaign_section_ids: catalog.section_ids_of(campaign_id),
        })
    }
}

/// Result of one answer event after question → section → campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub state: ProgressState,
    pub question: TransitionKind,
    pub question_xp: u64,
    /// `None` when the cascade stopped before the section stage.
    pub section: Option<TransitionKind>,
    pub section_xp: u64,
    pub campaign: Option<TransitionKind>,
    pub campaign_xp: u64,
}

impl CascadeOutcome {
    #[must_use]
    pub fn total_xp_awarded(&self) -> u64 {
        self.question_xp
            .saturating_add(self.section_xp)
            .saturating_add(self.campaign_xp)
    }

    #[must_use]
    pub fn section_completed(&self) -> bool {
        self.section == Some(TransitionKind::Awarded)
    }

    #[must_use]
    pub fn campaign_completed(&self) -> bool {
        self.campaign == Some(TransitionKind::Awarded)
    }

    /// True when nothing about the state changed.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.total_xp_awarded() == 0
            && self.question != TransitionKind::Awarded
            && !self.section_completed()
            && !self.campaign_completed()
    }
}

/// Completions that follow from the recorded answers but were never marked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSweep {
    pub state: ProgressState,
    pub sections: Vec<SectionId>,
    pub campaigns: Vec<CampaignId>,
    pub xp_awarded: u64,
}

impl CompletionSweep {
    fn absorb(&mut self, transition: Transition) -> bool {
        if !transition.awarded() {
            return false;
        }
        self.xp_awarded = self.xp_awarded.saturating_add(transition.xp_awarded);
        self.state = transition.state;
        true
    }
}

//
// ─── ENGINE ────────────────────────────────────────────────────────────────────
//

/// Applies XP, streak and completion rules to `ProgressState`.
#[derive(Debug, Clone, Copy)]
pub struct ProgressionEngine {
    streaks: StreakTracker,
    section_completion_xp: u64,
    campaign_completion_xp: u64,
}

impl Default for ProgressionEngine {
    fn default() -> Self {
        Self::new(&ProgressionSettings::default())
    }
}

impl ProgressionEngine {
    #[must_use]
    pub fn new(settings: &ProgressionSettings) -> Self {
        Self {
            streaks: StreakTracker::new(settings.day_boundary()),
            section_completion_xp: settings.section_completion_xp(),
            campaign_completion_xp: settings.campaign_completion_xp(),
        }
    }

    #[must_use]
    pub fn section_completion_xp(&self) -> u64 {
        self.section_completion_xp
    }

    #[must_use]
    pub fn campaign_completion_xp(&self) -> u64 {
        self.campaign_completion_xp
    }

    #[must_use]
    pub fn streaks(&self) -> StreakTracker {
        self.streaks
    }

    fn award(&self, state: &mut ProgressState, xp: u64, now: DateTime<Utc>) {
        let streak = self
            .streaks
            .update(state.streak(), state.last_activity_at(), now);
        state.award(xp, streak, now);
    }

    /// Credit a correct answer once.
    ///
    /// Incorrect answers and repeats return the state unchanged with zero XP.
    #[must_use]
    pub fn on_question_answered(
        &self,
        state: &ProgressState,
        question_id: QuestionId,
        is_correct: bool,
        xp_value: u64,
        now: DateTime<Utc>,
    ) -> Transition {
        if !is_correct {
            return Transition::unchanged(state, TransitionKind::Incorrect);
        }
        if state.has_answered(question_id) {
            return Transition::unchanged(state, TransitionKind::AlreadyCredited);
        }

        let mut next = state.clone();
        next.insert_answered(question_id);
        self.award(&mut next, xp_value, now);
        Transition {
            state: next,
            xp_awarded: xp_value,
            kind: TransitionKind::Awarded,
        }
    }

    /// Mark a section complete once all of its questions are answered.
    ///
    /// An empty question list is rejected: a section with no questions can
    /// never have been "finished".
    #[must_use]
    pub fn on_section_eligible_for_completion(
        &self,
        state: &ProgressState,
        section_id: SectionId,
        question_ids: &[QuestionId],
        section_completion_xp: u64,
        now: DateTime<Utc>,
    ) -> Transition {
        if question_ids.is_empty() {
            return Transition::unchanged(state, TransitionKind::Rejected);
        }
        if state.is_section_completed(section_id) {
            return Transition::unchanged(state, TransitionKind::AlreadyCompleted);
        }
        if !question_ids.iter().all(|q| state.has_answered(*q)) {
            return Transition::unchanged(state, TransitionKind::Incomplete);
        }

        let mut next = state.clone();
        next.insert_section(section_id);
        self.award(&mut next, section_completion_xp, now);
        Transition {
            state: next,
            xp_awarded: section_completion_xp,
            kind: TransitionKind::Awarded,
        }
    }

    /// Mark a campaign complete once all of its sections are complete.
    #[must_use]
    pub fn on_campaign_eligible_for_completion(
        &self,
        state: &ProgressState,
        campaign_id: CampaignId,
        section_ids: &[SectionId],
        campaign_completion_xp: u64,
        now: DateTime<Utc>,
    ) -> Transition {
        if section_ids.is_empty() {
            return Transition::unchanged(state, TransitionKind::Rejected);
        }
        if state.is_campaign_completed(campaign_id) {
            return Transition::unchanged(state, TransitionKind::AlreadyCompleted);
        }
        if !section_ids.iter().all(|s| state.is_section_completed(*s)) {
            return Transition::unchanged(state, TransitionKind::Incomplete);
        }

        let mut next = state.clone();
        next.insert_campaign(campaign_id);
        self.award(&mut next, campaign_completion_xp, now);
        Transition {
            state: next,
            xp_awarded: campaign_completion_xp,
            kind: TransitionKind::Awarded,
        }
    }

    /// Run question → section → campaign against one snapshot.
    ///
    /// The cascade continues past the question stage only for correct answers
    /// (newly or previously credited), so a repeat answer can still close a
    /// section whose completion was never recorded. Contradictory context
    /// (question not in its section, section not in its campaign) is rejected
    /// with the state unchanged.
    #[must_use]
    pub fn apply_answer(
        &self,
        state: &ProgressState,
        ctx: &AnswerContext,
        now: DateTime<Utc>,
    ) -> CascadeOutcome {
        let stopped = |kind: TransitionKind| CascadeOutcome {
            state: state.clone(),
            question: kind,
            question_xp: 0,
            section: None,
            section_xp: 0,
            campaign: None,
            campaign_xp: 0,
        };

        if !ctx.section_question_ids.contains(&ctx.question_id)
            || !ctx.campaign_section_ids.contains(&ctx.section_id)
        {
            return stopped(TransitionKind::Rejected);
        }

        let question =
            self.on_question_answered(state, ctx.question_id, ctx.is_correct, ctx.xp_value, now);
        if !matches!(
            question.kind,
            TransitionKind::Awarded | TransitionKind::AlreadyCredited
        ) {
            return stopped(question.kind);
        }

        let section = self.on_section_eligible_for_completion(
            &question.state,
            ctx.section_id,
            &ctx.section_question_ids,
            self.section_completion_xp,
            now,
        );
        let campaign = self.on_campaign_eligible_for_completion(
            &section.state,
            ctx.campaign_id,
            &ctx.campaign_section_ids,
            self.campaign_completion_xp,
            now,
        );

        CascadeOutcome {
            state: campaign.state,
            question: question.kind,
            question_xp: question.xp_awarded,
            section: Some(section.kind),
            section_xp: section.xp_awarded,
            campaign: Some(campaign.kind),
            campaign_xp: campaign.xp_awarded,
        }
    }

    /// Close every section and campaign of `catalog` whose prerequisites are
    /// all recorded in `state`, awarding each bonus once.
    ///
    /// Set unions (guest merge) can complete units without any single answer
    /// event seeing it; this sweep records them. Already completed units are
    /// left alone, so running it twice awards nothing the second time.
    #[must_use]
    pub fn reconcile_completions(
        &self,
        state: &ProgressState,
        catalog: &Catalog,
        at: DateTime<Utc>,
    ) -> CompletionSweep {
        let mut sweep = CompletionSweep {
            state: state.clone(),
            sections: Vec::new(),
            campaigns: Vec::new(),
            xp_awarded: 0,
        };
        for campaign in catalog.campaigns() {
            let section_ids = catalog.section_ids_of(campaign.id);
            for section in &section_ids {
                let t = self.on_section_eligible_for_completion(
                    &sweep.state,
                    *section,
                    &catalog.question_ids_of(*section),
                    self.section_completion_xp,
                    at,
                );
                if sweep.absorb(t) {
                    sweep.sections.push(*section);
                }
            }
            let t = self.on_campaign_eligible_for_completion(
                &sweep.state,
                campaign.id,
                &section_ids,
                self.campaign_completion_xp,
                at,
            );
            if sweep.absorb(t) {
                sweep.campaigns.push(campaign.id);
            }
        }
        sweep
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
