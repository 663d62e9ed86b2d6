use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use raccoon_core::{
    level::{LevelCalculator, LevelProgress},
    merge::merge_guest_into,
    model::{AnswerId, Catalog, GuestProgress, ProgressState, QuestionId, SectionId, UserId},
    progression::{AnswerContext, CascadeOutcome, ProgressionEngine},
    settings::ProgressionSettings,
    time::Clock,
};
use storage::repository::{
    CampaignCompletionRow, GuestProgressStore, ProgressRecord, ProgressRepository,
    SectionCompletionDelta, SectionCompletionRow, StorageError,
};

use crate::catalog_service::CatalogService;
use crate::error::ProgressServiceError;
use crate::retry::{RetryConfig, retry_on_conflict};

//
// ─── TYPES ─────────────────────────────────────────────────────────────────────
//

/// Whose progress an operation targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Learner {
    /// Not signed in; progress lives in the local guest store.
    Guest,
    Account(UserId),
}

/// Result of one persisted answer event.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerOutcome {
    pub cascade: CascadeOutcome,
    /// New record version for accounts; `None` for guests or when nothing
    /// needed writing.
    pub version: Option<u64>,
    pub level: LevelProgress,
}

/// What `merge_on_login` did.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    /// `false` when there was no guest progress to merge.
    pub merged: bool,
    pub xp_added: u64,
    /// The guest session had already been folded in by an earlier attempt.
    pub replayed: bool,
    /// Section and campaign bonuses for units the union completed.
    pub completion_xp: u64,
    pub state: ProgressState,
    pub version: u64,
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Turns answer events into persisted progress for guests and accounts.
///
/// Every event follows read-latest, compute, write: the engine runs against
/// the freshest stored state, and a version conflict sends the event back to
/// the read step, so an award is re-checked against what is actually stored.
pub struct ProgressService {
    clock: Clock,
    engine: ProgressionEngine,
    levels: LevelCalculator,
    retry: RetryConfig,
    progress: Arc<dyn ProgressRepository>,
    guest: Arc<dyn GuestProgressStore>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        settings: &ProgressionSettings,
        progress: Arc<dyn ProgressRepository>,
        guest: Arc<dyn GuestProgressStore>,
    ) -> Self {
        Self {
            clock: Clock::default(),
            engine: ProgressionEngine::new(settings),
            levels: LevelCalculator::from_settings(settings),
            retry: RetryConfig {
                max_attempts: settings.conflict_retry_attempts(),
            },
            progress,
            guest,
        }
    }

    /// Override the clock (usually for deterministic testing).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn level_progress(&self, state: &ProgressState) -> LevelProgress {
        self.levels.progress(state.total_xp())
    }

    /// Load the user's record, creating and persisting an empty one if none
    /// exists yet.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the record cannot be read
    /// or created.
    pub async fn load_or_create(&self, user: &UserId) -> Result<ProgressRecord, ProgressServiceError> {
        match self.progress.load_progress(user).await {
            Ok(record) => Ok(record),
            Err(StorageError::NotFound) => {
                let state = ProgressState::new();
                match self.progress.save_progress(user, &state, None).await {
                    Ok(version) => {
                        tracing::info!(user = user.as_str(), "created progress record");
                        Ok(ProgressRecord {
                            user_id: user.clone(),
                            state,
                            version,
                        })
                    }
                    // Someone else created it first; theirs wins.
                    Err(StorageError::Conflict) => Ok(self.progress.load_progress(user).await?),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Current guest progress, starting (and saving) a new guest session if
    /// none exists.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the guest store fails.
    pub async fn load_or_start_guest(&self) -> Result<GuestProgress, ProgressServiceError> {
        if let Some(guest) = self.guest.load_guest().await? {
            return Ok(guest);
        }
        let guest = GuestProgress::start();
        self.guest.save_guest(&guest).await?;
        tracing::info!(session = %guest.session_id, "started guest session");
        Ok(guest)
    }

    /// Latest persisted state for a learner.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on read failure.
    pub async fn current_state(&self, learner: &Learner) -> Result<ProgressState, ProgressServiceError> {
        match learner {
            Learner::Guest => Ok(self
                .guest
                .load_guest()
                .await?
                .map(|g| g.state)
                .unwrap_or_default()),
            Learner::Account(user) => Ok(self.load_or_create(user).await?.state),
        }
    }

    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on read failure.
    pub async fn completion_rows(
        &self,
        user: &UserId,
    ) -> Result<(Vec<SectionCompletionRow>, Vec<CampaignCompletionRow>), ProgressServiceError> {
        let sections = self.progress.load_section_completion_rows(user).await?;
        let campaigns = self.progress.load_campaign_completion_rows(user).await?;
        Ok((sections, campaigns))
    }

    /// Grade `answer` against the catalog, then apply and persist it.
    ///
    /// The question's section must be unlocked in the state read for the
    /// write; a locked section is rejected before anything is credited.
    ///
    /// # Errors
    ///
    /// Returns `UnknownQuestion` / `UnknownAnswer` when the ids do not match
    /// the catalog, `Locked` when earlier units are still open, plus
    /// everything `apply_and_persist` returns.
    pub async fn answer(
        &self,
        learner: &Learner,
        catalog: &Catalog,
        question_id: QuestionId,
        answer_id: AnswerId,
        local: &mut ProgressState,
    ) -> Result<AnswerOutcome, ProgressServiceError> {
        let question = catalog
            .question(question_id)
            .ok_or(ProgressServiceError::UnknownQuestion {
                question: question_id,
            })?;
        let is_correct = question
            .grade(answer_id)
            .ok_or(ProgressServiceError::UnknownAnswer {
                question: question_id,
                answer: answer_id,
            })?;
        let ctx = AnswerContext::from_catalog(catalog, question_id, is_correct).ok_or(
            ProgressServiceError::UnknownQuestion {
                question: question_id,
            },
        )?;
        self.persist(learner, &ctx, Some(catalog), local).await
    }

    /// Apply one answer event and persist the result.
    ///
    /// `local` is the caller's in-memory view. It is replaced with the
    /// committed state only after the write has landed; if the write fails,
    /// or the future is dropped mid-flight, it still holds the pre-event
    /// snapshot.
    ///
    /// The context is trusted as given; `answer` is the catalog-checked
    /// entry point that also enforces unlock order.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on read/write failure and
    /// `ConflictRetriesExhausted` if the record keeps changing concurrently.
    pub async fn apply_and_persist(
        &self,
        learner: &Learner,
        ctx: &AnswerContext,
        local: &mut ProgressState,
    ) -> Result<AnswerOutcome, ProgressServiceError> {
        self.persist(learner, ctx, None, local).await
    }

    async fn persist(
        &self,
        learner: &Learner,
        ctx: &AnswerContext,
        gate: Option<&Catalog>,
        local: &mut ProgressState,
    ) -> Result<AnswerOutcome, ProgressServiceError> {
        let now = self.now();
        let result = match learner {
            Learner::Guest => self.persist_guest_answer(ctx, gate, now).await,
            Learner::Account(user) => self.persist_account_answer(user, ctx, gate, now).await,
        };

        match result {
            Ok(outcome) => {
                *local = outcome.cascade.state.clone();
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(
                    question = %ctx.question_id,
                    error = %err,
                    "answer not persisted; keeping pre-event state"
                );
                Err(err)
            }
        }
    }

    async fn persist_guest_answer(
        &self,
        ctx: &AnswerContext,
        gate: Option<&Catalog>,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, ProgressServiceError> {
        let guest = self.load_or_start_guest().await?;
        ensure_unlocked(gate, ctx, &guest.state)?;
        let cascade = self.engine.apply_answer(&guest.state, ctx, now);
        if !cascade.is_noop() {
            let next = GuestProgress::with_state(guest.session_id, cascade.state.clone());
            self.guest.save_guest(&next).await?;
            log_award(None, &cascade);
        }
        Ok(AnswerOutcome {
            level: self.level_progress(&cascade.state),
            cascade,
            version: None,
        })
    }

    async fn persist_account_answer(
        &self,
        user: &UserId,
        ctx: &AnswerContext,
        gate: Option<&Catalog>,
        now: DateTime<Utc>,
    ) -> Result<AnswerOutcome, ProgressServiceError> {
        retry_on_conflict(self.retry, "apply_and_persist", |attempt| {
            self.try_account_answer(user, ctx, gate, now, attempt)
        })
        .await
    }

    async fn try_account_answer(
        &self,
        user: &UserId,
        ctx: &AnswerContext,
        gate: Option<&Catalog>,
        now: DateTime<Utc>,
        attempt: u32,
    ) -> Result<AnswerOutcome, ProgressServiceError> {
        let record = self.load_or_create(user).await?;
        ensure_unlocked(gate, ctx, &record.state)?;
        let cascade = self.engine.apply_answer(&record.state, ctx, now);
        if cascade.is_noop() {
            return Ok(AnswerOutcome {
                level: self.level_progress(&cascade.state),
                cascade,
                version: None,
            });
        }

        // Per-entity rows go first; they are union-merged, so a retry or a
        // failed top-level commit leaves nothing to undo.
        let delta = SectionCompletionDelta {
            answered_question_ids: ctx
                .section_question_ids
                .iter()
                .copied()
                .filter(|q| cascade.state.has_answered(*q))
                .collect(),
            completed: cascade.state.is_section_completed(ctx.section_id),
        };
        self.progress
            .upsert_section_completion(user, ctx.section_id, &delta)
            .await?;
        if cascade.state.is_campaign_completed(ctx.campaign_id) {
            self.progress
                .upsert_campaign_completion(user, ctx.campaign_id)
                .await?;
        }

        let version = self
            .progress
            .save_progress(user, &cascade.state, Some(record.version))
            .await?;
        if attempt > 1 {
            tracing::debug!(user = user.as_str(), attempt, "answer committed after retry");
        }
        log_award(Some(user), &cascade);
        Ok(AnswerOutcome {
            level: self.level_progress(&cascade.state),
            cascade,
            version: Some(version),
        })
    }

    /// Fold local guest progress into the user's server record and clear
    /// the guest store.
    ///
    /// Safe to re-run after a partial failure: completion rows are
    /// union-merged and the server record remembers merged guest sessions, so
    /// guest XP is added at most once.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` on read/write failure and
    /// `ConflictRetriesExhausted` if the record keeps changing concurrently.
    pub async fn merge_on_login(
        &self,
        user: &UserId,
        catalog: &Catalog,
    ) -> Result<MergeReport, ProgressServiceError> {
        let Some(guest) = self.guest.load_guest().await? else {
            let record = self.load_or_create(user).await?;
            return Ok(MergeReport {
                merged: false,
                xp_added: 0,
                replayed: false,
                completion_xp: 0,
                state: record.state,
                version: record.version,
            });
        };

        let report = retry_on_conflict(self.retry, "merge_on_login", |_| {
            self.try_merge(user, catalog, &guest)
        })
        .await?;

        self.guest.clear_guest().await?;
        tracing::info!(
            user = user.as_str(),
            session = %guest.session_id,
            xp_added = report.xp_added,
            completion_xp = report.completion_xp,
            replayed = report.replayed,
            "merged guest progress on login"
        );
        Ok(report)
    }

    async fn try_merge(
        &self,
        user: &UserId,
        catalog: &Catalog,
        guest: &GuestProgress,
    ) -> Result<MergeReport, ProgressServiceError> {
        let record = self.load_or_create(user).await?;
        let outcome = merge_guest_into(&record.state, guest, &self.engine.streaks());
        // Bonuses for units the union closed count as of the last answer.
        let at = outcome.state.last_activity_at().unwrap_or_else(|| self.now());
        let sweep = self.engine.reconcile_completions(&outcome.state, catalog, at);

        self.upsert_guest_rows(user, catalog, guest, &sweep.state)
            .await?;
        for section in &sweep.sections {
            let delta = SectionCompletionDelta {
                answered_question_ids: catalog.question_ids_of(*section).into_iter().collect(),
                completed: true,
            };
            self.progress
                .upsert_section_completion(user, *section, &delta)
                .await?;
        }
        for campaign in &sweep.campaigns {
            self.progress
                .upsert_campaign_completion(user, *campaign)
                .await?;
        }

        let version = self
            .progress
            .save_progress(user, &sweep.state, Some(record.version))
            .await?;
        Ok(MergeReport {
            merged: true,
            xp_added: outcome.xp_added,
            replayed: outcome.replayed,
            completion_xp: sweep.xp_awarded,
            state: sweep.state,
            version,
        })
    }

    async fn upsert_guest_rows(
        &self,
        user: &UserId,
        catalog: &Catalog,
        guest: &GuestProgress,
        merged: &ProgressState,
    ) -> Result<(), ProgressServiceError> {
        for campaign in catalog.campaigns() {
            for section in catalog.sections_of(campaign.id) {
                let answered: BTreeSet<QuestionId> = catalog
                    .questions_of(section.id)
                    .iter()
                    .map(|q| q.id)
                    .filter(|q| guest.state.has_answered(*q))
                    .collect();
                let guest_completed = guest.state.is_section_completed(section.id);
                if answered.is_empty() && !guest_completed {
                    continue;
                }
                let delta = SectionCompletionDelta {
                    answered_question_ids: answered,
                    completed: merged.is_section_completed(section.id),
                };
                self.progress
                    .upsert_section_completion(user, section.id, &delta)
                    .await?;
            }
        }

        for campaign in guest.state.completed_campaigns() {
            self.progress
                .upsert_campaign_completion(user, *campaign)
                .await?;
        }

        // Sections the catalog no longer lists still carry their completion.
        for section in orphaned_sections(catalog, guest) {
            self.progress
                .upsert_section_completion(
                    user,
                    section,
                    &SectionCompletionDelta {
                        answered_question_ids: BTreeSet::new(),
                        completed: true,
                    },
                )
                .await?;
        }
        Ok(())
    }
}

fn ensure_unlocked(
    gate: Option<&Catalog>,
    ctx: &AnswerContext,
    state: &ProgressState,
) -> Result<(), ProgressServiceError> {
    match gate {
        Some(catalog) if !CatalogService::is_section_unlocked(catalog, ctx.section_id, state) => {
            Err(ProgressServiceError::Locked {
                section: ctx.section_id,
            })
        }
        _ => Ok(()),
    }
}

fn orphaned_sections(catalog: &Catalog, guest: &GuestProgress) -> Vec<SectionId> {
    guest
        .state
        .completed_sections()
        .iter()
        .copied()
        .filter(|s| catalog.section(*s).is_none())
        .collect()
}

fn log_award(user: Option<&UserId>, cascade: &CascadeOutcome) {
    tracing::info!(
        user = user.map_or("guest", UserId::as_str),
        question_xp = cascade.question_xp,
        section_xp = cascade.section_xp,
        campaign_xp = cascade.campaign_xp,
        total_xp = cascade.state.total_xp(),
        section_completed = cascade.section_completed(),
        campaign_completed = cascade.campaign_completed(),
        "progress updated"
    );
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
