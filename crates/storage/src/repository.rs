use async_trait::async_trait;
use raccoon_core::model::{
    Campaign, CampaignId, Catalog, CatalogDocument, GuestProgress, ProgressState, Question,
    QuestionId, Section, SectionId, UserId,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// The record changed between read and write.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Failures worth showing the learner a "try again" for.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Connection(_))
    }
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Top-level progress record with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub user_id: UserId,
    pub state: ProgressState,
    pub version: u64,
}

/// Per-section progress row, keyed by `(user, section)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionCompletionRow {
    pub section_id: SectionId,
    pub answered_question_ids: BTreeSet<QuestionId>,
    pub correct_count: u32,
    pub completed: bool,
}

/// Changes to fold into a section row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionCompletionDelta {
    pub answered_question_ids: BTreeSet<QuestionId>,
    pub completed: bool,
}

impl SectionCompletionRow {
    /// Union-merge a delta into an existing row (or a fresh one).
    ///
    /// Answered ids are unioned, `correct_count` follows the union size and
    /// `completed` never goes back to false, so applying the same delta twice
    /// yields the same row.
    #[must_use]
    pub fn merge(
        existing: Option<&SectionCompletionRow>,
        section_id: SectionId,
        delta: &SectionCompletionDelta,
    ) -> Self {
        let mut answered = existing
            .map(|row| row.answered_question_ids.clone())
            .unwrap_or_default();
        answered.extend(delta.answered_question_ids.iter().copied());
        let correct_count = u32::try_from(answered.len()).unwrap_or(u32::MAX);
        Self {
            section_id,
            answered_question_ids: answered,
            correct_count,
            completed: existing.is_some_and(|row| row.completed) || delta.completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignCompletionRow {
    pub campaign_id: CampaignId,
    pub completed: bool,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Repository contract for per-user progress.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the user's progress record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the user has no record yet.
    async fn load_progress(&self, user: &UserId) -> Result<ProgressRecord, StorageError>;

    /// Write the user's progress and return the new version.
    ///
    /// `expected_version` is `None` to create a record and `Some(v)` to replace
    /// version `v`. Re-sending a write that already landed (same state, stored
    /// version one past `expected_version`) succeeds without another bump.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the stored version moved on, or
    /// other storage errors.
    async fn save_progress(
        &self,
        user: &UserId,
        state: &ProgressState,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if rows cannot be read.
    async fn load_section_completion_rows(
        &self,
        user: &UserId,
    ) -> Result<Vec<SectionCompletionRow>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if rows cannot be read.
    async fn load_campaign_completion_rows(
        &self,
        user: &UserId,
    ) -> Result<Vec<CampaignCompletionRow>, StorageError>;

    /// Look up `(user, section)`, union-merge the delta into it, or insert.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written.
    async fn upsert_section_completion(
        &self,
        user: &UserId,
        section: SectionId,
        delta: &SectionCompletionDelta,
    ) -> Result<SectionCompletionRow, StorageError>;

    /// Mark `(user, campaign)` completed, inserting the row if missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be written.
    async fn upsert_campaign_completion(
        &self,
        user: &UserId,
        campaign: CampaignId,
    ) -> Result<CampaignCompletionRow, StorageError>;
}

/// Read-only access to authored content. Lists come back in display order.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on read failure.
    async fn list_campaigns(&self) -> Result<Vec<Campaign>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read failure.
    async fn list_sections(&self, campaign: CampaignId) -> Result<Vec<Section>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read failure.
    async fn list_questions(&self, section: SectionId) -> Result<Vec<Question>, StorageError>;

    /// Assemble the whole validated catalog.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if stored content is inconsistent.
    async fn load_catalog(&self) -> Result<Catalog, StorageError> {
        let campaigns = self.list_campaigns().await?;
        let mut sections = Vec::new();
        let mut questions = Vec::new();
        for campaign in &campaigns {
            for section in self.list_sections(campaign.id).await? {
                questions.extend(self.list_questions(section.id).await?);
                sections.push(section);
            }
        }
        Catalog::new(CatalogDocument {
            campaigns,
            sections,
            questions,
        })
        .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Local store for a not-yet-authenticated learner.
#[async_trait]
pub trait GuestProgressStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store exists but cannot be read.
    async fn load_guest(&self) -> Result<Option<GuestProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    async fn save_guest(&self, guest: &GuestProgress) -> Result<(), StorageError>;

    /// Remove guest progress. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    async fn clear_guest(&self) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

/// Decide the outcome of a versioned write against what is stored.
///
/// Shared by adapters so every backend agrees on conflict and replay rules.
pub(crate) fn check_version(
    stored: Option<(&ProgressState, u64)>,
    state: &ProgressState,
    expected_version: Option<u64>,
) -> Result<VersionCheck, StorageError> {
    match (stored, expected_version) {
        (None, None) => Ok(VersionCheck::Write(1)),
        (None, Some(_)) => Err(StorageError::NotFound),
        (Some((current, version)), expected) => {
            let expected_next = expected.map_or(1, |v| v + 1);
            if Some(version) == expected {
                Ok(VersionCheck::Write(version + 1))
            } else if version == expected_next && current == state {
                Ok(VersionCheck::AlreadyApplied(version))
            } else {
                Err(StorageError::Conflict)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VersionCheck {
    Write(u64),
    AlreadyApplied(u64),
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<UserId, ProgressRecord>>>,
    sections: Arc<Mutex<HashMap<(UserId, SectionId), SectionCompletionRow>>>,
    campaigns: Arc<Mutex<HashMap<(UserId, CampaignId), CampaignCompletionRow>>>,
    catalog: Arc<Mutex<Catalog>>,
    guest: Arc<Mutex<Option<GuestProgress>>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_catalog(catalog: Catalog) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(catalog)),
            ..Self::default()
        }
    }

    /// Replace the served content.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn set_catalog(&self, catalog: Catalog) -> Result<(), StorageError> {
        *self.catalog.lock().map_err(poisoned)? = catalog;
        Ok(())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn load_progress(&self, user: &UserId) -> Result<ProgressRecord, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        guard.get(user).cloned().ok_or(StorageError::NotFound)
    }

    async fn save_progress(
        &self,
        user: &UserId,
        state: &ProgressState,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let stored = guard.get(user).map(|r| (&r.state, r.version));
        match check_version(stored, state, expected_version)? {
            VersionCheck::AlreadyApplied(v) => Ok(v),
            VersionCheck::Write(version) => {
                guard.insert(
                    user.clone(),
                    ProgressRecord {
                        user_id: user.clone(),
                        state: state.clone(),
                        version,
                    },
                );
                Ok(version)
            }
        }
    }

    async fn load_section_completion_rows(
        &self,
        user: &UserId,
    ) -> Result<Vec<SectionCompletionRow>, StorageError> {
        let guard = self.sections.lock().map_err(poisoned)?;
        let mut rows: Vec<_> = guard
            .iter()
            .filter(|((u, _), _)| u == user)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by_key(|r| r.section_id);
        Ok(rows)
    }

    async fn load_campaign_completion_rows(
        &self,
        user: &UserId,
    ) -> Result<Vec<CampaignCompletionRow>, StorageError> {
        let guard = self.campaigns.lock().map_err(poisoned)?;
        let mut rows: Vec<_> = guard
            .iter()
            .filter(|((u, _), _)| u == user)
            .map(|(_, row)| *row)
            .collect();
        rows.sort_by_key(|r| r.campaign_id);
        Ok(rows)
    }

    async fn upsert_section_completion(
        &self,
        user: &UserId,
        section: SectionId,
        delta: &SectionCompletionDelta,
    ) -> Result<SectionCompletionRow, StorageError> {
        let mut guard = self.sections.lock().map_err(poisoned)?;
        let key = (user.clone(), section);
        let row = SectionCompletionRow::merge(guard.get(&key), section, delta);
        guard.insert(key, row.clone());
        Ok(row)
    }

    async fn upsert_campaign_completion(
        &self,
        user: &UserId,
        campaign: CampaignId,
    ) -> Result<CampaignCompletionRow, StorageError> {
        let mut guard = self.campaigns.lock().map_err(poisoned)?;
        let row = CampaignCompletionRow {
            campaign_id: campaign,
            completed: true,
        };
        guard.insert((user.clone(), campaign), row);
        Ok(row)
    }
}

#[async_trait]
impl ContentCatalog for InMemoryRepository {
    async fn list_campaigns(&self) -> Result<Vec<Campaign>, StorageError> {
        let guard = self.catalog.lock().map_err(poisoned)?;
        Ok(guard.campaigns().to_vec())
    }

    async fn list_sections(&self, campaign: CampaignId) -> Result<Vec<Section>, StorageError> {
        let guard = self.catalog.lock().map_err(poisoned)?;
        Ok(guard.sections_of(campaign).to_vec())
    }

    async fn list_questions(&self, section: SectionId) -> Result<Vec<Question>, StorageError> {
        let guard = self.catalog.lock().map_err(poisoned)?;
        Ok(guard.questions_of(section).to_vec())
    }

    async fn load_catalog(&self) -> Result<Catalog, StorageError> {
        let guard = self.catalog.lock().map_err(poisoned)?;
        Ok(guard.clone())
    }
}

#[async_trait]
impl GuestProgressStore for InMemoryRepository {
    async fn load_guest(&self) -> Result<Option<GuestProgress>, StorageError> {
        Ok(self.guest.lock().map_err(poisoned)?.clone())
    }

    async fn save_guest(&self, guest: &GuestProgress) -> Result<(), StorageError> {
        *self.guest.lock().map_err(poisoned)? = Some(guest.clone());
        Ok(())
    }

    async fn clear_guest(&self) -> Result<(), StorageError> {
        *self.guest.lock().map_err(poisoned)? = None;
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub catalog: Arc<dyn ContentCatalog>,
    pub guest: Arc<dyn GuestProgressStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory(catalog: Catalog) -> Self {
        let repo = InMemoryRepository::with_catalog(catalog);
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let content: Arc<dyn ContentCatalog> = Arc::new(repo.clone());
        let guest: Arc<dyn GuestProgressStore> = Arc::new(repo);
        Self {
            progress,
            catalog: content,
            guest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("raccoon-1").unwrap()
    }

    fn ids(raw: &[u64]) -> BTreeSet<QuestionId> {
        raw.iter().copied().map(QuestionId::new).collect()
    }

    #[tokio::test]
    async fn missing_progress_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo.load_progress(&user()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn versioned_save_detects_conflicts() {
        let repo = InMemoryRepository::new();
        let state = ProgressState::new();
        assert_eq!(repo.save_progress(&user(), &state, None).await.unwrap(), 1);

        let other = ProgressState::from_persisted(
            50,
            1,
            None,
            ids(&[7]),
            BTreeSet::new(),
            BTreeSet::new(),
            BTreeSet::new(),
        );
        let stale = repo.save_progress(&user(), &other, Some(0)).await;
        assert!(matches!(stale, Err(StorageError::Conflict)));

        let record = repo.load_progress(&user()).await.unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(repo.save_progress(&user(), &state, Some(1)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn resending_a_landed_write_is_idempotent() {
        let repo = InMemoryRepository::new();
        let state = ProgressState::new();
        repo.save_progress(&user(), &state, None).await.unwrap();
        // Same create again: already applied at version 1.
        assert_eq!(repo.save_progress(&user(), &state, None).await.unwrap(), 1);
        assert_eq!(repo.load_progress(&user()).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn updating_a_missing_record_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .save_progress(&user(), &ProgressState::new(), Some(3))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn section_upsert_unions_and_stays_completed() {
        let repo = InMemoryRepository::new();
        let section = SectionId::new(10);
        repo.upsert_section_completion(
            &user(),
            section,
            &SectionCompletionDelta {
                answered_question_ids: ids(&[1, 2]),
                completed: true,
            },
        )
        .await
        .unwrap();
        let row = repo
            .upsert_section_completion(
                &user(),
                section,
                &SectionCompletionDelta {
                    answered_question_ids: ids(&[2, 3]),
                    completed: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(row.answered_question_ids, ids(&[1, 2, 3]));
        assert_eq!(row.correct_count, 3);
        assert!(row.completed);

        let rows = repo.load_section_completion_rows(&user()).await.unwrap();
        assert_eq!(rows, vec![row]);
    }

    #[tokio::test]
    async fn campaign_upsert_is_idempotent() {
        let repo = InMemoryRepository::new();
        let c = CampaignId::new(1);
        repo.upsert_campaign_completion(&user(), c).await.unwrap();
        repo.upsert_campaign_completion(&user(), c).await.unwrap();
        let rows = repo.load_campaign_completion_rows(&user()).await.unwrap();
        assert_eq!(
            rows,
            vec![CampaignCompletionRow {
                campaign_id: c,
                completed: true
            }]
        );
    }

    #[tokio::test]
    async fn guest_store_round_trips_and_clears() {
        let repo = InMemoryRepository::new();
        assert!(repo.load_guest().await.unwrap().is_none());
        let guest = GuestProgress::start();
        repo.save_guest(&guest).await.unwrap();
        assert_eq!(repo.load_guest().await.unwrap(), Some(guest));
        repo.clear_guest().await.unwrap();
        repo.clear_guest().await.unwrap();
        assert!(repo.load_guest().await.unwrap().is_none());
    }
}
