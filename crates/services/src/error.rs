//! Shared error types for the services crate.

use thiserror::Error;

use raccoon_core::ConfigError;
use raccoon_core::model::{AnswerId, QuestionId, SectionId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("question {question} is not in the catalog")]
    UnknownQuestion { question: QuestionId },

    #[error("answer {answer} is not an option of question {question}")]
    UnknownAnswer {
        question: QuestionId,
        answer: AnswerId,
    },

    /// Earlier sections or campaigns are not completed yet.
    #[error("section {section} is locked")]
    Locked { section: SectionId },

    /// The record kept changing under us; surfaced instead of overwriting.
    #[error("progress kept changing concurrently; gave up after {attempts} attempts")]
    ConflictRetriesExhausted { attempts: u32 },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressServiceError {
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Conflict))
    }
}

/// Errors emitted by `CatalogService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
