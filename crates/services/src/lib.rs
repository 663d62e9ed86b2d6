#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog_service;
pub mod error;
pub mod progress_service;
pub mod retry;

pub use raccoon_core::Clock;

pub use app_services::AppServices;
pub use catalog_service::{CampaignView, CatalogService, SectionView};
pub use error::{AppServicesError, CatalogServiceError, ProgressServiceError};
pub use progress_service::{AnswerOutcome, Learner, MergeReport, ProgressService};
pub use retry::RetryConfig;
