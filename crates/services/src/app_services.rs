use std::path::PathBuf;
use std::sync::Arc;

use raccoon_core::settings::ProgressionSettings;
use storage::repository::Storage;
use storage::sqlite::SqliteRepository;

use crate::Clock;
use crate::catalog_service::CatalogService;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<ProgressService>,
    catalog: Arc<CatalogService>,
    sqlite: Option<SqliteRepository>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage and a guest JSON file.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        guest_file: impl Into<PathBuf>,
        settings: &ProgressionSettings,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let sqlite = SqliteRepository::connect(db_url).await?;
        sqlite.migrate().await?;
        let storage = Storage::from_sqlite(sqlite.clone(), guest_file);
        let mut services = Self::from_storage(&storage, settings, clock);
        services.sqlite = Some(sqlite);
        Ok(services)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, settings: &ProgressionSettings, clock: Clock) -> Self {
        let progress = Arc::new(
            ProgressService::new(
                settings,
                Arc::clone(&storage.progress),
                Arc::clone(&storage.guest),
            )
            .with_clock(clock),
        );
        let catalog = Arc::new(CatalogService::new(Arc::clone(&storage.catalog)));
        Self {
            progress,
            catalog,
            sqlite: None,
        }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<CatalogService> {
        Arc::clone(&self.catalog)
    }

    /// The `SQLite` adapter, when the services were built over one.
    #[must_use]
    pub fn sqlite(&self) -> Option<&SqliteRepository> {
        self.sqlite.as_ref()
    }
}
