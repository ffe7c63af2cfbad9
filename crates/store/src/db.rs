//! Database connection and schema
//!
//! Uses Turso (async SQLite-compatible) for the configuration store.
//! The schema is created on open and evolved in place by the
//! [`crate::migrate`] module; both steps are idempotent, so restarting
//! against an existing database is always safe.

use std::path::Path;

use tracing::info;
use turso::{Builder, Database};

use crate::error::Result;
use crate::migrate;
use crate::repos::{
    ApplicationRepo, ChannelRepo, CollectorRepo, IntegrationRepo, RouteRepo, SettingsRepo,
    SourceRepo, TransformationRepo,
};

/// Configuration store handle
///
/// Cheap to share behind an `Arc`; every worker resolves entities
/// through it on each message.
pub struct Store {
    db: Database,
}

impl Store {
    /// Open (or create) a file-backed store and run migrations.
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::StoreError::corrupt("db_path", format!("create {parent:?}: {e}"))
                })?;
            }
        }

        let path = db_path.display().to_string();
        info!(path = %path, "opening configuration database");

        let db = Builder::new_local(&path).build().await?;
        let store = Self { db };
        migrate::run(&store.db).await?;

        info!(path = %path, "configuration database ready");
        Ok(store)
    }

    /// Open an in-memory store (tests).
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        let store = Self { db };
        migrate::run(&store.db).await?;
        Ok(store)
    }

    /// The underlying database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Application repository.
    pub fn applications(&self) -> ApplicationRepo<'_> {
        ApplicationRepo::new(&self.db)
    }

    /// Channel repository.
    pub fn channels(&self) -> ChannelRepo<'_> {
        ChannelRepo::new(&self.db)
    }

    /// Route repository.
    pub fn routes(&self) -> RouteRepo<'_> {
        RouteRepo::new(&self.db)
    }

    /// Transformation repository.
    pub fn transformations(&self) -> TransformationRepo<'_> {
        TransformationRepo::new(&self.db)
    }

    /// Collector repository.
    pub fn collectors(&self) -> CollectorRepo<'_> {
        CollectorRepo::new(&self.db)
    }

    /// Integration repository.
    pub fn integrations(&self) -> IntegrationRepo<'_> {
        IntegrationRepo::new(&self.db)
    }

    /// Settings repository.
    pub fn settings(&self) -> SettingsRepo<'_> {
        SettingsRepo::new(&self.db)
    }

    /// Route-source picklist queries.
    pub fn sources(&self) -> SourceRepo<'_> {
        SourceRepo::new(&self.db)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
