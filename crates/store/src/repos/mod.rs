//! Entity repositories
//!
//! One repository per entity, borrowing the shared database handle.
//! Referential cleanup (cascade and clear-on-delete) runs inside
//! explicit transactions in the owning repo.

mod applications;
mod channels;
mod collectors;
mod integrations;
mod routes;
mod settings;
mod sources;
mod transformations;

pub use applications::ApplicationRepo;
pub use channels::ChannelRepo;
pub use collectors::CollectorRepo;
pub use integrations::IntegrationRepo;
pub use routes::RouteRepo;
pub use settings::SettingsRepo;
pub use sources::SourceRepo;
pub use transformations::TransformationRepo;

use turso::Connection;

use crate::error::{Result, StoreError};

/// Map a unique-constraint violation to `AlreadyExists`.
pub(crate) fn map_unique(
    err: turso::Error,
    entity: &'static str,
    name: &str,
) -> StoreError {
    if err.to_string().contains("UNIQUE constraint") {
        StoreError::already_exists(entity, name)
    } else {
        err.into()
    }
}

/// Run `body` inside a transaction, rolling back on error.
pub(crate) async fn in_transaction<F, Fut>(conn: &Connection, body: F) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    conn.execute("BEGIN", ()).await?;
    match body().await {
        Ok(()) => {
            conn.execute("COMMIT", ()).await?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK", ()).await;
            Err(e)
        }
    }
}
