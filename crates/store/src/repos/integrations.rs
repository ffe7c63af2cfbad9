//! Integration repository

use tracing::debug;
use turso::Database;

use crate::error::Result;
use crate::models::{self, Integration};

use super::{in_transaction, map_unique};

const COLUMNS: &str = "id, name, description, created_at, updated_at";

/// CRUD for integration labels.
pub struct IntegrationRepo<'a> {
    db: &'a Database,
}

impl<'a> IntegrationRepo<'a> {
    /// Create a new integration repository.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new integration.
    pub async fn create(&self, i: &Integration) -> Result<()> {
        let conn = self.db.connect()?;

        conn.execute(
            "INSERT INTO integrations (id, name, description, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            [
                i.id.as_str(),
                i.name.as_str(),
                i.description.as_str(),
                i.created_at.to_rfc3339().as_str(),
                i.updated_at.to_rfc3339().as_str(),
            ],
        )
        .await
        .map_err(|e| map_unique(e, "integration", &i.name))?;

        Ok(())
    }

    /// Get an integration by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Integration>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!("SELECT {COLUMNS} FROM integrations WHERE id = ?1"),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_integration(&row)?)),
            None => Ok(None),
        }
    }

    /// List all integrations, alphabetically.
    pub async fn list(&self) -> Result<Vec<Integration>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!("SELECT {COLUMNS} FROM integrations ORDER BY name ASC"),
                (),
            )
            .await?;

        let mut integrations = Vec::new();
        while let Some(row) = rows.next().await? {
            integrations.push(Self::row_to_integration(&row)?);
        }
        Ok(integrations)
    }

    /// Update an integration.
    pub async fn update(&self, i: &Integration) -> Result<()> {
        let conn = self.db.connect()?;
        let now = models::now_string();

        conn.execute(
            "UPDATE integrations SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
            [
                i.name.as_str(),
                i.description.as_str(),
                now.as_str(),
                i.id.as_str(),
            ],
        )
        .await
        .map_err(|e| map_unique(e, "integration", &i.name))?;

        Ok(())
    }

    /// Delete an integration; routes and collectors keep running but
    /// lose the label.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.db.connect()?;

        in_transaction(&conn, || async {
            conn.execute(
                "UPDATE routes SET integration_id = '' WHERE integration_id = ?1",
                [id],
            )
            .await?;
            conn.execute(
                "UPDATE collectors SET integration_id = '' WHERE integration_id = ?1",
                [id],
            )
            .await?;
            conn.execute("DELETE FROM integrations WHERE id = ?1", [id])
                .await?;
            Ok(())
        })
        .await?;

        debug!(id, "deleted integration");
        Ok(())
    }

    fn row_to_integration(row: &turso::Row) -> Result<Integration> {
        let created_at: String = row.get(3)?;
        let updated_at: String = row.get(4)?;

        Ok(Integration {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: models::parse_timestamp("created_at", &created_at)?,
            updated_at: models::parse_timestamp("updated_at", &updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Collector;
    use crate::Store;

    async fn setup() -> Store {
        Store::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_list_is_alphabetical() {
        let store = setup().await;
        let repo = store.integrations();

        repo.create(&Integration::new("warehouse", "")).await.unwrap();
        repo.create(&Integration::new("billing", "")).await.unwrap();

        let all = repo.list().await.unwrap();
        assert_eq!(all[0].name, "billing");
        assert_eq!(all[1].name, "warehouse");
    }

    #[tokio::test]
    async fn test_delete_clears_collector_labels() {
        let store = setup().await;

        let integration = Integration::new("warehouse", "");
        store.integrations().create(&integration).await.unwrap();

        let c = Collector::new(
            "stock",
            "@every 5m",
            "starlark",
            "def collect(): return None",
            Some(integration.id.clone()),
        );
        store.collectors().create(&c).await.unwrap();

        store.integrations().delete(&integration.id).await.unwrap();

        let survived = store.collectors().get_by_id(&c.id).await.unwrap().unwrap();
        assert_eq!(survived.integration_id, None);
    }
}
