//! Collector repository

use tracing::debug;
use turso::Database;

use crate::error::Result;
use crate::models::{self, collector_output_source, Collector};

use super::{in_transaction, map_unique};

const COLUMNS: &str = "id, name, schedule, engine, script, integration_id, created_at, updated_at";

/// CRUD for scheduled collectors.
pub struct CollectorRepo<'a> {
    db: &'a Database,
}

impl<'a> CollectorRepo<'a> {
    /// Create a new collector repository.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new collector.
    pub async fn create(&self, c: &Collector) -> Result<()> {
        let conn = self.db.connect()?;

        conn.execute(
            "INSERT INTO collectors (id, name, schedule, engine, script, integration_id, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            [
                c.id.as_str(),
                c.name.as_str(),
                c.schedule.as_str(),
                c.engine.as_str(),
                c.script.as_str(),
                models::opt_to_column(&c.integration_id),
                c.created_at.to_rfc3339().as_str(),
                c.updated_at.to_rfc3339().as_str(),
            ],
        )
        .await
        .map_err(|e| map_unique(e, "collector", &c.name))?;

        Ok(())
    }

    /// Get a collector by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Collector>> {
        self.get_by("id", id).await
    }

    /// Get a collector by name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Collector>> {
        self.get_by("name", name).await
    }

    async fn get_by(&self, column: &str, value: &str) -> Result<Option<Collector>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!("SELECT {COLUMNS} FROM collectors WHERE {column} = ?1"),
                [value],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_collector(&row)?)),
            None => Ok(None),
        }
    }

    /// List all collectors, newest first.
    pub async fn list(&self) -> Result<Vec<Collector>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!("SELECT {COLUMNS} FROM collectors ORDER BY created_at DESC"),
                (),
            )
            .await?;

        let mut collectors = Vec::new();
        while let Some(row) = rows.next().await? {
            collectors.push(Self::row_to_collector(&row)?);
        }
        Ok(collectors)
    }

    /// Collectors of one integration, newest first.
    pub async fn get_by_integration_id(&self, integration_id: &str) -> Result<Vec<Collector>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {COLUMNS} FROM collectors WHERE integration_id = ?1 \
                     ORDER BY created_at DESC"
                ),
                [integration_id],
            )
            .await?;

        let mut collectors = Vec::new();
        while let Some(row) = rows.next().await? {
            collectors.push(Self::row_to_collector(&row)?);
        }
        Ok(collectors)
    }

    /// Update a collector.
    pub async fn update(&self, c: &Collector) -> Result<()> {
        let conn = self.db.connect()?;
        let now = models::now_string();

        conn.execute(
            "UPDATE collectors SET name = ?1, schedule = ?2, engine = ?3, script = ?4, \
             integration_id = ?5, updated_at = ?6 WHERE id = ?7",
            [
                c.name.as_str(),
                c.schedule.as_str(),
                c.engine.as_str(),
                c.script.as_str(),
                models::opt_to_column(&c.integration_id),
                now.as_str(),
                c.id.as_str(),
            ],
        )
        .await
        .map_err(|e| map_unique(e, "collector", &c.name))?;

        Ok(())
    }

    /// Delete a collector and the routes subscribed to its output.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.db.connect()?;
        let source = collector_output_source(id);

        in_transaction(&conn, || async {
            conn.execute(
                "DELETE FROM routes WHERE source_channel_id = ?1",
                [source.as_str()],
            )
            .await?;
            conn.execute("DELETE FROM collectors WHERE id = ?1", [id])
                .await?;
            Ok(())
        })
        .await?;

        debug!(id, "deleted collector");
        Ok(())
    }

    fn row_to_collector(row: &turso::Row) -> Result<Collector> {
        let integration: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;

        Ok(Collector {
            id: row.get(0)?,
            name: row.get(1)?,
            schedule: row.get(2)?,
            engine: row.get(3)?,
            script: row.get(4)?,
            integration_id: models::opt_from_column(integration),
            created_at: models::parse_timestamp("created_at", &created_at)?,
            updated_at: models::parse_timestamp("updated_at", &updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Route, ROUTE_TYPE_DIRECT};
    use crate::Store;

    async fn setup() -> Store {
        Store::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = setup().await;
        let repo = store.collectors();

        let c = Collector::new(
            "exchange-rates",
            "0 * * * *",
            "javascript",
            "function collect() { return {rate: 1}; }",
            None,
        );
        repo.create(&c).await.unwrap();

        let found = repo.get_by_name("exchange-rates").await.unwrap().unwrap();
        assert_eq!(found.schedule, "0 * * * *");
        assert_eq!(found.integration_id, None);
        assert_eq!(found.output_exchange(), format!("collector-output:{}", c.id));
    }

    #[tokio::test]
    async fn test_delete_removes_subscribed_routes() {
        let store = setup().await;

        let c = Collector::new("k", "@every 1s", "starlark", "def collect(): return None", None);
        store.collectors().create(&c).await.unwrap();

        let route = Route::new(
            "from-collector",
            collector_output_source(&c.id),
            None,
            ROUTE_TYPE_DIRECT,
            None,
            None,
        );
        store.routes().create(&route).await.unwrap();

        store.collectors().delete(&c.id).await.unwrap();

        assert!(store.collectors().get_by_id(&c.id).await.unwrap().is_none());
        assert!(store.routes().get_by_id(&route.id).await.unwrap().is_none());
    }
}
