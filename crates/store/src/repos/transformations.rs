//! Transformation repository

use tracing::debug;
use turso::Database;

use crate::error::Result;
use crate::models::{self, Transformation};

use super::{in_transaction, map_unique};

const COLUMNS: &str = "id, name, engine, script, created_at, updated_at";

/// CRUD for transformation scripts.
pub struct TransformationRepo<'a> {
    db: &'a Database,
}

impl<'a> TransformationRepo<'a> {
    /// Create a new transformation repository.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new transformation.
    pub async fn create(&self, t: &Transformation) -> Result<()> {
        let conn = self.db.connect()?;

        conn.execute(
            "INSERT INTO transformations (id, name, engine, script, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            [
                t.id.as_str(),
                t.name.as_str(),
                t.engine.as_str(),
                t.script.as_str(),
                t.created_at.to_rfc3339().as_str(),
                t.updated_at.to_rfc3339().as_str(),
            ],
        )
        .await
        .map_err(|e| map_unique(e, "transformation", &t.name))?;

        Ok(())
    }

    /// Get a transformation by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Transformation>> {
        self.get_by("id", id).await
    }

    /// Get a transformation by name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Transformation>> {
        self.get_by("name", name).await
    }

    async fn get_by(&self, column: &str, value: &str) -> Result<Option<Transformation>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!("SELECT {COLUMNS} FROM transformations WHERE {column} = ?1"),
                [value],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_transformation(&row)?)),
            None => Ok(None),
        }
    }

    /// List all transformations, newest first.
    pub async fn list(&self) -> Result<Vec<Transformation>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!("SELECT {COLUMNS} FROM transformations ORDER BY created_at DESC"),
                (),
            )
            .await?;

        let mut transformations = Vec::new();
        while let Some(row) = rows.next().await? {
            transformations.push(Self::row_to_transformation(&row)?);
        }
        Ok(transformations)
    }

    /// Update a transformation.
    pub async fn update(&self, t: &Transformation) -> Result<()> {
        let conn = self.db.connect()?;
        let now = models::now_string();

        conn.execute(
            "UPDATE transformations SET name = ?1, engine = ?2, script = ?3, updated_at = ?4 \
             WHERE id = ?5",
            [
                t.name.as_str(),
                t.engine.as_str(),
                t.script.as_str(),
                now.as_str(),
                t.id.as_str(),
            ],
        )
        .await
        .map_err(|e| map_unique(e, "transformation", &t.name))?;

        Ok(())
    }

    /// Delete a transformation. Routes that used it keep running but
    /// drop messages as misconfigured until an operator intervenes.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.db.connect()?;

        in_transaction(&conn, || async {
            conn.execute(
                "UPDATE routes SET transformation_id = '' WHERE transformation_id = ?1",
                [id],
            )
            .await?;
            conn.execute("DELETE FROM transformations WHERE id = ?1", [id])
                .await?;
            Ok(())
        })
        .await?;

        debug!(id, "deleted transformation");
        Ok(())
    }

    fn row_to_transformation(row: &turso::Row) -> Result<Transformation> {
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;

        Ok(Transformation {
            id: row.get(0)?,
            name: row.get(1)?,
            engine: row.get(2)?,
            script: row.get(3)?,
            created_at: models::parse_timestamp("created_at", &created_at)?,
            updated_at: models::parse_timestamp("updated_at", &updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Application, Channel, Route, DIRECTION_OUTBOUND, ROUTE_TYPE_TRANSFORM};
    use crate::Store;

    async fn setup() -> Store {
        Store::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let store = setup().await;
        let repo = store.transformations();

        let t = Transformation::new("uppercase", "javascript", "function transform(b, h) {}");
        repo.create(&t).await.unwrap();

        let mut found = repo.get_by_name("uppercase").await.unwrap().unwrap();
        assert_eq!(found.engine, "javascript");

        found.script = "function transform(b, h) { return {body: b}; }".into();
        repo.update(&found).await.unwrap();

        let reread = repo.get_by_id(&t.id).await.unwrap().unwrap();
        assert!(reread.script.contains("return"));
    }

    #[tokio::test]
    async fn test_duplicate_name_fails() {
        let store = setup().await;
        let repo = store.transformations();

        repo.create(&Transformation::new("t", "starlark", "")).await.unwrap();
        assert!(repo.create(&Transformation::new("t", "starlark", "")).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_clears_route_references() {
        let store = setup().await;

        let app = Application::new("erp");
        store.applications().create(&app).await.unwrap();
        let ch = Channel::new(&app.id, "src", DIRECTION_OUTBOUND, "src-q", false);
        store.channels().create(&ch).await.unwrap();

        let t = Transformation::new("t", "starlark", "def transform(b, h): return None");
        store.transformations().create(&t).await.unwrap();

        let route = Route::new(
            "r1",
            &ch.id,
            None,
            ROUTE_TYPE_TRANSFORM,
            Some(t.id.clone()),
            None,
        );
        store.routes().create(&route).await.unwrap();

        store.transformations().delete(&t.id).await.unwrap();

        // The route survives with its transformation reference cleared;
        // dispatch now dead-letters its messages.
        let survived = store.routes().get_by_id(&route.id).await.unwrap().unwrap();
        assert_eq!(survived.transformation_id, None);
    }
}
