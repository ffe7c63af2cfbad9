//! Application repository

use tracing::{debug, info};
use turso::Database;

use crate::error::Result;
use crate::models::{self, Application};

use super::{in_transaction, map_unique};

/// CRUD for applications, including the ownership cascade.
pub struct ApplicationRepo<'a> {
    db: &'a Database,
}

impl<'a> ApplicationRepo<'a> {
    /// Create a new application repository.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new application.
    pub async fn create(&self, app: &Application) -> Result<()> {
        let conn = self.db.connect()?;

        conn.execute(
            r#"
            INSERT INTO applications (id, name, client_secret, id_token, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            [
                app.id.as_str(),
                app.name.as_str(),
                app.client_secret.as_str(),
                app.id_token.as_str(),
                app.created_at.to_rfc3339().as_str(),
                app.updated_at.to_rfc3339().as_str(),
            ],
        )
        .await
        .map_err(|e| map_unique(e, "application", &app.name))?;

        info!(name = %app.name, "created application");
        Ok(())
    }

    /// Get an application by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Application>> {
        self.get_by("id", id).await
    }

    /// Get an application by name.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Application>> {
        self.get_by("name", name).await
    }

    /// Get an application by its id token.
    pub async fn get_by_id_token(&self, token: &str) -> Result<Option<Application>> {
        self.get_by("id_token", token).await
    }

    async fn get_by(&self, column: &str, value: &str) -> Result<Option<Application>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT id, name, client_secret, id_token, created_at, updated_at \
                     FROM applications WHERE {column} = ?1"
                ),
                [value],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_application(&row)?)),
            None => Ok(None),
        }
    }

    /// List all applications, newest first.
    pub async fn list(&self) -> Result<Vec<Application>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                "SELECT id, name, client_secret, id_token, created_at, updated_at \
                 FROM applications ORDER BY created_at DESC",
                (),
            )
            .await?;

        let mut apps = Vec::new();
        while let Some(row) = rows.next().await? {
            apps.push(Self::row_to_application(&row)?);
        }
        Ok(apps)
    }

    /// Update an application's name.
    pub async fn update(&self, app: &Application) -> Result<()> {
        let conn = self.db.connect()?;
        let now = models::now_string();

        conn.execute(
            "UPDATE applications SET name = ?1, updated_at = ?2 WHERE id = ?3",
            [app.name.as_str(), now.as_str(), app.id.as_str()],
        )
        .await
        .map_err(|e| map_unique(e, "application", &app.name))?;

        Ok(())
    }

    /// Delete an application with its channels.
    ///
    /// Routes sourced from the deleted channels are removed; routes
    /// targeting them keep running but lose their destination, which the
    /// route worker treats as fatal per message.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.db.connect()?;

        in_transaction(&conn, || async {
            conn.execute(
                "DELETE FROM routes WHERE source_channel_id IN \
                 (SELECT id FROM channels WHERE application_id = ?1)",
                [id],
            )
            .await?;
            conn.execute(
                "UPDATE routes SET destination_channel_id = '' WHERE destination_channel_id IN \
                 (SELECT id FROM channels WHERE application_id = ?1)",
                [id],
            )
            .await?;
            conn.execute("DELETE FROM channels WHERE application_id = ?1", [id])
                .await?;
            conn.execute("DELETE FROM applications WHERE id = ?1", [id])
                .await?;
            Ok(())
        })
        .await?;

        debug!(id, "deleted application");
        Ok(())
    }

    fn row_to_application(row: &turso::Row) -> Result<Application> {
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;

        Ok(Application {
            id: row.get(0)?,
            name: row.get(1)?,
            client_secret: row.get(2)?,
            id_token: row.get(3)?,
            created_at: models::parse_timestamp("created_at", &created_at)?,
            updated_at: models::parse_timestamp("updated_at", &updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, Route, DIRECTION_OUTBOUND, ROUTE_TYPE_DIRECT};
    use crate::Store;

    async fn setup() -> Store {
        Store::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = setup().await;
        let repo = store.applications();

        let app = Application::new("erp");
        repo.create(&app).await.unwrap();

        let found = repo.get_by_name("erp").await.unwrap().unwrap();
        assert_eq!(found.id, app.id);
        assert_eq!(found.client_secret, app.client_secret);

        let by_token = repo.get_by_id_token(&app.id_token).await.unwrap();
        assert!(by_token.is_some());
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let store = setup().await;
        assert!(store.applications().get_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_fails() {
        let store = setup().await;
        let repo = store.applications();

        repo.create(&Application::new("erp")).await.unwrap();
        assert!(repo.create(&Application::new("erp")).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_channels_and_routes() {
        let store = setup().await;
        let app = Application::new("erp");
        store.applications().create(&app).await.unwrap();

        let ch = Channel::new(&app.id, "orders", DIRECTION_OUTBOUND, "orders-q", false);
        store.channels().create(&ch).await.unwrap();

        let route = Route::new("r1", &ch.id, None, ROUTE_TYPE_DIRECT, None, None);
        store.routes().create(&route).await.unwrap();

        store.applications().delete(&app.id).await.unwrap();

        assert!(store.channels().get_by_id(&ch.id).await.unwrap().is_none());
        assert!(store.routes().get_by_id(&route.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_clears_dangling_destinations() {
        let store = setup().await;
        let keep = Application::new("keeper");
        let gone = Application::new("goner");
        store.applications().create(&keep).await.unwrap();
        store.applications().create(&gone).await.unwrap();

        let src = Channel::new(&keep.id, "src", DIRECTION_OUTBOUND, "src-q", false);
        let dst = Channel::new(&gone.id, "dst", "inbound", "dst-q", false);
        store.channels().create(&src).await.unwrap();
        store.channels().create(&dst).await.unwrap();

        let route = Route::new(
            "r1",
            &src.id,
            Some(dst.id.clone()),
            ROUTE_TYPE_DIRECT,
            None,
            None,
        );
        store.routes().create(&route).await.unwrap();

        store.applications().delete(&gone.id).await.unwrap();

        let survived = store.routes().get_by_id(&route.id).await.unwrap().unwrap();
        assert_eq!(survived.destination_channel_id, None);
    }
}
