//! Route repository

use tracing::debug;
use turso::Database;

use crate::error::Result;
use crate::models::{self, Route, RouteInfo};

use super::{ApplicationRepo, ChannelRepo, CollectorRepo, IntegrationRepo, TransformationRepo};

const ROUTE_COLUMNS: &str = "id, name, source_channel_id, destination_channel_id, route_type, \
                             transformation_id, integration_id, created_at";

/// CRUD for routes plus the enriched [`RouteInfo`] view.
pub struct RouteRepo<'a> {
    db: &'a Database,
}

impl<'a> RouteRepo<'a> {
    /// Create a new route repository.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new route.
    pub async fn create(&self, route: &Route) -> Result<()> {
        let conn = self.db.connect()?;

        conn.execute(
            r#"
            INSERT INTO routes (id, name, source_channel_id, destination_channel_id, route_type,
                                transformation_id, integration_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            [
                route.id.as_str(),
                route.name.as_str(),
                route.source_channel_id.as_str(),
                models::opt_to_column(&route.destination_channel_id),
                route.route_type.as_str(),
                models::opt_to_column(&route.transformation_id),
                models::opt_to_column(&route.integration_id),
                route.created_at.to_rfc3339().as_str(),
            ],
        )
        .await?;

        Ok(())
    }

    /// Update a route's definition.
    pub async fn update(&self, route: &Route) -> Result<()> {
        let conn = self.db.connect()?;

        conn.execute(
            "UPDATE routes SET name = ?1, source_channel_id = ?2, destination_channel_id = ?3, \
             route_type = ?4, transformation_id = ?5, integration_id = ?6 WHERE id = ?7",
            [
                route.name.as_str(),
                route.source_channel_id.as_str(),
                models::opt_to_column(&route.destination_channel_id),
                route.route_type.as_str(),
                models::opt_to_column(&route.transformation_id),
                models::opt_to_column(&route.integration_id),
                route.id.as_str(),
            ],
        )
        .await?;

        Ok(())
    }

    /// Delete a route.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.db.connect()?;
        conn.execute("DELETE FROM routes WHERE id = ?1", [id]).await?;
        debug!(id, "deleted route");
        Ok(())
    }

    /// Get a route by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Route>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE id = ?1"),
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_route(&row)?)),
            None => Ok(None),
        }
    }

    /// All routes as enriched infos, newest first.
    pub async fn list(&self) -> Result<Vec<RouteInfo>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!("SELECT {ROUTE_COLUMNS} FROM routes ORDER BY created_at DESC"),
                (),
            )
            .await?;

        let mut infos = Vec::new();
        while let Some(row) = rows.next().await? {
            let route = Self::row_to_route(&row)?;
            infos.push(self.build_route_info(&route).await);
        }
        Ok(infos)
    }

    /// Routes of one integration as enriched infos, newest first.
    pub async fn get_by_integration_id(&self, integration_id: &str) -> Result<Vec<RouteInfo>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ROUTE_COLUMNS} FROM routes WHERE integration_id = ?1 \
                     ORDER BY created_at DESC"
                ),
                [integration_id],
            )
            .await?;

        let mut infos = Vec::new();
        while let Some(row) = rows.next().await? {
            let route = Self::row_to_route(&row)?;
            infos.push(self.build_route_info(&route).await);
        }
        Ok(infos)
    }

    /// Enrich a raw route with display names for all its references.
    ///
    /// Dangling references (deleted channels, apps, transformations or
    /// integrations) leave their fields empty; this never fails.
    pub async fn build_route_info(&self, route: &Route) -> RouteInfo {
        let mut info = RouteInfo {
            id: route.id.clone(),
            name: route.name.clone(),
            source_channel_id: route.source_channel_id.clone(),
            destination_channel_id: route.destination_channel_id.clone().unwrap_or_default(),
            route_type: route.route_type.clone(),
            transformation_id: route.transformation_id.clone().unwrap_or_default(),
            integration_id: route.integration_id.clone().unwrap_or_default(),
            created_at: Some(route.created_at),
            ..RouteInfo::default()
        };

        let channels = ChannelRepo::new(self.db);
        let applications = ApplicationRepo::new(self.db);

        if let Some(collector_id) = route.collector_source() {
            if let Ok(Some(collector)) = CollectorRepo::new(self.db).get_by_id(collector_id).await {
                info.source_app_name = "Collector".into();
                info.source_channel_name = collector.name;
                info.source_base_name = route.source_channel_id.clone();
            }
        } else if let Ok(Some(source)) = channels.get_by_id(&route.source_channel_id).await {
            info.source_base_name = source.destination.clone();
            info.source_destination = source.destination;
            info.source_channel_name = source.name;
            if let Ok(Some(app)) = applications.get_by_id(&source.application_id).await {
                info.source_app_name = app.name;
            }
        }

        if let Some(dest_id) = &route.destination_channel_id {
            if let Ok(Some(dest)) = channels.get_by_id(dest_id).await {
                info.destination_destination = dest.destination;
                info.destination_channel_name = dest.name;
                if let Ok(Some(app)) = applications.get_by_id(&dest.application_id).await {
                    info.destination_app_name = app.name;
                }
            }
        }

        if let Some(transformation_id) = &route.transformation_id {
            if let Ok(Some(t)) = TransformationRepo::new(self.db).get_by_id(transformation_id).await
            {
                info.transformation_name = t.name;
            }
        }

        if let Some(integration_id) = &route.integration_id {
            if let Ok(Some(i)) = IntegrationRepo::new(self.db).get_by_id(integration_id).await {
                info.integration_name = i.name;
            }
        }

        info
    }

    fn row_to_route(row: &turso::Row) -> Result<Route> {
        let destination: String = row.get(3)?;
        let transformation: String = row.get(5)?;
        let integration: String = row.get(6)?;
        let created_at: String = row.get(7)?;

        Ok(Route {
            id: row.get(0)?,
            name: row.get(1)?,
            source_channel_id: row.get(2)?,
            destination_channel_id: models::opt_from_column(destination),
            route_type: row.get(4)?,
            transformation_id: models::opt_from_column(transformation),
            integration_id: models::opt_from_column(integration),
            created_at: models::parse_timestamp("created_at", &created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        collector_output_source, Application, Channel, Collector, Transformation,
        DIRECTION_INBOUND, DIRECTION_OUTBOUND, ROUTE_TYPE_DIRECT, ROUTE_TYPE_TRANSFORM,
    };
    use crate::Store;

    struct Fixture {
        store: Store,
        src: Channel,
        dst: Channel,
    }

    async fn setup() -> Fixture {
        let store = Store::new_memory().await.unwrap();
        let app = Application::new("erp");
        store.applications().create(&app).await.unwrap();

        let src = Channel::new(&app.id, "src", DIRECTION_OUTBOUND, "src-q", false);
        let dst = Channel::new(&app.id, "dst", DIRECTION_INBOUND, "dst-q", false);
        store.channels().create(&src).await.unwrap();
        store.channels().create(&dst).await.unwrap();

        Fixture { store, src, dst }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let f = setup().await;

        let route = Route::new(
            "orders-to-wms",
            &f.src.id,
            Some(f.dst.id.clone()),
            ROUTE_TYPE_DIRECT,
            None,
            None,
        );
        f.store.routes().create(&route).await.unwrap();

        let found = f.store.routes().get_by_id(&route.id).await.unwrap().unwrap();
        assert_eq!(found.name, "orders-to-wms");
        assert_eq!(found.destination_channel_id.as_deref(), Some(f.dst.id.as_str()));
        assert_eq!(found.transformation_id, None);
    }

    #[tokio::test]
    async fn test_route_info_resolves_all_references() {
        let f = setup().await;

        let t = Transformation::new("strip-totals", "starlark", "def transform(b, h): return None");
        f.store.transformations().create(&t).await.unwrap();

        let route = Route::new(
            "r1",
            &f.src.id,
            Some(f.dst.id.clone()),
            ROUTE_TYPE_TRANSFORM,
            Some(t.id.clone()),
            None,
        );
        f.store.routes().create(&route).await.unwrap();

        let infos = f.store.routes().list().await.unwrap();
        assert_eq!(infos.len(), 1);
        let info = &infos[0];
        assert_eq!(info.source_channel_name, "src");
        assert_eq!(info.source_app_name, "erp");
        assert_eq!(info.source_destination, "src-q");
        assert_eq!(info.destination_channel_name, "dst");
        assert_eq!(info.destination_destination, "dst-q");
        assert_eq!(info.transformation_name, "strip-totals");
    }

    #[tokio::test]
    async fn test_route_info_tolerates_dangling_references() {
        let f = setup().await;

        let route = Route::new(
            "r1",
            "deleted-channel",
            Some("also-deleted".into()),
            ROUTE_TYPE_TRANSFORM,
            Some("gone-transformation".into()),
            Some("gone-integration".into()),
        );
        f.store.routes().create(&route).await.unwrap();

        let info = f.store.routes().build_route_info(&route).await;
        assert_eq!(info.id, route.id);
        assert_eq!(info.source_channel_name, "");
        assert_eq!(info.source_app_name, "");
        assert_eq!(info.destination_channel_name, "");
        assert_eq!(info.transformation_name, "");
        assert_eq!(info.integration_name, "");
    }

    #[tokio::test]
    async fn test_route_info_from_collector_source() {
        let f = setup().await;

        let collector = Collector::new(
            "weather",
            "@every 1m",
            "starlark",
            "def collect(): return {\"t\": 1}",
            None,
        );
        f.store.collectors().create(&collector).await.unwrap();

        let route = Route::new(
            "weather-feed",
            collector_output_source(&collector.id),
            Some(f.dst.id.clone()),
            ROUTE_TYPE_DIRECT,
            None,
            None,
        );
        f.store.routes().create(&route).await.unwrap();

        let info = f.store.routes().build_route_info(&route).await;
        assert_eq!(info.source_app_name, "Collector");
        assert_eq!(info.source_channel_name, "weather");
        assert_eq!(info.source_base_name, route.source_channel_id);
    }

    #[tokio::test]
    async fn test_get_by_integration_id() {
        let f = setup().await;
        let integration = crate::models::Integration::new("warehouse", "");
        f.store.integrations().create(&integration).await.unwrap();

        let tagged = Route::new(
            "tagged",
            &f.src.id,
            Some(f.dst.id.clone()),
            ROUTE_TYPE_DIRECT,
            None,
            Some(integration.id.clone()),
        );
        let untagged = Route::new(
            "untagged",
            &f.src.id,
            Some(f.dst.id.clone()),
            ROUTE_TYPE_DIRECT,
            None,
            None,
        );
        f.store.routes().create(&tagged).await.unwrap();
        f.store.routes().create(&untagged).await.unwrap();

        let infos = f
            .store
            .routes()
            .get_by_integration_id(&integration.id)
            .await
            .unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "tagged");
        assert_eq!(infos[0].integration_name, "warehouse");
    }
}
