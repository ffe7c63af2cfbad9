//! Channel repository

use tracing::debug;
use turso::Database;

use crate::error::{Result, StoreError};
use crate::models::{self, Channel, ChannelInfo};

use super::{in_transaction, map_unique};

/// CRUD for channels plus the routable-channel and orphan queries.
pub struct ChannelRepo<'a> {
    db: &'a Database,
}

impl<'a> ChannelRepo<'a> {
    /// Create a new channel repository.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a new channel.
    pub async fn create(&self, channel: &Channel) -> Result<()> {
        let conn = self.db.connect()?;

        conn.execute(
            r#"
            INSERT INTO channels (id, application_id, name, direction, destination, fanout_mode, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            (
                channel.id.as_str(),
                channel.application_id.as_str(),
                channel.name.as_str(),
                channel.direction.as_str(),
                channel.destination.as_str(),
                channel.fanout_mode as i64,
                channel.created_at.to_rfc3339(),
            ),
        )
        .await
        .map_err(|e| map_unique(e, "channel", &channel.name))?;

        Ok(())
    }

    /// Update a channel's mutable fields.
    pub async fn update(&self, channel: &Channel) -> Result<()> {
        let conn = self.db.connect()?;

        conn.execute(
            "UPDATE channels SET name = ?1, direction = ?2, destination = ?3, fanout_mode = ?4 \
             WHERE id = ?5",
            (
                channel.name.as_str(),
                channel.direction.as_str(),
                channel.destination.as_str(),
                channel.fanout_mode as i64,
                channel.id.as_str(),
            ),
        )
        .await
        .map_err(|e| map_unique(e, "channel", &channel.name))?;

        Ok(())
    }

    /// Get a channel by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Channel>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                "SELECT id, application_id, name, direction, destination, fanout_mode, created_at \
                 FROM channels WHERE id = ?1",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_channel(&row)?)),
            None => Ok(None),
        }
    }

    /// Get every channel with the given name (names are only unique per
    /// application).
    pub async fn get_by_name(&self, name: &str) -> Result<Vec<Channel>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                "SELECT id, application_id, name, direction, destination, fanout_mode, created_at \
                 FROM channels WHERE name = ?1",
                [name],
            )
            .await?;

        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(Self::row_to_channel(&row)?);
        }
        Ok(channels)
    }

    /// Resolve a channel by id, falling back to a unique name match.
    pub async fn find(&self, identifier: &str) -> Result<Option<Channel>> {
        if let Some(channel) = self.get_by_id(identifier).await? {
            return Ok(Some(channel));
        }

        let mut matches = self.get_by_name(identifier).await?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches.remove(0))),
            _ => Err(StoreError::ambiguous("channel", identifier)),
        }
    }

    /// List all channels.
    pub async fn list(&self) -> Result<Vec<Channel>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                "SELECT id, application_id, name, direction, destination, fanout_mode, created_at \
                 FROM channels",
                (),
            )
            .await?;

        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(Self::row_to_channel(&row)?);
        }
        Ok(channels)
    }

    /// List the channels of one application.
    pub async fn get_by_app_id(&self, app_id: &str) -> Result<Vec<Channel>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                "SELECT id, application_id, name, direction, destination, fanout_mode, created_at \
                 FROM channels WHERE application_id = ?1",
                [app_id],
            )
            .await?;

        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(Self::row_to_channel(&row)?);
        }
        Ok(channels)
    }

    /// Channels of one direction joined with their application name,
    /// ordered for picklists.
    pub async fn get_all_routable(&self, direction: &str) -> Result<Vec<ChannelInfo>> {
        let conn = self.db.connect()?;

        let mut rows = conn
            .query(
                r#"
                SELECT c.id, c.name, c.destination, c.fanout_mode, a.name
                FROM channels c
                JOIN applications a ON c.application_id = a.id
                WHERE c.direction = ?1
                ORDER BY a.name, c.name
                "#,
                [direction],
            )
            .await?;

        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            let fanout: i64 = row.get(3)?;
            channels.push(ChannelInfo {
                id: row.get(0)?,
                name: row.get(1)?,
                destination: row.get(2)?,
                fanout_mode: fanout != 0,
                application_name: row.get(4)?,
            });
        }
        Ok(channels)
    }

    /// Delete a channel and the routes it sources; routes targeting it
    /// lose their destination.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let conn = self.db.connect()?;

        in_transaction(&conn, || async {
            conn.execute("DELETE FROM routes WHERE source_channel_id = ?1", [id])
                .await?;
            conn.execute(
                "UPDATE routes SET destination_channel_id = '' WHERE destination_channel_id = ?1",
                [id],
            )
            .await?;
            conn.execute("DELETE FROM channels WHERE id = ?1", [id])
                .await?;
            Ok(())
        })
        .await?;

        debug!(id, "deleted channel");
        Ok(())
    }

    /// Remove channels whose application no longer exists. Returns the
    /// number of channels removed.
    pub async fn delete_orphaned(&self) -> Result<u64> {
        let conn = self.db.connect()?;

        let removed = conn
            .execute(
                "DELETE FROM channels WHERE application_id NOT IN (SELECT id FROM applications)",
                (),
            )
            .await?;

        if removed > 0 {
            debug!(count = removed, "removed orphaned channels");
        }
        Ok(removed)
    }

    fn row_to_channel(row: &turso::Row) -> Result<Channel> {
        let fanout: i64 = row.get(5)?;
        let created_at: String = row.get(6)?;

        Ok(Channel {
            id: row.get(0)?,
            application_id: row.get(1)?,
            name: row.get(2)?,
            direction: row.get(3)?,
            destination: row.get(4)?,
            fanout_mode: fanout != 0,
            created_at: models::parse_timestamp("created_at", &created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Application, DIRECTION_INBOUND, DIRECTION_OUTBOUND};
    use crate::Store;

    async fn setup_with_app() -> (Store, Application) {
        let store = Store::new_memory().await.unwrap();
        let app = Application::new("erp");
        store.applications().create(&app).await.unwrap();
        (store, app)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, app) = setup_with_app().await;

        let ch = Channel::new(&app.id, "orders", DIRECTION_OUTBOUND, "orders-q", true);
        store.channels().create(&ch).await.unwrap();

        let found = store.channels().get_by_id(&ch.id).await.unwrap().unwrap();
        assert_eq!(found.destination, "orders-q");
        assert!(found.fanout_mode);
        assert_eq!(found.direction, DIRECTION_OUTBOUND);
    }

    #[tokio::test]
    async fn test_name_unique_per_application() {
        let (store, app) = setup_with_app().await;
        let other = Application::new("crm");
        store.applications().create(&other).await.unwrap();

        let ch1 = Channel::new(&app.id, "orders", DIRECTION_OUTBOUND, "q1", false);
        store.channels().create(&ch1).await.unwrap();

        // Same name under the same application is rejected...
        let dup = Channel::new(&app.id, "orders", DIRECTION_OUTBOUND, "q2", false);
        assert!(store.channels().create(&dup).await.is_err());

        // ...but fine under another application.
        let ok = Channel::new(&other.id, "orders", DIRECTION_OUTBOUND, "q3", false);
        store.channels().create(&ok).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_by_id_then_unique_name() {
        let (store, app) = setup_with_app().await;
        let ch = Channel::new(&app.id, "orders", DIRECTION_OUTBOUND, "q1", false);
        store.channels().create(&ch).await.unwrap();

        let by_id = store.channels().find(&ch.id).await.unwrap().unwrap();
        assert_eq!(by_id.id, ch.id);

        let by_name = store.channels().find("orders").await.unwrap().unwrap();
        assert_eq!(by_name.id, ch.id);

        assert!(store.channels().find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_ambiguous_name_is_an_error() {
        let (store, app) = setup_with_app().await;
        let other = Application::new("crm");
        store.applications().create(&other).await.unwrap();

        store
            .channels()
            .create(&Channel::new(&app.id, "orders", DIRECTION_OUTBOUND, "q1", false))
            .await
            .unwrap();
        store
            .channels()
            .create(&Channel::new(&other.id, "orders", DIRECTION_OUTBOUND, "q2", false))
            .await
            .unwrap();

        assert!(store.channels().find("orders").await.is_err());
    }

    #[tokio::test]
    async fn test_routable_channels_filter_and_join() {
        let (store, app) = setup_with_app().await;

        store
            .channels()
            .create(&Channel::new(&app.id, "out", DIRECTION_OUTBOUND, "out-q", false))
            .await
            .unwrap();
        store
            .channels()
            .create(&Channel::new(&app.id, "in", DIRECTION_INBOUND, "in-q", false))
            .await
            .unwrap();

        let outbound = store.channels().get_all_routable(DIRECTION_OUTBOUND).await.unwrap();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].name, "out");
        assert_eq!(outbound[0].application_name, "erp");
    }

    #[tokio::test]
    async fn test_delete_orphaned() {
        let (store, app) = setup_with_app().await;
        let ch = Channel::new(&app.id, "orders", DIRECTION_OUTBOUND, "q1", false);
        store.channels().create(&ch).await.unwrap();

        // Nothing orphaned while the application exists.
        assert_eq!(store.channels().delete_orphaned().await.unwrap(), 0);

        // Remove the application row directly, leaving the channel behind.
        let conn = store.db().connect().unwrap();
        conn.execute("DELETE FROM applications WHERE id = ?1", [app.id.as_str()])
            .await
            .unwrap();

        assert_eq!(store.channels().delete_orphaned().await.unwrap(), 1);
        assert!(store.channels().get_by_id(&ch.id).await.unwrap().is_none());
    }
}
