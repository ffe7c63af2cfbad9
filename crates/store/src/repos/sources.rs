//! Route-source picklist

use turso::Database;

use crate::error::Result;
use crate::models::{collector_output_source, RouteSource, DIRECTION_INBOUND, DIRECTION_OUTBOUND};

use super::{ChannelRepo, CollectorRepo};

/// Queries that unify channels and collectors into one picklist.
pub struct SourceRepo<'a> {
    db: &'a Database,
}

impl<'a> SourceRepo<'a> {
    /// Create a new source repository.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Every possible route source: outbound channels, inbound channels
    /// (so routes can be chained) and collectors, sorted by label.
    pub async fn list_route_sources(&self) -> Result<Vec<RouteSource>> {
        let channels = ChannelRepo::new(self.db);
        let mut sources = Vec::new();

        for ch in channels.get_all_routable(DIRECTION_OUTBOUND).await? {
            sources.push(RouteSource {
                id: ch.id,
                name: format!("External source: {} / {}", ch.application_name, ch.name),
            });
        }

        for ch in channels.get_all_routable(DIRECTION_INBOUND).await? {
            sources.push(RouteSource {
                id: ch.id,
                name: format!("Internal source: {} / {}", ch.application_name, ch.name),
            });
        }

        for collector in CollectorRepo::new(self.db).list().await? {
            sources.push(RouteSource {
                id: collector_output_source(&collector.id),
                name: format!("Collector: {}", collector.name),
            });
        }

        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{Application, Channel, Collector, DIRECTION_INBOUND, DIRECTION_OUTBOUND};
    use crate::Store;

    #[tokio::test]
    async fn test_unified_picklist() {
        let store = Store::new_memory().await.unwrap();

        let app = Application::new("erp");
        store.applications().create(&app).await.unwrap();
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

        let c = Collector::new("rates", "@every 1h", "starlark", "def collect(): return None", None);
        store.collectors().create(&c).await.unwrap();

        let sources = store.sources().list_route_sources().await.unwrap();
        assert_eq!(sources.len(), 3);

        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"External source: erp / out"));
        assert!(names.contains(&"Internal source: erp / in"));
        assert!(names.contains(&"Collector: rates"));

        let collector_entry = sources.iter().find(|s| s.name.starts_with("Collector")).unwrap();
        assert_eq!(collector_entry.id, format!("collector-output:{}", c.id));

        // Sorted by label.
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
