//! Worker supervisor
//!
//! Tracks every running worker by key (`inbound-<base>`,
//! `outbound-<base>`, `router-<route_id>`) in a mutex-protected
//! registry: a presence set plus a map of cancellation tokens. Starts
//! are idempotent by key; stop cancels the token and the worker exits
//! at its next suspension point.
//!
//! Route workers are the only kind the admin surface stops and
//! restarts individually; inbound/outbound workers are cancelled as a
//! group at shutdown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mezzo_broker::{names, Broker};
use mezzo_script::ScriptService;
use mezzo_store::{Store, COLLECTOR_SOURCE_PREFIX};

use crate::error::{EngineError, Result};
use crate::workers;

/// Delay between stopping and restarting a route worker, giving the
/// old consumer time to settle.
const RESTART_SETTLE: Duration = Duration::from_millis(100);

fn inbound_key(base: &str) -> String {
    format!("inbound-{base}")
}

fn outbound_key(base: &str) -> String {
    format!("outbound-{base}")
}

fn router_key(route_id: &str) -> String {
    format!("router-{route_id}")
}

/// Mutex-protected worker registry.
#[derive(Default)]
pub(crate) struct Registry {
    workers: HashSet<String>,
    stoppers: HashMap<String, CancellationToken>,
}

impl Registry {
    /// Register a key and hand back its fresh cancellation token, or
    /// `None` if a worker with this key is already running.
    pub(crate) fn try_register(registry: &Mutex<Self>, key: &str) -> Option<CancellationToken> {
        let mut guard = registry.lock();
        if guard.workers.contains(key) {
            return None;
        }
        let token = CancellationToken::new();
        guard.workers.insert(key.to_string());
        guard.stoppers.insert(key.to_string(), token.clone());
        Some(token)
    }

    /// Cancel and deregister a key. Returns whether it was running.
    pub(crate) fn cancel(registry: &Mutex<Self>, key: &str) -> bool {
        let mut guard = registry.lock();
        let was_running = guard.workers.remove(key);
        if let Some(token) = guard.stoppers.remove(key) {
            token.cancel();
        }
        was_running
    }

    /// Remove a key without cancelling (worker exited on its own).
    pub(crate) fn remove(registry: &Mutex<Self>, key: &str) {
        let mut guard = registry.lock();
        guard.workers.remove(key);
        guard.stoppers.remove(key);
    }

    /// Cancel everything.
    pub(crate) fn cancel_all(registry: &Mutex<Self>) {
        let mut guard = registry.lock();
        for token in guard.stoppers.values() {
            token.cancel();
        }
        guard.stoppers.clear();
        guard.workers.clear();
    }

    pub(crate) fn is_running(registry: &Mutex<Self>, key: &str) -> bool {
        registry.lock().workers.contains(key)
    }

    pub(crate) fn len(registry: &Mutex<Self>) -> usize {
        registry.lock().workers.len()
    }
}

/// Owns all worker lifetimes. One per process.
pub struct Supervisor {
    broker: Arc<Broker>,
    store: Arc<Store>,
    scripts: Arc<ScriptService>,
    registry: Arc<Mutex<Registry>>,
}

impl Supervisor {
    /// Create a supervisor over the shared collaborators.
    pub fn new(broker: Arc<Broker>, store: Arc<Store>, scripts: Arc<ScriptService>) -> Self {
        Self {
            broker,
            store,
            scripts,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Number of live workers.
    pub fn worker_count(&self) -> usize {
        Registry::len(&self.registry)
    }

    /// Start the inbound forwarder for a channel base. No-op if
    /// already running.
    pub fn start_inbound_forwarder(&self, base: &str) {
        let key = inbound_key(base);
        let Some(token) = Registry::try_register(&self.registry, &key) else {
            warn!(base, "inbound forwarder already started, skipping");
            return;
        };

        info!(
            from = %names::durable_queue(base),
            to = %base,
            "starting inbound forwarder"
        );

        let broker = Arc::clone(&self.broker);
        let registry = Arc::clone(&self.registry);
        let base = base.to_string();
        tokio::spawn(async move {
            let _active = crate::metrics::ActiveWorker::new("inbound");
            workers::inbound::run(broker, &base, token).await;
            Registry::remove(&registry, &inbound_key(&base));
        });
    }

    /// Start the outbound collector for a channel base. No-op if
    /// already running.
    pub fn start_outbound_collector(&self, base: &str) {
        let key = outbound_key(base);
        let Some(token) = Registry::try_register(&self.registry, &key) else {
            warn!(base, "outbound collector already started, skipping");
            return;
        };

        info!(
            from = %base,
            to = %names::durable_exchange(base),
            "starting outbound collector"
        );

        let broker = Arc::clone(&self.broker);
        let registry = Arc::clone(&self.registry);
        let base = base.to_string();
        tokio::spawn(async move {
            let _active = crate::metrics::ActiveWorker::new("outbound");
            workers::outbound::run(broker, &base, token).await;
            Registry::remove(&registry, &outbound_key(&base));
        });
    }

    /// Start a route worker. Idempotent by route id.
    ///
    /// `source_id` is a channel id or `collector-output:<collector_id>`;
    /// the source's mode decides whether this worker competes on the
    /// shared durable queue or gets its own fanout subscription queue.
    pub async fn start_router(
        &self,
        route_id: &str,
        route_name: &str,
        source_id: &str,
    ) -> Result<()> {
        let key = router_key(route_id);
        if Registry::is_running(&self.registry, &key) {
            warn!(route_id, "router worker already started, skipping");
            return Ok(());
        }

        let source_queue = self
            .resolve_router_source(route_id, route_name, source_id)
            .await?;

        let Some(token) = Registry::try_register(&self.registry, &key) else {
            // Raced with a concurrent start; the earlier one wins.
            return Ok(());
        };

        let registry = Arc::clone(&self.registry);
        let context = workers::router::RouterContext {
            broker: Arc::clone(&self.broker),
            store: Arc::clone(&self.store),
            scripts: Arc::clone(&self.scripts),
            route_id: route_id.to_string(),
            source_queue,
        };
        let route_id = route_id.to_string();
        tokio::spawn(async move {
            let _active = crate::metrics::ActiveWorker::new("router");
            workers::router::run(context, token).await;
            Registry::remove(&registry, &router_key(&route_id));
        });

        Ok(())
    }

    /// Stop a route worker if it is running.
    pub fn stop_router(&self, route_id: &str) {
        if Registry::cancel(&self.registry, &router_key(route_id)) {
            info!(route_id, "stopping router worker");
        }
    }

    /// Stop, settle, start. Used after admin edits to a route.
    pub async fn restart_router(
        &self,
        route_id: &str,
        route_name: &str,
        source_id: &str,
    ) -> Result<()> {
        self.stop_router(route_id);
        tokio::time::sleep(RESTART_SETTLE).await;
        self.start_router(route_id, route_name, source_id).await
    }

    /// Cancel every worker. Shutdown path.
    pub fn stop_all(&self) {
        info!(workers = self.worker_count(), "stopping all workers");
        Registry::cancel_all(&self.registry);
    }

    /// Work out which queue a route worker consumes, declaring the
    /// fanout subscription topology where needed.
    async fn resolve_router_source(
        &self,
        route_id: &str,
        route_name: &str,
        source_id: &str,
    ) -> Result<String> {
        if source_id.starts_with(COLLECTOR_SOURCE_PREFIX) {
            // Collector outputs are always fanout.
            let queue = names::route_fanout_queue(route_name, route_id);
            info!(route_id, exchange = source_id, "router consumes collector output (fanout)");
            self.broker.setup_fanout_subscription(source_id, &queue).await?;
            return Ok(queue);
        }

        let channel = self
            .store
            .channels()
            .get_by_id(source_id)
            .await?
            .ok_or_else(|| EngineError::SourceMissing {
                source_id: source_id.to_string(),
            })?;

        if channel.fanout_mode {
            let exchange = names::durable_exchange(&channel.destination);
            let queue = names::route_fanout_queue(route_name, route_id);
            info!(route_id, exchange = %exchange, "router consumes channel (fanout)");
            self.broker.setup_fanout_subscription(&exchange, &queue).await?;
            Ok(queue)
        } else {
            let queue = names::durable_queue(&channel.destination);
            info!(route_id, queue = %queue, "router consumes channel (direct)");
            Ok(queue)
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("workers", &self.worker_count())
            .finish()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        Registry::cancel_all(&self.registry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent_per_key() {
        let registry = Mutex::new(Registry::default());

        let first = Registry::try_register(&registry, "router-r1");
        assert!(first.is_some());

        // Second registration of the same key is refused.
        assert!(Registry::try_register(&registry, "router-r1").is_none());

        // A different key is independent.
        assert!(Registry::try_register(&registry, "router-r2").is_some());
        assert_eq!(Registry::len(&registry), 2);
    }

    #[test]
    fn test_cancel_fires_token_and_frees_key() {
        let registry = Mutex::new(Registry::default());
        let token = Registry::try_register(&registry, "router-r1").unwrap();

        assert!(Registry::cancel(&registry, "router-r1"));
        assert!(token.is_cancelled());
        assert!(!Registry::is_running(&registry, "router-r1"));

        // Key is reusable after cancellation.
        assert!(Registry::try_register(&registry, "router-r1").is_some());
    }

    #[test]
    fn test_cancel_unknown_key_is_noop() {
        let registry = Mutex::new(Registry::default());
        assert!(!Registry::cancel(&registry, "router-missing"));
    }

    #[test]
    fn test_cancel_all() {
        let registry = Mutex::new(Registry::default());
        let t1 = Registry::try_register(&registry, "inbound-a").unwrap();
        let t2 = Registry::try_register(&registry, "outbound-a").unwrap();

        Registry::cancel_all(&registry);
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
        assert_eq!(Registry::len(&registry), 0);
    }

    #[test]
    fn test_worker_keys() {
        assert_eq!(inbound_key("q1"), "inbound-q1");
        assert_eq!(outbound_key("q1"), "outbound-q1");
        assert_eq!(router_key("r9"), "router-r9");
    }
}
