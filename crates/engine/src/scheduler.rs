//! Collector scheduler
//!
//! One cancellable task per collector. A task sleeps until its next
//! fire time, reloads the collector row (so schedule and script edits
//! apply on the next tick and a deleted collector winds itself down),
//! runs the script, and publishes any produced body to the collector's
//! output exchange.
//!
//! Execution is inline in the task, so ticks of the same collector can
//! never overlap; different collectors run in parallel. A tick that
//! overruns its schedule simply delays the next fire.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mezzo_broker::Broker;
use mezzo_script::ScriptService;
use mezzo_store::{models::Collector, Store};

use crate::error::{EngineError, Result};
use crate::metrics;

/// A parsed collector schedule.
///
/// Accepts standard cron (5 fields, or 6 with a leading seconds
/// column) and the interval form `@every <n><unit>` with units `ms`,
/// `s`, `m`, `h`.
#[derive(Debug, Clone)]
pub enum ScheduleSpec {
    Cron(Box<Schedule>),
    Every(Duration),
}

impl ScheduleSpec {
    /// Next fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScheduleSpec::Cron(schedule) => schedule.after(&now).next(),
            ScheduleSpec::Every(interval) => {
                let interval = chrono::Duration::from_std(*interval).ok()?;
                now.checked_add_signed(interval)
            }
        }
    }
}

impl FromStr for ScheduleSpec {
    type Err = EngineError;

    fn from_str(expression: &str) -> Result<Self> {
        let invalid = |message: String| EngineError::InvalidSchedule {
            expression: expression.to_string(),
            message,
        };

        let trimmed = expression.trim();

        if let Some(interval) = trimmed.strip_prefix("@every ") {
            return parse_interval(interval.trim())
                .map(ScheduleSpec::Every)
                .map_err(invalid);
        }

        // The cron parser wants a seconds column; plain 5-field
        // expressions get a literal zero prepended.
        let fields = trimmed.split_whitespace().count();
        let normalized = if fields == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        };

        Schedule::from_str(&normalized)
            .map(|schedule| ScheduleSpec::Cron(Box::new(schedule)))
            .map_err(|e| invalid(e.to_string()))
    }
}

fn parse_interval(s: &str) -> std::result::Result<Duration, String> {
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(index) if index > 0 => s.split_at(index),
        _ => return Err(format!("malformed interval '{s}'")),
    };

    let amount: u64 = digits.parse().map_err(|e| format!("{e}"))?;
    if amount == 0 {
        return Err("interval must be positive".to_string());
    }

    match unit {
        "ms" => Ok(Duration::from_millis(amount)),
        "s" => Ok(Duration::from_secs(amount)),
        "m" => Ok(Duration::from_secs(amount * 60)),
        "h" => Ok(Duration::from_secs(amount * 3600)),
        other => Err(format!("unknown interval unit '{other}'")),
    }
}

/// Registers collectors and runs their scheduled tasks.
pub struct CollectorScheduler {
    store: Arc<Store>,
    scripts: Arc<ScriptService>,
    broker: Arc<Broker>,
    tasks: Mutex<HashMap<String, CancellationToken>>,
}

impl CollectorScheduler {
    /// Create a scheduler over the shared collaborators.
    pub fn new(store: Arc<Store>, scripts: Arc<ScriptService>, broker: Arc<Broker>) -> Self {
        Self {
            store,
            scripts,
            broker,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Register every stored collector. Bad schedules are logged and
    /// skipped; one broken collector doesn't block the rest.
    pub async fn start(&self) -> Result<()> {
        let collectors = self.store.collectors().list().await?;
        info!(count = collectors.len(), "registering collectors");

        for collector in &collectors {
            self.register(collector);
        }
        Ok(())
    }

    /// Register one collector, replacing any existing task for its id.
    pub fn register(&self, collector: &Collector) {
        let spec = match ScheduleSpec::from_str(&collector.schedule) {
            Ok(spec) => spec,
            Err(e) => {
                error!(
                    collector = %collector.name,
                    schedule = %collector.schedule,
                    error = %e,
                    "invalid schedule, collector not registered"
                );
                return;
            }
        };

        let token = CancellationToken::new();
        if let Some(previous) = self
            .tasks
            .lock()
            .insert(collector.id.clone(), token.clone())
        {
            previous.cancel();
        }

        info!(
            collector = %collector.name,
            schedule = %collector.schedule,
            "collector registered"
        );

        let store = Arc::clone(&self.store);
        let scripts = Arc::clone(&self.scripts);
        let broker = Arc::clone(&self.broker);
        let collector_id = collector.id.clone();
        tokio::spawn(async move {
            run_schedule(store, scripts, broker, collector_id, spec, token).await;
        });
    }

    /// Cancel a collector's task (deleted or disabled).
    pub fn deregister(&self, collector_id: &str) {
        if let Some(token) = self.tasks.lock().remove(collector_id) {
            info!(collector_id, "collector deregistered");
            token.cancel();
        }
    }

    /// Cancel every task. Shutdown path.
    pub fn stop_all(&self) {
        let mut tasks = self.tasks.lock();
        for token in tasks.values() {
            token.cancel();
        }
        tasks.clear();
    }
}

impl Drop for CollectorScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

async fn run_schedule(
    store: Arc<Store>,
    scripts: Arc<ScriptService>,
    broker: Arc<Broker>,
    collector_id: String,
    spec: ScheduleSpec,
    cancel: CancellationToken,
) {
    loop {
        let now = Utc::now();
        let Some(next) = spec.next_after(now) else {
            warn!(collector_id, "schedule yields no further fire times, stopping");
            return;
        };
        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(collector_id, "collector task cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        match tick(&store, &scripts, &broker, &collector_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!(collector_id, "collector no longer exists, stopping its task");
                return;
            }
            Err(e) => {
                error!(collector_id, error = %e, "collector run failed");
                metrics::error_recorded("collector");
            }
        }
    }
}

/// Execute one collector fire. `Ok(false)` means the collector row is
/// gone and the task should end.
async fn tick(
    store: &Store,
    scripts: &ScriptService,
    broker: &Broker,
    collector_id: &str,
) -> Result<bool> {
    let Some(collector) = store.collectors().get_by_id(collector_id).await? else {
        return Ok(false);
    };

    debug!(collector = %collector.name, "running collector");

    let output = scripts
        .execute(
            &collector.engine,
            &collector.script,
            serde_json::Map::new(),
            serde_json::Map::new(),
        )
        .await?;

    let Some(output) = output else {
        info!(collector = %collector.name, "collector produced no data");
        return Ok(true);
    };

    let body = serde_json::to_vec(&Value::Object(output.body))
        .map_err(|e| mezzo_script::ScriptError::BadResult(e.to_string()))?;

    let exchange = collector.output_exchange();
    broker.ensure_exchange(&exchange).await?;
    broker.publish(&exchange, "", &body).await?;

    metrics::message_processed("collector", &collector.name, &exchange);
    info!(collector = %collector.name, exchange = %exchange, "collector output published");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_five_field_cron_accepted() {
        let spec: ScheduleSpec = "*/5 * * * *".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 1).unwrap();
        let next = spec.next_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 1, 12, 5, 0).unwrap());
    }

    #[test]
    fn test_six_field_cron_accepted() {
        let spec: ScheduleSpec = "30 * * * * *".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let next = spec.next_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 30).unwrap());
    }

    #[test]
    fn test_every_intervals() {
        for (expr, expected) in [
            ("@every 1s", Duration::from_secs(1)),
            ("@every 500ms", Duration::from_millis(500)),
            ("@every 2m", Duration::from_secs(120)),
            ("@every 1h", Duration::from_secs(3600)),
        ] {
            match expr.parse::<ScheduleSpec>().unwrap() {
                ScheduleSpec::Every(interval) => assert_eq!(interval, expected, "{expr}"),
                other => panic!("{expr} parsed as {other:?}"),
            }
        }
    }

    #[test]
    fn test_every_next_after_is_relative() {
        let spec: ScheduleSpec = "@every 1s".parse().unwrap();
        let now = Utc::now();
        let next = spec.next_after(now).unwrap();
        assert_eq!(next - now, chrono::Duration::seconds(1));
    }

    #[test]
    fn test_invalid_schedules_rejected() {
        for expr in [
            "",
            "not cron",
            "@every",
            "@every fast",
            "@every 0s",
            "@every 5d",
            "* * *",
        ] {
            assert!(
                expr.parse::<ScheduleSpec>().is_err(),
                "'{expr}' should be rejected"
            );
        }
    }
}
