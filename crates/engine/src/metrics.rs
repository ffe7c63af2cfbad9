//! Worker metrics
//!
//! Thin wrappers over the `metrics` facade so call sites stay terse and
//! the series names live in one place. The binary installs the
//! Prometheus recorder; without one these are no-ops.

use metrics::{counter, gauge};

/// `mezzo_messages_processed_total{worker_type, source, destination}`
pub(crate) fn message_processed(worker_type: &'static str, source: &str, destination: &str) {
    counter!(
        "mezzo_messages_processed_total",
        "worker_type" => worker_type,
        "source" => source.to_string(),
        "destination" => destination.to_string()
    )
    .increment(1);
}

/// `mezzo_errors_total{worker_type}`
pub(crate) fn error_recorded(worker_type: &'static str) {
    counter!("mezzo_errors_total", "worker_type" => worker_type).increment(1);
}

/// RAII guard for `mezzo_active_workers{worker_type}`.
///
/// Created when a worker task starts; the gauge drops with the task,
/// however the task exits.
pub(crate) struct ActiveWorker {
    worker_type: &'static str,
}

impl ActiveWorker {
    pub(crate) fn new(worker_type: &'static str) -> Self {
        gauge!("mezzo_active_workers", "worker_type" => worker_type).increment(1.0);
        Self { worker_type }
    }
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        gauge!("mezzo_active_workers", "worker_type" => self.worker_type).decrement(1.0);
    }
}
