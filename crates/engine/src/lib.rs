//! Mezzo - Messaging Engine
//!
//! The moving parts of the bus: a supervisor owning every worker's
//! lifetime, the three worker state machines (inbound forwarder,
//! outbound collector, route worker), the cron-driven collector
//! scheduler, and the boot reconciliation that brings broker topology
//! and workers in line with the configuration store.
//!
//! Workers never kill the process. Transient broker or store failures
//! requeue the in-flight message and back off; misconfiguration and
//! malformed payloads drop the message with a log line; a cancelled
//! worker exits at its next suspension point.

mod bootstrap;
mod error;
mod metrics;
mod scheduler;
mod supervisor;
mod workers;

pub use bootstrap::reconcile;
pub use error::{EngineError, Result};
pub use scheduler::{CollectorScheduler, ScheduleSpec};
pub use supervisor::Supervisor;
