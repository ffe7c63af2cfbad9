//! Worker state machines
//!
//! Each worker runs as its own tokio task under a cancellation token
//! handed out by the supervisor. Every sleep and every consume is
//! select!-interruptible, so cancellation latency is bounded by the
//! current broker round-trip.

pub(crate) mod inbound;
pub(crate) mod outbound;
pub(crate) mod router;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Backoff while a transient queue is missing or a durable queue is
/// empty.
pub(crate) const POLL_BACKOFF: Duration = Duration::from_secs(1);

/// Backoff after a broker-level failure before reopening.
pub(crate) const FAILURE_BACKOFF: Duration = Duration::from_secs(5);

/// Sleep that returns early (true) when the worker is cancelled.
pub(crate) async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
