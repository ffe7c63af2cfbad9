//! Outbound collector
//!
//! Consumes the transient queue a producer application writes to and
//! persists every message into the channel's durable exchange. Acks
//! only after the durable republish confirmed; republish failures
//! requeue.
//!
//! Like the inbound side, the transient queue is probed passively and
//! polled into existence rather than declared by the bus.

use std::sync::Arc;

use futures::StreamExt;
use lapin::options::BasicNackOptions;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use mezzo_broker::{names, Broker};

use crate::error::EngineError;
use crate::metrics;

use super::{cancellable_sleep, FAILURE_BACKOFF, POLL_BACKOFF};

pub(crate) async fn run(broker: Arc<Broker>, base: &str, cancel: CancellationToken) {
    let source_queue = base.to_string();
    let dest_exchange = names::durable_exchange(base);

    loop {
        if cancel.is_cancelled() {
            info!(base, "outbound collector stopped");
            return;
        }

        match consume(&broker, &source_queue, &dest_exchange, &cancel).await {
            Ok(()) => {
                info!(base, "outbound collector stopped");
                return;
            }
            Err(e) if e.is_queue_absent() => {
                if cancellable_sleep(POLL_BACKOFF, &cancel).await {
                    info!(base, "outbound collector stopped");
                    return;
                }
            }
            Err(e) => {
                error!(base, error = %e, "outbound collector failed, restarting");
                metrics::error_recorded("outbound");
                if cancellable_sleep(FAILURE_BACKOFF, &cancel).await {
                    info!(base, "outbound collector stopped");
                    return;
                }
            }
        }
    }
}

/// One consume session. Returns `Ok(())` only on cancellation.
async fn consume(
    broker: &Broker,
    source_queue: &str,
    dest_exchange: &str,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    broker.declare_queue_passive(source_queue).await?;

    let (_channel, mut consumer) = broker
        .consume(source_queue, &format!("mezzo-outbound-{source_queue}"))
        .await?;

    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            next = consumer.next() => match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(EngineError::ConsumerClosed {
                        queue: source_queue.to_string(),
                    });
                }
            },
        };

        debug!(source = source_queue, "collected message from transient queue");

        match broker.republish_durable(&delivery, dest_exchange).await {
            Ok(()) => {
                metrics::message_processed("outbound", source_queue, dest_exchange);
                let _ = delivery.ack(Default::default()).await;
            }
            Err(e) => {
                error!(error = %e, "failed to persist message, requeueing");
                metrics::error_recorded("outbound");
                let _ = delivery
                    .nack(BasicNackOptions {
                        requeue: true,
                        ..Default::default()
                    })
                    .await;
            }
        }
    }
}
