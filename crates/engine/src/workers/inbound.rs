//! Inbound forwarder
//!
//! Moves messages from a channel's durable queue to the transient
//! queue its consumer application listens on. The transient queue is
//! only ever probed passively: until the consumer declares it, every
//! cycle parks for a second and tries again — that is the normal
//! startup sequence, not an error.
//!
//! A message is never acked on the durable queue until the transient
//! publish succeeded, so a crash between the two redelivers.

use std::sync::Arc;

use lapin::options::{BasicGetOptions, BasicNackOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use mezzo_broker::{names, Broker, BrokerError};

use crate::metrics;

use super::{cancellable_sleep, FAILURE_BACKOFF, POLL_BACKOFF};

enum Outcome {
    Forwarded,
    Empty,
}

pub(crate) async fn run(broker: Arc<Broker>, base: &str, cancel: CancellationToken) {
    let source_queue = names::durable_queue(base);
    let dest_queue = base.to_string();

    loop {
        if cancellable_sleep(POLL_BACKOFF, &cancel).await {
            info!(base, "inbound forwarder stopped");
            return;
        }

        match forward_one(&broker, &source_queue, &dest_queue).await {
            Ok(Outcome::Forwarded) => {
                metrics::message_processed("inbound", &source_queue, &dest_queue);
                debug!(from = %source_queue, to = %dest_queue, "message forwarded");
            }
            Ok(Outcome::Empty) => {}
            Err(BrokerError::QueueAbsent { .. }) => {
                // Consumer hasn't declared its queue yet.
            }
            Err(e) => {
                error!(base, error = %e, "inbound forwarder error");
                metrics::error_recorded("inbound");
                if cancellable_sleep(FAILURE_BACKOFF, &cancel).await {
                    info!(base, "inbound forwarder stopped");
                    return;
                }
            }
        }
    }
}

/// One forward cycle on a fresh channel: probe the destination, pull
/// one message, publish it transient, then settle the source.
async fn forward_one(
    broker: &Broker,
    source_queue: &str,
    dest_queue: &str,
) -> Result<Outcome, BrokerError> {
    let ch = broker.channel().await?;

    ch.queue_declare(
        dest_queue,
        QueueDeclareOptions {
            passive: true,
            ..Default::default()
        },
        FieldTable::default(),
    )
    .await
    .map_err(|_| BrokerError::QueueAbsent {
        queue: dest_queue.to_string(),
    })?;

    let message = match ch
        .basic_get(source_queue, BasicGetOptions { no_ack: false })
        .await?
    {
        Some(message) => message,
        None => return Ok(Outcome::Empty),
    };
    let delivery = message.delivery;

    match broker.forward_transient(&delivery, dest_queue).await {
        Ok(()) => {
            delivery.ack(Default::default()).await?;
            Ok(Outcome::Forwarded)
        }
        Err(e) => {
            error!(error = %e, "failed to forward message, requeueing");
            let _ = delivery
                .nack(BasicNackOptions {
                    requeue: true,
                    ..Default::default()
                })
                .await;
            Err(e)
        }
    }
}
