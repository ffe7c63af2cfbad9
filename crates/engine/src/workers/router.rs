//! Route worker
//!
//! Consumes a route's source queue and republishes each message into
//! the destination channel's durable exchange, optionally piping the
//! body through a transformation script.
//!
//! The route and its references are re-fetched from the store for
//! every delivery, so admin edits apply to in-flight traffic without a
//! restart. Retry policy per delivery:
//!
//! - transient store/broker trouble → nack with requeue;
//! - missing destination, missing transformation, malformed JSON or a
//!   script failure → nack without requeue (dead-letter);
//! - script returns None → ack and drop (filtered).

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::BasicNackOptions;
use lapin::types::{AMQPValue, FieldTable};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use mezzo_broker::{names, Broker};
use mezzo_script::ScriptService;
use mezzo_store::{Store, ROUTE_TYPE_TRANSFORM};

use crate::error::EngineError;
use crate::metrics;

use super::{cancellable_sleep, FAILURE_BACKOFF};

/// Attempts to fetch the route row before giving up on a delivery.
const ROUTE_FETCH_ATTEMPTS: u32 = 3;

/// Gap between route fetch attempts; rides out a store blip.
const ROUTE_FETCH_GAP: Duration = Duration::from_millis(100);

/// Everything a route worker needs, cloned out of the supervisor.
pub(crate) struct RouterContext {
    pub broker: Arc<Broker>,
    pub store: Arc<Store>,
    pub scripts: Arc<ScriptService>,
    pub route_id: String,
    pub source_queue: String,
}

pub(crate) async fn run(ctx: RouterContext, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() {
            info!(route_id = %ctx.route_id, "router worker stopped");
            return;
        }

        match consume(&ctx, &cancel).await {
            Ok(()) => {
                info!(route_id = %ctx.route_id, "router worker stopped");
                return;
            }
            Err(e) => {
                error!(route_id = %ctx.route_id, error = %e, "router worker failed, restarting");
                metrics::error_recorded("router");
            }
        }

        if cancellable_sleep(FAILURE_BACKOFF, &cancel).await {
            info!(route_id = %ctx.route_id, "router worker stopped during backoff");
            return;
        }
    }
}

/// One consume session. Returns `Ok(())` only on cancellation.
async fn consume(ctx: &RouterContext, cancel: &CancellationToken) -> Result<(), EngineError> {
    let (_channel, mut consumer) = ctx
        .broker
        .consume(&ctx.source_queue, &format!("mezzo-router-{}", ctx.route_id))
        .await?;

    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            next = consumer.next() => match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(EngineError::ConsumerClosed {
                        queue: ctx.source_queue.clone(),
                    });
                }
            },
        };

        dispatch(ctx, delivery).await;
    }
}

/// Decide one delivery's fate: republish, requeue, dead-letter or drop.
async fn dispatch(ctx: &RouterContext, delivery: Delivery) {
    let route_id = ctx.route_id.as_str();

    // The route row may be mid-update; tolerate a momentary store blip
    // before requeueing.
    let mut route = None;
    for attempt in 1..=ROUTE_FETCH_ATTEMPTS {
        match ctx.store.routes().get_by_id(route_id).await {
            Ok(Some(found)) => {
                route = Some(found);
                break;
            }
            Ok(None) | Err(_) if attempt < ROUTE_FETCH_ATTEMPTS => {
                tokio::time::sleep(ROUTE_FETCH_GAP).await;
            }
            Ok(None) => {}
            Err(e) => error!(route_id, error = %e, "route fetch failed"),
        }
    }
    let Some(route) = route else {
        error!(route_id, "failed to get route after retries, requeueing");
        requeue(&delivery).await;
        return;
    };

    let Some(destination_id) = route.destination_channel_id.as_deref() else {
        error!(route_id, "route has no destination channel, dead-lettering");
        dead_letter(&delivery).await;
        return;
    };

    let destination = match ctx.store.channels().get_by_id(destination_id).await {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            error!(route_id, destination_id, "destination channel missing, requeueing");
            requeue(&delivery).await;
            return;
        }
        Err(e) => {
            error!(route_id, error = %e, "failed to get destination channel, requeueing");
            requeue(&delivery).await;
            return;
        }
    };

    let mut final_body = None;

    if route.route_type == ROUTE_TYPE_TRANSFORM {
        debug!(route_id, "applying transformation");

        let Some(transformation_id) = route.transformation_id.as_deref() else {
            error!(route_id, "transform route has no transformation, dead-lettering");
            dead_letter(&delivery).await;
            return;
        };

        let transformation = match ctx.store.transformations().get_by_id(transformation_id).await {
            Ok(Some(t)) => t,
            Ok(None) | Err(_) => {
                error!(route_id, transformation_id, "transformation unavailable, dead-lettering");
                dead_letter(&delivery).await;
                return;
            }
        };

        let body: Map<String, Value> = match serde_json::from_slice(&delivery.data) {
            Ok(body) => body,
            Err(e) => {
                error!(route_id, error = %e, "message body is not a JSON object, dead-lettering");
                dead_letter(&delivery).await;
                return;
            }
        };
        let headers = headers_to_map(delivery.properties.headers().as_ref());

        let output = match ctx
            .scripts
            .execute(&transformation.engine, &transformation.script, body, headers)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                error!(route_id, transformation_id, error = %e, "transformation failed, dead-lettering");
                dead_letter(&delivery).await;
                return;
            }
        };

        let Some(output) = output else {
            info!(route_id, transformation_id, "message filtered by transformation");
            ack(&delivery).await;
            return;
        };

        match serde_json::to_vec(&Value::Object(output.body)) {
            Ok(bytes) => final_body = Some(bytes),
            Err(e) => {
                error!(route_id, error = %e, "failed to serialize transformed body, dead-lettering");
                dead_letter(&delivery).await;
                return;
            }
        }
    }

    let exchange = names::durable_exchange(&destination.destination);
    let body = final_body.as_deref().unwrap_or(&delivery.data);

    match ctx
        .broker
        .republish_durable_with_body(&delivery, &exchange, body)
        .await
    {
        Ok(()) => {
            metrics::message_processed("router", &ctx.source_queue, &exchange);
            debug!(route_id, from = %ctx.source_queue, to = %exchange, "message routed");
            ack(&delivery).await;
        }
        Err(e) => {
            error!(route_id, error = %e, "failed to republish, requeueing");
            metrics::error_recorded("router");
            requeue(&delivery).await;
        }
    }
}

async fn ack(delivery: &Delivery) {
    if let Err(e) = delivery.ack(Default::default()).await {
        error!(error = %e, "ack failed");
    }
}

async fn requeue(delivery: &Delivery) {
    let _ = delivery
        .nack(BasicNackOptions {
            requeue: true,
            ..Default::default()
        })
        .await;
}

async fn dead_letter(delivery: &Delivery) {
    let _ = delivery.nack(BasicNackOptions::default()).await;
}

/// AMQP header table → script-facing JSON map.
fn headers_to_map(headers: Option<&FieldTable>) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(table) = headers {
        for (key, value) in table.inner() {
            map.insert(key.as_str().to_string(), amqp_value_to_json(value));
        }
    }
    map
}

/// Scalars map directly; anything the JSON tree can't carry is
/// stringified rather than dropped.
fn amqp_value_to_json(value: &AMQPValue) -> Value {
    match value {
        AMQPValue::Boolean(b) => Value::from(*b),
        AMQPValue::ShortShortInt(i) => Value::from(*i),
        AMQPValue::ShortShortUInt(i) => Value::from(*i),
        AMQPValue::ShortInt(i) => Value::from(*i),
        AMQPValue::ShortUInt(i) => Value::from(*i),
        AMQPValue::LongInt(i) => Value::from(*i),
        AMQPValue::LongUInt(i) => Value::from(*i),
        AMQPValue::LongLongInt(i) => Value::from(*i),
        AMQPValue::Float(f) => Value::from(f64::from(*f)),
        AMQPValue::Double(d) => Value::from(*d),
        AMQPValue::ShortString(s) => Value::from(s.as_str()),
        AMQPValue::LongString(s) => Value::from(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::Timestamp(t) => Value::from(*t),
        AMQPValue::Void => Value::Null,
        other => Value::from(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_to_map_scalars() {
        let mut table = FieldTable::default();
        table.insert("trace".into(), AMQPValue::LongString("abc-123".into()));
        table.insert("retries".into(), AMQPValue::LongInt(2));
        table.insert("urgent".into(), AMQPValue::Boolean(true));
        table.insert("score".into(), AMQPValue::Double(0.5));
        table.insert("nothing".into(), AMQPValue::Void);

        let map = headers_to_map(Some(&table));
        assert_eq!(map["trace"], Value::from("abc-123"));
        assert_eq!(map["retries"], Value::from(2));
        assert_eq!(map["urgent"], Value::from(true));
        assert_eq!(map["score"], Value::from(0.5));
        assert_eq!(map["nothing"], Value::Null);
    }

    #[test]
    fn test_headers_to_map_empty() {
        assert!(headers_to_map(None).is_empty());
        assert!(headers_to_map(Some(&FieldTable::default())).is_empty());
    }
}
