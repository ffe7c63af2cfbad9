//! Broker object naming
//!
//! Every broker object name is derived from a channel's `destination`
//! base string or a route's identity. These formats are part of the
//! external contract: producer and consumer applications bind to them.

/// AMQP delivery mode for transient messages.
pub const DELIVERY_MODE_TRANSIENT: u8 = 1;

/// AMQP delivery mode for persistent messages.
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// The durable fanout exchange of a channel.
pub fn durable_exchange(base: &str) -> String {
    format!("durable_exchange_for_{base}")
}

/// The durable queue of a channel, bound to its durable exchange.
pub fn durable_queue(base: &str) -> String {
    format!("durable_queue_for_{base}")
}

/// The per-route subscription queue used in fanout mode.
pub fn route_fanout_queue(route_name: &str, route_id: &str) -> String {
    format!("route_fanout_queue_for_{route_name}_{route_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_names_are_bit_exact() {
        assert_eq!(durable_exchange("q1"), "durable_exchange_for_q1");
        assert_eq!(durable_queue("q1"), "durable_queue_for_q1");
        assert_eq!(
            route_fanout_queue("orders", "ab12"),
            "route_fanout_queue_for_orders_ab12"
        );
    }
}
