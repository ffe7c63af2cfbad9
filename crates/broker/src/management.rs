//! Broker management HTTP API
//!
//! Used only by the reconciliation surface to compare broker state with
//! the configuration store. Failures surface as errors; nothing in the
//! message path depends on this client.

use serde::Deserialize;

use mezzo_config::RabbitMqConfig;

use crate::error::{BrokerError, Result};

/// A queue as reported by the management API.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueInfo {
    pub name: String,
    pub vhost: String,
    pub durable: bool,
}

/// Client for the broker's management HTTP API.
pub struct ManagementClient {
    base_url: String,
    user: String,
    pass: String,
    client: reqwest::Client,
}

impl ManagementClient {
    /// Create a client from broker config.
    pub fn new(config: &RabbitMqConfig) -> Self {
        Self {
            base_url: config.management_dsn.trim_end_matches('/').to_string(),
            user: config.management_user.clone(),
            pass: config.management_pass.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// List all queues on the broker.
    pub async fn list_queues(&self) -> Result<Vec<QueueInfo>> {
        let url = format!("{}/api/queues", self.base_url);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.user, Some(&self.pass))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BrokerError::Management(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for ManagementClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_info_deserializes_management_payload() {
        // The API returns far more fields than we model; they must be
        // ignored without error.
        let payload = r#"[
            {"name": "durable_queue_for_q1", "vhost": "/", "durable": true, "messages": 3,
             "state": "running"},
            {"name": "q1", "vhost": "/", "durable": false}
        ]"#;

        let queues: Vec<QueueInfo> = serde_json::from_str(payload).unwrap();
        assert_eq!(queues.len(), 2);
        assert_eq!(queues[0].name, "durable_queue_for_q1");
        assert!(queues[0].durable);
        assert!(!queues[1].durable);
    }

    #[test]
    fn test_base_url_trailing_slash_normalized() {
        let config = RabbitMqConfig {
            management_dsn: "http://localhost:15672/".into(),
            ..RabbitMqConfig::default()
        };
        let client = ManagementClient::new(&config);
        assert_eq!(client.base_url, "http://localhost:15672");
    }
}
