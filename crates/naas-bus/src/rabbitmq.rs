//! RabbitMQ realization of the bus: every subject is a topic-exchange
//! routing key; queues are declared per-consumer and bound to the subject
//! they read.

use crate::{subjects, BusPublisher, DeadLetter};
use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    ExchangeKind,
};
use naas_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// RabbitMQ connection and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RabbitMqConfig {
    /// AMQP connection URL.
    pub url: String,
    /// Topic exchange every subject is published/bound through.
    pub exchange: String,
    /// Max publish attempts before dead-lettering (spec §7, default 5).
    pub max_attempts: u32,
    /// Initial retry delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Backoff multiplier applied between attempts.
    pub backoff_multiplier: f64,
    /// Maximum retry delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            exchange: "naas.events".to_string(),
            max_attempts: 5,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30000,
        }
    }
}

/// Bus client backed by a single RabbitMQ channel over a topic exchange.
#[derive(Debug)]
pub struct RabbitMqBusClient {
    channel: Arc<Channel>,
    config: RabbitMqConfig,
}

impl RabbitMqBusClient {
    /// Connect and declare the shared topic exchange.
    pub async fn new(config: RabbitMqConfig) -> Result<Self> {
        info!("connecting to bus at {}", config.url);

        let connection = Connection::connect(
            &config.url,
            ConnectionProperties::default()
                .with_connection_name("naas-bus".into())
                .with_executor(tokio_executor_trait::Tokio::current())
                .with_reactor(tokio_reactor_trait::Tokio),
        )
        .await
        .map_err(|e| Error::connection(format!("failed to connect to bus: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| Error::connection(format!("failed to create channel: {e}")))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::connection(format!("failed to declare exchange: {e}")))?;

        info!("bus connected, exchange '{}' declared", config.exchange);

        Ok(Self {
            channel: Arc::new(channel),
            config,
        })
    }

    /// Declare a durable queue bound to `subject` and return a consumer.
    ///
    /// Each bound queue gets its own consumer tag so multiple services can
    /// subscribe to the same subject independently (spec §5: ordering is
    /// per-partition within one service, not across subscribers).
    pub async fn subscribe(&self, subject: &str, consumer_tag: &str) -> Result<lapin::Consumer> {
        let queue_name = format!("{subject}.{consumer_tag}");

        self.channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::connection(format!("failed to declare queue {queue_name}: {e}")))?;

        self.channel
            .queue_bind(
                &queue_name,
                &self.config.exchange,
                subject,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::connection(format!("failed to bind queue {queue_name}: {e}")))?;

        let consumer = self
            .channel
            .basic_consume(
                &queue_name,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::connection(format!("failed to consume from {queue_name}: {e}")))?;

        Ok(consumer)
    }

    async fn publish_with_retry(&self, subject: &str, payload: &[u8]) -> Result<()> {
        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into())
            .with_timestamp(chrono::Utc::now().timestamp() as u64);

        let mut attempt = 0;
        let mut delay = self.config.initial_delay_ms;

        loop {
            attempt += 1;

            match self
                .channel
                .basic_publish(
                    &self.config.exchange,
                    subject,
                    BasicPublishOptions::default(),
                    payload,
                    properties.clone(),
                )
                .await
            {
                Ok(_) => {
                    debug!(subject, attempt, "published to bus");
                    metrics::counter!("bus_publishes_total", "subject" => subject.to_string())
                        .increment(1);
                    if attempt > 1 {
                        metrics::counter!("bus_publish_retries_total").increment(1);
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.config.max_attempts {
                        error!(subject, attempts = attempt, error = %e, "bus publish exhausted retries");
                        return Err(Error::bus_transient(format!(
                            "failed to publish to {subject} after {attempt} attempts: {e}"
                        )));
                    }

                    warn!(subject, attempt, delay_ms = delay, error = %e, "bus publish failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay = ((delay as f64) * self.config.backoff_multiplier) as u64;
                    delay = delay.min(self.config.max_delay_ms);
                }
            }
        }
    }
}

#[async_trait]
impl BusPublisher for RabbitMqBusClient {
    async fn publish(&self, subject: &str, payload: &[u8]) -> Result<()> {
        self.publish_with_retry(subject, payload).await
    }

    async fn publish_deadletter(
        &self,
        subject: &str,
        reason: &str,
        original: serde_json::Value,
    ) -> Result<()> {
        let dead_letter = DeadLetter { reason, original };
        let payload = serde_json::to_vec(&dead_letter).map_err(Error::Serialization)?;
        let deadletter_subject = subjects::deadletter_for(subject);
        self.publish_with_retry(&deadletter_subject, &payload).await
    }

    async fn health_check(&self) -> Result<()> {
        if !self.channel.status().connected() {
            return Err(Error::connection("bus channel is not connected"));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "rabbitmq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_retry_budget() {
        let config = RabbitMqConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.exchange, "naas.events");
    }

    #[test]
    fn deadletter_subject_naming() {
        assert_eq!(
            subjects::deadletter_for(subjects::ANOMALY_DETECTED),
            "deadletter.anomaly.detected"
        );
    }
}
