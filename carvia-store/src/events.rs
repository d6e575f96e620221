use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

use carvia_domain::error::LedgerError;
use carvia_domain::repository::{BookingEvent, BookingNotifier};

#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer })
    }

    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(Duration::from_secs(0)))
            .await
        {
            Ok(delivery) => {
                info!(
                    "Sent message to {}/{}: partition {} offset {}",
                    topic, key, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

/// Kafka-backed booking notifier. Downstream consumers (the notification
/// service) deliver the actual emails; the ledger only publishes the event.
pub struct KafkaNotifier {
    producer: EventProducer,
}

impl KafkaNotifier {
    pub fn new(producer: EventProducer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl BookingNotifier for KafkaNotifier {
    async fn notify(&self, event: BookingEvent) -> Result<(), LedgerError> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| LedgerError::internal(e.to_string()))?;
        self.producer
            .publish(event.kind.topic(), &event.booking_id.to_string(), &payload)
            .await
            .map_err(|e| LedgerError::internal(e.to_string()))
    }
}
