use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message,
};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Connection settings for one topic subscription.
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    pub hosts: String,
    pub topic: String,
    pub consumer_group: String,
    pub offset_reset: String,
    pub tls: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RecvErr {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("received empty payload")]
    Empty,
}

/// A consumer subscribed to a single topic carrying JSON records of one
/// schema. Delivery is at-least-once: offsets are committed automatically,
/// so redelivered records are possible and the sink must stay idempotent.
pub struct SingleTopicConsumer {
    consumer: StreamConsumer,
    topic: String,
}

impl SingleTopicConsumer {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.hosts)
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.offset_reset)
            .set("enable.auto.commit", "true");

        if config.tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[config.topic.as_str()])?;

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next record and deserialize it. Undeserializable or
    /// empty payloads surface as errors so the caller can log and skip
    /// them without stalling the partition.
    pub async fn json_recv<T>(&self) -> Result<T, RecvErr>
    where
        T: DeserializeOwned,
    {
        let message = self.consumer.recv().await?;
        let payload = message.payload().ok_or(RecvErr::Empty)?;
        Ok(serde_json::from_slice(payload)?)
    }
}
