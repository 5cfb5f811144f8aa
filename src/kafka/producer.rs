use crate::kafka::key::{Offset, Partition};
use crate::kafka::message::Record;
use crate::settings::Settings;
use async_trait::async_trait;
use log::{error, info, warn};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::sync::Mutex;
use std::time::Duration;

const METADATA_TIMEOUT: Duration = Duration::from_secs(15);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes records to a topic. Safe to share between concurrent publishers.
#[async_trait]
pub trait IMessageWriter: 'static + Send + Sync {
    async fn write(&self, topic: &str, record: &Record) -> KafkaResult<(Partition, Offset)>;
    /// Number of partitions of `topic`, or zero if unknown.
    fn partition_count(&self, topic: &str) -> usize;
    /// Flushes buffered records and releases the connection. Repeated calls are no-ops.
    fn close(&self);
}

pub struct KafkaWriter {
    producer: Mutex<Option<FutureProducer>>,
}

impl KafkaWriter {
    /// Creates the producer and pings the brokers by requesting metadata
    /// for the producer topic.
    pub fn new(settings: &Settings) -> KafkaResult<Self> {
        let producer: FutureProducer = super::config::producer_config(settings).create()?;
        match producer
            .client()
            .fetch_metadata(Some(&settings.producer_topic), METADATA_TIMEOUT)
        {
            Ok(metadata) => {
                info!(
                    "Connected to kafka brokers. Found {} topic(s) for {}.",
                    metadata.topics().len(),
                    settings.producer_topic
                );
            }
            Err(e) => {
                error!("Failed to fetch metadata from kafka brokers.({})", e);
                return Err(e);
            }
        }
        Ok(Self {
            producer: Mutex::new(Some(producer)),
        })
    }

    /// A handle on the live producer, or `None` after `close`.
    fn producer(&self) -> Option<FutureProducer> {
        self.producer.lock().ok().and_then(|p| p.clone())
    }
}

#[async_trait]
impl IMessageWriter for KafkaWriter {
    async fn write(&self, topic: &str, record: &Record) -> KafkaResult<(Partition, Offset)> {
        let producer = self.producer().ok_or(KafkaError::Canceled)?;
        let mut future_record = FutureRecord::to(topic)
            .key(record.key.as_str())
            .payload(record.payload.as_slice())
            .timestamp(record.timestamp.timestamp_millis())
            .headers(record.owned_headers());
        if let Some(partition) = record.partition {
            future_record = future_record.partition(partition);
        }
        producer
            .send(future_record, Timeout::Never)
            .await
            .map_err(|(e, _)| e)
    }

    fn partition_count(&self, topic: &str) -> usize {
        let producer = match self.producer() {
            Some(producer) => producer,
            None => return 0,
        };
        match producer
            .client()
            .fetch_metadata(Some(topic), METADATA_TIMEOUT)
        {
            Ok(metadata) => metadata
                .topics()
                .iter()
                .find(|t| t.name() == topic)
                .map_or(0, |t| t.partitions().len()),
            Err(e) => {
                warn!("Failed to read partitions of {}.({})", topic, e);
                0
            }
        }
    }

    fn close(&self) {
        let producer = match self.producer.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(producer) = producer {
            producer.flush(FLUSH_TIMEOUT);
            info!("Producer flushed and closed.");
        }
    }
}
