use crate::balancer::Balancer;
use crate::codec::{self, Event};
use crate::context::Context;
use crate::error::PublishError;
use crate::kafka::key::{Offset, Partition, Topic};
use crate::kafka::message::Record;
use crate::kafka::producer::IMessageWriter;
use crate::settings::{BalancerKind, Settings};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// Upper bound of a single publish call, retries included.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Publishes events to the producer topic. Cheap to share behind an `Arc`;
/// concurrent callers need no extra locking.
pub struct Publisher {
    writer: Arc<dyn IMessageWriter>,
    topic: Topic,
    balancer: Balancer,
    max_attempts: usize,
    timeout: Duration,
}

impl Publisher {
    pub fn new(writer: Arc<dyn IMessageWriter>, settings: &Settings) -> Self {
        let topic = settings.producer_topic.trim().to_string();
        let kind = settings.balancer();
        let partitions = match kind {
            BalancerKind::RoundRobin | BalancerKind::LeastBytes => writer.partition_count(&topic),
            BalancerKind::Crc32 | BalancerKind::Murmur2 => 0,
        };
        debug!(
            "Publisher for {} uses {:?} over {} partition(s).",
            topic, kind, partitions
        );
        Self {
            writer,
            topic,
            balancer: Balancer::new(kind, partitions),
            max_attempts: settings.max_attempts(),
            timeout: PUBLISH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Encodes and sends one event, returning where it landed.
    ///
    /// Transient send failures are retried up to the configured attempt
    /// count. Running out of time yields [`PublishError::Timeout`], which is
    /// transient: the caller decides whether to publish again.
    pub async fn publish<E: Event>(
        &self,
        ctx: &Context,
        event: &E,
    ) -> Result<(Partition, Offset), PublishError> {
        if event.partition_key().trim().is_empty() {
            return Err(PublishError::EmptyKey);
        }
        let mut record = codec::encode(event)?;
        record.partition = self.balancer.pick(record.payload.len());
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(PublishError::Canceled),
            sent = timeout(self.timeout, self.send(&record)) => match sent {
                Ok(result) => result,
                Err(_) => Err(PublishError::Timeout(self.timeout)),
            },
        }
    }

    async fn send(&self, record: &Record) -> Result<(Partition, Offset), PublishError> {
        let mut attempt = 1;
        loop {
            match self.writer.write(&self.topic, record).await {
                Ok(delivered) => return Ok(delivered),
                Err(e) => {
                    let e = PublishError::from_kafka(e);
                    if !e.is_transient() || attempt >= self.max_attempts {
                        return Err(e);
                    }
                    warn!(
                        "Publish attempt {}/{} to {} failed, retrying.({})",
                        attempt, self.max_attempts, self.topic, e
                    );
                    sleep(RETRY_BACKOFF * attempt as u32).await;
                    attempt += 1;
                }
            }
        }
    }

    pub fn close(&self) {
        self.writer.close();
    }
}
