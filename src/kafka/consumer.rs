use crate::context::Context;
use crate::kafka::key::{CommitToken, Topic};
use crate::kafka::message::Message;
use crate::settings::Settings;
use async_trait::async_trait;
use log::{debug, info};
use rdkafka::consumer::stream_consumer::StreamConsumer as BaseStreamConsumer;
use rdkafka::consumer::{CommitMode, Consumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::{Offset, TopicPartitionList};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task;
use tokio::time::{timeout_at, Instant};

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a single fetch attempt.
#[derive(Debug)]
pub enum Fetch {
    Message(Message),
    /// Nothing arrived before the deadline.
    Empty,
    Cancelled,
    EndOfStream,
}

/// Reads one subscribed topic under a consumer-group identity.
#[async_trait]
pub trait IMessageReader: 'static + Send + Sync {
    /// Waits for one message until `deadline`. Without a deadline only an
    /// already available message is returned.
    async fn fetch(&self, ctx: &Context, deadline: Option<Instant>) -> KafkaResult<Fetch>;
    /// Commits the position following each token in one call.
    async fn commit(&self, tokens: &[CommitToken]) -> KafkaResult<()>;
    /// Moves each token's partition back to the token, so it is fetched again.
    async fn rewind(&self, tokens: &[CommitToken]) -> KafkaResult<()>;
    /// Releases the subscription and the client. Repeated calls are no-ops.
    fn close(&self);
}

/// `close` takes the client out, so it is dropped once the last in-flight
/// call holding a clone finishes.
pub struct KafkaReader {
    base_consumer: Mutex<Option<Arc<BaseStreamConsumer>>>,
    topic: Topic,
}

impl KafkaReader {
    pub fn new(settings: &Settings) -> KafkaResult<Self> {
        let base_consumer: BaseStreamConsumer =
            super::config::consumer_config(settings).create()?;
        let topic = settings.consumer_topic.trim().to_string();
        base_consumer.subscribe(&[topic.as_str()])?;
        info!(
            "Subscribed to topic {} as group {}.",
            topic, settings.group_id
        );
        Ok(Self {
            base_consumer: Mutex::new(Some(Arc::new(base_consumer))),
            topic,
        })
    }

    /// The live client, or `None` after `close`.
    fn consumer(&self) -> Option<Arc<BaseStreamConsumer>> {
        self.base_consumer.lock().ok().and_then(|c| c.clone())
    }

    fn commit_list(&self, tokens: &[CommitToken]) -> KafkaResult<TopicPartitionList> {
        let mut tpl = TopicPartitionList::with_capacity(tokens.len());
        for token in tokens {
            tpl.add_partition_offset(
                &self.topic,
                token.partition(),
                Offset::Offset(token.offset() + 1),
            )?;
        }
        Ok(tpl)
    }
}

fn join_error(e: task::JoinError) -> KafkaError {
    debug!("Blocking kafka call did not complete.({})", e);
    KafkaError::Canceled
}

#[async_trait]
impl IMessageReader for KafkaReader {
    async fn fetch(&self, ctx: &Context, deadline: Option<Instant>) -> KafkaResult<Fetch> {
        let consumer = match self.consumer() {
            Some(consumer) => consumer,
            None => return Ok(Fetch::Cancelled),
        };
        let deadline = deadline.unwrap_or_else(Instant::now);
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Ok(Fetch::Cancelled),
            received = timeout_at(deadline, consumer.recv()) => match received {
                Err(_) => Ok(Fetch::Empty),
                Ok(Ok(msg)) => Ok(Fetch::Message(Message::new(msg.detach()))),
                Ok(Err(KafkaError::PartitionEOF(_))) => Ok(Fetch::EndOfStream),
                Ok(Err(e)) => Err(e),
            },
        }
    }

    async fn commit(&self, tokens: &[CommitToken]) -> KafkaResult<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        let consumer = self.consumer().ok_or(KafkaError::Canceled)?;
        let tpl = self.commit_list(tokens)?;
        task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(join_error)?
    }

    async fn rewind(&self, tokens: &[CommitToken]) -> KafkaResult<()> {
        let base_consumer = self.consumer().ok_or(KafkaError::Canceled)?;
        for token in tokens {
            let consumer = base_consumer.clone();
            let topic = self.topic.clone();
            let token = *token;
            task::spawn_blocking(move || {
                consumer.seek(
                    &topic,
                    token.partition(),
                    Offset::Offset(token.offset()),
                    SEEK_TIMEOUT,
                )
            })
            .await
            .map_err(join_error)??;
        }
        Ok(())
    }

    fn close(&self) {
        let consumer = match self.base_consumer.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(consumer) = consumer {
            consumer.unsubscribe();
            info!("Unsubscribed from topic {}.", self.topic);
        }
    }
}
