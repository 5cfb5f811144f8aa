use crate::codec::{self, Event, TypeFilter};
use crate::context::Context;
use crate::error::DecodeError;
use crate::kafka::consumer::{Fetch, IMessageReader};
use crate::kafka::key::{token, CommitToken, Partition, Topic};
use crate::kafka::message::{Message, Record};
use crate::kafka::producer::IMessageWriter;
use crate::macros::selector;
use crate::policy::{Fetched, IBatchPolicy};
use crate::publisher::PUBLISH_TIMEOUT;
use chrono::Utc;
use log::{debug, error, warn};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

/// Pause taken after an unexpected fetch failure before the tick ends.
pub const FETCH_ERROR_BACKOFF: Duration = Duration::from_millis(50);

pub const DLQ_REASON_HEADER: &str = "dlq-reason";
pub const DLQ_SOURCE_PARTITION_HEADER: &str = "dlq-source-partition";
pub const DLQ_SOURCE_OFFSET_HEADER: &str = "dlq-source-offset";

selector! {
    /// What happens to a message whose payload cannot be decoded.
    pub enum PoisonPolicy {
        /// Log it and commit past it.
        Drop = "drop" ["drop", "skip"],
        /// Copy it to the dead-letter topic, then commit past it.
        DeadLetter = "dead-letter" ["dead-letter", "deadletter", "dlq"],
    }
    default = Drop;
}

/// A decoded payload paired with the token that acknowledges it.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchItem<T> {
    payload: T,
    token: CommitToken,
}

impl<T> BatchItem<T> {
    pub(crate) fn new(payload: T, token: CommitToken) -> Self {
        Self { payload, token }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn token(&self) -> CommitToken {
        self.token
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Held {
    /// Filtered or dropped; counts as processed once everything before it is.
    Skipped,
    /// Could not be set aside; its partition must stop here.
    Failed,
}

/// A message kept out of the items but still part of the batch's commit
/// order. `position` is the number of items that arrived before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HeldMessage {
    pub(crate) position: usize,
    pub(crate) token: CommitToken,
    pub(crate) held: Held,
}

/// One tick's worth of items, in arrival order.
#[derive(Debug)]
pub struct Batch<T> {
    items: Vec<BatchItem<T>>,
    held: Vec<HeldMessage>,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<T> Batch<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            held: vec![],
        }
    }

    pub fn items(&self) -> &[BatchItem<T>] {
        &self.items
    }

    pub fn into_items(self) -> Vec<BatchItem<T>> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn held(&self) -> &[HeldMessage] {
        &self.held
    }

    pub(crate) fn push(&mut self, item: BatchItem<T>) {
        self.items.push(item);
    }

    pub(crate) fn hold(&mut self, token: CommitToken, held: Held) {
        self.held.push(HeldMessage {
            position: self.items.len(),
            token,
            held,
        });
    }

    fn has_partition(&self, partition: Partition) -> bool {
        self.items.iter().any(|i| i.token.partition() == partition)
            || self.held.iter().any(|h| h.token.partition() == partition)
    }
}

impl<T> From<Vec<BatchItem<T>>> for Batch<T> {
    fn from(items: Vec<BatchItem<T>>) -> Self {
        Self { items, held: vec![] }
    }
}

/// Drains the reader into batches, one per tick.
pub struct BatchAssembler<T> {
    reader: Arc<dyn IMessageReader>,
    policy: Box<dyn IBatchPolicy>,
    filter: TypeFilter,
    poison: PoisonPolicy,
    dead_letter: Option<(Arc<dyn IMessageWriter>, Topic)>,
    _event: PhantomData<fn() -> T>,
}

impl<T: Event> BatchAssembler<T> {
    pub fn new(reader: Arc<dyn IMessageReader>, policy: impl IBatchPolicy + 'static) -> Self {
        Self {
            reader,
            policy: Box::new(policy),
            filter: TypeFilter::default(),
            poison: PoisonPolicy::default(),
            dead_letter: None,
            _event: PhantomData,
        }
    }

    pub fn type_filter(mut self, filter: TypeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Routes undecodable messages to `topic` instead of dropping them.
    pub fn dead_letter(mut self, writer: Arc<dyn IMessageWriter>, topic: &str) -> Self {
        self.poison = PoisonPolicy::DeadLetter;
        self.dead_letter = Some((writer, topic.to_string()));
        self
    }

    pub fn policy(&self) -> &dyn IBatchPolicy {
        self.policy.as_ref()
    }

    pub fn reader(&self) -> &Arc<dyn IMessageReader> {
        &self.reader
    }

    /// Collects items until the policy is exhausted.
    ///
    /// Only the first fetch may wait, up to `first_wait`; later fetches take
    /// what is already available. The tick ends early on an empty fetch,
    /// cancellation, end of stream or a fetch error. Never fails: whatever
    /// was collected is returned.
    pub async fn poll_batch(&mut self, ctx: &Context, first_wait: Duration) -> Batch<T> {
        let mut batch = Batch::with_capacity(self.policy.capacity());
        self.policy.start_tick();
        let mut deadline = Some(Instant::now() + first_wait);
        while !self.policy.exhausted() {
            let message = match self.reader.fetch(ctx, deadline).await {
                Ok(Fetch::Message(message)) => message,
                Ok(Fetch::Empty) | Ok(Fetch::Cancelled) | Ok(Fetch::EndOfStream) => break,
                Err(e) => {
                    warn!("Kafka fetch failed, ending this tick.({})", e);
                    sleep(FETCH_ERROR_BACKOFF).await;
                    break;
                }
            };
            deadline = None;

            if !self.filter.accepts(&message, T::EVENT_TYPE) {
                debug!(
                    "Skipping non-{} message.(partition={}, offset={})",
                    T::EVENT_TYPE,
                    message.partition(),
                    message.offset()
                );
                self.skip(&mut batch, &message).await;
                self.policy.record(Fetched::Skipped);
                continue;
            }

            match codec::decode::<T>(&message) {
                Ok(payload) => {
                    batch.push(BatchItem::new(payload, token!(message)));
                    self.policy.record(Fetched::Item);
                }
                Err(e) => {
                    error!(
                        "Failed to decode message, skipping it.(partition={}, offset={}, error={})",
                        message.partition(),
                        message.offset(),
                        e
                    );
                    self.discard_poison(&mut batch, &message, &e).await;
                    self.policy.record(Fetched::Skipped);
                }
            }
        }
        batch
    }

    /// Acknowledges a message that will not reach the handler. The commit
    /// is deferred to the coordinator when an earlier item of the same
    /// partition is still pending, so it cannot jump that item.
    async fn skip(&self, batch: &mut Batch<T>, message: &Message) {
        let token = token!(message);
        if batch.has_partition(token.partition()) {
            batch.hold(token, Held::Skipped);
            return;
        }
        if let Err(e) = self.reader.commit(&[token]).await {
            warn!(
                "Failed to commit skipped message.(partition={}, offset={}, error={})",
                token.partition(),
                token.offset(),
                e
            );
        }
    }

    async fn discard_poison(&self, batch: &mut Batch<T>, message: &Message, e: &DecodeError) {
        if let (PoisonPolicy::DeadLetter, Some((writer, topic))) = (self.poison, &self.dead_letter) {
            let record = dead_letter_record(message, e);
            let written = match timeout(PUBLISH_TIMEOUT, writer.write(topic, &record)).await {
                Ok(written) => written.map_err(|e| e.to_string()),
                Err(_) => Err("timed out".to_string()),
            };
            if let Err(reason) = written {
                error!(
                    "Failed to dead-letter message to {}, holding its partition.(partition={}, offset={}, error={})",
                    topic,
                    message.partition(),
                    message.offset(),
                    reason
                );
                batch.hold(token!(message), Held::Failed);
                return;
            }
        }
        self.skip(batch, message).await;
    }
}

fn dead_letter_record(message: &Message, e: &DecodeError) -> Record {
    let mut headers = message.headers();
    headers.push((DLQ_REASON_HEADER.to_string(), e.to_string().into_bytes()));
    headers.push((
        DLQ_SOURCE_PARTITION_HEADER.to_string(),
        message.partition().to_string().into_bytes(),
    ));
    headers.push((
        DLQ_SOURCE_OFFSET_HEADER.to_string(),
        message.offset().to_string().into_bytes(),
    ));
    Record {
        key: message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned())
            .unwrap_or_default(),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        timestamp: Utc::now(),
        headers,
        partition: None,
    }
}
