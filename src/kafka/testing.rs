//! In-memory broker standing in for both the reader and the writer.
use crate::codec::{self, Event};
use crate::context::Context;
use crate::kafka::consumer::{Fetch, IMessageReader};
use crate::kafka::key::{CommitToken, Offset, Partition, Topic};
use crate::kafka::message::{Message, Record};
use crate::kafka::producer::IMessageWriter;
use async_trait::async_trait;
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::{OwnedHeaders, OwnedMessage};
use rdkafka::Timestamp;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};

#[derive(Default)]
struct State {
    log: HashMap<Partition, Vec<Message>>,
    queue: VecDeque<Message>,
    commits: Vec<Vec<CommitToken>>,
    rewinds: Vec<CommitToken>,
    foreign: HashMap<Topic, Vec<Record>>,
    fetch_errors: VecDeque<KafkaError>,
    write_errors: VecDeque<KafkaError>,
    commit_errors: VecDeque<KafkaError>,
    rewind_errors: VecDeque<KafkaError>,
    write_delay: Option<Duration>,
    end_of_stream: bool,
    reader_closes: usize,
    writer_closes: usize,
}

pub struct MemoryBroker {
    topic: Topic,
    partitions: usize,
    state: Mutex<State>,
}

impl MemoryBroker {
    pub fn new(topic: &str, partitions: usize) -> Self {
        Self {
            topic: topic.to_string(),
            partitions,
            state: Mutex::new(State::default()),
        }
    }

    /// Appends a raw message to `partition` and returns its offset.
    pub fn push(&self, partition: Partition, payload: &[u8], headers: &[(&str, &str)]) -> Offset {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect::<Vec<_>>();
        self.append(partition, None, payload.to_vec(), &headers)
    }

    /// Appends an encoded event to `partition` and returns its offset.
    pub fn push_event<E: Event>(&self, partition: Partition, event: &E) -> Offset {
        let record = codec::encode(event).unwrap();
        self.append(
            partition,
            Some(record.key.into_bytes()),
            record.payload,
            &record.headers,
        )
    }

    fn append(
        &self,
        partition: Partition,
        key: Option<Vec<u8>>,
        payload: Vec<u8>,
        headers: &[(String, Vec<u8>)],
    ) -> Offset {
        let mut state = self.state.lock().unwrap();
        let log = state.log.entry(partition).or_default();
        let offset = log.len() as Offset;
        let owned_headers = headers
            .iter()
            .fold(OwnedHeaders::new(), |h, (k, v)| h.add(k.as_str(), v.as_slice()));
        let message = Message::new(OwnedMessage::new(
            Some(payload),
            key,
            self.topic.clone(),
            Timestamp::CreateTime(0),
            partition,
            offset,
            Some(owned_headers),
        ));
        log.push(message.clone());
        state.queue.push_back(message);
        offset
    }

    /// Every commit call, in order, with the tokens it carried.
    pub fn commits(&self) -> Vec<Vec<CommitToken>> {
        self.state.lock().unwrap().commits.clone()
    }

    /// Committed consumer position of `partition`, i.e. the next offset to read.
    pub fn committed(&self, partition: Partition) -> Option<Offset> {
        let state = self.state.lock().unwrap();
        state
            .commits
            .iter()
            .flatten()
            .filter(|t| t.partition() == partition)
            .last()
            .map(|t| t.offset() + 1)
    }

    pub fn rewinds(&self) -> Vec<CommitToken> {
        self.state.lock().unwrap().rewinds.clone()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn foreign_records(&self, topic: &str) -> Vec<Record> {
        let state = self.state.lock().unwrap();
        state.foreign.get(topic).cloned().unwrap_or_default()
    }

    pub fn partition_log(&self, partition: Partition) -> Vec<Message> {
        let state = self.state.lock().unwrap();
        state.log.get(&partition).cloned().unwrap_or_default()
    }

    pub fn fail_next_fetch(&self, e: KafkaError) {
        self.state.lock().unwrap().fetch_errors.push_back(e);
    }

    pub fn fail_next_write(&self, e: KafkaError) {
        self.state.lock().unwrap().write_errors.push_back(e);
    }

    pub fn fail_next_commit(&self, e: KafkaError) {
        self.state.lock().unwrap().commit_errors.push_back(e);
    }

    /// The next rewind fails and leaves the queue untouched.
    pub fn fail_next_rewind(&self, e: KafkaError) {
        self.state.lock().unwrap().rewind_errors.push_back(e);
    }

    pub fn delay_writes(&self, delay: Duration) {
        self.state.lock().unwrap().write_delay = Some(delay);
    }

    /// Report end-of-stream instead of waiting once the queue is drained.
    pub fn end_of_stream(&self) {
        self.state.lock().unwrap().end_of_stream = true;
    }

    pub fn close_calls(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap();
        (state.reader_closes, state.writer_closes)
    }

    fn key_partition(&self, key: &str) -> Partition {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.max(1) as u64) as Partition
    }
}

#[async_trait]
impl IMessageReader for MemoryBroker {
    async fn fetch(&self, ctx: &Context, deadline: Option<Instant>) -> KafkaResult<Fetch> {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(e) = state.fetch_errors.pop_front() {
                return Err(e);
            }
            if state.reader_closes > 0 {
                return Ok(Fetch::Cancelled);
            }
            if let Some(message) = state.queue.pop_front() {
                return Ok(Fetch::Message(message));
            }
            if state.end_of_stream {
                return Ok(Fetch::EndOfStream);
            }
        }
        match deadline {
            None => Ok(Fetch::Empty),
            Some(deadline) => {
                tokio::select! {
                    _ = ctx.cancelled() => Ok(Fetch::Cancelled),
                    _ = sleep_until(deadline) => Ok(Fetch::Empty),
                }
            }
        }
    }

    async fn commit(&self, tokens: &[CommitToken]) -> KafkaResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.commit_errors.pop_front() {
            return Err(e);
        }
        state.commits.push(tokens.to_vec());
        Ok(())
    }

    async fn rewind(&self, tokens: &[CommitToken]) -> KafkaResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.rewind_errors.pop_front() {
            return Err(e);
        }
        for token in tokens {
            state.rewinds.push(*token);
            state.queue.retain(|m| m.partition() != token.partition());
            let replay = state
                .log
                .get(&token.partition())
                .map(|log| {
                    log.iter()
                        .filter(|m| m.offset() >= token.offset())
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            for message in replay.into_iter().rev() {
                state.queue.push_front(message);
            }
        }
        Ok(())
    }

    fn close(&self) {
        self.state.lock().unwrap().reader_closes += 1;
    }
}

#[async_trait]
impl IMessageWriter for MemoryBroker {
    async fn write(&self, topic: &str, record: &Record) -> KafkaResult<(Partition, Offset)> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            if let Some(e) = state.write_errors.pop_front() {
                return Err(e);
            }
            state.write_delay
        };
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        if topic != self.topic {
            let mut state = self.state.lock().unwrap();
            let records = state.foreign.entry(topic.to_string()).or_default();
            records.push(record.clone());
            return Ok((0, records.len() as Offset - 1));
        }
        let partition = record
            .partition
            .unwrap_or_else(|| self.key_partition(&record.key));
        let offset = self.append(
            partition,
            Some(record.key.as_bytes().to_vec()),
            record.payload.clone(),
            &record.headers,
        );
        Ok((partition, offset))
    }

    fn partition_count(&self, topic: &str) -> usize {
        if topic == self.topic {
            self.partitions
        } else {
            0
        }
    }

    fn close(&self) {
        self.state.lock().unwrap().writer_closes += 1;
    }
}
