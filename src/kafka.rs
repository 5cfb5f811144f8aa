pub(crate) mod config;
pub mod consumer;
pub mod key;
pub mod message;
pub mod producer;
#[cfg(test)]
pub(crate) mod testing;

pub use consumer::{Fetch, IMessageReader, KafkaReader};
pub use key::{CommitToken, Offset, Partition, Topic};
pub use message::{Message, Record};
pub use producer::{IMessageWriter, KafkaWriter};
