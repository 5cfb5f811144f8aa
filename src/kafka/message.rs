use crate::kafka::key::{Offset, Partition};
use chrono::{DateTime, Utc};
use rdkafka::message::{Headers, Message as IMessage, OwnedHeaders, OwnedMessage};

/// A message read from the consumer topic.
#[derive(Clone, Debug)]
pub struct Message {
    base: OwnedMessage,
}

impl Message {
    pub fn new(base: OwnedMessage) -> Self {
        Self { base }
    }

    pub fn topic(&self) -> &str {
        self.base.topic()
    }

    pub fn partition(&self) -> Partition {
        self.base.partition()
    }

    pub fn offset(&self) -> Offset {
        self.base.offset()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.base.key()
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.base.payload()
    }

    /// Looks up a header value, matching the name case-insensitively.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        let headers = self.base.headers()?;
        (0..headers.count())
            .filter_map(|i| headers.get(i))
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn headers(&self) -> Vec<(String, Vec<u8>)> {
        match self.base.headers() {
            Some(headers) => (0..headers.count())
                .filter_map(|i| headers.get(i))
                .map(|(key, value)| (key.to_string(), value.to_vec()))
                .collect(),
            None => vec![],
        }
    }
}

/// An outgoing message: partition key, encoded payload, creation time and headers.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub key: String,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub headers: Vec<(String, Vec<u8>)>,
    /// Explicit target partition; `None` leaves the choice to the client partitioner.
    pub partition: Option<Partition>,
}

impl Record {
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_slice())
    }

    pub(crate) fn owned_headers(&self) -> OwnedHeaders {
        self.headers
            .iter()
            .fold(OwnedHeaders::new_with_capacity(self.headers.len()), |h, (key, value)| {
                h.add(key.as_str(), value.as_slice())
            })
    }
}
