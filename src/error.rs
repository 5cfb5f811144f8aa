use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Fatal errors raised while acquiring broker resources at startup.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),
    #[error("failed to create kafka client: {0}")]
    Kafka(#[from] KafkaError),
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("partition key must not be empty")]
    EmptyKey,
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to produce to kafka: {0}")]
    Transient(#[source] KafkaError),
    #[error("failed to produce to kafka (permanent): {0}")]
    Permanent(#[source] KafkaError),
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
    #[error("publish canceled")]
    Canceled,
}

impl PublishError {
    /// Whether the caller may reasonably try the same publish again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PublishError::Transient(_) | PublishError::Timeout(_) | PublishError::Canceled
        )
    }

    pub(crate) fn from_kafka(e: KafkaError) -> Self {
        if is_retriable(&e) {
            PublishError::Transient(e)
        } else {
            PublishError::Permanent(e)
        }
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("failed to commit offsets: {0}")]
    Commit(#[source] KafkaError),
    #[error("failed to rewind partitions: {0}")]
    Rewind(#[source] KafkaError),
}

/// Send failures that a later attempt can get past.
pub(crate) fn is_retriable(e: &KafkaError) -> bool {
    use RDKafkaErrorCode::*;
    matches!(
        e.rdkafka_error_code(),
        Some(
            QueueFull
                | MessageTimedOut
                | RequestTimedOut
                | OperationTimedOut
                | NetworkException
                | BrokerTransportFailure
                | AllBrokersDown
                | LeaderNotAvailable
                | NotLeaderForPartition
                | NotEnoughReplicas
                | NotEnoughReplicasAfterAppend
                | UnknownTopicOrPartition
                | NotCoordinator
                | CoordinatorLoadInProgress
        )
    )
}
