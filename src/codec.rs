//! Wire format of published events: a JSON body plus headers naming the
//! content type, event type and schema version.
use crate::error::DecodeError;
use crate::kafka::message::{Message, Record};
use crate::macros::selector;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const EVENT_TYPE_HEADER: &str = "event-type";
pub const SCHEMA_VERSION_HEADER: &str = "schema-ver";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// A domain payload that travels over the queue.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    const EVENT_TYPE: &'static str;
    const SCHEMA_VERSION: u32;

    /// Key that pins all events of one domain entity to one partition.
    fn partition_key(&self) -> String;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SmsEvent {
    pub user_id: Uuid,
    pub phone: String,
    #[serde(rename = "iin")]
    pub national_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event for SmsEvent {
    const EVENT_TYPE: &'static str = "sms";
    const SCHEMA_VERSION: u32 = 1;

    fn partition_key(&self) -> String {
        self.user_id.to_string()
    }
}

pub fn encode<E: Event>(event: &E) -> Result<Record, serde_json::Error> {
    let payload = serde_json::to_vec(event)?;
    Ok(Record {
        key: event.partition_key(),
        payload,
        timestamp: Utc::now(),
        headers: vec![
            (CONTENT_TYPE_HEADER.to_string(), CONTENT_TYPE_JSON.as_bytes().to_vec()),
            (EVENT_TYPE_HEADER.to_string(), E::EVENT_TYPE.as_bytes().to_vec()),
            (
                SCHEMA_VERSION_HEADER.to_string(),
                E::SCHEMA_VERSION.to_string().into_bytes(),
            ),
        ],
        partition: None,
    })
}

pub fn decode<E: Event>(message: &Message) -> Result<E, DecodeError> {
    match message.payload() {
        Some(payload) if !payload.is_empty() => Ok(serde_json::from_slice(payload)?),
        _ => Err(DecodeError::Empty),
    }
}

selector! {
    /// How strictly received messages must carry the expected `event-type` header.
    pub enum TypeFilter {
        /// Header must be present and match.
        Strict = "strict" ["strict"],
        /// A missing header passes; a different one does not.
        Lenient = "lenient" ["lenient", "permissive"],
        Off = "off" ["off", "none", "disabled"],
    }
    default = Strict;
}

impl TypeFilter {
    pub fn accepts(&self, message: &Message, expected: &str) -> bool {
        let matches = |value: &[u8]| {
            std::str::from_utf8(value)
                .map(|v| v.trim().eq_ignore_ascii_case(expected))
                .unwrap_or(false)
        };
        match (self, message.header(EVENT_TYPE_HEADER)) {
            (TypeFilter::Off, _) => true,
            (TypeFilter::Strict, None) => false,
            (TypeFilter::Lenient, None) => true,
            (_, Some(value)) => matches(value),
        }
    }
}
