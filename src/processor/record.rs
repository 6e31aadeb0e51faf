use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why a record's payload could not be turned into JSON
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

/// One record as delivered by the shard runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Base64 of the UTF-8 JSON payload
    pub data: String,
    pub partition_key: String,
    pub sequence_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_sequence_number: Option<u64>,
    /// Milliseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approximate_arrival_timestamp: Option<i64>,
}

impl Record {
    pub fn new(
        data: impl Into<String>,
        partition_key: impl Into<String>,
        sequence_number: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            partition_key: partition_key.into(),
            sequence_number: sequence_number.into(),
            sub_sequence_number: None,
            approximate_arrival_timestamp: None,
        }
    }

    /// Parse one entry of a delivered batch
    pub fn from_wire(value: &Value) -> Result<Self, DecodeError> {
        Self::deserialize(value).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    /// Build a record whose payload is the base64 encoding of `payload`
    pub fn from_payload(
        payload: &[u8],
        partition_key: impl Into<String>,
        sequence_number: impl Into<String>,
    ) -> Self {
        Self::new(STANDARD.encode(payload), partition_key, sequence_number)
    }

    /// base64 → UTF-8 → JSON
    pub fn decode_payload(&self) -> Result<Value, DecodeError> {
        let bytes = STANDARD.decode(self.data.trim())?;
        let text = String::from_utf8(bytes)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn arrival_time(&self) -> Option<DateTime<Utc>> {
        self.approximate_arrival_timestamp
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
    }
}
