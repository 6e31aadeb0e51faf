use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::processor::ShutdownReason;

/// Message read from the host daemon, one JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HostMessage {
    Initialize {
        #[serde(rename = "shardId")]
        shard_id: String,
    },
    /// Records stay untyped here so one malformed entry cannot reject the whole batch
    ProcessRecords {
        records: Vec<Value>,
    },
    Shutdown {
        reason: ShutdownReason,
    },
    ShutdownRequested,
    LeaseLost,
    ShardEnded,
    /// Reply to a checkpoint request
    Checkpoint {
        #[serde(default)]
        checkpoint: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
}

impl HostMessage {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::ProcessRecords { .. } => "processRecords",
            Self::Shutdown { .. } => "shutdown",
            Self::ShutdownRequested => "shutdownRequested",
            Self::LeaseLost => "leaseLost",
            Self::ShardEnded => "shardEnded",
            Self::Checkpoint { .. } => "checkpoint",
        }
    }
}

/// Message written back to the host daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ProcessorMessage {
    Status {
        #[serde(rename = "responseFor")]
        response_for: String,
    },
    Checkpoint {
        checkpoint: Option<String>,
    },
}

impl ProcessorMessage {
    pub fn status(response_for: impl Into<String>) -> Self {
        Self::Status {
            response_for: response_for.into(),
        }
    }
}
