//! # Shard Record Processor
//!
//! Per-shard lifecycle driven by the leasing runtime.
//!
//! ```text
//! Uninitialized ──initialize──→ Active ──shutdown──→ Terminating ──checkpoint settled──→ Done
//!                                 │  ↑
//!                                 └──┘ process_batch / shutdown_requested
//! ```
//!
//! Every batch is checkpointed at its last record once all records have settled, whatever
//! happened to the individual records. A failing record is skipped rather than replayed forever.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::checkpointer::{CheckpointError, Checkpointer};
use super::record::{DecodeError, Record};
use crate::error::WatchmanError;
use crate::router::{DispatchOutcome, EventRouter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardState {
    Uninitialized,
    Active,
    Terminating,
    Done,
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Active => "active",
            Self::Terminating => "terminating",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why the host is shutting the processor down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShutdownReason {
    /// The shard has ended; checkpoint at its end
    Terminate,
    /// The lease was lost; another worker may own the shard
    Zombie,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminate => "TERMINATE",
            Self::Zombie => "ZOMBIE",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShutdownReason {
    type Err = WatchmanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TERMINATE" => Ok(Self::Terminate),
            "ZOMBIE" => Ok(Self::Zombie),
            other => Err(WatchmanError::InvalidState(format!(
                "Unknown shutdown reason: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessorError {
    #[error("Cannot {operation} while {actual} (expected {expected})")]
    InvalidState {
        operation: &'static str,
        expected: ShardState,
        actual: ShardState,
    },
}

impl From<ProcessorError> for WatchmanError {
    fn from(err: ProcessorError) -> Self {
        WatchmanError::InvalidState(err.to_string())
    }
}

/// Result of the single checkpoint attempt a lifecycle call makes
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointOutcome {
    NotAttempted,
    Confirmed {
        requested: Option<String>,
        confirmed: Option<String>,
    },
    Failed {
        requested: Option<String>,
        error: CheckpointError,
    },
}

impl CheckpointOutcome {
    pub fn is_attempted(&self) -> bool {
        !matches!(self, Self::NotAttempted)
    }

    pub fn requested(&self) -> Option<&str> {
        match self {
            Self::NotAttempted => None,
            Self::Confirmed { requested, .. } | Self::Failed { requested, .. } => {
                requested.as_deref()
            }
        }
    }
}

/// A record that could not be decoded and was left out of dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    pub sequence_number: String,
    pub partition_key: String,
    pub error: String,
}

impl DecodeFailure {
    /// Failure for a batch entry that is not a record at all; identifiers are kept when present
    fn malformed(entry: &Value, error: &DecodeError) -> Self {
        let field = |name: &str| match entry.get(name) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Self {
            sequence_number: field("sequenceNumber"),
            partition_key: field("partitionKey"),
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub records: usize,
    /// One outcome per successfully decoded record, in batch order
    pub dispatched: Vec<DispatchOutcome>,
    /// Malformed entries first, then records whose payload failed to decode
    pub decode_failures: Vec<DecodeFailure>,
    pub checkpoint: CheckpointOutcome,
}

impl BatchSummary {
    fn undispatched(records: usize, decode_failures: Vec<DecodeFailure>) -> Self {
        Self {
            records,
            dispatched: Vec::new(),
            decode_failures,
            checkpoint: CheckpointOutcome::NotAttempted,
        }
    }

    pub fn failed_actions(&self) -> usize {
        self.dispatched
            .iter()
            .flat_map(|outcome| outcome.reports())
            .filter(|report| !report.is_success())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownSummary {
    pub reason: ShutdownReason,
    pub checkpoint: CheckpointOutcome,
}

enum RecordOutcome {
    Dispatched(DispatchOutcome),
    DecodeFailed(DecodeFailure),
}

/// Bridges one shard's host lifecycle to the [`EventRouter`]
///
/// The host delivers one lifecycle call at a time, so operations take `&mut self`.
pub struct ShardRecordProcessor {
    processor_id: Uuid,
    router: Arc<EventRouter>,
    shard_id: Option<String>,
    state: ShardState,
}

impl fmt::Debug for ShardRecordProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardRecordProcessor")
            .field("processor_id", &self.processor_id)
            .field("shard_id", &self.shard_id)
            .field("state", &self.state)
            .finish()
    }
}

impl ShardRecordProcessor {
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self {
            processor_id: Uuid::new_v4(),
            router,
            shard_id: None,
            state: ShardState::Uninitialized,
        }
    }

    pub fn processor_id(&self) -> Uuid {
        self.processor_id
    }

    pub fn shard_id(&self) -> Option<&str> {
        self.shard_id.as_deref()
    }

    pub fn state(&self) -> ShardState {
        self.state
    }

    fn shard_label(&self) -> &str {
        self.shard_id.as_deref().unwrap_or("-")
    }

    fn require(&self, operation: &'static str, expected: ShardState) -> Result<(), ProcessorError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ProcessorError::InvalidState {
                operation,
                expected,
                actual: self.state,
            })
        }
    }

    pub fn initialize(&mut self, shard_id: impl Into<String>) -> Result<(), ProcessorError> {
        self.require("initialize", ShardState::Uninitialized)?;

        let shard_id = shard_id.into();
        info!(
            processor_id = %self.processor_id,
            shard_id = %shard_id,
            source = %self.router.source(),
            "Shard processor initialized"
        );
        self.shard_id = Some(shard_id);
        self.state = ShardState::Active;
        Ok(())
    }

    /// Decode and dispatch every record, then checkpoint at the last one
    ///
    /// Record and action failures never fail the batch. The only error is calling this outside
    /// the `Active` state.
    #[instrument(skip_all, fields(processor_id = %self.processor_id, records = records.len()))]
    pub async fn process_batch(
        &mut self,
        records: &[Record],
        checkpointer: &dyn Checkpointer,
    ) -> Result<BatchSummary, ProcessorError> {
        self.require("process a batch", ShardState::Active)?;
        Ok(self
            .run_batch(records.len(), records, Vec::new(), checkpointer)
            .await)
    }

    /// [`process_batch`](Self::process_batch) over entries exactly as the host delivered them
    ///
    /// An entry without the record shape counts as a decode failure and the rest of the batch
    /// proceeds. The checkpoint goes to the last well-formed record; with none, nothing is
    /// checkpointed.
    #[instrument(skip_all, fields(processor_id = %self.processor_id, records = entries.len()))]
    pub async fn process_wire_batch(
        &mut self,
        entries: &[Value],
        checkpointer: &dyn Checkpointer,
    ) -> Result<BatchSummary, ProcessorError> {
        self.require("process a batch", ShardState::Active)?;

        let mut records = Vec::with_capacity(entries.len());
        let mut malformed = Vec::new();
        for entry in entries {
            match Record::from_wire(entry) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let failure = DecodeFailure::malformed(entry, &e);
                    warn!(
                        shard_id = %self.shard_label(),
                        sequence_number = %failure.sequence_number,
                        error = %e,
                        "Skipping malformed record"
                    );
                    malformed.push(failure);
                }
            }
        }

        Ok(self
            .run_batch(entries.len(), &records, malformed, checkpointer)
            .await)
    }

    async fn run_batch(
        &self,
        total: usize,
        records: &[Record],
        mut decode_failures: Vec<DecodeFailure>,
        checkpointer: &dyn Checkpointer,
    ) -> BatchSummary {
        let Some(last) = records.last() else {
            debug!(
                shard_id = %self.shard_label(),
                "No records to dispatch, nothing to checkpoint"
            );
            return BatchSummary::undispatched(total, decode_failures);
        };

        let started = Instant::now();
        let router = &self.router;
        let shard_id = self.shard_label();

        let outcomes = join_all(records.iter().map(|record| async move {
            match record.decode_payload() {
                Ok(raw) => RecordOutcome::Dispatched(router.process(&raw).await),
                Err(e) => {
                    warn!(
                        shard_id = %shard_id,
                        sequence_number = %record.sequence_number,
                        partition_key = %record.partition_key,
                        error = %e,
                        "Failed to decode record"
                    );
                    RecordOutcome::DecodeFailed(DecodeFailure {
                        sequence_number: record.sequence_number.clone(),
                        partition_key: record.partition_key.clone(),
                        error: e.to_string(),
                    })
                }
            }
        }))
        .await;

        let mut dispatched = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                RecordOutcome::Dispatched(outcome) => dispatched.push(outcome),
                RecordOutcome::DecodeFailed(failure) => decode_failures.push(failure),
            }
        }

        let checkpoint = self
            .checkpoint(checkpointer, Some(&last.sequence_number))
            .await;

        let summary = BatchSummary {
            records: total,
            dispatched,
            decode_failures,
            checkpoint,
        };

        info!(
            shard_id = %self.shard_label(),
            records = summary.records,
            dispatched = summary.dispatched.len(),
            decode_failures = summary.decode_failures.len(),
            failed_actions = summary.failed_actions(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Processed batch"
        );

        summary
    }

    /// Host asked for a graceful stop; checkpoint what has been delivered and stay active
    pub async fn shutdown_requested(
        &mut self,
        checkpointer: &dyn Checkpointer,
    ) -> Result<CheckpointOutcome, ProcessorError> {
        self.require("handle a shutdown request", ShardState::Active)?;

        info!(shard_id = %self.shard_label(), "Shutdown requested by host");
        Ok(self.checkpoint(checkpointer, None).await)
    }

    pub async fn shutdown(
        &mut self,
        reason: ShutdownReason,
        checkpointer: &dyn Checkpointer,
    ) -> Result<ShutdownSummary, ProcessorError> {
        self.require("shut down", ShardState::Active)?;
        self.state = ShardState::Terminating;

        info!(
            processor_id = %self.processor_id,
            shard_id = %self.shard_label(),
            reason = %reason,
            "Shard processor shutting down"
        );

        let checkpoint = match reason {
            ShutdownReason::Terminate => self.checkpoint(checkpointer, None).await,
            ShutdownReason::Zombie => {
                debug!(shard_id = %self.shard_label(), "Lease lost, skipping checkpoint");
                CheckpointOutcome::NotAttempted
            }
        };

        self.state = ShardState::Done;
        Ok(ShutdownSummary { reason, checkpoint })
    }

    async fn checkpoint(
        &self,
        checkpointer: &dyn Checkpointer,
        sequence_number: Option<&str>,
    ) -> CheckpointOutcome {
        let requested = sequence_number.map(str::to_string);

        match checkpointer.checkpoint(sequence_number).await {
            Ok(confirmed) => {
                info!(
                    shard_id = %self.shard_label(),
                    requested = ?requested,
                    confirmed = ?confirmed,
                    "Checkpoint succeeded"
                );
                CheckpointOutcome::Confirmed {
                    requested,
                    confirmed,
                }
            }
            Err(error) => {
                warn!(
                    shard_id = %self.shard_label(),
                    requested = ?requested,
                    error = %error,
                    "Checkpoint failed"
                );
                CheckpointOutcome::Failed { requested, error }
            }
        }
    }
}
