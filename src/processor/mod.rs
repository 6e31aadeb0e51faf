//! Per-shard record processing: wire records, checkpointing, and the shard lifecycle.

pub mod checkpointer;
pub mod record;
pub mod shard_processor;

pub use checkpointer::{CheckpointError, Checkpointer};
pub use record::{DecodeError, Record};
pub use shard_processor::{
    BatchSummary, CheckpointOutcome, DecodeFailure, ProcessorError, ShardRecordProcessor,
    ShardState, ShutdownReason, ShutdownSummary,
};
