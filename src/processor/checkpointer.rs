use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckpointError {
    #[error("Checkpoint rejected by host: {error}")]
    Rejected { error: String },

    #[error("Checkpoint protocol error: {0}")]
    Protocol(String),

    #[error("Checkpoint I/O error: {0}")]
    Io(String),
}

/// Records shard progress with the leasing runtime
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Checkpoint at `sequence_number`, or at the end of the delivered records when `None`
    ///
    /// Returns the sequence number the host confirmed, if it reported one.
    async fn checkpoint(
        &self,
        sequence_number: Option<&str>,
    ) -> Result<Option<String>, CheckpointError>;
}
