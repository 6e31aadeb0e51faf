//! Drives a [`ShardRecordProcessor`] from the host daemon's line protocol.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::messages::{HostMessage, ProcessorMessage};
use crate::error::Result;
use crate::processor::{
    CheckpointError, Checkpointer, ShardRecordProcessor, ShardState, ShutdownReason,
};

struct ProtocolIo<R, W> {
    reader: R,
    writer: W,
    line: String,
}

impl<R, W> ProtocolIo<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Next message, or `None` at end of stream
    ///
    /// Blank lines and lines that are not a known host message are logged and skipped.
    async fn read_message(&mut self) -> Result<Option<HostMessage>> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }
            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => warn!(error = %e, line = %line, "Skipping unreadable host message"),
            }
        }
    }

    async fn write_message(&mut self, message: &ProcessorMessage) -> Result<()> {
        let mut encoded = serde_json::to_vec(message)?;
        encoded.push(b'\n');
        self.writer.write_all(&encoded).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// [`Checkpointer`] that asks the host daemon over the shared protocol stream
pub struct ProtocolCheckpointer<R, W> {
    io: Arc<Mutex<ProtocolIo<R, W>>>,
}

#[async_trait]
impl<R, W> Checkpointer for ProtocolCheckpointer<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn checkpoint(
        &self,
        sequence_number: Option<&str>,
    ) -> std::result::Result<Option<String>, CheckpointError> {
        let mut io = self.io.lock().await;

        io.write_message(&ProcessorMessage::Checkpoint {
            checkpoint: sequence_number.map(str::to_string),
        })
        .await
        .map_err(|e| CheckpointError::Io(e.to_string()))?;

        match io.read_message().await {
            Ok(Some(HostMessage::Checkpoint {
                error: Some(error), ..
            })) => Err(CheckpointError::Rejected { error }),
            Ok(Some(HostMessage::Checkpoint { checkpoint, .. })) => Ok(checkpoint),
            Ok(Some(other)) => Err(CheckpointError::Protocol(format!(
                "expected a checkpoint reply, received '{}'",
                other.action()
            ))),
            Ok(None) => Err(CheckpointError::Io(
                "host closed the stream before replying to the checkpoint".to_string(),
            )),
            Err(e) => Err(CheckpointError::Protocol(e.to_string())),
        }
    }
}

/// Reads host messages until end of stream and answers each lifecycle message once
///
/// A `ZOMBIE` shutdown is acknowledged like any other; the process keeps running and leaves it
/// to the host to stop it.
pub struct KclDriver<R, W> {
    io: Arc<Mutex<ProtocolIo<R, W>>>,
    checkpointer: ProtocolCheckpointer<R, W>,
    processor: ShardRecordProcessor,
}

impl KclDriver<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Speak the protocol over the process's stdin and stdout
    pub fn stdio(processor: ShardRecordProcessor) -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), processor)
    }
}

impl<R, W> KclDriver<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W, processor: ShardRecordProcessor) -> Self {
        let io = Arc::new(Mutex::new(ProtocolIo {
            reader,
            writer,
            line: String::new(),
        }));
        Self {
            checkpointer: ProtocolCheckpointer {
                io: Arc::clone(&io),
            },
            io,
            processor,
        }
    }

    pub fn processor(&self) -> &ShardRecordProcessor {
        &self.processor
    }

    /// Run until the host closes the stream, returning the processor's final state
    ///
    /// A read or write failure on the stream ends the run with an error.
    pub async fn run(mut self) -> Result<ShardState> {
        info!(processor_id = %self.processor.processor_id(), "Protocol driver started");

        loop {
            let message = self.io.lock().await.read_message().await?;
            let Some(message) = message else {
                info!(
                    shard_id = ?self.processor.shard_id(),
                    state = %self.processor.state(),
                    "Host closed the protocol stream"
                );
                return Ok(self.processor.state());
            };
            self.handle(message).await?;
        }
    }

    async fn handle(&mut self, message: HostMessage) -> Result<()> {
        let action = message.action();
        debug!(action = action, "Received host message");

        match message {
            HostMessage::Initialize { shard_id } => {
                if let Err(e) = self.processor.initialize(shard_id) {
                    warn!(action = action, error = %e, "Lifecycle call rejected");
                }
            }
            HostMessage::ProcessRecords { records } => {
                if let Err(e) = self
                    .processor
                    .process_wire_batch(&records, &self.checkpointer)
                    .await
                {
                    warn!(action = action, error = %e, "Lifecycle call rejected");
                }
            }
            HostMessage::ShutdownRequested => {
                if let Err(e) = self
                    .processor
                    .shutdown_requested(&self.checkpointer)
                    .await
                {
                    warn!(action = action, error = %e, "Lifecycle call rejected");
                }
            }
            HostMessage::Shutdown { reason } => self.shutdown(action, reason).await,
            HostMessage::LeaseLost => self.shutdown(action, ShutdownReason::Zombie).await,
            HostMessage::ShardEnded => self.shutdown(action, ShutdownReason::Terminate).await,
            HostMessage::Checkpoint { .. } => {
                warn!("Ignoring checkpoint reply with no request outstanding");
                return Ok(());
            }
        }

        self.io
            .lock()
            .await
            .write_message(&ProcessorMessage::status(action))
            .await
    }

    async fn shutdown(&mut self, action: &'static str, reason: ShutdownReason) {
        match self.processor.shutdown(reason, &self.checkpointer).await {
            Ok(_) if reason == ShutdownReason::Zombie => {
                info!(
                    shard_id = ?self.processor.shard_id(),
                    "Lease lost; acknowledging without exiting"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(action = action, error = %e, "Lifecycle call rejected"),
        }
    }
}
