//! # Host Protocol Adapter
//!
//! Thin layer between the shard-leasing daemon and [`crate::processor::ShardRecordProcessor`].
//! The daemon writes one JSON message per line; each lifecycle message gets exactly one
//! `status` reply, sent after any checkpoint exchange it triggered has completed.
//!
//! ```text
//! daemon                              driver
//!   │ {"action":"processRecords",...}   │
//!   │ ───────────────────────────────→  │ decode + dispatch
//!   │ {"action":"checkpoint","checkpoint":"3"}
//!   │ ←───────────────────────────────  │
//!   │ {"action":"checkpoint","checkpoint":"3","error":null}
//!   │ ───────────────────────────────→  │
//!   │ {"action":"status","responseFor":"processRecords"}
//!   │ ←───────────────────────────────  │
//! ```

pub mod driver;
pub mod messages;

pub use driver::{KclDriver, ProtocolCheckpointer};
pub use messages::{HostMessage, ProcessorMessage};
