pub mod types;

pub use types::{Event, EventSource};
