//! # Event Router
//!
//! Maps decoded records to named events and runs each event's configured actions.
//!
//! ## Architecture
//!
//! ```text
//! raw JSON ──→ Event::decode ──→ EventHandlerTable lookup ──→ handle_event
//!                                                                │
//!                              ┌──────────────┬──────────────────┤ (all concurrently)
//!                              ▼              ▼                  ▼
//!                           action A       action B    ...    action N
//!                              │              │                  │
//!                              └──────────────┴──── settle all ──┴──→ Vec<ActionReport>
//! ```
//!
//! Action failures are logged and reported, never propagated.

pub mod event_router;

pub use event_router::{ActionReport, DispatchOutcome, EventRouter};
