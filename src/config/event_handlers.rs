//! # Event Handler Table
//!
//! Configuration mapping event names to ordered action lists.
//!
//! ```yaml
//! event_handlers:
//!   campaignCreated:
//!     actions:
//!       - send_email
//!       - name: update_campaign
//!         options:
//!           field: status
//! ```
//!
//! The order of an action list defines execution and reporting order only. Every action in a
//! list runs independently of its siblings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// A single entry of an event's action list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionSpec {
    /// Bare action name, invoked without options
    Name(String),
    /// Action name with per-invocation options
    Detailed {
        name: String,
        #[serde(default)]
        options: Option<Value>,
    },
}

impl ActionSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn with_options(name: impl Into<String>, options: Value) -> Self {
        Self::Detailed {
            name: name.into(),
            options: Some(options),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Detailed { name, .. } => name,
        }
    }

    /// Options passed to the action; explicit `null` options are treated as absent
    pub fn options(&self) -> Option<&Value> {
        match self {
            Self::Name(_) => None,
            Self::Detailed { options, .. } => options.as_ref().filter(|v| !v.is_null()),
        }
    }
}

/// Actions configured for one event name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventHandlerConfig {
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

/// Mapping from event name to its configured action list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventHandlerTable(HashMap<String, EventHandlerConfig>);

impl EventHandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, replacing any existing entry for `event`
    pub fn with_event<I>(mut self, event: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = ActionSpec>,
    {
        self.insert(event, actions);
        self
    }

    pub fn insert<I>(&mut self, event: impl Into<String>, actions: I)
    where
        I: IntoIterator<Item = ActionSpec>,
    {
        self.0.insert(
            event.into(),
            EventHandlerConfig {
                actions: actions.into_iter().collect(),
            },
        );
    }

    /// Configured action list for `event`, if the event is routed at all
    pub fn actions_for(&self, event: &str) -> Option<&[ActionSpec]> {
        self.0.get(event).map(|config| config.actions.as_slice())
    }

    /// Distinct action names referenced anywhere in the table
    pub fn action_names(&self) -> BTreeSet<String> {
        self.0
            .values()
            .flat_map(|config| config.actions.iter())
            .map(|spec| spec.name().to_string())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &EventHandlerConfig)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
