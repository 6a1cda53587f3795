//! Deterministic UI event replay.
//!
//! A fixture is a JSON array of event objects consumed strictly in order.
//! Once the queue is drained every poll yields a `none` event.

use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::host::{HostError, HostResult};

/// One UI event as seen by `sys.ui_pollEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub target_id: String,
    pub x: i32,
    pub y: i32,
    pub key: String,
    pub text: String,
    pub modifiers: String,
    pub repeat: bool,
}

impl UiEvent {
    /// Terminal event returned once input is exhausted.
    pub fn none() -> Self {
        Self::default()
    }
}

impl Default for UiEvent {
    fn default() -> Self {
        Self {
            kind: "none".to_string(),
            target_id: String::new(),
            x: -1,
            y: -1,
            key: String::new(),
            text: String::new(),
            modifiers: String::new(),
            repeat: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventReplay {
    queue: VecDeque<UiEvent>,
}

impl EventReplay {
    pub fn new(events: impl IntoIterator<Item = UiEvent>) -> Self {
        Self {
            queue: events.into_iter().collect(),
        }
    }

    pub fn from_json(text: &str) -> HostResult<Self> {
        let events: Vec<UiEvent> =
            serde_json::from_str(text).map_err(|e| HostError::Invalid(format!("event fixture: {}", e)))?;
        Ok(Self::new(events))
    }

    pub fn from_file(path: &Path) -> HostResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn next_event(&mut self) -> UiEvent {
        self.queue.pop_front().unwrap_or_else(UiEvent::none)
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}
