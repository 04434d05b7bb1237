use std::collections::VecDeque;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

pub const ACTION_LOG_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionEntry {
    pub time: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ActionLog {
    entries: VecDeque<ActionEntry>,
    capacity: usize,
}

impl ActionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, now: DateTime<FixedOffset>, message: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ActionEntry {
            time: now.format("%H:%M:%S").to_string(),
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&ActionEntry> {
        self.entries.back()
    }

    pub fn to_vec(&self) -> Vec<ActionEntry> {
        self.entries.iter().cloned().collect()
    }
}

impl Default for ActionLog {
    fn default() -> Self {
        Self::new(ACTION_LOG_CAPACITY)
    }
}
