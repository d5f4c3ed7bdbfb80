use crate::types::DeliveryLogEntry;
use chrono::Utc;
use std::collections::VecDeque;

pub const MAX_LOG_ENTRIES: usize = 100;

/// Bounded, in-memory record of recent delivery outcomes. Oldest entries are
/// evicted first once the capacity is reached.
#[derive(Debug)]
pub struct DeliveryLog {
    entries: VecDeque<DeliveryLogEntry>,
    capacity: usize,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::with_capacity(MAX_LOG_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `entry`, stamped with the append time so timestamps follow
    /// log order.
    pub fn record(&mut self, mut entry: DeliveryLogEntry) {
        entry.timestamp = Utc::now();
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Copy of the log, newest first.
    pub fn recent(&self) -> Vec<DeliveryLogEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DeliveryLog {
    fn default() -> Self {
        Self::new()
    }
}
