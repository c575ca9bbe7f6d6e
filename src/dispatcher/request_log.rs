use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

use super::DispatchSource;

/// Dispatches remembered by a [`RequestLog`].
pub const REQUEST_LOG_CAPACITY: usize = 100;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    pub timestamp: DateTime<Utc>,
    pub data_server_name: String,
    pub source: DispatchSource,
    pub duration_ms: u128,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RequestLogEntry {
    pub fn new(
        data_server_name: &str,
        source: DispatchSource,
        duration: Duration,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            data_server_name: data_server_name.to_string(),
            source,
            duration_ms: duration.as_millis(),
            success: error.is_none(),
            error,
        }
    }
}

/// Ring buffer keeping the most recent dispatches, oldest first.
#[derive(Debug)]
pub struct RequestLog {
    entries: VecDeque<RequestLogEntry>,
    capacity: usize,
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::with_capacity(REQUEST_LOG_CAPACITY)
    }
}

impl RequestLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: RequestLogEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&RequestLogEntry> {
        self.entries.back()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RequestLogEntry> {
        self.entries.iter()
    }
}
