use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datetime::format_local;

pub const LOG_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Audit trail of user actions; keeps the newest `LOG_LIMIT` entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ActivityLog {
    entries: Vec<ActivityEntry>,
}

impl ActivityLog {
    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    pub fn record(&mut self, at: DateTime<Utc>, message: impl Into<String>) {
        let message = message.into();
        debug!(%message, "activity");
        self.entries.push(ActivityEntry { at, message });
        if self.entries.len() > LOG_LIMIT {
            let excess = self.entries.len() - LOG_LIMIT;
            self.entries.drain(..excess);
        }
    }

    pub fn clear(&mut self, at: DateTime<Utc>) {
        self.entries.clear();
        self.record(at, "Activity log cleared");
    }

    /// Plain-text export, one `[timestamp] message` line per entry.
    pub fn export(&self, tz: &Tz) -> String {
        self.entries
            .iter()
            .map(|entry| format!("[{}] {}", format_local(entry.at, tz), entry.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
