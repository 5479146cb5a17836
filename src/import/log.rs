// ABOUTME: Timestamped per-record issues reported back with each chunk response

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub message: String,
}

/// Entries collected while one chunk is processed
#[derive(Debug, Default)]
pub struct ChunkLog {
    entries: Vec<LogEntry>,
    errors: u64,
}

impl ChunkLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, level: LogLevel, message: String) {
        self.entries.push(LogEntry {
            time: Utc::now(),
            level,
            message,
        });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message.into());
    }

    /// Record an error; each one counts towards the session's error total
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors += 1;
        self.push(LogLevel::Error, message.into());
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_errors_are_counted() {
        let mut log = ChunkLog::new();
        log.info("detected csv");
        log.warning("column 'extra' ignored");
        log.error("record 3: bad value");
        assert_eq!(log.errors(), 1);

        let entries = log.into_entries();
        assert_eq!(entries.len(), 3);
        let json = serde_json::to_value(&entries[2]).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "record 3: bad value");
    }
}
