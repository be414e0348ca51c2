use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A log line that matched the `<timestamp> <host> <service>[<pid>]: <message>` grammar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedEvent {
    pub timestamp: String,
    pub host: String,
    pub service: String,
    pub pid: u32,
    pub message: String,
}

impl ParsedEvent {
    /// Interpret the timestamp text as a UTC instant.
    ///
    /// Accepts RFC 3339 (with offset) or a naive `YYYY-MM-DDTHH:MM:SS[.frac]`
    /// which is taken to be UTC. Returns `None` for anything else.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthKind {
    Failed,
    Succeeded,
}

/// An authentication attempt recognised in a log message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub kind: AuthKind,
    /// Dotted-quad source address, kept as it appeared in the log
    pub address: String,
    pub username: String,
}
