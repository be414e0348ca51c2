//! Line grammar for authentication logs
//!
//! `<ISO8601-timestamp> <host> <service>[<pid>]: <message>`
//!
//! Lines that do not match are not errors. They are dropped and never
//! reach the rest of the pipeline.

use crate::models::ParsedEvent;
use regex::Regex;
use std::sync::OnceLock;

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<timestamp>\d{4}-\d{2}-\d{2}T\S+)\s+(?P<host>\S+)\s+(?P<service>[^\[]+)\[(?P<pid>\d+)\]:\s+(?P<message>.*)$",
        )
        .expect("line pattern is a valid regex")
    })
}

/// Parse a single raw line into an event
pub fn parse_line(line: &str) -> Option<ParsedEvent> {
    let line = line.trim();
    let caps = match line_pattern().captures(line) {
        Some(caps) => caps,
        None => {
            log::trace!("Dropping malformed line: {}", line);
            return None;
        }
    };

    let pid = match caps["pid"].parse::<u32>() {
        Ok(pid) => pid,
        Err(_) => {
            log::trace!("Dropping line with out-of-range pid: {}", line);
            return None;
        }
    };

    Some(ParsedEvent {
        timestamp: caps["timestamp"].to_string(),
        host: caps["host"].to_string(),
        service: caps["service"].to_string(),
        pid,
        message: caps["message"].to_string(),
    })
}

/// Parse a batch of lines, keeping input order and skipping rejects
pub fn parse_lines<I, S>(lines: I) -> Vec<ParsedEvent>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| parse_line(line.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failed_password_line() {
        let line = "2024-01-01T00:00:01 host sshd[123]: Failed password for invalid user root from 10.0.0.5";
        let event = parse_line(line).unwrap();
        assert_eq!(event.timestamp, "2024-01-01T00:00:01");
        assert_eq!(event.host, "host");
        assert_eq!(event.service, "sshd");
        assert_eq!(event.pid, 123);
        assert_eq!(
            event.message,
            "Failed password for invalid user root from 10.0.0.5"
        );
    }

    #[test]
    fn test_trailing_newline_trimmed() {
        let line = "2024-03-10T12:30:00.123456+00:00 bastion sshd[9]: Accepted password for alice from 1.2.3.4 port 22 ssh2\n";
        let event = parse_line(line).unwrap();
        assert_eq!(event.timestamp, "2024-03-10T12:30:00.123456+00:00");
        assert_eq!(event.message, "Accepted password for alice from 1.2.3.4 port 22 ssh2");
    }

    #[test]
    fn test_service_name_with_spaces() {
        let line = "2024-01-01T00:00:01 host sshd session[1]: Failed password for root from 1.2.3.4";
        let event = parse_line(line).unwrap();
        assert_eq!(event.host, "host");
        assert_eq!(event.service, "sshd session");
        assert_eq!(event.pid, 1);
        assert_eq!(event.message, "Failed password for root from 1.2.3.4");
    }

    #[test]
    fn test_missing_pid_rejected() {
        assert!(parse_line("2024-01-01T00:00:01 host sshd: Failed password for root from 10.0.0.5").is_none());
        assert!(parse_line("2024-01-01T00:00:01 host sshd[]: Failed password for root from 10.0.0.5").is_none());
    }

    #[test]
    fn test_syslog_timestamp_rejected() {
        let line = "Jan 1 12:00:00 hostname sshd[1234]: Accepted password for alice from 192.168.1.100";
        assert!(parse_line(line).is_none());
    }

    #[test]
    fn test_pid_overflow_rejected() {
        let line = "2024-01-01T00:00:01 host sshd[99999999999]: Failed password for root from 10.0.0.5";
        assert!(parse_line(line).is_none());
    }

    #[test]
    fn test_empty_line_rejected() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   ").is_none());
    }

    #[test]
    fn test_parse_lines_skips_rejects() {
        let lines = vec![
            "2024-01-01T00:00:01 host sshd[1]: first",
            "garbage",
            "2024-01-01T00:00:02 host cron[2]: second",
        ];
        let events = parse_lines(lines);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "first");
        assert_eq!(events[1].service, "cron");
    }
}
