//! Recognises failed and accepted password attempts in event messages

use crate::models::{AuthKind, AuthOutcome, ParsedEvent};
use regex::Regex;
use std::sync::OnceLock;

fn failed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"Failed password for (?:invalid user )?(?P<user>\w+) from (?P<ip>\d+\.\d+\.\d+\.\d+)",
        )
        .expect("failed login pattern is a valid regex")
    })
}

fn accepted_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Accepted password for (?P<user>\w+) from (?P<ip>\d+\.\d+\.\d+\.\d+)")
            .expect("accepted login pattern is a valid regex")
    })
}

/// Classify an event's message. Failed attempts take precedence.
pub fn classify(event: &ParsedEvent) -> Option<AuthOutcome> {
    classify_message(&event.message)
}

pub fn classify_message(message: &str) -> Option<AuthOutcome> {
    let patterns = [
        (AuthKind::Failed, failed_pattern()),
        (AuthKind::Succeeded, accepted_pattern()),
    ];

    for (kind, pattern) in patterns {
        if let Some(caps) = pattern.captures(message) {
            return Some(AuthOutcome {
                kind,
                address: caps["ip"].to_string(),
                username: caps["user"].to_string(),
            });
        }
    }

    log::trace!("Message is not an authentication attempt: {}", message);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_password() {
        let outcome = classify_message("Failed password for admin from 192.168.1.10 port 4242 ssh2").unwrap();
        assert_eq!(outcome.kind, AuthKind::Failed);
        assert_eq!(outcome.username, "admin");
        assert_eq!(outcome.address, "192.168.1.10");
    }

    #[test]
    fn test_failed_password_invalid_user() {
        let outcome = classify_message("Failed password for invalid user root from 10.0.0.5").unwrap();
        assert_eq!(outcome.kind, AuthKind::Failed);
        assert_eq!(outcome.username, "root");
        assert_eq!(outcome.address, "10.0.0.5");
    }

    #[test]
    fn test_accepted_password() {
        let outcome = classify_message("Accepted password for alice from 1.2.3.4 port 22 ssh2").unwrap();
        assert_eq!(outcome.kind, AuthKind::Succeeded);
        assert_eq!(outcome.username, "alice");
        assert_eq!(outcome.address, "1.2.3.4");
    }

    #[test]
    fn test_failed_takes_precedence() {
        let message = "Accepted password for bob from 2.2.2.2; Failed password for eve from 3.3.3.3";
        let outcome = classify_message(message).unwrap();
        assert_eq!(outcome.kind, AuthKind::Failed);
        assert_eq!(outcome.address, "3.3.3.3");
    }

    #[test]
    fn test_unrelated_messages() {
        assert!(classify_message("Accepted publickey for alice from 1.2.3.4").is_none());
        assert!(classify_message("Connection closed by 1.2.3.4 port 22").is_none());
        assert!(classify_message("Failed password for root from localhost").is_none());
    }

    #[test]
    fn test_classify_event() {
        let event = ParsedEvent {
            timestamp: "2024-01-01T00:00:01".to_string(),
            host: "host".to_string(),
            service: "sshd".to_string(),
            pid: 1,
            message: "Failed password for guest from 8.8.8.8".to_string(),
        };
        let outcome = classify(&event).unwrap();
        assert_eq!(outcome.username, "guest");
    }
}
