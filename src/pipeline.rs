//! Batch analysis entry point
//!
//! raw lines -> events -> auth outcomes -> feature vectors
//!   -> { risk assessment, anomaly flag } -> defense actions
//!
//! Each call is a pure transformation of its input. Nothing is carried over
//! between batches.

use crate::detection::{self, AnomalyDetector, DetectorConfig, DetectorError};
use crate::input;
use crate::models::{AnomalyResult, AuthOutcome, FeatureVector, ThreatReport};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// No line in the batch matched the log grammar
    #[error("No valid log entries found")]
    NoData,

    #[error("Anomaly detection failed: {0}")]
    Detector(#[from] DetectorError),
}

/// Threat reports keyed by source address
pub type ThreatAnalysis = BTreeMap<String, ThreatReport>;

/// Runs the full pipeline with a fixed detector configuration
#[derive(Debug, Clone)]
pub struct Analyzer {
    detector: AnomalyDetector,
}

impl Analyzer {
    /// Fails fast on an invalid detector configuration
    pub fn new(config: DetectorConfig) -> Result<Self, AnalysisError> {
        Ok(Analyzer {
            detector: AnomalyDetector::new(config)?,
        })
    }

    pub fn detector_config(&self) -> &DetectorConfig {
        self.detector.config()
    }

    /// Analyse one batch of raw log lines.
    ///
    /// Returns `AnalysisError::NoData` when no line parses. A batch with
    /// parseable lines but no authentication attempts yields an empty map.
    pub fn analyze<I, S>(&self, lines: I) -> Result<ThreatAnalysis, AnalysisError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let events = input::parse_lines(lines);
        if events.is_empty() {
            return Err(AnalysisError::NoData);
        }

        let outcomes: Vec<AuthOutcome> = events.iter().filter_map(input::classify).collect();
        log::debug!(
            "Parsed {} event(s), {} authentication attempt(s)",
            events.len(),
            outcomes.len()
        );

        let features = detection::aggregate(&outcomes);
        self.assess(features)
    }

    /// Score, detect and advise over already aggregated features
    pub fn assess(
        &self,
        features: BTreeMap<String, FeatureVector>,
    ) -> Result<ThreatAnalysis, AnalysisError> {
        let vectors: Vec<FeatureVector> = features.into_values().collect();
        let mut anomalies = self.detector.detect(&vectors)?;

        let reports: ThreatAnalysis = vectors
            .into_iter()
            .map(|fv| {
                let risk = detection::score(&fv);
                let anomaly = anomalies.remove(&fv.address).unwrap_or_else(|| AnomalyResult {
                    address: fv.address.clone(),
                    is_anomaly: false,
                    anomaly_score: 0.0,
                });
                let actions = detection::advise(&risk);
                (
                    fv.address.clone(),
                    ThreatReport {
                        address: fv.address.clone(),
                        features: fv,
                        risk,
                        anomaly,
                        actions,
                    },
                )
            })
            .collect();

        log::info!("Analyzed {} address(es)", reports.len());
        Ok(reports)
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Analyzer {
            detector: AnomalyDetector::default(),
        }
    }
}

/// Analyse a batch with the default detector configuration
pub fn analyze<I, S>(lines: I) -> Result<ThreatAnalysis, AnalysisError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Analyzer::default().analyze(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisSummary, RiskLevel};

    fn failed_line(user: &str, ip: &str) -> String {
        format!(
            "2024-01-01T00:00:01 host sshd[123]: Failed password for invalid user {} from {}",
            user, ip
        )
    }

    fn accepted_line(user: &str, ip: &str) -> String {
        format!(
            "2024-01-01T00:00:02 host sshd[124]: Accepted password for {} from {} port 22 ssh2",
            user, ip
        )
    }

    fn test_analyzer() -> Analyzer {
        Analyzer::new(DetectorConfig::new(0.1, 10, 42)).unwrap()
    }

    #[test]
    fn test_brute_force_scenario() {
        let lines: Vec<String> = ["root", "admin", "oracle", "test", "guest", "ubuntu"]
            .iter()
            .map(|user| failed_line(user, "10.0.0.5"))
            .collect();

        let reports = test_analyzer().analyze(&lines).unwrap();
        let report = &reports["10.0.0.5"];

        assert_eq!(report.features.failed_attempts, 6);
        assert_eq!(report.features.successful_logins, 0);
        assert_eq!(report.features.unique_users_targeted, 6);
        assert_eq!(report.risk.risk_score, 30);
        assert_eq!(report.risk.risk_level, RiskLevel::High);
        assert_eq!(
            report.actions,
            vec![
                "Block IP using firewall: sudo iptables -A INPUT -s 10.0.0.5 -j DROP",
                "Enable fail2ban rule for SSH brute force",
                "Trigger security alert to SOC team",
            ]
        );
        // Lone address: nothing to compare against
        assert!(!report.anomaly.is_anomaly);
    }

    #[test]
    fn test_line_without_pid_has_no_effect() {
        let mut lines = vec![
            accepted_line("alice", "192.168.1.2"),
            failed_line("bob", "192.168.1.3"),
        ];
        let baseline = test_analyzer().analyze(&lines).unwrap();

        lines.push(
            "2024-01-01T00:00:03 host sshd: Failed password for root from 10.9.9.9".to_string(),
        );
        let with_malformed = test_analyzer().analyze(&lines).unwrap();

        assert_eq!(baseline, with_malformed);
        assert!(!with_malformed.contains_key("10.9.9.9"));
    }

    #[test]
    fn test_no_data() {
        let lines = vec!["garbage", "Jan 1 12:00:00 host sshd[1]: Failed password for root from 1.1.1.1"];
        assert_eq!(test_analyzer().analyze(lines), Err(AnalysisError::NoData));

        let empty: Vec<String> = Vec::new();
        assert_eq!(analyze(empty), Err(AnalysisError::NoData));
    }

    #[test]
    fn test_events_without_auth_attempts() {
        let lines = vec!["2024-01-01T00:00:01 host cron[77]: (root) CMD (run-parts /etc/cron.hourly)"];
        let reports = test_analyzer().analyze(lines).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let result = Analyzer::new(DetectorConfig::new(0.0, 10, 42));
        assert!(matches!(
            result,
            Err(AnalysisError::Detector(DetectorError::InvalidContamination(_)))
        ));
    }

    #[test]
    fn test_mixed_population() {
        let mut lines = Vec::new();
        for i in 1..=9 {
            let ip = format!("192.168.0.{}", i);
            lines.push(accepted_line("deploy", &ip));
            if i % 3 == 0 {
                lines.push(failed_line("deploy", &ip));
            }
        }
        for i in 0..40 {
            lines.push(failed_line(&format!("user{}", i % 12), "203.0.113.66"));
        }

        let analyzer = Analyzer::new(DetectorConfig::new(0.1, 100, 42)).unwrap();
        let reports = analyzer.analyze(&lines).unwrap();
        assert_eq!(reports.len(), 10);

        let attacker = &reports["203.0.113.66"];
        assert_eq!(attacker.risk.risk_level, RiskLevel::High);
        assert!(attacker.anomaly.is_anomaly);

        let flagged: Vec<_> = reports.values().filter(|r| r.anomaly.is_anomaly).collect();
        assert_eq!(flagged.len(), 1);

        let summary = AnalysisSummary::from_reports(reports.values());
        assert_eq!(summary.total_addresses, 10);
        assert_eq!(summary.high_risk, 1);
        assert_eq!(summary.anomalies_detected, 1);
        // 1 accepted + 1 failed for the same user: 2 + 3 - 2 = 3
        assert_eq!(reports["192.168.0.3"].risk.risk_score, 3);
        assert_eq!(summary.low_risk, 9);
    }

    #[test]
    fn test_assess_rejects_mismatched_keys() {
        let mut features = BTreeMap::new();
        for (key, failed) in [("a", 1), ("b", 4)] {
            let mut fv = FeatureVector::new("10.0.0.1");
            fv.failed_attempts = failed;
            features.insert(key.to_string(), fv);
        }

        assert_eq!(
            test_analyzer().assess(features),
            Err(AnalysisError::Detector(DetectorError::DuplicateAddress(
                "10.0.0.1".to_string()
            )))
        );
    }

    #[test]
    fn test_repeatable_across_calls() {
        let lines: Vec<String> = (0..20)
            .map(|i| failed_line(&format!("u{}", i % 4), &format!("10.1.0.{}", i % 7)))
            .collect();
        let analyzer = test_analyzer();
        assert_eq!(analyzer.analyze(&lines).unwrap(), analyzer.analyze(&lines).unwrap());
    }
}
