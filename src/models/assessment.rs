use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Behavioural counters for one source address within a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub address: String,
    pub failed_attempts: u32,
    pub successful_logins: u32,
    pub unique_users_targeted: u32,
}

impl FeatureVector {
    pub fn new(address: impl Into<String>) -> Self {
        FeatureVector {
            address: address.into(),
            failed_attempts: 0,
            successful_logins: 0,
            unique_users_targeted: 0,
        }
    }

    /// The point the anomaly detector works on
    pub fn as_point(&self) -> [f64; 3] {
        [
            f64::from(self.failed_attempts),
            f64::from(self.successful_logins),
            f64::from(self.unique_users_targeted),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const HIGH_THRESHOLD: i64 = 10;
    pub const MEDIUM_THRESHOLD: i64 = 5;

    /// Map a risk score onto its level. Monotonic in `score`.
    pub fn from_score(score: i64) -> Self {
        if score >= Self::HIGH_THRESHOLD {
            RiskLevel::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub address: String,
    pub risk_score: i64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub address: String,
    pub is_anomaly: bool,
    /// Normalised isolation score in (0, 1]; higher is more isolated
    pub anomaly_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefensePlan {
    pub address: String,
    pub actions: Vec<String>,
}

/// Everything the pipeline concluded about one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatReport {
    pub address: String,
    pub features: FeatureVector,
    pub risk: RiskAssessment,
    pub anomaly: AnomalyResult,
    pub actions: Vec<String>,
}

/// Aggregate counts over a set of threat reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_addresses: usize,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
    pub anomalies_detected: usize,
}

impl AnalysisSummary {
    /// Tally one address
    pub fn record(&mut self, level: RiskLevel, is_anomaly: bool) {
        self.total_addresses += 1;
        match level {
            RiskLevel::High => self.high_risk += 1,
            RiskLevel::Medium => self.medium_risk += 1,
            RiskLevel::Low => self.low_risk += 1,
        }
        if is_anomaly {
            self.anomalies_detected += 1;
        }
    }

    pub fn from_reports<'a, I>(reports: I) -> Self
    where
        I: IntoIterator<Item = &'a ThreatReport>,
    {
        let mut summary = AnalysisSummary::default();
        for report in reports {
            summary.record(report.risk.risk_level, report.anomaly.is_anomaly);
        }
        summary
    }
}
