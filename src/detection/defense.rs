//! Maps risk levels to recommended defensive actions

use crate::models::{DefensePlan, RiskAssessment, RiskLevel};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefenseAction {
    BlockAddress(String),
    EnableBruteForceProtection,
    RaiseSecurityAlert,
    MonitorAddress(String),
    IncreaseLogVerbosity,
    NoActionRequired,
}

impl fmt::Display for DefenseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefenseAction::BlockAddress(address) => write!(
                f,
                "Block IP using firewall: sudo iptables -A INPUT -s {} -j DROP",
                address
            ),
            DefenseAction::EnableBruteForceProtection => {
                f.write_str("Enable fail2ban rule for SSH brute force")
            }
            DefenseAction::RaiseSecurityAlert => f.write_str("Trigger security alert to SOC team"),
            DefenseAction::MonitorAddress(address) => write!(f, "Monitor IP {} closely", address),
            DefenseAction::IncreaseLogVerbosity => {
                f.write_str("Increase logging verbosity for SSH service")
            }
            DefenseAction::NoActionRequired => f.write_str("No immediate action required"),
        }
    }
}

/// The ordered action table for a risk level
pub fn actions_for(level: RiskLevel, address: &str) -> Vec<DefenseAction> {
    match level {
        RiskLevel::High => vec![
            DefenseAction::BlockAddress(address.to_string()),
            DefenseAction::EnableBruteForceProtection,
            DefenseAction::RaiseSecurityAlert,
        ],
        RiskLevel::Medium => vec![
            DefenseAction::MonitorAddress(address.to_string()),
            DefenseAction::IncreaseLogVerbosity,
        ],
        RiskLevel::Low => vec![DefenseAction::NoActionRequired],
    }
}

pub fn advise(assessment: &RiskAssessment) -> Vec<String> {
    actions_for(assessment.risk_level, &assessment.address)
        .iter()
        .map(ToString::to_string)
        .collect()
}

pub fn plan(assessment: &RiskAssessment) -> DefensePlan {
    DefensePlan {
        address: assessment.address.clone(),
        actions: advise(assessment),
    }
}
