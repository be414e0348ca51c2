//! Persistence module for threat records
//!
//! The analysis pipeline never touches storage. Callers convert its
//! reports into `ThreatRecord`s and hand them to a `ThreatStore`.

pub mod sqlite_store;

pub use sqlite_store::SqliteThreatStore;

use crate::models::{AnalysisSummary, RiskLevel, ThreatReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during persistence operations
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid data in database: {0}")]
    InvalidData(String),

    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// Latest known assessment of one address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub address: String,
    pub risk_score: i64,
    pub risk_level: RiskLevel,
    pub failed_attempts: u32,
    pub successful_logins: u32,
    pub unique_users_targeted: u32,
    pub anomaly_detected: bool,
    pub analyzed_at: DateTime<Utc>,
}

impl ThreatRecord {
    pub fn from_report(report: &ThreatReport, analyzed_at: DateTime<Utc>) -> Self {
        ThreatRecord {
            address: report.address.clone(),
            risk_score: report.risk.risk_score,
            risk_level: report.risk.risk_level,
            failed_attempts: report.features.failed_attempts,
            successful_logins: report.features.successful_logins,
            unique_users_targeted: report.features.unique_users_targeted,
            anomaly_detected: report.anomaly.is_anomaly,
            analyzed_at,
        }
    }
}

/// Trait for threat record storage backends
pub trait ThreatStore: Send + Sync {
    /// Insert a record, replacing any previous record for the same address
    fn upsert_threat(&self, record: &ThreatRecord) -> Result<(), PersistenceError>;

    /// Upsert a whole batch atomically
    fn upsert_all(&self, records: &[ThreatRecord]) -> Result<usize, PersistenceError>;

    fn get_threat(&self, address: &str) -> Result<Option<ThreatRecord>, PersistenceError>;

    /// All records, ordered by address
    fn list_threats(&self) -> Result<Vec<ThreatRecord>, PersistenceError>;

    /// Counts by risk level over every stored record
    fn summary(&self) -> Result<AnalysisSummary, PersistenceError> {
        let mut summary = AnalysisSummary::default();
        for record in self.list_threats()? {
            summary.record(record.risk_level, record.anomaly_detected);
        }
        Ok(summary)
    }

    /// Clear all data (useful for testing)
    fn clear_all(&self) -> Result<(), PersistenceError>;
}
