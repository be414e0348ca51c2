//! SQLite implementation of the ThreatStore trait

use super::{PersistenceError, ThreatRecord, ThreatStore};
use crate::models::RiskLevel;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SELECT_COLUMNS: &str = "SELECT address, risk_score, risk_level, failed_attempts,
        successful_logins, unique_users_targeted, anomaly_detected, analyzed_at
     FROM threats";

/// SQLite-based threat storage
pub struct SqliteThreatStore {
    conn: Mutex<Connection>,
}

impl SqliteThreatStore {
    /// Create a new SQLite store at the specified path
    ///
    /// Creates the database file and initializes the schema if it doesn't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, PersistenceError> {
        let conn = Connection::open(db_path)?;
        let store = SqliteThreatStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (useful for testing)
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteThreatStore {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)
    }

    fn insert(conn: &Connection, record: &ThreatRecord) -> Result<(), PersistenceError> {
        conn.execute(
            "INSERT OR REPLACE INTO threats
             (address, risk_score, risk_level, failed_attempts, successful_logins,
              unique_users_targeted, anomaly_detected, analyzed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.address,
                record.risk_score,
                record.risk_level.as_str(),
                record.failed_attempts,
                record.successful_logins,
                record.unique_users_targeted,
                record.anomaly_detected,
                record.analyzed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Raw column values; converted outside the rusqlite closure so that
    /// bad data maps to `InvalidData` rather than a driver error.
    fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            address: row.get(0)?,
            risk_score: row.get(1)?,
            risk_level: row.get(2)?,
            failed_attempts: row.get(3)?,
            successful_logins: row.get(4)?,
            unique_users_targeted: row.get(5)?,
            anomaly_detected: row.get(6)?,
            analyzed_at: row.get(7)?,
        })
    }
}

struct RawRecord {
    address: String,
    risk_score: i64,
    risk_level: String,
    failed_attempts: u32,
    successful_logins: u32,
    unique_users_targeted: u32,
    anomaly_detected: bool,
    analyzed_at: String,
}

impl RawRecord {
    fn into_record(self) -> Result<ThreatRecord, PersistenceError> {
        let risk_level: RiskLevel = self
            .risk_level
            .parse()
            .map_err(PersistenceError::InvalidData)?;
        let analyzed_at = DateTime::parse_from_rfc3339(&self.analyzed_at)
            .map_err(|_| {
                PersistenceError::InvalidData(format!("Invalid timestamp: {}", self.analyzed_at))
            })?
            .with_timezone(&Utc);

        Ok(ThreatRecord {
            address: self.address,
            risk_score: self.risk_score,
            risk_level,
            failed_attempts: self.failed_attempts,
            successful_logins: self.successful_logins,
            unique_users_targeted: self.unique_users_targeted,
            anomaly_detected: self.anomaly_detected,
            analyzed_at,
        })
    }
}

impl ThreatStore for SqliteThreatStore {
    fn upsert_threat(&self, record: &ThreatRecord) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        Self::insert(&conn, record)
    }

    fn upsert_all(&self, records: &[ThreatRecord]) -> Result<usize, PersistenceError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for record in records {
            Self::insert(&tx, record)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn get_threat(&self, address: &str) -> Result<Option<ThreatRecord>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} WHERE address = ?", SELECT_COLUMNS))?;

        match stmt.query_row(params![address], Self::read_row) {
            Ok(raw) => Ok(Some(raw.into_record()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_threats(&self) -> Result<Vec<ThreatRecord>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY address", SELECT_COLUMNS))?;

        let raw = stmt
            .query_map([], Self::read_row)?
            .collect::<Result<Vec<RawRecord>, _>>()?;

        raw.into_iter().map(RawRecord::into_record).collect()
    }

    fn clear_all(&self) -> Result<(), PersistenceError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM threats", [])?;
        Ok(())
    }
}
