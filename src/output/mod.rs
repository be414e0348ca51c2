use crate::models::{AnalysisSummary, ThreatReport};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Output handler for threat reports
pub struct OutputHandler {
    format: OutputFormat,
    writer: Box<dyn Write + Send>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Console,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "jsonl" => OutputFormat::Jsonl,
            "console" => OutputFormat::Console,
            _ => OutputFormat::Jsonl, // Default
        }
    }
}

impl OutputHandler {
    /// Create a new output handler. Console output always goes to stdout.
    pub fn new(format: OutputFormat, file_path: Option<PathBuf>) -> Result<Self, OutputError> {
        let writer: Box<dyn Write + Send> = match (&format, file_path) {
            (OutputFormat::Console, _) | (_, None) => Box::new(io::stdout()),
            (_, Some(path)) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Box::new(BufWriter::new(file))
            }
        };

        Ok(OutputHandler { format, writer })
    }

    /// Write to an arbitrary sink
    pub fn with_writer(format: OutputFormat, writer: Box<dyn Write + Send>) -> Self {
        OutputHandler { format, writer }
    }

    pub fn write_report(&mut self, report: &ThreatReport) -> Result<(), OutputError> {
        let output = match self.format {
            OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(report)?),
            OutputFormat::Jsonl => format!("{}\n", serde_json::to_string(report)?),
            OutputFormat::Console => {
                let marker = if report.anomaly.is_anomaly { " [ANOMALY]" } else { "" };
                let mut line = format!(
                    "[{}] {} score={} failed={} success={} users={}{}\n",
                    report.risk.risk_level,
                    report.address,
                    report.risk.risk_score,
                    report.features.failed_attempts,
                    report.features.successful_logins,
                    report.features.unique_users_targeted,
                    marker
                );
                for action in &report.actions {
                    line.push_str(&format!("    - {}\n", action));
                }
                line
            }
        };
        self.write_output(&output)
    }

    pub fn write_reports<'a, I>(&mut self, reports: I) -> Result<usize, OutputError>
    where
        I: IntoIterator<Item = &'a ThreatReport>,
    {
        let mut written = 0;
        for report in reports {
            self.write_report(report)?;
            written += 1;
        }
        Ok(written)
    }

    pub fn write_summary(&mut self, summary: &AnalysisSummary) -> Result<(), OutputError> {
        let output = match self.format {
            OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(summary)?),
            OutputFormat::Jsonl => format!("{}\n", serde_json::to_string(summary)?),
            OutputFormat::Console => format!(
                "Addresses: {}, High: {}, Medium: {}, Low: {}, Anomalies: {}\n",
                summary.total_addresses,
                summary.high_risk,
                summary.medium_risk,
                summary.low_risk,
                summary.anomalies_detected
            ),
        };
        self.write_output(&output)
    }

    fn write_output(&mut self, data: &str) -> Result<(), OutputError> {
        self.writer.write_all(data.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    /// Flush any buffered output
    pub fn flush(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Last written report per address, used to skip reports that are
/// unchanged since the previous analysis of the same log
#[derive(Debug, Default)]
pub struct ReportCache {
    last_written: HashMap<String, ThreatReport>,
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports that are new or differ from what was last returned for
    /// their address. Returned reports are remembered.
    pub fn changed<'a, I>(&mut self, reports: I) -> Vec<&'a ThreatReport>
    where
        I: IntoIterator<Item = &'a ThreatReport>,
    {
        let mut changed = Vec::new();
        for report in reports {
            if self.last_written.get(&report.address) == Some(report) {
                continue;
            }
            self.last_written
                .insert(report.address.clone(), report.clone());
            changed.push(report);
        }
        changed
    }
}
