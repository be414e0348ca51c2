use std::path::PathBuf;
use structopt::StructOpt;

use sentinel::config::Config;
use sentinel::input::LogFileReader;
use sentinel::output::{OutputFormat, OutputHandler};
use sentinel::persistence::{SqliteThreatStore, ThreatRecord, ThreatStore};
use sentinel::{AnalysisError, AnalysisSummary, Analyzer};

/// Sentinel authentication log threat assessment
#[derive(StructOpt, Debug)]
#[structopt(name = "sentinel", about = "Authentication log threat assessment CLI")]
pub enum Cli {
    /// Analyse a log file once and print the threat reports
    Analyze {
        /// Path to the authentication log
        #[structopt(short, long)]
        file: PathBuf,
        /// Configuration file supplying detector settings
        #[structopt(short, long)]
        config: Option<PathBuf>,
        /// Output format: json, jsonl or console
        #[structopt(long, default_value = "console")]
        format: String,
        /// Also upsert results into this SQLite database
        #[structopt(long)]
        db: Option<PathBuf>,
    },
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
    /// Parse and display log events from a file
    Parse {
        /// Path to log file
        #[structopt(short, long)]
        file: PathBuf,
        /// Number of events to display
        #[structopt(short, long, default_value = "10")]
        lines: usize,
    },
    /// List stored threat records
    Threats {
        /// SQLite database written by the daemon or `analyze --db`
        #[structopt(long, default_value = "sentinel.db")]
        db: PathBuf,
        /// Show a single address
        #[structopt(short, long)]
        address: Option<String>,
    },
    /// Show risk level counts over stored threat records
    Summary {
        #[structopt(long, default_value = "sentinel.db")]
        db: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Analyze {
            file,
            config,
            format,
            db,
        } => {
            let settings = match config {
                Some(path) => Config::from_file(&path)?,
                None => Config::default(),
            };
            let analyzer = Analyzer::new(settings.detection.anomaly.clone())?;

            let lines = LogFileReader::new(&file).read_lines()?;
            let reports = match analyzer.analyze(&lines) {
                Ok(reports) => reports,
                Err(AnalysisError::NoData) => {
                    eprintln!("No valid log entries found in {:?}", file);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            };

            let mut output = OutputHandler::new(OutputFormat::from_str(&format), None)?;
            output.write_reports(reports.values())?;
            output.write_summary(&AnalysisSummary::from_reports(reports.values()))?;

            if let Some(db) = db {
                let store = SqliteThreatStore::new(&db)?;
                let now = chrono::Utc::now();
                let records: Vec<ThreatRecord> = reports
                    .values()
                    .map(|report| ThreatRecord::from_report(report, now))
                    .collect();
                let stored = store.upsert_all(&records)?;
                println!("Stored {} record(s) in {:?}", stored, db);
            }
        }
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Parse { file, lines } => {
            let reader = LogFileReader::new(&file);
            if !reader.is_valid() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }

            let events = reader.read_events()?;
            let display_count = std::cmp::min(lines, events.len());

            println!("Parsed {} event(s) (showing {}):\n", events.len(), display_count);
            for event in events.iter().take(display_count) {
                let auth = match sentinel::input::classify(event) {
                    Some(outcome) => format!(
                        "{:?} {} from {}",
                        outcome.kind, outcome.username, outcome.address
                    ),
                    None => "-".to_string(),
                };
                let timestamp = event
                    .timestamp_utc()
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| event.timestamp.clone());
                println!(
                    "  {} {} {}[{}] auth: {}",
                    timestamp, event.host, event.service, event.pid, auth
                );
            }
        }
        Cli::Threats { db, address } => {
            let store = SqliteThreatStore::new(&db)?;
            let records = match address {
                Some(address) => match store.get_threat(&address)? {
                    Some(record) => vec![record],
                    None => {
                        eprintln!("No record for {}", address);
                        std::process::exit(1);
                    }
                },
                None => store.list_threats()?,
            };
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Cli::Summary { db } => {
            let store = SqliteThreatStore::new(&db)?;
            println!("{}", serde_json::to_string_pretty(&store.summary()?)?);
        }
    }

    Ok(())
}
