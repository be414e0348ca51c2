use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sentinel::alerting::{AlertDispatcher, AlertQueue, AlertTracker};
use sentinel::config::Config;
use sentinel::input::LogFileReader;
use sentinel::output::{OutputFormat, OutputHandler, ReportCache};
use sentinel::persistence::{SqliteThreatStore, ThreatRecord, ThreatStore};
use sentinel::{AnalysisError, AnalysisSummary, Analyzer};

/// Re-analyses the configured authentication log on a fixed interval
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting Sentinel daemon...");

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let mut config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };
    config.apply_env_overrides();

    let analyzer = Analyzer::new(config.detection.anomaly.clone())?;
    let reader = LogFileReader::new(&config.input.file_path);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let mut output_handler = OutputHandler::new(
        OutputFormat::from_str(&config.output.format),
        config.output.file_path.clone(),
    )?;

    let store = if config.persistence.enabled {
        log::info!("Persisting threat records to {:?}", config.persistence.db_path);
        Some(SqliteThreatStore::new(&config.persistence.db_path)?)
    } else {
        None
    };

    // Alerts are dispatched from a background runtime so slow webhooks
    // never hold up analysis.
    let runtime = tokio::runtime::Runtime::new()?;
    let alert_queue = if config.alerting.enabled {
        let (tx, rx) = AlertDispatcher::create_channel();
        let dispatcher = AlertDispatcher::new(config.alerting.clone());
        runtime.spawn(dispatcher.run(rx));
        Some(AlertQueue::new(tx))
    } else {
        None
    };

    let mut report_cache = ReportCache::new();
    let mut alert_tracker = AlertTracker::new();

    let interval = Duration::from_secs(config.daemon.interval_seconds.max(1));
    log::info!(
        "Analysing {:?} every {}s. Press Ctrl+C to stop.",
        config.input.file_path,
        interval.as_secs()
    );

    while running.load(Ordering::SeqCst) {
        if let Err(e) = run_analysis(
            &analyzer,
            &reader,
            &config,
            &mut output_handler,
            &mut report_cache,
            &mut alert_tracker,
            store.as_ref(),
            alert_queue.as_ref(),
        ) {
            log::error!("Analysis run failed: {}", e);
        }

        // Sleep in short steps so shutdown stays responsive
        let deadline = Instant::now() + interval;
        while running.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    output_handler.flush()?;
    drop(alert_queue);
    runtime.shutdown_timeout(Duration::from_secs(5));
    log::info!("Sentinel daemon stopped");
    Ok(())
}

/// One full pass over the log file. Only reports that changed since the
/// previous pass are written, and only escalations are alerted.
fn run_analysis(
    analyzer: &Analyzer,
    reader: &LogFileReader,
    config: &Config,
    output_handler: &mut OutputHandler,
    report_cache: &mut ReportCache,
    alert_tracker: &mut AlertTracker,
    store: Option<&SqliteThreatStore>,
    alert_queue: Option<&AlertQueue>,
) -> Result<(), Box<dyn std::error::Error>> {
    let lines = reader.read_lines()?;

    let reports = match analyzer.analyze(&lines) {
        Ok(reports) => reports,
        Err(AnalysisError::NoData) => {
            log::warn!("No valid log entries found in {:?}", reader.path());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let changed = report_cache.changed(reports.values());
    output_handler.write_reports(changed.iter().copied())?;

    if let Some(store) = store {
        let now = chrono::Utc::now();
        let records: Vec<ThreatRecord> = reports
            .values()
            .map(|report| ThreatRecord::from_report(report, now))
            .collect();
        store.upsert_all(&records)?;
    }

    if let Some(queue) = alert_queue {
        for report in reports.values() {
            if alert_tracker.should_dispatch(&config.alerting, report) {
                log::warn!(
                    "THREAT DETECTED: {} level {} score {} anomaly {}",
                    report.address,
                    report.risk.risk_level,
                    report.risk.risk_score,
                    report.anomaly.is_anomaly
                );
                queue.queue_alert(report.clone());
            }
        }
    }

    let summary = AnalysisSummary::from_reports(reports.values());
    log::info!(
        "Analysed {} address(es): {} high, {} medium, {} low, {} anomalous",
        summary.total_addresses,
        summary.high_risk,
        summary.medium_risk,
        summary.low_risk,
        summary.anomalies_detected
    );

    Ok(())
}
