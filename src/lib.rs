pub mod alerting;
pub mod config;
pub mod detection;
pub mod input;
pub mod models;
pub mod output;
pub mod persistence;
pub mod pipeline;

// Re-export commonly used types
pub use alerting::{AlertDispatcher, AlertQueue, AlertTracker};
pub use detection::{AnomalyDetector, DetectorConfig, DetectorError};
pub use models::{AnalysisSummary, FeatureVector, RiskLevel, ThreatReport};
pub use persistence::{SqliteThreatStore, ThreatRecord, ThreatStore};
pub use pipeline::{analyze, AnalysisError, Analyzer, ThreatAnalysis};
