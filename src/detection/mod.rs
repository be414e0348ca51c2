pub mod defense;
pub mod features;
pub mod isolation_forest;
pub mod risk;

pub use defense::{advise, DefenseAction};
pub use features::aggregate;
pub use isolation_forest::{AnomalyDetector, DetectorConfig, DetectorError};
pub use risk::score;
