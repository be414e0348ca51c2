pub mod assessment;
pub mod event;

pub use assessment::{
    AnalysisSummary, AnomalyResult, DefensePlan, FeatureVector, RiskAssessment, RiskLevel,
    ThreatReport,
};
pub use event::{AuthKind, AuthOutcome, ParsedEvent};
