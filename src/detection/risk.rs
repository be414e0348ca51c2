//! Rule-based risk scoring
//!
//! `risk_score = failed * 2 + unique_users * 3 - successful * 2`

use crate::models::{FeatureVector, RiskAssessment, RiskLevel};

const FAILED_WEIGHT: i64 = 2;
const UNIQUE_USER_WEIGHT: i64 = 3;
const SUCCESS_WEIGHT: i64 = 2;

pub fn risk_score(fv: &FeatureVector) -> i64 {
    i64::from(fv.failed_attempts) * FAILED_WEIGHT
        + i64::from(fv.unique_users_targeted) * UNIQUE_USER_WEIGHT
        - i64::from(fv.successful_logins) * SUCCESS_WEIGHT
}

pub fn score(fv: &FeatureVector) -> RiskAssessment {
    let risk_score = risk_score(fv);
    RiskAssessment {
        address: fv.address.clone(),
        risk_score,
        risk_level: RiskLevel::from_score(risk_score),
    }
}
