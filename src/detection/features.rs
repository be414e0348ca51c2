//! Per-address feature aggregation
//!
//! A single pass over a batch of authentication outcomes. Counters are
//! commutative and username insertion is idempotent, so the result does not
//! depend on the order of the input.

use crate::models::{AuthKind, AuthOutcome, FeatureVector};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Build one feature vector per address seen in `outcomes`
pub fn aggregate<'a, I>(outcomes: I) -> BTreeMap<String, FeatureVector>
where
    I: IntoIterator<Item = &'a AuthOutcome>,
{
    let mut vectors: BTreeMap<String, FeatureVector> = BTreeMap::new();
    let mut users_targeted: HashMap<String, HashSet<&'a str>> = HashMap::new();

    for outcome in outcomes {
        let fv = vectors
            .entry(outcome.address.clone())
            .or_insert_with(|| FeatureVector::new(outcome.address.clone()));

        match outcome.kind {
            AuthKind::Failed => fv.failed_attempts += 1,
            AuthKind::Succeeded => fv.successful_logins += 1,
        }

        users_targeted
            .entry(outcome.address.clone())
            .or_default()
            .insert(outcome.username.as_str());
    }

    for (address, users) in users_targeted {
        if let Some(fv) = vectors.get_mut(&address) {
            fv.unique_users_targeted = users.len() as u32;
        }
    }

    log::debug!("Aggregated features for {} address(es)", vectors.len());
    vectors
}
