//! Isolation forest outlier detection over per-address feature vectors
//!
//! Anomalies are easier to isolate with random axis-aligned splits than
//! normal points, so they end up with shorter average path lengths across
//! an ensemble of random trees.
//!
//! Every point of the batch is scored against every tree, then the
//! `ceil(contamination * N)` highest scoring addresses are flagged. Ranking
//! by score rather than thresholding an absolute value keeps the flagged
//! fraction fixed regardless of how spread out the batch is.
//!
//! All randomness comes from per-tree ChaCha streams derived from the
//! configured seed: identical input sets and configuration always produce
//! identical output.

use crate::models::{AnomalyResult, FeatureVector};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_CONTAMINATION: f64 = 0.2;
pub const DEFAULT_TREE_COUNT: usize = 100;
pub const DEFAULT_SUBSAMPLE_SIZE: usize = 256;
pub const DEFAULT_SEED: u64 = 42;

const EULER_GAMMA: f64 = 0.5772156649;

/// Guards `ceil(contamination * N)` against products like 0.7 * 10 = 7.000000000000001
const FLAG_COUNT_RELATIVE_TOLERANCE: f64 = 1e-12;

/// Score reported for a lone point, which has nothing to be isolated from
const NEUTRAL_SCORE: f64 = 0.5;

type Point = [f64; 3];

/// Errors raised when the detector is misconfigured
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("Contamination must be in (0, 1], got {0}")]
    InvalidContamination(f64),

    #[error("Tree count must be at least 1, got {0}")]
    InvalidTreeCount(usize),

    #[error("Subsample size must be at least 1, got {0}")]
    InvalidSubsampleSize(usize),

    #[error("Address {0} appears more than once in the batch")]
    DuplicateAddress(String),
}

/// Isolation forest parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Assumed fraction of anomalous addresses in a batch
    pub contamination: f64,
    /// Number of isolation trees in the ensemble
    pub tree_count: usize,
    /// Upper bound on the points drawn for each tree
    pub subsample_size: usize,
    /// Seed for every random draw
    pub seed: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            contamination: DEFAULT_CONTAMINATION,
            tree_count: DEFAULT_TREE_COUNT,
            subsample_size: DEFAULT_SUBSAMPLE_SIZE,
            seed: DEFAULT_SEED,
        }
    }
}

impl DetectorConfig {
    pub fn new(contamination: f64, tree_count: usize, seed: u64) -> Self {
        DetectorConfig {
            contamination,
            tree_count,
            seed,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), DetectorError> {
        // Written so that NaN fails as well
        if !(self.contamination > 0.0 && self.contamination <= 1.0) {
            return Err(DetectorError::InvalidContamination(self.contamination));
        }
        if self.tree_count < 1 {
            return Err(DetectorError::InvalidTreeCount(self.tree_count));
        }
        if self.subsample_size < 1 {
            return Err(DetectorError::InvalidSubsampleSize(self.subsample_size));
        }
        Ok(())
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
///
/// `c(n) = 2 * (ln(n - 1) + gamma) - 2 * (n - 1) / n` for `n > 1`, else 0.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
}

/// Number of addresses flagged for a batch of `n`: `ceil(contamination * n)`
/// clamped to `[1, n]`.
///
/// A product within a relative `1e-12` of an integer is taken as that
/// integer, so `0.1 * 30` flags 3 rather than 4.
pub fn flagged_count(contamination: f64, n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let product = contamination * n as f64;
    let nearest = product.round();
    let raw = if (product - nearest).abs() <= product.abs() * FLAG_COUNT_RELATIVE_TOLERANCE {
        nearest
    } else {
        product.ceil()
    };
    (raw.max(1.0) as usize).min(n)
}

#[derive(Debug, Clone)]
enum IsolationNode {
    Internal {
        dimension: usize,
        split: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationNode {
    fn path_length(&self, point: &Point, depth: usize) -> f64 {
        match self {
            IsolationNode::Internal {
                dimension,
                split,
                left,
                right,
            } => {
                if point[*dimension] < *split {
                    left.path_length(point, depth + 1)
                } else {
                    right.path_length(point, depth + 1)
                }
            }
            IsolationNode::Leaf { size } => depth as f64 + average_path_length(*size),
        }
    }
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: IsolationNode,
}

impl IsolationTree {
    /// Build a tree over `points[i]` for each `i` in `sample`
    fn build(points: &[Point], sample: &[usize], max_depth: usize, rng: &mut ChaCha8Rng) -> Self {
        IsolationTree {
            root: Self::build_node(points, sample, 0, max_depth, rng),
        }
    }

    fn build_node(
        points: &[Point],
        indices: &[usize],
        depth: usize,
        max_depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> IsolationNode {
        if indices.len() <= 1 || depth >= max_depth {
            return IsolationNode::Leaf {
                size: indices.len(),
            };
        }

        let mut bounds = [(f64::INFINITY, f64::NEG_INFINITY); 3];
        for &i in indices {
            for (d, (min, max)) in bounds.iter_mut().enumerate() {
                *min = min.min(points[i][d]);
                *max = max.max(points[i][d]);
            }
        }

        // Dimensions that can still separate something
        let splittable: Vec<usize> = (0..bounds.len())
            .filter(|&d| bounds[d].0 < bounds[d].1)
            .collect();
        if splittable.is_empty() {
            return IsolationNode::Leaf {
                size: indices.len(),
            };
        }

        let dimension = splittable[rng.gen_range(0..splittable.len())];
        let (min, max) = bounds[dimension];
        let split = loop {
            let candidate = rng.gen_range(min..max);
            if candidate > min && candidate < max {
                break candidate;
            }
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| points[i][dimension] < split);

        IsolationNode::Internal {
            dimension,
            split,
            left: Box::new(Self::build_node(points, &left, depth + 1, max_depth, rng)),
            right: Box::new(Self::build_node(points, &right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, point: &Point) -> f64 {
        self.root.path_length(point, 0)
    }
}

/// Seeded isolation forest over a batch of feature vectors
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    /// Create a detector, rejecting invalid configuration up front
    pub fn new(config: DetectorConfig) -> Result<Self, DetectorError> {
        config.validate()?;
        Ok(AnomalyDetector { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Flag the most isolated addresses in the batch.
    ///
    /// The result depends only on the set of vectors, not their order.
    /// A batch of one is never flagged: there is nothing to compare it to.
    /// Addresses must be unique within the batch.
    pub fn detect(
        &self,
        vectors: &[FeatureVector],
    ) -> Result<BTreeMap<String, AnomalyResult>, DetectorError> {
        let mut ordered: Vec<&FeatureVector> = vectors.iter().collect();
        ordered.sort_by(|a, b| a.address.cmp(&b.address));

        if let Some(pair) = ordered.windows(2).find(|pair| pair[0].address == pair[1].address) {
            return Err(DetectorError::DuplicateAddress(pair[0].address.clone()));
        }

        match ordered.len() {
            0 => return Ok(BTreeMap::new()),
            1 => {
                let address = ordered[0].address.clone();
                let result = AnomalyResult {
                    address: address.clone(),
                    is_anomaly: false,
                    anomaly_score: NEUTRAL_SCORE,
                };
                return Ok(BTreeMap::from([(address, result)]));
            }
            _ => {}
        }

        let points: Vec<Point> = ordered.iter().map(|fv| fv.as_point()).collect();
        let scores = self.score_points(&points);

        let mut ranked: Vec<usize> = (0..points.len()).collect();
        ranked.sort_by(|&a, &b| {
            scores[b]
                .total_cmp(&scores[a])
                .then_with(|| ordered[a].address.cmp(&ordered[b].address))
        });

        let flag_count = flagged_count(self.config.contamination, points.len());
        let mut flagged = vec![false; points.len()];
        for &i in ranked.iter().take(flag_count) {
            flagged[i] = true;
        }

        log::debug!(
            "Isolation forest flagged {} of {} address(es) ({} trees, seed {})",
            flag_count,
            points.len(),
            self.config.tree_count,
            self.config.seed
        );

        Ok(ordered
            .iter()
            .enumerate()
            .map(|(i, fv)| {
                (
                    fv.address.clone(),
                    AnomalyResult {
                        address: fv.address.clone(),
                        is_anomaly: flagged[i],
                        anomaly_score: scores[i],
                    },
                )
            })
            .collect())
    }

    /// Normalised anomaly score `2^(-E[h(x)] / c(psi))` for every point
    fn score_points(&self, points: &[Point]) -> Vec<f64> {
        let psi = self.config.subsample_size.min(points.len());
        let max_depth = (psi as f64).log2().ceil() as usize;

        let trees: Vec<IsolationTree> = (0..self.config.tree_count)
            .map(|t| {
                let mut rng = self.tree_rng(t);
                let sample = index::sample(&mut rng, points.len(), psi).into_vec();
                IsolationTree::build(points, &sample, max_depth, &mut rng)
            })
            .collect();

        let normaliser = average_path_length(psi);
        points
            .iter()
            .map(|point| {
                let total: f64 = trees.iter().map(|tree| tree.path_length(point)).sum();
                let avg_path_length = total / trees.len() as f64;
                2f64.powf(-avg_path_length / normaliser)
            })
            .collect()
    }

    /// Independent stream per tree, all derived from the configured seed
    fn tree_rng(&self, tree_index: usize) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        rng.set_stream(tree_index as u64);
        rng
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        AnomalyDetector {
            config: DetectorConfig::default(),
        }
    }
}

/// One-shot detection with explicit parameters
pub fn detect(
    vectors: &[FeatureVector],
    contamination: f64,
    tree_count: usize,
    seed: u64,
) -> Result<BTreeMap<String, AnomalyResult>, DetectorError> {
    let detector = AnomalyDetector::new(DetectorConfig::new(contamination, tree_count, seed))?;
    detector.detect(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_vector(address: &str, failed: u32, success: u32, unique: u32) -> FeatureVector {
        FeatureVector {
            address: address.to_string(),
            failed_attempts: failed,
            successful_logins: success,
            unique_users_targeted: unique,
        }
    }

    /// Nine ordinary addresses and one hammering the server
    fn population_with_outlier() -> Vec<FeatureVector> {
        vec![
            create_vector("10.0.0.1", 1, 1, 1),
            create_vector("10.0.0.2", 2, 1, 1),
            create_vector("10.0.0.3", 1, 0, 1),
            create_vector("10.0.0.4", 2, 1, 2),
            create_vector("10.0.0.5", 1, 1, 1),
            create_vector("10.0.0.6", 0, 1, 1),
            create_vector("10.0.0.7", 2, 0, 1),
            create_vector("10.0.0.8", 1, 1, 1),
            create_vector("10.0.0.9", 1, 2, 1),
            create_vector("203.0.113.66", 250, 0, 30),
        ]
    }

    fn varied_population(n: u32) -> Vec<FeatureVector> {
        (0..n)
            .map(|i| create_vector(&format!("10.0.1.{}", i), i % 5, i % 3, i % 4))
            .collect()
    }

    fn flagged_addresses(results: &BTreeMap<String, AnomalyResult>) -> Vec<String> {
        results
            .values()
            .filter(|r| r.is_anomaly)
            .map(|r| r.address.clone())
            .collect()
    }

    fn max_depth(node: &IsolationNode) -> usize {
        match node {
            IsolationNode::Internal { left, right, .. } => 1 + max_depth(left).max(max_depth(right)),
            IsolationNode::Leaf { .. } => 0,
        }
    }

    fn leaf_total(node: &IsolationNode) -> usize {
        match node {
            IsolationNode::Internal { left, right, .. } => leaf_total(left) + leaf_total(right),
            IsolationNode::Leaf { size } => *size,
        }
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(0), 0.0);
        assert_eq!(average_path_length(1), 0.0);
        assert!((average_path_length(2) - 0.1544313298).abs() < 1e-9);
        assert!((average_path_length(256) - 10.244770920).abs() < 1e-6);
    }

    #[test]
    fn test_config_validation() {
        assert!(DetectorConfig::default().validate().is_ok());
        assert!(DetectorConfig::new(1.0, 1, 0).validate().is_ok());

        assert_eq!(
            DetectorConfig::new(0.0, 10, 0).validate(),
            Err(DetectorError::InvalidContamination(0.0))
        );
        assert_eq!(
            DetectorConfig::new(1.5, 10, 0).validate(),
            Err(DetectorError::InvalidContamination(1.5))
        );
        assert!(DetectorConfig::new(f64::NAN, 10, 0).validate().is_err());
        assert_eq!(
            DetectorConfig::new(0.1, 0, 0).validate(),
            Err(DetectorError::InvalidTreeCount(0))
        );

        let config = DetectorConfig {
            subsample_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(DetectorError::InvalidSubsampleSize(0)));
    }

    #[test]
    fn test_misconfiguration_fails_before_detection() {
        assert!(AnomalyDetector::new(DetectorConfig::new(-0.1, 10, 1)).is_err());
        assert!(detect(&population_with_outlier(), 0.1, 0, 1).is_err());
    }

    #[test]
    fn test_flagged_count() {
        assert_eq!(flagged_count(0.1, 10), 1);
        assert_eq!(flagged_count(0.2, 5), 1);
        assert_eq!(flagged_count(0.7, 10), 7);
        assert_eq!(flagged_count(0.25, 10), 3);
        assert_eq!(flagged_count(1.0, 4), 4);
        assert_eq!(flagged_count(0.001, 3), 1);
        assert_eq!(flagged_count(0.5, 1), 0);
        assert_eq!(flagged_count(0.5, 0), 0);
        assert_eq!(flagged_count(0.1, 30), 3);
        assert_eq!(flagged_count(0.30000000005, 10), 4);
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let vectors = vec![
            create_vector("10.0.0.1", 1, 0, 1),
            create_vector("10.0.0.2", 2, 0, 1),
            create_vector("10.0.0.1", 9, 0, 3),
            create_vector("10.0.0.3", 3, 1, 1),
        ];
        assert_eq!(
            detect(&vectors, 0.5, 10, 42),
            Err(DetectorError::DuplicateAddress("10.0.0.1".to_string()))
        );
    }

    #[test]
    fn test_empty_batch() {
        assert!(detect(&[], 0.1, 10, 42).unwrap().is_empty());
    }

    #[test]
    fn test_single_address_never_flagged() {
        let results = detect(&[create_vector("10.0.0.1", 500, 0, 50)], 1.0, 10, 42).unwrap();
        assert_eq!(results.len(), 1);
        assert!(!results["10.0.0.1"].is_anomaly);
        assert_eq!(results["10.0.0.1"].anomaly_score, NEUTRAL_SCORE);
    }

    #[test]
    fn test_extreme_address_is_the_only_anomaly() {
        let results = detect(&population_with_outlier(), 0.1, 100, 42).unwrap();
        assert_eq!(results.len(), 10);
        assert_eq!(flagged_addresses(&results), vec!["203.0.113.66".to_string()]);
    }

    #[test]
    fn test_extreme_address_flagged_across_seeds() {
        for seed in [0, 1, 7, 42, 1337, u64::MAX] {
            let results = detect(&population_with_outlier(), 0.1, 100, seed).unwrap();
            assert_eq!(
                flagged_addresses(&results),
                vec!["203.0.113.66".to_string()],
                "seed {}",
                seed
            );
        }
    }

    #[test]
    fn test_outlier_has_highest_score() {
        let results = detect(&population_with_outlier(), 0.1, 100, 42).unwrap();
        let outlier_score = results["203.0.113.66"].anomaly_score;
        for result in results.values().filter(|r| r.address != "203.0.113.66") {
            assert!(result.anomaly_score < outlier_score);
        }
        for result in results.values() {
            assert!(result.anomaly_score > 0.0 && result.anomaly_score <= 1.0);
        }
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let vectors = varied_population(40);
        let first = detect(&vectors, 0.2, 10, 7).unwrap();
        let second = detect(&vectors, 0.2, 10, 7).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_independent_of_input_order() {
        let vectors = varied_population(30);
        let mut reversed = vectors.clone();
        reversed.reverse();

        let forward = detect(&vectors, 0.2, 10, 99).unwrap();
        let backward = detect(&reversed, 0.2, 10, 99).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_flags_exactly_contamination_share() {
        let vectors = varied_population(20);
        for (contamination, expected) in [(0.05, 1), (0.1, 2), (0.25, 5), (0.7, 14), (1.0, 20)] {
            let results = detect(&vectors, contamination, 10, 3).unwrap();
            assert_eq!(results.len(), 20);
            assert_eq!(
                flagged_addresses(&results).len(),
                expected,
                "contamination {}",
                contamination
            );
        }
    }

    #[test]
    fn test_identical_points_tie_break_by_address() {
        let vectors: Vec<FeatureVector> = ["10.0.0.3", "10.0.0.1", "10.0.0.5", "10.0.0.2", "10.0.0.4"]
            .iter()
            .map(|a| create_vector(a, 3, 1, 2))
            .collect();

        let results = detect(&vectors, 0.2, 10, 42).unwrap();
        for result in results.values() {
            // Every tree is a single leaf holding all five points
            assert!((result.anomaly_score - 0.5).abs() < 1e-12);
        }
        assert_eq!(flagged_addresses(&results), vec!["10.0.0.1".to_string()]);
    }

    #[test]
    fn test_subsample_smaller_than_batch() {
        let config = DetectorConfig {
            contamination: 0.1,
            tree_count: 25,
            subsample_size: 8,
            seed: 5,
        };
        let detector = AnomalyDetector::new(config).unwrap();
        let vectors = varied_population(50);
        let results = detector.detect(&vectors).unwrap();

        // Points outside a tree's subsample are still scored
        assert_eq!(results.len(), 50);
        assert_eq!(flagged_addresses(&results).len(), 5);
    }

    #[test]
    fn test_tree_respects_depth_limit_and_sample() {
        let points: Vec<Point> = varied_population(64).iter().map(|fv| fv.as_point()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let sample = index::sample(&mut rng, points.len(), 16).into_vec();

        let tree = IsolationTree::build(&points, &sample, 4, &mut rng);
        assert!(max_depth(&tree.root) <= 4);
        assert_eq!(leaf_total(&tree.root), 16);
    }

    #[test]
    fn test_tree_streams_differ() {
        let detector = AnomalyDetector::new(DetectorConfig::default()).unwrap();
        let a: u64 = detector.tree_rng(0).gen();
        let b: u64 = detector.tree_rng(1).gen();
        let a_again: u64 = detector.tree_rng(0).gen();
        assert_ne!(a, b);
        assert_eq!(a, a_again);
    }
}
