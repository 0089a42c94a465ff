//! Per-position statistical detector
//!
//! Records are grouped by their root call's (address, depth). Within a group,
//! every matrix position gets a mean and a sample (n - 1) standard deviation
//! across the group's records, independently for offsets and self-times. A
//! record is anomalous when any position of either matrix satisfies
//!
//! ```text
//! value - mean > n * std
//! ```
//!
//! A group with a single record has a standard deviation of zero.
//!
//! # Precision
//!
//! Statistics are computed in `f32` on values shifted by the group's first
//! record, so positions holding identical values reduce to exact zeros and
//! large timestamps do not lose their low digits.

use super::{scan_store, AnomalyResult, AnomalyRun, CallStackDetector};
use crate::cancellation::CancellationToken;
use crate::encoding::CallStackArray;
use crate::error::Result;
use crate::store::ArrayStore;
use aprender::primitives::Matrix;
use std::collections::BTreeMap;
use trueno::Vector;

/// Root call (address, depth)
pub type GroupKey = (u64, u32);

/// Two-pass detector with sensitivity `n_value`
#[derive(Debug, Clone)]
pub struct StatisticalAnomalyDetector {
    n_value: u32,
}

/// Mean and std of one matrix kind, per position
#[derive(Debug, Clone, PartialEq)]
pub struct PositionStats {
    reference: Vec<f64>,
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl PositionStats {
    fn from_samples(reference: Vec<f64>, samples: &[Vec<f32>]) -> Self {
        let width = reference.len();
        let mut mean = Vec::with_capacity(width);
        let mut std = Vec::with_capacity(width);
        let mut column = Vec::with_capacity(samples.len());
        for position in 0..width {
            column.clear();
            column.extend(samples.iter().map(|s| s[position]));
            let m = Vector::from_slice(&column).mean().unwrap_or(0.0);
            mean.push(m);
            std.push(sample_std(&column, m));
        }
        Self {
            reference,
            mean,
            std,
        }
    }

    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    pub fn std(&self) -> &[f32] {
        &self.std
    }

    /// Mean of the original values at `position`
    pub fn mean_value(&self, position: usize) -> f64 {
        self.reference[position] + f64::from(self.mean[position])
    }

    /// True when every position passes `value - mean <= n * std`
    fn accepts(&self, matrix: &Matrix<f64>, n: f32) -> bool {
        matrix
            .as_slice()
            .iter()
            .zip(&self.reference)
            .zip(self.mean.iter().zip(&self.std))
            .all(|((&value, &reference), (&mean, &std))| {
                ((value - reference) as f32) - mean <= n * std
            })
    }
}

/// Offset and self-time statistics of one (address, depth) group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub shape: (usize, usize),
    pub samples: usize,
    pub offsets: PositionStats,
    pub self_times: PositionStats,
}

struct GroupSamples {
    shape: (usize, usize),
    offset_reference: Vec<f64>,
    self_time_reference: Vec<f64>,
    offsets: Vec<Vec<f32>>,
    self_times: Vec<Vec<f32>>,
}

impl GroupSamples {
    fn start(array: &CallStackArray) -> Self {
        Self {
            shape: array.shape(),
            offset_reference: array.offsets().as_slice().to_vec(),
            self_time_reference: array.self_times().as_slice().to_vec(),
            offsets: Vec::new(),
            self_times: Vec::new(),
        }
    }

    fn push(&mut self, array: &CallStackArray) {
        self.offsets
            .push(shifted(array.offsets(), &self.offset_reference));
        self.self_times
            .push(shifted(array.self_times(), &self.self_time_reference));
    }

    fn into_stats(self) -> GroupStats {
        GroupStats {
            shape: self.shape,
            samples: self.offsets.len(),
            offsets: PositionStats::from_samples(self.offset_reference, &self.offsets),
            self_times: PositionStats::from_samples(self.self_time_reference, &self.self_times),
        }
    }
}

/// Standard deviation with Bessel's correction
fn sample_std(column: &[f32], mean: f32) -> f32 {
    let n = column.len();
    if n < 2 {
        return 0.0;
    }
    let deviations: Vec<f32> = column.iter().map(|&x| x - mean).collect();
    let sum_sq = Vector::from_slice(&deviations)
        .sum_of_squares()
        .unwrap_or(0.0);
    (sum_sq / (n - 1) as f32).sqrt()
}

fn shifted(matrix: &Matrix<f64>, reference: &[f64]) -> Vec<f32> {
    matrix
        .as_slice()
        .iter()
        .zip(reference)
        .map(|(&v, &r)| (v - r) as f32)
        .collect()
}

impl StatisticalAnomalyDetector {
    pub fn new(n_value: u32) -> Self {
        Self { n_value }
    }

    pub fn n_value(&self) -> u32 {
        self.n_value
    }

    /// First pass: per-group statistics over every record in the store
    pub fn collect_statistics(
        &self,
        store: &mut ArrayStore,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<GroupKey, GroupStats>> {
        let _span = tracing::info_span!("collect_statistics").entered();

        let mut groups: BTreeMap<GroupKey, GroupSamples> = BTreeMap::new();
        scan_store(store, cancel, |array| {
            let group = groups
                .entry((array.address(), array.depth()))
                .or_insert_with(|| GroupSamples::start(&array));
            if group.shape != array.shape() {
                tracing::warn!(
                    address = array.address(),
                    timestamp = array.timestamp(),
                    "Record shape {:?} differs from its group {:?}, skipped",
                    array.shape(),
                    group.shape
                );
                return Ok(());
            }
            group.push(&array);
            Ok(())
        })?;

        let stats: BTreeMap<GroupKey, GroupStats> = groups
            .into_iter()
            .map(|(key, samples)| (key, samples.into_stats()))
            .collect();
        tracing::debug!(groups = stats.len(), "Statistics collected");
        Ok(stats)
    }

    /// Score one record against its group's statistics
    pub fn is_anomalous(&self, array: &CallStackArray, stats: &GroupStats) -> bool {
        let n = self.n_value as f32;
        !(stats.offsets.accepts(array.offsets(), n)
            && stats.self_times.accepts(array.self_times(), n))
    }
}

impl CallStackDetector for StatisticalAnomalyDetector {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn apply(&self, store: &mut ArrayStore, cancel: &CancellationToken) -> Result<AnomalyRun> {
        let stats = self.collect_statistics(store, cancel)?;

        let _span = tracing::info_span!("statistical_scoring", n_value = self.n_value).entered();
        let mut results = Vec::new();
        scan_store(store, cancel, |array| {
            let Some(group) = stats.get(&(array.address(), array.depth())) else {
                return Ok(());
            };
            if group.shape != array.shape() {
                return Ok(());
            }
            let anomalous = self.is_anomalous(&array, group);
            let score = if anomalous { 1.0 } else { 0.0 };
            tracing::trace!(timestamp = array.timestamp(), score, "Record scored");
            results.push(AnomalyResult::for_array(&array, score, anomalous));
            Ok(())
        })?;

        Ok(AnomalyRun {
            detector: self.name(),
            results,
            min_score: 0.0,
            max_score: 1.0,
            threshold: 0.0,
        })
    }
}
