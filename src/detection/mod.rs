// Call-stack anomaly detection
//
// Detectors consume an array store and produce an AnomalyRun: one score per
// root call plus the trace-wide min/max/threshold. Three strategies:
//
// - StatisticalAnomalyDetector: per-position mean/std within each
//   (address, depth) group, two passes over the store
// - ModelAnomalyDetector: any AnomalyModel scoring the flattened arrays
// - MetadataAnomalyDetector: dimension check against a model's metadata,
//   used when the model itself cannot be applied
//
// Runs are handed to a ResultSink keyed by "Info/<name>" and
// "Results/<depth>", each score valid over [timestamp, timestamp + duration).

mod metadata;
mod model;
mod sink;
mod statistical;

pub use metadata::MetadataAnomalyDetector;
pub use model::ModelAnomalyDetector;
pub use sink::{ResultTimeline, TimelineEvent};
pub use statistical::{GroupKey, GroupStats, PositionStats, StatisticalAnomalyDetector};

use crate::cancellation::CancellationToken;
use crate::encoding::CallStackArray;
use crate::error::Result;
use crate::store::ArrayStore;
use aprender::primitives::Matrix;
use serde::Serialize;

pub const INFO_MIN_KEY: &str = "Info/min";
pub const INFO_MAX_KEY: &str = "Info/max";
pub const INFO_THRESHOLD_KEY: &str = "Info/threshold";

/// Time-indexed attribute store receiving detector output
pub trait ResultSink {
    fn set_value(&mut self, timestamp: i64, value: f64, key: &str);
    fn clear_value(&mut self, timestamp: i64, key: &str);
}

/// Anything that maps an encoded array to an anomaly score in [0, 1]
///
/// The input is a 1 x (2 * rows * cols) matrix: the offset matrix followed by
/// the self-time matrix, both row-major.
pub trait AnomalyModel {
    fn score(&self, input: &Matrix<f32>) -> f64;
}

impl<T: AnomalyModel + ?Sized> AnomalyModel for &T {
    fn score(&self, input: &Matrix<f32>) -> f64 {
        (**self).score(input)
    }
}

/// Strategy applied to a closed array store
pub trait CallStackDetector {
    fn name(&self) -> &'static str;

    /// Score every record in `store`; the read stream is closed on return
    fn apply(&self, store: &mut ArrayStore, cancel: &CancellationToken) -> Result<AnomalyRun>;
}

/// Score of one root call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyResult {
    pub address: u64,
    pub depth: u32,
    pub timestamp: i64,
    pub duration: i64,
    pub score: f64,
    pub anomalous: bool,
}

impl AnomalyResult {
    pub fn for_array(array: &CallStackArray, score: f64, anomalous: bool) -> Self {
        Self {
            address: array.address(),
            depth: array.depth(),
            timestamp: array.timestamp(),
            duration: array.duration(),
            score,
            anomalous,
        }
    }
}

/// Detector output for a whole trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRun {
    pub detector: &'static str,
    pub results: Vec<AnomalyResult>,
    pub min_score: f64,
    pub max_score: f64,
    pub threshold: f64,
}

impl AnomalyRun {
    pub fn anomalies(&self) -> impl Iterator<Item = &AnomalyResult> {
        self.results.iter().filter(|r| r.anomalous)
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies().count()
    }

    /// Earliest result timestamp, where the trace-wide values are written
    pub fn start_timestamp(&self) -> i64 {
        self.results.iter().map(|r| r.timestamp).min().unwrap_or(0)
    }
}

/// Key under which a result at `depth` is published
pub fn result_key(depth: u32) -> String {
    format!("Results/{}", depth)
}

/// Write a run into `sink`
///
/// Min, max and threshold go out once at the start of the trace; each result
/// is set at its timestamp and cleared at `timestamp + duration`.
pub fn publish<S: ResultSink + ?Sized>(run: &AnomalyRun, sink: &mut S) {
    let start = run.start_timestamp();
    sink.set_value(start, run.min_score, INFO_MIN_KEY);
    sink.set_value(start, run.max_score, INFO_MAX_KEY);
    sink.set_value(start, run.threshold, INFO_THRESHOLD_KEY);

    for result in &run.results {
        let key = result_key(result.depth);
        sink.set_value(result.timestamp, result.score, &key);
        sink.clear_value(result.timestamp + result.duration, &key);
    }

    tracing::debug!(
        detector = run.detector,
        results = run.results.len(),
        anomalies = run.anomaly_count(),
        "Anomaly run published"
    );
}

/// Whether a model built for `model_rows x model_cols` arrays can score
/// `trace_rows x trace_cols` arrays; both dimensions must match exactly
pub fn is_metadata_compatible(
    trace_rows: usize,
    trace_cols: usize,
    model_rows: usize,
    model_cols: usize,
) -> bool {
    trace_rows == model_rows && trace_cols == model_cols
}

/// Open the store for reading, feed every record to `visit`, then close it
///
/// The read stream is closed on every exit path.
pub(crate) fn scan_store<F>(
    store: &mut ArrayStore,
    cancel: &CancellationToken,
    mut visit: F,
) -> Result<()>
where
    F: FnMut(CallStackArray) -> Result<()>,
{
    store.init_read()?;
    let outcome = drain(store, cancel, &mut visit);
    store.close_read();
    outcome
}

fn drain<F>(store: &mut ArrayStore, cancel: &CancellationToken, visit: &mut F) -> Result<()>
where
    F: FnMut(CallStackArray) -> Result<()>,
{
    for record in store.records() {
        cancel.check()?;
        visit(record?)?;
    }
    Ok(())
}
