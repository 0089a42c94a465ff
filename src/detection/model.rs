// Detector backed by an external anomaly model

use super::{scan_store, AnomalyModel, AnomalyResult, AnomalyRun, CallStackDetector};
use crate::cancellation::CancellationToken;
use crate::error::Result;
use crate::store::ArrayStore;

/// Scores every record with `model`; scores above `threshold` are anomalies
pub struct ModelAnomalyDetector<M> {
    model: M,
    threshold: f64,
}

impl<M: AnomalyModel> ModelAnomalyDetector<M> {
    pub fn new(model: M, threshold: f64) -> Self {
        Self { model, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl<M: AnomalyModel> CallStackDetector for ModelAnomalyDetector<M> {
    fn name(&self) -> &'static str {
        "model"
    }

    fn apply(&self, store: &mut ArrayStore, cancel: &CancellationToken) -> Result<AnomalyRun> {
        let _span = tracing::info_span!("model_scoring", threshold = self.threshold).entered();

        let mut results = Vec::new();
        let mut min_score = f64::INFINITY;
        let mut max_score = f64::NEG_INFINITY;
        scan_store(store, cancel, |array| {
            let input = array.model_input()?;
            let score = self.model.score(&input);
            min_score = min_score.min(score);
            max_score = max_score.max(score);
            results.push(AnomalyResult::for_array(
                &array,
                score,
                score > self.threshold,
            ));
            Ok(())
        })?;

        if results.is_empty() {
            min_score = 0.0;
            max_score = 0.0;
        }

        Ok(AnomalyRun {
            detector: self.name(),
            results,
            min_score,
            max_score,
            threshold: self.threshold,
        })
    }
}
