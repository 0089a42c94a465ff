// Dimension-only fallback detector

use super::{scan_store, AnomalyResult, AnomalyRun, CallStackDetector};
use crate::cancellation::CancellationToken;
use crate::encoding::{CallStackArray, CallStackMetadata};
use crate::error::Result;
use crate::store::ArrayStore;

/// Flags records whose own dimensions exceed a model's
///
/// Unlike [`super::is_metadata_compatible`], a record fits when it is no larger
/// than the model in either dimension.
#[derive(Debug, Clone)]
pub struct MetadataAnomalyDetector {
    model_rows: usize,
    model_cols: usize,
}

impl MetadataAnomalyDetector {
    pub fn new(model_rows: usize, model_cols: usize) -> Self {
        Self {
            model_rows,
            model_cols,
        }
    }

    pub fn from_metadata(metadata: &CallStackMetadata) -> Self {
        Self::new(metadata.depth_size, metadata.address_size())
    }

    pub fn fits(&self, num_rows: usize, num_cols: usize) -> bool {
        num_rows <= self.model_rows && num_cols <= self.model_cols
    }

    pub fn score(&self, array: &CallStackArray) -> f64 {
        if self.fits(array.num_rows(), array.num_cols()) {
            0.0
        } else {
            1.0
        }
    }
}

impl CallStackDetector for MetadataAnomalyDetector {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn apply(&self, store: &mut ArrayStore, cancel: &CancellationToken) -> Result<AnomalyRun> {
        let _span = tracing::info_span!(
            "metadata_scoring",
            model_rows = self.model_rows,
            model_cols = self.model_cols
        )
        .entered();

        let mut results = Vec::new();
        scan_store(store, cancel, |array| {
            let score = self.score(&array);
            results.push(AnomalyResult::for_array(&array, score, score >= 1.0));
            Ok(())
        })?;

        Ok(AnomalyRun {
            detector: self.name(),
            results,
            min_score: 0.0,
            max_score: 1.0,
            threshold: 1.0,
        })
    }
}
