//! End-to-end call-stack analysis
//!
//! 1. Rebuild the call hierarchy and encode every root subtree into the array
//!    store, unless the work directory already holds one.
//! 2. Pick a detector: statistical, or for model analysis the exported model
//!    when its metadata matches the trace exactly, otherwise the dimension
//!    check against the model's metadata.
//! 3. Apply it and publish the run into the result sink.

use crate::call_tree::{CallInterval, CallTree};
use crate::cancellation::CancellationToken;
use crate::config::{AnalysisConfig, AnalysisKind};
use crate::detection::{
    is_metadata_compatible, publish, AnomalyModel, AnomalyRun, CallStackDetector,
    MetadataAnomalyDetector, ModelAnomalyDetector, ResultSink, StatisticalAnomalyDetector,
};
use crate::encoding::{CallStackArray, CallStackMetadata, StackModel};
use crate::error::{CallStackError, Result};
use crate::store::{ArrayStore, EncodingMode, ModelContainer, StoreHeader};

/// Orchestrates array generation and detection
pub struct Analysis;

impl Analysis {
    /// Run a full analysis and publish the result into `sink`
    ///
    /// `model` is only consulted for [`AnalysisKind::Model`]; without one, or
    /// when the model's metadata does not match the trace, the dimension check
    /// runs instead.
    pub fn run<I, S>(
        config: &AnalysisConfig,
        calls: I,
        sink: &mut S,
        model: Option<&dyn AnomalyModel>,
        cancel: &CancellationToken,
    ) -> Result<AnomalyRun>
    where
        I: IntoIterator,
        I::Item: CallInterval,
        S: ResultSink + ?Sized,
    {
        config.validate().map_err(CallStackError::InvalidConfig)?;
        let _span = tracing::info_span!("analysis", kind = ?config.analysis).entered();

        let mut store = ArrayStore::new(&config.work_dir);
        if store.exists() {
            tracing::info!(
                "Reusing call-stack arrays in {}",
                config.work_dir.display()
            );
        } else {
            Self::generate_arrays(
                calls,
                config.target_depth,
                config.encoding,
                &mut store,
                cancel,
            )?;
        }

        let run = match config.analysis {
            AnalysisKind::Statistical => {
                StatisticalAnomalyDetector::new(config.n_value).apply(&mut store, cancel)?
            }
            AnalysisKind::Model => Self::apply_model(config, &mut store, model, cancel)?,
        };

        tracing::info!(
            detector = run.detector,
            records = run.results.len(),
            anomalies = run.anomaly_count(),
            "Analysis finished"
        );
        publish(&run, sink);
        Ok(run)
    }

    fn apply_model(
        config: &AnalysisConfig,
        store: &mut ArrayStore,
        model: Option<&dyn AnomalyModel>,
        cancel: &CancellationToken,
    ) -> Result<AnomalyRun> {
        let model_dir = config
            .model_dir
            .as_ref()
            .ok_or_else(|| CallStackError::InvalidConfig("model_dir is not set".to_string()))?;
        ModelContainer::require_artifacts(model_dir)?;
        let model_metadata = ModelContainer::read_metadata(model_dir)?;
        let trace_metadata = store.load_header()?.metadata;

        let detector = Self::select_detector(&trace_metadata, &model_metadata, model, config);
        detector.apply(store, cancel)
    }

    /// Model detector when dimensions match exactly and a model is present
    pub fn select_detector<'m>(
        trace: &CallStackMetadata,
        model_metadata: &CallStackMetadata,
        model: Option<&'m dyn AnomalyModel>,
        config: &AnalysisConfig,
    ) -> Box<dyn CallStackDetector + 'm> {
        let compatible = is_metadata_compatible(
            trace.depth_size,
            trace.address_size(),
            model_metadata.depth_size,
            model_metadata.address_size(),
        );
        match model {
            Some(model) if compatible => {
                Box::new(ModelAnomalyDetector::new(model, config.anomaly_threshold))
            }
            _ => {
                if !compatible {
                    tracing::warn!(
                        "Trace arrays are {}x{} but the model expects {}x{}, using metadata check",
                        trace.depth_size,
                        trace.address_size(),
                        model_metadata.depth_size,
                        model_metadata.address_size()
                    );
                }
                Box::new(MetadataAnomalyDetector::from_metadata(model_metadata))
            }
        }
    }

    /// Rebuild the hierarchy and write one array per root call into `store`
    ///
    /// On any failure, including cancellation, the partial store is closed and
    /// its artifacts deleted.
    pub fn generate_arrays<I>(
        calls: I,
        target_depth: u32,
        mode: EncodingMode,
        store: &mut ArrayStore,
        cancel: &CancellationToken,
    ) -> Result<StoreHeader>
    where
        I: IntoIterator,
        I::Item: CallInterval,
    {
        let _span = tracing::info_span!("generate_arrays", target_depth, %mode).entered();

        let tree = CallTree::recreate_hierarchy(calls, target_depth, cancel)?;
        let metadata = CallStackMetadata::aggregate(&tree, cancel)?;

        match Self::write_arrays(&tree, &metadata, mode, store, cancel) {
            Ok(()) => {
                tracing::info!(
                    roots = tree.roots().len(),
                    depth_size = metadata.depth_size,
                    address_size = metadata.address_size(),
                    "Call-stack arrays generated"
                );
                store.load_header()
            }
            Err(e) => {
                tracing::warn!("Array generation failed: {}", e);
                store.dispose()?;
                Err(e)
            }
        }
    }

    fn write_arrays(
        tree: &CallTree,
        metadata: &CallStackMetadata,
        mode: EncodingMode,
        store: &mut ArrayStore,
        cancel: &CancellationToken,
    ) -> Result<()> {
        store.init_write(metadata, mode)?;
        for &root in tree.roots() {
            cancel.check()?;
            let model = StackModel::from_root(tree, root);
            store.write(&CallStackArray::encode(&model, metadata)?)?;
        }
        store.close_write()
    }
}
