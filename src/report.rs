//! Text and JSON rendering of analysis output

use crate::detection::{AnomalyResult, AnomalyRun, ResultTimeline, TimelineEvent};
use crate::encoding::CallStackArray;
use crate::store::StoreHeader;
use serde::Serialize;
use std::fmt::Write;

/// JSON document printed by `pila detect --format json`
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub detector: &'a str,
    pub min_score: f64,
    pub max_score: f64,
    pub threshold: f64,
    pub records: usize,
    pub anomalies: usize,
    pub results: &'a [AnomalyResult],
    pub timeline: &'a [TimelineEvent],
}

impl<'a> JsonReport<'a> {
    pub fn new(run: &'a AnomalyRun, timeline: &'a ResultTimeline) -> Self {
        Self {
            detector: run.detector,
            min_score: run.min_score,
            max_score: run.max_score,
            threshold: run.threshold,
            records: run.results.len(),
            anomalies: run.anomaly_count(),
            results: &run.results,
            timeline: timeline.events(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Human-readable anomaly table
pub fn render_run(run: &AnomalyRun) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Call-Stack Anomaly Report ({}) ===", run.detector);
    let _ = writeln!(
        out,
        "records: {}  anomalies: {}  min: {:.3}  max: {:.3}  threshold: {:.3}",
        run.results.len(),
        run.anomaly_count(),
        run.min_score,
        run.max_score,
        run.threshold
    );
    if run.results.is_empty() {
        let _ = writeln!(out, "No root calls scored.");
        return out;
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:>14} {:>12} {:>6} {:>18} {:>7}",
        "timestamp", "duration", "depth", "address", "score"
    );
    let _ = writeln!(
        out,
        "-------------- ------------ ------ ------------------ -------"
    );
    for result in &run.results {
        let _ = writeln!(
            out,
            "{:>14} {:>12} {:>6} {:>#18x} {:>7.3}{}",
            result.timestamp,
            result.duration,
            result.depth,
            result.address,
            result.score,
            if result.anomalous { "  ANOMALY" } else { "" }
        );
    }
    out
}

/// Store header summary for `pila inspect`
pub fn render_header(header: &StoreHeader) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "records:      {}", header.record_count);
    let _ = writeln!(out, "encoding:     {}", header.encoding_mode);
    let _ = writeln!(
        out,
        "array shape:  {} x {}",
        header.metadata.depth_size,
        header.metadata.address_size()
    );
    let _ = writeln!(out, "column blocks:");
    let layout = header.metadata.column_layout();
    for (address, width) in &header.metadata.max_calls_per_address {
        let start = layout.get(address).copied().unwrap_or(0);
        let _ = writeln!(
            out,
            "  {:#x}: columns {}..{}",
            address,
            start,
            start + width
        );
    }
    out
}

/// One line per stored record
pub fn render_record(array: &CallStackArray) -> String {
    let (rows, cols) = array.shape();
    format!(
        "{:#x} depth={} ts={} dur={} local={}x{} padded={}x{}",
        array.address(),
        array.depth(),
        array.timestamp(),
        array.duration(),
        array.num_rows(),
        array.num_cols(),
        rows,
        cols
    )
}
