// Shared fixtures for integration tests
//
// Call lists are written as the JSON the `pila` binary reads.

#![allow(dead_code)]

use pila::call_tree::RecordedCall;
use std::path::{Path, PathBuf};

/// Two roots at depth 2 under one depth-1 call. Each root has one depth-3
/// child; the second child runs ten times longer while both roots keep a
/// self-time of 990.
pub fn outlier_trace() -> Vec<RecordedCall> {
    vec![
        RecordedCall::new(0, 10_000, 1, 0x1),
        RecordedCall::new(1_000, 1_000, 2, 0x2),
        RecordedCall::new(1_010, 10, 3, 0x3),
        RecordedCall::new(3_000, 1_090, 2, 0x2),
        RecordedCall::new(3_010, 100, 3, 0x3),
    ]
}

/// `roots` identical depth-2 subtrees, each with a fixed set of children
pub fn uniform_trace(roots: usize) -> Vec<RecordedCall> {
    let mut calls = vec![RecordedCall::new(0, roots as i64 * 10_000 + 10, 1, 0x1)];
    for r in 0..roots {
        let base = 1 + r as i64 * 10_000;
        calls.push(RecordedCall::new(base, 5_000, 2, 0x2));
        calls.push(RecordedCall::new(base + 100, 700, 3, 0x3));
        calls.push(RecordedCall::new(base + 1_000, 300, 3, 0x3));
        calls.push(RecordedCall::new(base + 2_000, 800, 3, 0x4));
        calls.push(RecordedCall::new(base + 2_100, 100, 4, 0x5));
    }
    calls
}

/// Write `calls` as a JSON array into `dir/name`
pub fn write_calls(dir: &Path, name: &str, calls: &[RecordedCall]) -> PathBuf {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(calls).unwrap();
    std::fs::write(&path, json).unwrap();
    path
}
