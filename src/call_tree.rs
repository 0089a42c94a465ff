//! Function-call hierarchy reconstruction
//!
//! Rebuilds parent/child links from a flat list of timestamped call intervals
//! and derives each call's self-time (duration minus the duration of its
//! direct children).
//!
//! # Algorithm
//!
//! Calls are bucketed by depth, starting at depth 1 and stopping at the first
//! empty depth. Each bucket is ordered by start time. For every pair of
//! adjacent depths, every call at depth `d` is compared with every call at
//! depth `d + 1`; the deeper call becomes a child when it is *strictly*
//! contained:
//!
//! ```text
//! parent.start < child.start && parent.end > child.end
//! ```
//!
//! A child sharing either boundary with its parent is not linked. Deeper calls
//! without a strict container are left out of every subtree.
//!
//! Linking is O(n²) per depth pair; an interval tree over each depth bucket
//! would bring it down to O(n log n).
//!
//! # Example
//!
//! ```
//! use pila::call_tree::{CallTree, RecordedCall};
//! use pila::cancellation::CancellationToken;
//!
//! # fn main() -> pila::error::Result<()> {
//! let calls = vec![
//!     RecordedCall::new(0, 100, 1, 0x10),
//!     RecordedCall::new(10, 30, 2, 0x20),
//! ];
//! let tree = CallTree::recreate_hierarchy(&calls, 1, &CancellationToken::new())?;
//!
//! let root = tree.roots()[0];
//! assert_eq!(tree.call(root).self_time(), 70);
//! # Ok(())
//! # }
//! ```

use crate::cancellation::CancellationToken;
use crate::error::{CallStackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// A recorded call interval, as produced by a call-graph collaborator
pub trait CallInterval {
    /// Start timestamp
    fn start(&self) -> i64;
    /// Duration of the call
    fn length(&self) -> i64;
    /// Call depth (>= 1)
    fn depth(&self) -> u32;
    /// Function address
    fn symbol(&self) -> u64;
}

impl<T: CallInterval + ?Sized> CallInterval for &T {
    fn start(&self) -> i64 {
        (**self).start()
    }

    fn length(&self) -> i64 {
        (**self).length()
    }

    fn depth(&self) -> u32 {
        (**self).depth()
    }

    fn symbol(&self) -> u64 {
        (**self).symbol()
    }
}

/// Plain call interval, the on-disk input format of the `pila` binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedCall {
    pub start: i64,
    pub length: i64,
    pub depth: u32,
    pub symbol: u64,
}

impl RecordedCall {
    pub fn new(start: i64, length: i64, depth: u32, symbol: u64) -> Self {
        Self {
            start,
            length,
            depth,
            symbol,
        }
    }
}

impl CallInterval for RecordedCall {
    fn start(&self) -> i64 {
        self.start
    }

    fn length(&self) -> i64 {
        self.length
    }

    fn depth(&self) -> u32 {
        self.depth
    }

    fn symbol(&self) -> u64 {
        self.symbol
    }
}

/// Load recorded calls from a JSON array of `{start, length, depth, symbol}`
pub fn load_calls<P: AsRef<Path>>(path: P) -> Result<Vec<RecordedCall>> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        return Err(CallStackError::MissingArtifact(path_ref.to_path_buf()));
    }

    let contents = fs::read_to_string(path_ref)?;
    serde_json::from_str(&contents).map_err(|e| {
        CallStackError::Decode(format!("invalid call list {}: {}", path_ref.display(), e))
    })
}

/// Reject intervals whose end time cannot be represented
fn check_interval<C: CallInterval>(call: &C) -> Result<()> {
    if call.length() < 0 || call.start().checked_add(call.length()).is_none() {
        return Err(CallStackError::Decode(format!(
            "call 0x{:x} at depth {} has invalid interval start={} length={}",
            call.symbol(),
            call.depth(),
            call.start(),
            call.length()
        )));
    }
    Ok(())
}

/// Index of a call inside its [`CallTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(usize);

impl CallId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One call with its reconstructed links
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    start: i64,
    duration: i64,
    depth: u32,
    symbol: u64,
    self_time: i64,
    parent: Option<CallId>,
    children: Vec<CallId>,
}

impl FunctionCall {
    fn new(start: i64, duration: i64, depth: u32, symbol: u64) -> Self {
        // Self-time only shrinks as children attach
        Self {
            start,
            duration,
            depth,
            symbol,
            self_time: duration,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn end(&self) -> i64 {
        self.start + self.duration
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn symbol(&self) -> u64 {
        self.symbol
    }

    pub fn self_time(&self) -> i64 {
        self.self_time
    }

    pub fn parent(&self) -> Option<CallId> {
        self.parent
    }

    pub fn children(&self) -> &[CallId] {
        &self.children
    }

    /// Strict containment; equal boundaries do not count
    fn strictly_contains(&self, other: &FunctionCall) -> bool {
        self.start < other.start && self.end() > other.end()
    }
}

/// Arena of reconstructed calls plus the root calls at the target depth
#[derive(Debug, Clone)]
pub struct CallTree {
    calls: Vec<FunctionCall>,
    roots: Vec<CallId>,
    target_depth: u32,
}

impl CallTree {
    /// Rebuild the call hierarchy and return the tree rooted at `target_depth`
    ///
    /// Calls at one depth are kept in start order; a call starting at the same
    /// timestamp as an earlier call of the same depth is dropped.
    ///
    /// # Errors
    ///
    /// `Decode` for a call with a negative length or an end time past
    /// `i64::MAX`, `NoRootCalls` when no call exists at `target_depth`,
    /// `Cancelled` when the token fires between depths.
    pub fn recreate_hierarchy<I>(
        calls: I,
        target_depth: u32,
        cancel: &CancellationToken,
    ) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: CallInterval,
    {
        let _span = tracing::info_span!("recreate_hierarchy", target_depth).entered();

        let mut by_depth: BTreeMap<u32, Vec<I::Item>> = BTreeMap::new();
        for call in calls {
            check_interval(&call)?;
            by_depth.entry(call.depth()).or_default().push(call);
        }

        let mut arena: Vec<FunctionCall> = Vec::new();
        // depth -> (start -> id), ordered like a start-keyed set
        let mut levels: BTreeMap<u32, BTreeMap<i64, CallId>> = BTreeMap::new();

        let mut depth = 1;
        while let Some(intervals) = by_depth.get(&depth) {
            cancel.check()?;
            let level = levels.entry(depth).or_default();
            for interval in intervals {
                level.entry(interval.start()).or_insert_with(|| {
                    let id = CallId(arena.len());
                    arena.push(FunctionCall::new(
                        interval.start(),
                        interval.length(),
                        depth,
                        interval.symbol(),
                    ));
                    id
                });
            }
            depth += 1;
        }

        let mut tree = CallTree {
            calls: arena,
            roots: Vec::new(),
            target_depth,
        };

        for (&d, level) in &levels {
            let Some(below) = levels.get(&(d + 1)) else {
                continue;
            };
            for &parent in level.values() {
                cancel.check()?;
                for &child in below.values() {
                    if tree.calls[parent.0].strictly_contains(&tree.calls[child.0]) {
                        tree.link(parent, child);
                    }
                }
            }
        }

        tree.roots = levels
            .get(&target_depth)
            .map(|level| level.values().copied().collect())
            .unwrap_or_default();

        if tree.roots.is_empty() {
            tracing::warn!("No root calls found at depth {}", target_depth);
            return Err(CallStackError::NoRootCalls { target_depth });
        }

        tracing::debug!(
            calls = tree.calls.len(),
            roots = tree.roots.len(),
            depths = levels.len(),
            "Call hierarchy rebuilt"
        );

        Ok(tree)
    }

    fn link(&mut self, parent: CallId, child: CallId) {
        let child_duration = self.calls[child.0].duration;
        self.calls[child.0].parent = Some(parent);
        let parent_call = &mut self.calls[parent.0];
        parent_call.children.push(child);
        parent_call.self_time -= child_duration;
    }

    /// Root calls at the target depth, in start order
    pub fn roots(&self) -> &[CallId] {
        &self.roots
    }

    pub fn target_depth(&self) -> u32 {
        self.target_depth
    }

    pub fn call(&self, id: CallId) -> &FunctionCall {
        &self.calls[id.0]
    }

    pub fn children(&self, id: CallId) -> &[CallId] {
        &self.calls[id.0].children
    }

    pub fn parent(&self, id: CallId) -> Option<CallId> {
        self.calls[id.0].parent
    }

    /// Total number of reconstructed calls, linked or not
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Visit `root` and its descendants in pre-order
    pub fn walk<F>(&self, root: CallId, mut visit: F)
    where
        F: FnMut(&FunctionCall),
    {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let call = &self.calls[id.0];
            visit(call);
            stack.extend(call.children.iter().rev().copied());
        }
    }

    /// Number of calls in the subtree rooted at `root`, root included
    pub fn subtree_len(&self, root: CallId) -> usize {
        let mut count = 0;
        self.walk(root, |_| count += 1);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rebuild(calls: &[RecordedCall], target_depth: u32) -> Result<CallTree> {
        CallTree::recreate_hierarchy(calls, target_depth, &CancellationToken::new())
    }

    #[test]
    fn test_nested_calls_link_and_self_time() {
        // main [0,100) -> a [10,40), b [50,90) ; a -> c [15,25)
        let calls = vec![
            RecordedCall::new(0, 100, 1, 0x1),
            RecordedCall::new(10, 30, 2, 0xa),
            RecordedCall::new(50, 40, 2, 0xb),
            RecordedCall::new(15, 10, 3, 0xc),
        ];
        let tree = rebuild(&calls, 1).unwrap();

        assert_eq!(tree.roots().len(), 1);
        let root = tree.roots()[0];
        assert_eq!(tree.call(root).self_time(), 100 - 30 - 40);

        let children = tree.children(root);
        assert_eq!(children.len(), 2);
        let a = children[0];
        let b = children[1];
        assert_eq!(tree.call(a).symbol(), 0xa);
        assert_eq!(tree.call(b).symbol(), 0xb);
        assert_eq!(tree.call(a).self_time(), 20);
        assert_eq!(tree.call(b).self_time(), 40);
        assert_eq!(tree.parent(a), Some(root));

        let c = tree.children(a)[0];
        assert_eq!(tree.call(c).self_time(), 10);
        assert_eq!(tree.parent(c), Some(a));
        assert!(tree.children(c).is_empty());
    }

    #[test]
    fn test_shared_end_boundary_is_not_linked() {
        let calls = vec![
            RecordedCall::new(0, 100, 1, 0x1),
            // Ends exactly where the parent ends
            RecordedCall::new(50, 50, 2, 0x2),
        ];
        let tree = rebuild(&calls, 1).unwrap();
        let root = tree.roots()[0];
        assert!(tree.children(root).is_empty());
        assert_eq!(tree.call(root).self_time(), 100);
    }

    #[test]
    fn test_shared_start_boundary_is_not_linked() {
        let calls = vec![
            RecordedCall::new(0, 100, 1, 0x1),
            RecordedCall::new(0, 10, 2, 0x2),
        ];
        let tree = rebuild(&calls, 1).unwrap();
        assert!(tree.children(tree.roots()[0]).is_empty());
    }

    #[test]
    fn test_roots_at_target_depth_in_start_order() {
        let calls = vec![
            RecordedCall::new(0, 1000, 1, 0x1),
            RecordedCall::new(500, 100, 2, 0x3),
            RecordedCall::new(100, 100, 2, 0x2),
        ];
        let tree = rebuild(&calls, 2).unwrap();
        let starts: Vec<i64> = tree.roots().iter().map(|&r| tree.call(r).start()).collect();
        assert_eq!(starts, vec![100, 500]);
    }

    #[test]
    fn test_missing_target_depth_reports_no_roots() {
        let calls = vec![RecordedCall::new(0, 10, 1, 0x1)];
        match rebuild(&calls, 3) {
            Err(CallStackError::NoRootCalls { target_depth }) => assert_eq!(target_depth, 3),
            other => panic!("Expected NoRootCalls, got {:?}", other),
        }
    }

    #[test]
    fn test_depth_gap_stops_collection() {
        // Nothing at depth 2, so depth 3 is never reached
        let calls = vec![
            RecordedCall::new(0, 100, 1, 0x1),
            RecordedCall::new(10, 10, 3, 0x3),
        ];
        let tree = rebuild(&calls, 1).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(rebuild(&calls, 3).is_err());
    }

    #[test]
    fn test_orphan_calls_excluded_from_subtrees() {
        let calls = vec![
            RecordedCall::new(0, 100, 1, 0x1),
            RecordedCall::new(10, 10, 2, 0x2),
            // Outside of the depth-1 call
            RecordedCall::new(200, 10, 2, 0x3),
        ];
        let tree = rebuild(&calls, 1).unwrap();
        assert_eq!(tree.subtree_len(tree.roots()[0]), 2);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_duplicate_start_keeps_first_call() {
        let calls = vec![
            RecordedCall::new(0, 100, 1, 0x1),
            RecordedCall::new(0, 50, 1, 0x2),
        ];
        let tree = rebuild(&calls, 1).unwrap();
        assert_eq!(tree.roots().len(), 1);
        assert_eq!(tree.call(tree.roots()[0]).symbol(), 0x1);
    }

    #[test]
    fn test_walk_is_pre_order() {
        let calls = vec![
            RecordedCall::new(0, 100, 1, 0x1),
            RecordedCall::new(10, 30, 2, 0x2),
            RecordedCall::new(12, 5, 3, 0x3),
            RecordedCall::new(50, 30, 2, 0x4),
        ];
        let tree = rebuild(&calls, 1).unwrap();
        let mut order = Vec::new();
        tree.walk(tree.roots()[0], |call| order.push(call.symbol()));
        assert_eq!(order, vec![0x1, 0x2, 0x3, 0x4]);
    }

    #[test]
    fn test_cancelled_token_aborts() {
        let calls = vec![RecordedCall::new(0, 100, 1, 0x1)];
        let token = CancellationToken::new();
        token.cancel();
        let result = CallTree::recreate_hierarchy(&calls, 1, &token);
        assert!(matches!(result, Err(CallStackError::Cancelled)));
    }

    #[test]
    fn test_load_calls_from_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("calls.json");
        fs::write(
            &path,
            r#"[{"start": 0, "length": 10, "depth": 1, "symbol": 16}]"#,
        )
        .unwrap();

        let calls = load_calls(&path).unwrap();
        assert_eq!(calls, vec![RecordedCall::new(0, 10, 1, 16)]);
    }

    #[test]
    fn test_overflowing_interval_is_rejected() {
        let calls = vec![
            RecordedCall::new(0, 100, 1, 0x1),
            RecordedCall::new(i64::MAX, 10, 2, 0x2),
        ];
        assert!(matches!(rebuild(&calls, 1), Err(CallStackError::Decode(_))));

        let calls = vec![
            RecordedCall::new(0, 100, 1, 0x1),
            RecordedCall::new(10, -5, 2, 0x2),
        ];
        assert!(matches!(rebuild(&calls, 1), Err(CallStackError::Decode(_))));
    }

    #[test]
    fn test_boundary_interval_is_accepted() {
        let calls = vec![RecordedCall::new(i64::MAX - 10, 10, 1, 0x1)];
        let tree = rebuild(&calls, 1).unwrap();
        assert_eq!(tree.call(tree.roots()[0]).end(), i64::MAX);
    }

    #[test]
    fn test_load_calls_rejects_invalid_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("calls.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_calls(&path), Err(CallStackError::Decode(_))));
    }

    #[test]
    fn test_load_calls_missing_file() {
        let result = load_calls("/nonexistent/calls.json");
        assert!(matches!(result, Err(CallStackError::MissingArtifact(_))));
    }
}
