// Trace-wide array sizing

use super::StackModel;
use crate::call_tree::CallTree;
use crate::cancellation::CancellationToken;
use crate::error::{CallStackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Global sizing shared by every array of a trace
///
/// `max_calls_per_address` is the widest an address ever gets at one depth in
/// any root subtree; `depth_size` is the deepest absolute depth seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStackMetadata {
    pub max_calls_per_address: BTreeMap<u64, usize>,
    pub depth_size: usize,
}

impl CallStackMetadata {
    pub fn new(max_calls_per_address: BTreeMap<u64, usize>, depth_size: usize) -> Self {
        Self {
            max_calls_per_address,
            depth_size,
        }
    }

    /// Aggregate sizing over every root subtree of `tree`
    pub fn aggregate(tree: &CallTree, cancel: &CancellationToken) -> Result<Self> {
        let _span = tracing::info_span!("aggregate_metadata", roots = tree.roots().len()).entered();

        let mut metadata = Self::default();
        for &root in tree.roots() {
            cancel.check()?;
            metadata.include(&StackModel::from_root(tree, root));
        }

        tracing::debug!(
            addresses = metadata.max_calls_per_address.len(),
            depth_size = metadata.depth_size,
            address_size = metadata.address_size(),
            "Metadata aggregated"
        );
        Ok(metadata)
    }

    /// Widen this metadata so that `model` fits
    pub fn include(&mut self, model: &StackModel) {
        for (address, count) in model.max_calls_per_address() {
            let current = self.max_calls_per_address.entry(address).or_insert(0);
            *current = (*current).max(count);
        }
        let (rows, _) = model.local_dimensions();
        self.depth_size = self.depth_size.max(rows);
    }

    /// Number of columns: sum of every per-address maximum
    pub fn address_size(&self) -> usize {
        self.max_calls_per_address.values().sum()
    }

    /// First column of each address block, in ascending address order
    pub fn column_layout(&self) -> BTreeMap<u64, usize> {
        let mut next = 0;
        self.max_calls_per_address
            .iter()
            .map(|(&address, &width)| {
                let start = next;
                next += width;
                (address, start)
            })
            .collect()
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CallStackError::Encode(format!("metadata: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            return Err(CallStackError::MissingArtifact(path_ref.to_path_buf()));
        }

        let contents = fs::read_to_string(path_ref)?;
        serde_json::from_str(&contents).map_err(|e| {
            CallStackError::Decode(format!("invalid metadata {}: {}", path_ref.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_tree::RecordedCall;

    fn two_root_tree() -> CallTree {
        // Root A: two 0x20 children. Root B: one 0x20 child and one 0x30 grandchild
        let calls = vec![
            RecordedCall::new(0, 100, 1, 0x10),
            RecordedCall::new(10, 10, 2, 0x20),
            RecordedCall::new(30, 10, 2, 0x20),
            RecordedCall::new(200, 100, 1, 0x10),
            RecordedCall::new(210, 50, 2, 0x20),
            RecordedCall::new(220, 5, 3, 0x30),
        ];
        CallTree::recreate_hierarchy(&calls, 1, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_aggregate_takes_elementwise_maximum() {
        let metadata =
            CallStackMetadata::aggregate(&two_root_tree(), &CancellationToken::new()).unwrap();
        assert_eq!(metadata.depth_size, 3);
        assert_eq!(metadata.max_calls_per_address.get(&0x10), Some(&1));
        assert_eq!(metadata.max_calls_per_address.get(&0x20), Some(&2));
        assert_eq!(metadata.max_calls_per_address.get(&0x30), Some(&1));
        assert_eq!(metadata.address_size(), 4);
    }

    #[test]
    fn test_aggregate_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let result = CallStackMetadata::aggregate(&two_root_tree(), &token);
        assert!(matches!(result, Err(CallStackError::Cancelled)));
    }

    #[test]
    fn test_column_layout_follows_address_order() {
        let mut maximums = BTreeMap::new();
        maximums.insert(0x6d, 1);
        maximums.insert(0x2, 3);
        let layout = CallStackMetadata::new(maximums, 3).column_layout();
        assert_eq!(layout.get(&0x2), Some(&0));
        assert_eq!(layout.get(&0x6d), Some(&3));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("metadata.json");
        let metadata = CallStackMetadata::new(BTreeMap::from([(0x2, 3), (0x6d, 1)]), 3);
        metadata.write_to_file(&path).unwrap();
        assert_eq!(CallStackMetadata::read_from_file(&path).unwrap(), metadata);
    }

    #[test]
    fn test_read_missing_file() {
        let result = CallStackMetadata::read_from_file("/nonexistent/metadata.json");
        assert!(matches!(result, Err(CallStackError::MissingArtifact(_))));
    }
}
