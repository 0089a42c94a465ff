// Per-root sparse model: (depth, address) -> ordered call entries

use super::CallEntry;
use crate::call_tree::{CallId, CallTree};
use crate::error::{CallStackError, Result};
use aprender::primitives::Matrix;
use std::collections::BTreeMap;

/// Sparse representation of one sub-callstack
///
/// Depth keys are absolute depths of the original tree, not depths relative
/// to the root call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackModel {
    address: u64,
    depth: u32,
    timestamp: i64,
    duration: i64,
    data: BTreeMap<u32, BTreeMap<u64, Vec<CallEntry>>>,
}

impl StackModel {
    /// Empty model for a root call
    pub fn new(address: u64, depth: u32, timestamp: i64, duration: i64) -> Self {
        Self {
            address,
            depth,
            timestamp,
            duration,
            data: BTreeMap::new(),
        }
    }

    /// Build the model of the subtree rooted at `root`, in pre-order
    pub fn from_root(tree: &CallTree, root: CallId) -> Self {
        let root_call = tree.call(root);
        let mut model = Self::new(
            root_call.symbol(),
            root_call.depth(),
            root_call.start(),
            root_call.duration(),
        );
        let root_start = root_call.start();
        tree.walk(root, |call| {
            model.add_entry(
                call.depth(),
                call.symbol(),
                call.start() - root_start,
                call.self_time(),
            );
        });
        model
    }

    /// Append an entry under its absolute depth and address
    pub fn add_entry(&mut self, depth: u32, address: u64, offset: i64, self_time: i64) {
        self.data
            .entry(depth)
            .or_default()
            .entry(address)
            .or_default()
            .push(CallEntry::new(offset, self_time));
    }

    /// Root call address
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Root call depth
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Root call start timestamp
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Root call duration
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// Entries recorded for an address at an absolute depth
    pub fn entries(&self, depth: u32, address: u64) -> &[CallEntry] {
        self.data
            .get(&depth)
            .and_then(|by_address| by_address.get(&address))
            .map_or(&[], Vec::as_slice)
    }

    /// For each address, the largest number of calls it has at any one depth
    pub fn max_calls_per_address(&self) -> BTreeMap<u64, usize> {
        let mut maximums = BTreeMap::new();
        for by_address in self.data.values() {
            for (&address, entries) in by_address {
                let current = maximums.entry(address).or_insert(0);
                *current = (*current).max(entries.len());
            }
        }
        maximums
    }

    /// (rows, cols) of this model's array when encoded on its own
    pub fn local_dimensions(&self) -> (usize, usize) {
        let rows = self.data.keys().next_back().map_or(0, |&d| d as usize);
        let cols = self.max_calls_per_address().values().sum();
        (rows, cols)
    }

    /// Encode with this model's own dimensions only
    pub fn to_local_array<F>(&self, accessor: F) -> Result<Matrix<f64>>
    where
        F: Fn(&CallEntry) -> i64,
    {
        let maximums = self.max_calls_per_address();
        let (rows, cols) = self.local_dimensions();
        self.to_array(accessor, rows, cols, &maximums)
    }

    /// Encode into a `depth_size x address_size` matrix
    ///
    /// Column blocks follow ascending address order, each as wide as the
    /// address's maximum in `max_calls_per_address`. Addresses missing from
    /// `max_calls_per_address` are not encoded, and entries beyond a block's
    /// width or past the last row or column are dropped.
    pub fn to_array<F>(
        &self,
        accessor: F,
        depth_size: usize,
        address_size: usize,
        max_calls_per_address: &BTreeMap<u64, usize>,
    ) -> Result<Matrix<f64>>
    where
        F: Fn(&CallEntry) -> i64,
    {
        let mut data = vec![0.0; depth_size * address_size];
        for row in 0..depth_size {
            // Depths start at 1
            let Some(by_address) = self.data.get(&(row as u32 + 1)) else {
                continue;
            };
            let mut block_start = 0;
            for (address, &width) in max_calls_per_address {
                if let Some(entries) = by_address.get(address) {
                    for (i, entry) in entries.iter().take(width).enumerate() {
                        let col = block_start + i;
                        if col < address_size {
                            data[row * address_size + col] = accessor(entry) as f64;
                        }
                    }
                }
                block_start += width;
            }
        }
        Matrix::from_vec(depth_size, address_size, data).map_err(|e| {
            CallStackError::Encode(format!("{}x{} array: {}", depth_size, address_size, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(matrix: &Matrix<f64>) -> Vec<Vec<f64>> {
        (0..matrix.n_rows())
            .map(|r| matrix.row(r).as_slice().to_vec())
            .collect()
    }

    /// The six-call stack used in the layout docs:
    ///
    /// ```text
    ///            {1} 0x2
    ///        {2} 0x2    {3} 0x6d
    ///   {4} 0x2     {5} 0x2   {6} 0x2
    /// ```
    fn layout_model() -> StackModel {
        let mut model = StackModel::new(0x2, 1, 0, 100);
        model.add_entry(1, 0x2, 0, 1);
        model.add_entry(2, 0x2, 1, 2);
        model.add_entry(2, 0x6d, 50, 3);
        model.add_entry(3, 0x2, 2, 4);
        model.add_entry(3, 0x2, 51, 5);
        model.add_entry(3, 0x2, 60, 6);
        model
    }

    #[test]
    fn test_max_calls_per_address() {
        let maximums = layout_model().max_calls_per_address();
        assert_eq!(maximums.get(&0x2), Some(&3));
        assert_eq!(maximums.get(&0x6d), Some(&1));
    }

    #[test]
    fn test_local_dimensions() {
        assert_eq!(layout_model().local_dimensions(), (3, 4));
    }

    #[test]
    fn test_local_self_time_layout() {
        let matrix = layout_model()
            .to_local_array(CallEntry::self_time)
            .unwrap();
        assert_eq!(
            rows(&matrix),
            vec![
                vec![1.0, 0.0, 0.0, 0.0],
                vec![2.0, 0.0, 0.0, 3.0],
                vec![4.0, 5.0, 6.0, 0.0],
            ]
        );
    }

    #[test]
    fn test_global_padding_adds_rows_and_blocks() {
        let model = layout_model();
        let mut maximums = BTreeMap::new();
        maximums.insert(0x1, 2);
        maximums.insert(0x2, 3);
        maximums.insert(0x6d, 2);

        let matrix = model
            .to_array(CallEntry::offset, 5, 7, &maximums)
            .unwrap();
        assert_eq!(matrix.shape(), (5, 7));
        let rows = rows(&matrix);
        // 0x1 block is columns 0..2, 0x2 is 2..5, 0x6d is 5..7
        assert_eq!(rows[1], vec![0.0, 0.0, 1.0, 0.0, 0.0, 50.0, 0.0]);
        assert_eq!(rows[2], vec![0.0, 0.0, 2.0, 51.0, 60.0, 0.0, 0.0]);
        assert!(rows[3].iter().all(|&v| v == 0.0));
        assert!(rows[4].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_entries_beyond_block_width_are_dropped() {
        let model = layout_model();
        let mut maximums = BTreeMap::new();
        maximums.insert(0x2, 1);
        let matrix = model
            .to_array(CallEntry::self_time, 3, 1, &maximums)
            .unwrap();
        assert_eq!(rows(&matrix), vec![vec![1.0], vec![2.0], vec![4.0]]);
    }

    #[test]
    fn test_entries_lookup() {
        let model = layout_model();
        assert_eq!(model.entries(3, 0x2).len(), 3);
        assert!(model.entries(4, 0x2).is_empty());
    }
}
