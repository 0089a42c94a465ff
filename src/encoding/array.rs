// One encoded root call

use super::{CallEntry, CallStackMetadata, StackModel};
use crate::error::{CallStackError, Result};
use aprender::primitives::Matrix;

/// Offset and self-time matrices of one root call, padded to the trace size
///
/// `num_rows`/`num_cols` keep the root's own dimensions from before padding.
#[derive(Debug, Clone, PartialEq)]
pub struct CallStackArray {
    address: u64,
    depth: u32,
    timestamp: i64,
    duration: i64,
    offsets: Matrix<f64>,
    self_times: Matrix<f64>,
    num_rows: usize,
    num_cols: usize,
}

impl CallStackArray {
    /// Encode `model` with the trace-wide sizing in `metadata`
    pub fn encode(model: &StackModel, metadata: &CallStackMetadata) -> Result<Self> {
        let depth_size = metadata.depth_size;
        let address_size = metadata.address_size();
        let maximums = &metadata.max_calls_per_address;
        let (num_rows, num_cols) = model.local_dimensions();

        Ok(Self {
            address: model.address(),
            depth: model.depth(),
            timestamp: model.timestamp(),
            duration: model.duration(),
            offsets: model.to_array(CallEntry::offset, depth_size, address_size, maximums)?,
            self_times: model.to_array(CallEntry::self_time, depth_size, address_size, maximums)?,
            num_rows,
            num_cols,
        })
    }

    /// Reassemble a decoded record; both matrices must share a shape
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        address: u64,
        depth: u32,
        timestamp: i64,
        duration: i64,
        offsets: Matrix<f64>,
        self_times: Matrix<f64>,
        num_rows: usize,
        num_cols: usize,
    ) -> Result<Self> {
        if offsets.shape() != self_times.shape() {
            return Err(CallStackError::Decode(format!(
                "offset matrix is {:?} but self-time matrix is {:?}",
                offsets.shape(),
                self_times.shape()
            )));
        }
        Ok(Self {
            address,
            depth,
            timestamp,
            duration,
            offsets,
            self_times,
            num_rows,
            num_cols,
        })
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn offsets(&self) -> &Matrix<f64> {
        &self.offsets
    }

    pub fn self_times(&self) -> &Matrix<f64> {
        &self.self_times
    }

    /// Rows of the root's own array, before padding
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Columns of the root's own array, before padding
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Padded shape shared by both matrices
    pub fn shape(&self) -> (usize, usize) {
        self.offsets.shape()
    }

    /// Model input: offsets then self-times, flattened into one row
    pub fn model_input(&self) -> Result<Matrix<f32>> {
        let values: Vec<f32> = self
            .offsets
            .as_slice()
            .iter()
            .chain(self.self_times.as_slice())
            .map(|&v| v as f32)
            .collect();
        let width = values.len();
        Matrix::from_vec(1, width, values)
            .map_err(|e| CallStackError::Encode(format!("model input: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn model() -> StackModel {
        let mut model = StackModel::new(0x10, 1, 1_000, 100);
        model.add_entry(1, 0x10, 0, 70);
        model.add_entry(2, 0x20, 10, 30);
        model
    }

    #[test]
    fn test_encode_pads_to_metadata() {
        let metadata = CallStackMetadata::new(BTreeMap::from([(0x10, 1), (0x20, 2), (0x30, 1)]), 3);
        let array = CallStackArray::encode(&model(), &metadata).unwrap();

        assert_eq!(array.shape(), (3, 4));
        assert_eq!((array.num_rows(), array.num_cols()), (2, 2));
        assert_eq!(array.offsets().row(1).as_slice(), &[0.0, 10.0, 0.0, 0.0]);
        assert_eq!(array.self_times().row(0).as_slice(), &[70.0, 0.0, 0.0, 0.0]);
        assert_eq!(array.timestamp(), 1_000);
        assert_eq!(array.address(), 0x10);
    }

    #[test]
    fn test_model_input_concatenates_offsets_then_self_times() {
        let metadata = CallStackMetadata::new(BTreeMap::from([(0x10, 1), (0x20, 1)]), 2);
        let array = CallStackArray::encode(&model(), &metadata).unwrap();
        let input = array.model_input().unwrap();

        assert_eq!(input.shape(), (1, 8));
        // offsets: [0, 0, 0, 10], self-times: [70, 0, 0, 30]
        assert_eq!(input.get(0, 3), 10.0);
        assert_eq!(input.get(0, 4), 70.0);
        assert_eq!(input.get(0, 7), 30.0);
    }

    #[test]
    fn test_from_parts_rejects_mismatched_shapes() {
        let result = CallStackArray::from_parts(
            1,
            1,
            0,
            0,
            Matrix::from_vec(2, 2, vec![0.0; 4]).unwrap(),
            Matrix::from_vec(2, 3, vec![0.0; 6]).unwrap(),
            2,
            2,
        );
        assert!(matches!(result, Err(CallStackError::Decode(_))));
    }
}
