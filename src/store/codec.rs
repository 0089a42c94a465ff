// Record encoding modes and their matrix codecs

use crate::encoding::CallStackArray;
use crate::error::{CallStackError, Result};
use aprender::primitives::Matrix;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How matrices are laid out inside stored records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Nested rows of values
    Dense,
    /// The matrix type's own serialized form
    #[default]
    Native,
}

impl EncodingMode {
    /// Codec for this mode
    pub fn codec(self) -> &'static MatrixCodec {
        &CODECS[self as usize]
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingMode::Dense => write!(f, "dense"),
            EncodingMode::Native => write!(f, "native"),
        }
    }
}

/// Matrix as it appears on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MatrixPayload {
    Dense(Vec<Vec<f64>>),
    Native(Matrix<f64>),
}

/// Matrix conversion pair for one encoding mode
pub struct MatrixCodec {
    pub mode: EncodingMode,
    pub encode: fn(&Matrix<f64>) -> MatrixPayload,
    pub decode: fn(MatrixPayload) -> Result<Matrix<f64>>,
}

// Indexed by `EncodingMode as usize`
static CODECS: [MatrixCodec; 2] = [
    MatrixCodec {
        mode: EncodingMode::Dense,
        encode: encode_dense,
        decode: decode_dense,
    },
    MatrixCodec {
        mode: EncodingMode::Native,
        encode: encode_native,
        decode: decode_native,
    },
];

fn encode_dense(matrix: &Matrix<f64>) -> MatrixPayload {
    MatrixPayload::Dense(
        (0..matrix.n_rows())
            .map(|r| matrix.row(r).as_slice().to_vec())
            .collect(),
    )
}

fn decode_dense(payload: MatrixPayload) -> Result<Matrix<f64>> {
    let rows = match payload {
        MatrixPayload::Dense(rows) => rows,
        MatrixPayload::Native(_) => {
            return Err(CallStackError::Decode(
                "expected dense matrix, found native".to_string(),
            ))
        }
    };

    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    let mut data = Vec::with_capacity(n_rows * n_cols);
    for (i, row) in rows.into_iter().enumerate() {
        if row.len() != n_cols {
            return Err(CallStackError::Decode(format!(
                "row {} has {} columns, expected {}",
                i,
                row.len(),
                n_cols
            )));
        }
        data.extend(row);
    }
    Matrix::from_vec(n_rows, n_cols, data).map_err(|e| CallStackError::Decode(e.to_string()))
}

fn encode_native(matrix: &Matrix<f64>) -> MatrixPayload {
    MatrixPayload::Native(matrix.clone())
}

fn decode_native(payload: MatrixPayload) -> Result<Matrix<f64>> {
    match payload {
        MatrixPayload::Native(matrix) => {
            // Deserialization does not go through the length check
            let (rows, cols) = matrix.shape();
            if matrix.as_slice().len() != rows * cols {
                return Err(CallStackError::Decode(format!(
                    "matrix buffer holds {} values, expected {}x{}",
                    matrix.as_slice().len(),
                    rows,
                    cols
                )));
            }
            Ok(matrix)
        }
        MatrixPayload::Dense(_) => Err(CallStackError::Decode(
            "expected native matrix, found dense".to_string(),
        )),
    }
}

/// One stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub address: u64,
    pub depth: u32,
    pub timestamp: i64,
    pub duration: i64,
    pub offsets: MatrixPayload,
    pub self_times: MatrixPayload,
    pub num_rows: usize,
    pub num_cols: usize,
}

impl StoredRecord {
    pub fn from_array(array: &CallStackArray, mode: EncodingMode) -> Self {
        let codec = mode.codec();
        Self {
            address: array.address(),
            depth: array.depth(),
            timestamp: array.timestamp(),
            duration: array.duration(),
            offsets: (codec.encode)(array.offsets()),
            self_times: (codec.encode)(array.self_times()),
            num_rows: array.num_rows(),
            num_cols: array.num_cols(),
        }
    }

    pub fn into_array(self, mode: EncodingMode) -> Result<CallStackArray> {
        let codec = mode.codec();
        CallStackArray::from_parts(
            self.address,
            self.depth,
            self.timestamp,
            self.duration,
            (codec.decode)(self.offsets)?,
            (codec.decode)(self.self_times)?,
            self.num_rows,
            self.num_cols,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_table_matches_modes() {
        assert_eq!(EncodingMode::Dense.codec().mode, EncodingMode::Dense);
        assert_eq!(EncodingMode::Native.codec().mode, EncodingMode::Native);
    }

    #[test]
    fn test_payload_shapes_per_mode() {
        let matrix = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();

        match (EncodingMode::Dense.codec().encode)(&matrix) {
            MatrixPayload::Dense(rows) => assert_eq!(rows, vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
            other => panic!("Expected dense payload, got {:?}", other),
        }
        match (EncodingMode::Native.codec().encode)(&matrix) {
            MatrixPayload::Native(native) => {
                assert_eq!(native.shape(), (2, 2));
                assert_eq!(native.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
            }
            other => panic!("Expected native payload, got {:?}", other),
        }
    }

    #[test]
    fn test_dense_decode_rejects_ragged_rows() {
        let payload = MatrixPayload::Dense(vec![vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(
            (EncodingMode::Dense.codec().decode)(payload),
            Err(CallStackError::Decode(_))
        ));
    }

    #[test]
    fn test_native_decode_checks_buffer_length() {
        // Same serde layout as the matrix, with one value missing
        let json = r#"{"Native":{"data":[1.0,2.0,3.0],"rows":2,"cols":2}}"#;
        let payload: MatrixPayload = serde_json::from_str(json).unwrap();
        assert!(matches!(
            (EncodingMode::Native.codec().decode)(payload),
            Err(CallStackError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_other_mode() {
        let matrix = Matrix::from_vec(1, 1, vec![0.0]).unwrap();
        let payload = (EncodingMode::Dense.codec().encode)(&matrix);
        assert!((EncodingMode::Native.codec().decode)(payload).is_err());
    }

    #[test]
    fn test_mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&EncodingMode::Dense).unwrap(), "\"dense\"");
        assert_eq!(EncodingMode::default(), EncodingMode::Native);
        assert_eq!(EncodingMode::Native.to_string(), "native");
    }
}
