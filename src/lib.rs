//! Pila - call-stack encoding and anomaly detection
//!
//! This library rebuilds function-call hierarchies from flat, timestamped call
//! intervals, encodes every sub-tree rooted at a chosen depth into fixed-shape
//! offset and self-time matrices, streams them through a compressed on-disk
//! store, and flags sub-trees whose timing departs from their peers.
//!
//! ```
//! use pila::call_tree::{CallTree, RecordedCall};
//! use pila::cancellation::CancellationToken;
//! use pila::encoding::{CallStackArray, CallStackMetadata, StackModel};
//!
//! # fn main() -> pila::error::Result<()> {
//! let cancel = CancellationToken::new();
//! let calls = vec![
//!     RecordedCall::new(0, 100, 1, 0x1),
//!     RecordedCall::new(10, 20, 2, 0x2),
//!     RecordedCall::new(40, 20, 2, 0x2),
//! ];
//! let tree = CallTree::recreate_hierarchy(&calls, 1, &cancel)?;
//! let metadata = CallStackMetadata::aggregate(&tree, &cancel)?;
//!
//! let model = StackModel::from_root(&tree, tree.roots()[0]);
//! let array = CallStackArray::encode(&model, &metadata)?;
//! assert_eq!(array.shape(), (2, 3));
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod call_tree;
pub mod cancellation;
pub mod cli;
pub mod config;
pub mod detection;
pub mod encoding;
pub mod error;
pub mod report;
pub mod store;
