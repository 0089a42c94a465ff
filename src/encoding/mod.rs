// Call-stack array encoding
//
// Turns each root call's subtree into two fixed-shape matrices (offsets and
// self-times) whose dimensions come from trace-wide metadata, so every array
// of a trace has the same shape.
//
// Layout:
// - Rows are absolute depths (row = depth - 1), including depths above the
//   root call, which stay zero.
// - Columns are blocks, one per address in ascending address order. Each
//   block is as wide as the largest number of calls that address ever has at
//   a single depth in any subtree of the trace.
// - Within a block, calls fill cells left to right in pre-order.

mod array;
mod call_entry;
mod metadata;
mod stack_model;

pub use array::CallStackArray;
pub use call_entry::CallEntry;
pub use metadata::CallStackMetadata;
pub use stack_model::StackModel;
