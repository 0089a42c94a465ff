// On-disk containers
//
// ArrayStore: a gzip stream of MessagePack records plus a JSON header with the
// record count, the trace metadata and the encoding mode. Records are read
// back in write order; the header count decides when the stream is done.
//
// ModelContainer: a serialized model next to the metadata it was built
// against, so a later run can check dimensions before scoring.

mod array_store;
mod codec;
mod model_container;

pub use array_store::{ArrayStore, Records, StoreHeader, DATA_FILE, HEADER_FILE};
pub use codec::{EncodingMode, MatrixCodec, MatrixPayload, StoredRecord};
pub use model_container::{ModelContainer, METADATA_FILE, MODEL_FILE};
