#![no_main]

use libfuzzer_sys::fuzz_target;
use pila::call_tree::{CallTree, RecordedCall};
use pila::cancellation::CancellationToken;
use pila::encoding::{CallStackArray, CallStackMetadata, StackModel};

fuzz_target!(|data: &[u8]| {
    // Any call list that parses must rebuild and encode without panicking
    let Ok(calls) = serde_json::from_slice::<Vec<RecordedCall>>(data) else {
        return;
    };
    if calls.iter().any(|c| c.depth > 64) {
        return;
    }

    let cancel = CancellationToken::new();
    let Ok(tree) = CallTree::recreate_hierarchy(&calls, 1, &cancel) else {
        return;
    };
    let Ok(metadata) = CallStackMetadata::aggregate(&tree, &cancel) else {
        return;
    };
    if metadata.depth_size * metadata.address_size() > 1 << 20 {
        return;
    }
    for &root in tree.roots() {
        let array = CallStackArray::encode(&StackModel::from_root(&tree, root), &metadata)
            .expect("encode within metadata bounds");
        assert_eq!(array.shape(), (metadata.depth_size, metadata.address_size()));
    }
});
