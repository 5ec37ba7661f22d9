#![no_main]

use std::hint::black_box;

use dexinfo::file::{CodeItemAccessor, EncodedCatchHandlerIterator};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(iterator) = EncodedCatchHandlerIterator::new(data, 0) {
        for handler in iterator {
            let _ = black_box(handler);
        }
    }
    if let Ok(accessor) = CodeItemAccessor::new(data, 0) {
        let _ = black_box(accessor.to_code_item());
    }
});
