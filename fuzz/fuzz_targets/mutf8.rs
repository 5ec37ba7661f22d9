#![no_main]

use dexinfo::utf;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // first byte is the declared length in UTF-16 code units
    if let Some((len, rest)) = data.split_first() {
        if let Ok(s) = utf::mutf8_to_str_lossy(rest, *len as usize) {
            let _ = s.len();
        }
    }
});
