#![no_main]

use dexinfo::file::{dump::ReportOptions, DexImage, DexLocation, VerifyPreset};

extern crate dexinfo;
extern crate libfuzzer_sys;

libfuzzer_sys::fuzz_target!(|data: &[u8]| {
    // this must not panic
    if let Ok(dex) = DexImage::parse_with(data, DexLocation::InMemory, VerifyPreset::None) {
        for idx in 0..dex.class_count() as u32 {
            let _ = dex.methods_of(idx);
            let _ = dex.fields_of(idx);
        }
        let _ = dex.report_string(&ReportOptions::default());
    }
});
