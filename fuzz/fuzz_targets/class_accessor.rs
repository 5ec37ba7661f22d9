#![no_main]

use dexinfo::file::{ClassAccessor, Field, Method};

extern crate dexinfo;
extern crate libfuzzer_sys;

fn null_field_visitor(_field: &Field) -> dexinfo::Result<()> {
    Ok(())
}

fn null_method_visitor(_method: &Method) -> dexinfo::Result<()> {
    Ok(())
}

libfuzzer_sys::fuzz_target!(|data: &[u8]| {
    // this must not panic
    if let Ok(ca) = ClassAccessor::new(data, 0) {
        let _fields: Vec<_> = ca.get_fields().collect();
        if let Ok(methods) = ca.get_methods() {
            let _methods: Vec<_> = methods.collect();
        }

        // visitors shouldn't panic too
        let _res = ca
            .visit_fields_and_methods(
                null_field_visitor,
                null_field_visitor,
                null_method_visitor,
                null_method_visitor,
            )
            .is_ok();
        let _ = ca.read_class_data();
    }
});
