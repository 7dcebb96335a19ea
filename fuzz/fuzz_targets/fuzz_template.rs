#![no_main]
use helios::provider::template::{Value, replace_formatted, sprintf};
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let mut values = HashMap::new();
    values.insert("current".to_string(), Value::Int(16));
    values.insert("enable".to_string(), Value::Bool(true));
    // expands to itself until the pass limit
    values.insert("loop".to_string(), Value::from("${loop}"));
    let _ = replace_formatted(text, &values);

    let _ = sprintf(text, &Value::Float(-1150.5));
    let _ = sprintf(text, &Value::Str(text.to_string()));
});
