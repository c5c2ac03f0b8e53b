//! Fuzz target for the restricted expression evaluator.
//!
//! Arbitrary text must produce a finite number or a `CalcError`.

#![no_main]

use calc_relay::calc::evaluate;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(value) = evaluate(input) {
            assert!(value.is_finite());
        }
    }
});
