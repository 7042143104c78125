//! Fuzz target: the expression parser on arbitrary input.
//!
//! A successful parse must never claim more bytes than it was given, and the
//! consumed length must fall on a character boundary.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mimic_core::template::parser::parse_expression;

fuzz_target!(|data: &[u8]| {
    let Ok(src) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok((_, consumed)) = parse_expression(src) {
        assert!(consumed <= src.len());
        assert!(src.is_char_boundary(consumed));
    }
});
