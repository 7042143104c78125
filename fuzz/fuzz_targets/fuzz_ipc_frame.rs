//! Fuzz target: decoding child-to-parent frames.
//!
//! Arbitrary bytes must decode, report an incomplete frame, or fail with an
//! error. Never panic, and never claim more bytes than were supplied.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mimic_core::ExecutionResult;
use mimic_executor::ipc::decode_frame;

fuzz_target!(|data: &[u8]| {
    if let Ok(Some((message, consumed))) = decode_frame(data) {
        assert!(consumed <= data.len());
        let _ = ExecutionResult::from(message);
    }
});
