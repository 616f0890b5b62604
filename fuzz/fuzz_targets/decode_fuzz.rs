//! Fuzz test for decoding stored field text
//!
//! Backends may hold text written by older deployments or by hand, so the
//! decoder must accept anything without panicking.
//!
//! Run with: cargo +nightly fuzz run decode_fuzz -- -max_total_time=60

#![no_main]

use kashing_cache::serializer::{decode_default, encode_default};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        let value = decode_default(raw);

        // Whatever decoded must encode again.
        let text = encode_default(&value).expect("decoded values always encode");
        let _ = decode_default(&text);
    }
});
