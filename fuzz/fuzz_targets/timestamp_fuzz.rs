//! Fuzz test for timestamp parsing
//!
//! Run with: cargo +nightly fuzz run timestamp_fuzz -- -max_total_time=60

#![no_main]

use kashing_cache::serializer::{looks_like_timestamp, parse_timestamp, TIME_FORMAT};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = looks_like_timestamp(input);

        // Anything that parses must survive the `time` storage format.
        if let Some(time) = parse_timestamp(input) {
            let stored = time.format(TIME_FORMAT).to_string();
            assert_eq!(parse_timestamp(&stored).map(|t| t.timestamp()), Some(time.timestamp()));
        }
    }
});
