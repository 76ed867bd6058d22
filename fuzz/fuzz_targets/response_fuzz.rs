//! Fuzz test for the completion response parser
//!
//! Feeds arbitrary text through framing classification and section parsing
//! to find panics on slicing and marker handling.
//!
//! Run with: cargo +nightly fuzz run response_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use remodel_protocol::{
    classify_rewrite_response, classify_schema_response, parse, SchemaResponse,
    DEFAULT_TERMINATOR,
};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let artifact = parse(input);

    // Everything after the terminator is ignored, so parsing the framed
    // body must give the same artifact as parsing the raw text.
    if let SchemaResponse::Complete(body) = classify_schema_response(input, DEFAULT_TERMINATOR) {
        assert!(input.starts_with(body), "Body must be a prefix of the response");
        assert_eq!(parse(body), artifact);
    }

    for query in &artifact.queries {
        assert_eq!(query.weight, 0, "Parsed queries carry no weight");
    }

    let _ = classify_rewrite_response(input);
});
