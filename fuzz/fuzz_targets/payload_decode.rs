#![no_main]

use libfuzzer_sys::fuzz_target;
use session_store_core::{JsonCodec, MarshalCodec, SessionCodec};

fuzz_target!(|data: &[u8]| {
    // Stored payloads are raw column bytes: blobs and non-UTF-8 text
    // included. Decoding must never panic, and anything it accepts must
    // survive a re-encode.
    let codecs: [&dyn SessionCodec; 2] = [&MarshalCodec, &JsonCodec];
    for codec in codecs {
        if let Some(map) = codec.decode(data) {
            assert!(
                std::str::from_utf8(data).is_ok(),
                "decoded a non-UTF-8 payload"
            );
            let encoded = codec
                .encode(&map)
                .expect("decoded session must re-encode");
            let again = codec
                .decode(encoded.as_bytes())
                .expect("re-encoded session must decode");
            assert_eq!(again.len(), map.len());
        }
    }
});
