#![no_main]
use libfuzzer_sys::fuzz_target;
use xcf_rs::{decode_bytes, encode_to_vec, EncodeOptions};

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = decode_bytes(data) else {
        return;
    };

    // Whatever decodes and re-encodes must decode again with the same shape
    if let Ok(bytes) = encode_to_vec(&doc, EncodeOptions::default()) {
        let again = decode_bytes(&bytes).expect("re-encoded document failed to decode");
        assert_eq!(again.layer_count(), doc.layer_count());
        assert_eq!(again.channels.len(), doc.channels.len());
    }
});
