#![no_main]
use libfuzzer_sys::fuzz_target;
use xcf_rs::core::rle;

fuzz_target!(|data: &[u8]| {
    let encoded = rle::encode(data);
    assert_eq!(rle::decode(&encoded, data.len()).unwrap(), data);

    // Arbitrary input as a compressed stream: errors are fine, panics are not
    let _ = rle::decode(data, 4096);
});
