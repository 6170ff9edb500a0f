//! Fuzz target for ratchet header parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use ratchet_session::message::RegularMessageHeader;

fuzz_target!(|data: &[u8]| {
    // If parsing succeeds, verify roundtrip
    if let Ok(header) = RegularMessageHeader::from_bytes(data) {
        let serialized = header.to_bytes();
        let roundtrip =
            RegularMessageHeader::from_bytes(&serialized).expect("roundtrip should succeed");

        assert_eq!(header.counter, roundtrip.counter);
        assert_eq!(header.prev_chain_count, roundtrip.prev_chain_count);
        assert_eq!(header.public_key, roundtrip.public_key);
    }
});
