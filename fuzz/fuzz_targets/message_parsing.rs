//! Fuzz target for pairwise message parsing
//!
//! Tests that arbitrary message data doesn't cause panics or undefined behavior

#![no_main]

use libfuzzer_sys::fuzz_target;
use ratchet_session::Message;

fuzz_target!(|data: &[u8]| {
    // If it parses successfully, try serialization roundtrip
    if let Ok(message) = Message::from_bytes(data) {
        let serialized = message.to_bytes();
        let roundtrip = Message::from_bytes(&serialized).expect("roundtrip should succeed");

        assert_eq!(message, roundtrip);
        assert_eq!(message.message_type(), roundtrip.message_type());
    }
});
