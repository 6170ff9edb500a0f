//! Fuzz target for group message and group header parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use ratchet_session::group_message::RegularGroupMessageHeader;
use ratchet_session::GroupMessage;

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = GroupMessage::from_bytes(data) {
        let roundtrip =
            GroupMessage::from_bytes(&message.to_bytes()).expect("roundtrip should succeed");
        assert_eq!(message, roundtrip);

        // Accessors fail cleanly on either body
        let _ = message.session_id();
        let _ = message.epoch();
        let _ = message.counter();
    }

    if let Ok(header) = RegularGroupMessageHeader::from_bytes(data) {
        let roundtrip = RegularGroupMessageHeader::from_bytes(&header.to_bytes())
            .expect("roundtrip should succeed");
        assert_eq!(header, roundtrip);
    }
});
