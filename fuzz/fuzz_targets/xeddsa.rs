#![no_main]

use libfuzzer_sys::fuzz_target;
use ratchet_session::xeddsa::{self, Signature, SIGNATURE_LENGTH};
use ratchet_session::PublicKey;

fuzz_target!(|data: &[u8]| {
    // Try to verify arbitrary signatures with arbitrary public keys
    if data.len() >= 32 + SIGNATURE_LENGTH {
        let public = PublicKey::from_slice(&data[..32]).expect("32 bytes");
        let signature: Signature = data[32..32 + SIGNATURE_LENGTH]
            .try_into()
            .expect("signature length");

        // Use remaining data as message
        let message = if data.len() > 32 + SIGNATURE_LENGTH {
            &data[32 + SIGNATURE_LENGTH..]
        } else {
            b"test"
        };

        // Verification should not panic, will almost always fail
        let _ = xeddsa::verify(&public, message, &signature);
    }
});
