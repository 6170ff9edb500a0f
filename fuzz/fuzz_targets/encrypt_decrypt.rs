//! Fuzz target for AEAD sealing and opening with corrupted inputs
//!
//! Ensures decryption failures don't cause panics or memory unsafety

#![no_main]

use libfuzzer_sys::fuzz_target;
use ratchet_session::provider::{generate_nonce, NONCE_SIZE};
use ratchet_session::{CryptoProvider, DefaultProvider, Error, SymmetricKey};

fuzz_target!(|data: &[u8]| {
    if data.len() < 32 + NONCE_SIZE + 1 {
        return;
    }

    // Extract components from fuzz data
    let provider = DefaultProvider::new();
    let key = SymmetricKey::from_slice(&data[..32]).expect("32 bytes");
    let nonce: [u8; NONCE_SIZE] = data[32..32 + NONCE_SIZE].try_into().expect("nonce length");
    let plaintext = &data[32 + NONCE_SIZE..];

    let ciphertext = provider
        .aead_encrypt(&key, &nonce, plaintext, b"")
        .expect("encryption should succeed");

    // Decryption with correct parameters should succeed
    let decrypted = provider
        .aead_decrypt(&key, &nonce, &ciphertext, b"")
        .expect("decryption should succeed");
    assert_eq!(&decrypted, plaintext);

    // Corrupted ciphertext should fail gracefully
    let mut corrupted = ciphertext.clone();
    corrupted[0] ^= 1;
    assert_eq!(
        provider.aead_decrypt(&key, &nonce, &corrupted, b""),
        Err(Error::AeadAuthenticationFailed)
    );

    // Wrong associated data or nonce should fail
    assert!(provider.aead_decrypt(&key, &nonce, &ciphertext, b"wrong").is_err());
    let other_nonce = generate_nonce(u32::from(data[0]), key.as_bytes());
    if other_nonce != nonce {
        assert!(provider.aead_decrypt(&key, &other_nonce, &ciphertext, b"").is_err());
    }
});
