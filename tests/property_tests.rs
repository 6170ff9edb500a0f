//! Property-based tests for pairwise and group sessions
//!
//! Uses proptest to verify protocol invariants across random inputs

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use ratchet_session::xeddsa::SIGNATURE_LENGTH;
use ratchet_session::{
    DefaultProvider, Error, GroupMessage, GroupSession, GroupTicket, IdentityKeyPair, Message,
    ParticipantId, ParticipantInfo, RatchetConfig, SecretKey, Session,
};

type TestSession = Session<DefaultProvider<StdRng>>;
type TestGroup = GroupSession<DefaultProvider<StdRng>>;

/// Sessions after Bob has answered and decrypted Alice's first message.
fn session_pair(seed: u64) -> (TestSession, TestSession) {
    let mut rng = StdRng::seed_from_u64(seed);
    let alice = IdentityKeyPair::generate(&mut rng);
    let bob = IdentityKeyPair::generate(&mut rng);
    let bob_long_term = SecretKey::generate(&mut rng);

    let mut alice_session = Session::initiate(
        DefaultProvider::with_rng(StdRng::seed_from_u64(seed ^ 0xA11CE)),
        RatchetConfig::default(),
        &alice,
        bob.public_key(),
        bob_long_term.public_key(),
        None,
    )
    .unwrap();
    let first = alice_session.encrypt(b"hello").unwrap();

    let mut bob_session = Session::respond(
        DefaultProvider::with_rng(StdRng::seed_from_u64(seed ^ 0xB0B)),
        RatchetConfig::default(),
        alice.public_key(),
        &bob,
        &bob_long_term,
        None,
        &first,
    )
    .unwrap();
    bob_session.decrypt(&first).unwrap();

    (alice_session, bob_session)
}

/// Two members of a fresh group at epoch zero; returns Alice's id.
fn group_pair(seed: u64) -> (ParticipantId, TestGroup, TestGroup) {
    let mut rng = StdRng::seed_from_u64(seed);
    let alice_key = SecretKey::generate(&mut rng);
    let bob_key = SecretKey::generate(&mut rng);
    let alice_id = ParticipantId::from_bytes([1; 32]);
    let bob_id = ParticipantId::from_bytes([2; 32]);

    let mut provider = DefaultProvider::with_rng(StdRng::seed_from_u64(seed));
    let session_id = TestGroup::generate_session_id(&mut provider);
    let ticket = GroupTicket::new(&mut provider, session_id);

    let alice = GroupSession::new(
        DefaultProvider::with_rng(StdRng::seed_from_u64(seed ^ 1)),
        RatchetConfig::default(),
        alice_id,
        alice_key.clone(),
        &ticket,
        &[ParticipantInfo { id: bob_id, public_key: bob_key.public_key() }],
    )
    .unwrap();
    let bob = GroupSession::new(
        DefaultProvider::with_rng(StdRng::seed_from_u64(seed ^ 2)),
        RatchetConfig::default(),
        bob_id,
        bob_key,
        &ticket,
        &[ParticipantInfo { id: alice_id, public_key: alice_key.public_key() }],
    )
    .unwrap();

    (alice_id, alice, bob)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn test_session_encrypt_decrypt_roundtrip(
        seed in any::<u64>(),
        message in prop::collection::vec(any::<u8>(), 0..1000)
    ) {
        // Any message encrypted then decrypted should match original
        let (mut alice, mut bob) = session_pair(seed);

        let encrypted = alice.encrypt(&message).unwrap();
        let received = Message::from_bytes(&encrypted.to_bytes()).unwrap();
        prop_assert_eq!(bob.decrypt(&received).unwrap(), message.clone());

        let reply = bob.encrypt(&message).unwrap();
        prop_assert_eq!(alice.decrypt(&reply).unwrap(), message);
    }

    #[test]
    fn test_conversation_pattern_roundtrip(
        seed in any::<u64>(),
        pattern in prop::collection::vec(any::<bool>(), 1..40)
    ) {
        // Arbitrary interleavings of speakers keep both sides in sync
        let (mut alice, mut bob) = session_pair(seed);

        for (i, alice_speaks) in pattern.into_iter().enumerate() {
            let text = format!("message {i}");
            if alice_speaks {
                let message = alice.encrypt(text.as_bytes()).unwrap();
                prop_assert_eq!(bob.decrypt(&message).unwrap(), text.as_bytes());
            } else {
                let message = bob.encrypt(text.as_bytes()).unwrap();
                prop_assert_eq!(alice.decrypt(&message).unwrap(), text.as_bytes());
            }
        }
    }

    #[test]
    fn test_out_of_order_delivery_any_order(
        seed in any::<u64>(),
        permutation in Just((0..10usize).collect::<Vec<_>>()).prop_shuffle()
    ) {
        // Messages should decrypt correctly in any order
        let (mut alice, mut bob) = session_pair(seed);

        let messages: Vec<_> = (0..10)
            .map(|i| {
                let text = format!("Message {i}");
                (alice.encrypt(text.as_bytes()).unwrap(), text)
            })
            .collect();

        for &idx in &permutation {
            let (encrypted, expected) = &messages[idx];
            let decrypted = bob.decrypt(encrypted).unwrap();
            prop_assert_eq!(&decrypted, expected.as_bytes());
        }
    }

    #[test]
    fn test_bit_flip_never_decrypts(
        seed in any::<u64>(),
        bit in any::<prop::sample::Index>()
    ) {
        // A flipped bit anywhere in a serialized message is rejected and
        // leaves the session able to read the genuine one
        let (mut alice, mut bob) = session_pair(seed);
        let reply = bob.encrypt(b"reply").unwrap();
        alice.decrypt(&reply).unwrap();

        let message = alice.encrypt(b"authentic").unwrap();
        prop_assert!(message.prekey_message().is_none());
        let mut bytes = message.to_bytes();

        let header = message.regular_message().header_bytes();
        let header_start = bytes
            .windows(header.len())
            .position(|window| window == header)
            .unwrap();
        let key_start = header_start + header.len() - 32;
        let key_end = header_start + header.len();
        let cipher_text_start = bytes.len() - message.regular_message().cipher_text().len();

        let position = bit.index(bytes.len() * 8);
        let byte = position / 8;
        bytes[byte] ^= 1 << (position % 8);
        let tampered = Message::from_bytes(&bytes);

        if byte >= cipher_text_start || (key_start..key_end).contains(&byte) {
            // Ciphertext, tag and ratchet key are all authenticated
            let tampered = tampered.unwrap();
            prop_assert_eq!(bob.decrypt(&tampered), Err(Error::AeadAuthenticationFailed));
        } else if (header_start..key_start).contains(&byte) {
            // Counter fields may point outside the skip window first
            let result = bob.decrypt(&tampered.unwrap());
            prop_assert!(
                matches!(
                    result,
                    Err(Error::AeadAuthenticationFailed
                        | Error::DuplicateOrMissingMessage
                        | Error::TooManySkippedMessages
                        | Error::WireFormatInvalid
                        | Error::KeyDeserializationFailed)
                ),
                "unexpected result {:?}",
                result
            );
        } else if let Ok(tampered) = tampered {
            prop_assert!(bob.decrypt(&tampered).is_err());
        }
        prop_assert_eq!(bob.decrypt(&message).unwrap(), b"authentic");
    }

    #[test]
    fn test_group_bit_flip_fails_signature(
        seed in any::<u64>(),
        bit in any::<prop::sample::Index>()
    ) {
        // Signature and ciphertext flips are caught before decryption
        let (alice_id, mut alice, mut bob) = group_pair(seed);

        let message = alice.encrypt(b"authentic").unwrap();
        let regular = message.regular_message().unwrap();
        let mut bytes = message.to_bytes();

        let signature_start = bytes
            .windows(SIGNATURE_LENGTH)
            .position(|window| window == regular.signature())
            .unwrap();
        let cipher_text_start = bytes.len() - regular.cipher_text().len();
        let signed: Vec<usize> = (signature_start..signature_start + SIGNATURE_LENGTH)
            .chain(cipher_text_start..bytes.len())
            .collect();

        let position = bit.index(signed.len() * 8);
        bytes[signed[position / 8]] ^= 1 << (position % 8);
        let tampered = GroupMessage::from_bytes(&bytes).unwrap();

        prop_assert_eq!(
            bob.decrypt(&tampered, &alice_id),
            Err(Error::SignatureVerificationFailed)
        );
        prop_assert_eq!(bob.decrypt(&message, &alice_id).unwrap(), b"authentic");
    }

    #[test]
    fn test_different_messages_different_ciphertexts(
        seed in any::<u64>(),
        count in 2usize..20
    ) {
        // The same plaintext never repeats a ciphertext
        let (mut alice, _) = session_pair(seed);

        let ciphertexts: Vec<_> = (0..count)
            .map(|_| alice.encrypt(b"same").unwrap().regular_message().cipher_text().to_vec())
            .collect();

        for i in 0..ciphertexts.len() {
            for j in (i + 1)..ciphertexts.len() {
                prop_assert_ne!(&ciphertexts[i], &ciphertexts[j]);
            }
        }
    }

    #[test]
    fn test_group_roundtrip(
        seed in any::<u64>(),
        message in prop::collection::vec(any::<u8>(), 0..500),
        rotations in 0u32..4
    ) {
        // Group members read each other across epoch rotations
        let (alice_id, mut alice, mut bob) = group_pair(seed);
        let bob_id = bob.my_id();

        for _ in 0..rotations {
            let next = alice.create_group_ticket().unwrap();
            alice.update_session_state(&next, &[], &[]).unwrap();
            bob.update_session_state(&next, &[], &[]).unwrap();
        }

        let encrypted = alice.encrypt(&message).unwrap();
        prop_assert_eq!(bob.decrypt(&encrypted, &alice_id).unwrap(), message.clone());
        let reply = bob.encrypt(&message).unwrap();
        prop_assert_eq!(alice.decrypt(&reply, &bob_id).unwrap(), message);
    }
}

#[cfg(test)]
mod deterministic_tests {
    use super::*;
    use ratchet_session::kdf::ChainKey;
    use ratchet_session::SymmetricKey;

    #[test]
    fn test_chain_kdf_deterministic() {
        // same inputs should always produce same outputs
        let provider = DefaultProvider::new();
        let chain = ChainKey::new(SymmetricKey::from_bytes([42u8; 32]));

        let (next1, key1) = chain.advance(&provider).unwrap();
        let (next2, key2) = chain.advance(&provider).unwrap();

        assert_eq!(next1, next2);
        assert_eq!(key1, key2);
        assert_ne!(next1.key(), key1.key());
    }

    #[test]
    fn test_dh_commutative() {
        // DH(a, B) == DH(b, A)
        let mut rng = StdRng::seed_from_u64(3);
        let a = SecretKey::generate(&mut rng);
        let b = SecretKey::generate(&mut rng);

        let shared1 = a.diffie_hellman(&b.public_key()).unwrap();
        let shared2 = b.diffie_hellman(&a.public_key()).unwrap();

        assert_eq!(shared1.as_bytes(), shared2.as_bytes());
    }
}
