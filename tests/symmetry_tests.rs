use rand_core::{OsRng, RngCore};
use ratchet_session::{
    x3dh::{initiator_secret, responder_secret},
    xeddsa::{self, Signature, SIGNING_RANDOM_LENGTH},
    DefaultProvider, Error, IdentityKeyPair, PublicKey, RatchetConfig, SecretKey, Session,
};

fn sign_prekey(identity: &IdentityKeyPair, prekey: &PublicKey) -> Signature {
    let mut random = [0u8; SIGNING_RANDOM_LENGTH];
    OsRng.fill_bytes(&mut random);
    xeddsa::sign(identity.secret_key(), prekey.as_bytes(), &random)
}

#[test]
fn test_x3dh_formal_symmetry_multiple_runs() {
    let provider = DefaultProvider::new();

    for run in 0..100 {
        let alice_identity = IdentityKeyPair::generate(&mut OsRng);
        let bob_identity = IdentityKeyPair::generate(&mut OsRng);
        let bob_long_term = SecretKey::generate(&mut OsRng);
        let bob_one_time = (run % 2 == 0).then(|| SecretKey::generate(&mut OsRng));
        let alice_ephemeral = SecretKey::generate(&mut OsRng);

        let sk_a = initiator_secret(
            &provider,
            alice_identity.secret_key(),
            &alice_ephemeral,
            &bob_identity.public_key(),
            &bob_long_term.public_key(),
            bob_one_time.as_ref().map(SecretKey::public_key).as_ref(),
        )
        .unwrap();

        let sk_b = responder_secret(
            &provider,
            bob_identity.secret_key(),
            &bob_long_term,
            bob_one_time.as_ref(),
            &alice_identity.public_key(),
            &alice_ephemeral.public_key(),
        )
        .unwrap();

        assert_eq!(sk_a, sk_b, "X3DH symmetry violated");
    }
}

#[test]
fn test_identity_substitution_breaks_agreement() {
    let provider = DefaultProvider::new();
    let alice_identity = IdentityKeyPair::generate(&mut OsRng);
    let bob_identity = IdentityKeyPair::generate(&mut OsRng);
    let attempter_identity = IdentityKeyPair::generate(&mut OsRng);
    let bob_long_term = SecretKey::generate(&mut OsRng);
    let alice_ephemeral = SecretKey::generate(&mut OsRng);

    // Alice is handed the attempter's identity in place of Bob's
    let sk_a = initiator_secret(
        &provider,
        alice_identity.secret_key(),
        &alice_ephemeral,
        &attempter_identity.public_key(),
        &bob_long_term.public_key(),
        None,
    )
    .unwrap();

    let sk_b = responder_secret(
        &provider,
        bob_identity.secret_key(),
        &bob_long_term,
        None,
        &alice_identity.public_key(),
        &alice_ephemeral.public_key(),
    )
    .unwrap();

    assert_ne!(sk_a, sk_b, "MITM identity substitution must not agree");
}

#[test]
fn test_dh_input_sensitivity() {
    let provider = DefaultProvider::new();
    let alice_identity = IdentityKeyPair::generate(&mut OsRng);
    let bob_identity = IdentityKeyPair::generate(&mut OsRng);
    let alice_ephemeral = SecretKey::generate(&mut OsRng);

    // Regenerate Bob's long-term prekey
    let secrets: Vec<_> = (0..2)
        .map(|_| {
            initiator_secret(
                &provider,
                alice_identity.secret_key(),
                &alice_ephemeral,
                &bob_identity.public_key(),
                &SecretKey::generate(&mut OsRng).public_key(),
                None,
            )
            .unwrap()
        })
        .collect();

    assert_ne!(
        secrets[0], secrets[1],
        "Changing DH inputs must change shared secret"
    );
}

#[test]
fn test_one_time_key_changes_secret() {
    let provider = DefaultProvider::new();
    let alice_identity = IdentityKeyPair::generate(&mut OsRng);
    let bob_identity = IdentityKeyPair::generate(&mut OsRng);
    let bob_long_term = SecretKey::generate(&mut OsRng);
    let bob_one_time = SecretKey::generate(&mut OsRng);
    let alice_ephemeral = SecretKey::generate(&mut OsRng);

    let derive = |one_time: Option<&PublicKey>| {
        initiator_secret(
            &provider,
            alice_identity.secret_key(),
            &alice_ephemeral,
            &bob_identity.public_key(),
            &bob_long_term.public_key(),
            one_time,
        )
        .unwrap()
    };

    assert_ne!(derive(None), derive(Some(&bob_one_time.public_key())));
}

#[test]
fn test_session_ids_symmetric() {
    let alice_identity = IdentityKeyPair::generate(&mut OsRng);
    let bob_identity = IdentityKeyPair::generate(&mut OsRng);
    let bob_long_term = SecretKey::generate(&mut OsRng);
    let bob_one_time = SecretKey::generate(&mut OsRng);

    let mut alice = Session::initiate(
        DefaultProvider::new(),
        RatchetConfig::default(),
        &alice_identity,
        bob_identity.public_key(),
        bob_long_term.public_key(),
        Some(bob_one_time.public_key()),
    )
    .unwrap();
    let first = alice.encrypt(b"first").unwrap();

    let bob = Session::respond(
        DefaultProvider::new(),
        RatchetConfig::default(),
        alice_identity.public_key(),
        &bob_identity,
        &bob_long_term,
        Some(&bob_one_time),
        &first,
    )
    .unwrap();

    assert_eq!(alice.id(), bob.id());
    assert_eq!(alice.sender_identity_key(), bob.sender_identity_key());
    assert_eq!(alice.sender_ephemeral_key(), bob.sender_ephemeral_key());
    assert_eq!(alice.receiver_identity_key(), bob.receiver_identity_key());
    assert_eq!(alice.receiver_long_term_key(), bob.receiver_long_term_key());
    assert_eq!(alice.receiver_one_time_key(), bob.receiver_one_time_key());
}

#[test]
fn test_responder_rejects_unexpected_sender() {
    let alice_identity = IdentityKeyPair::generate(&mut OsRng);
    let bob_identity = IdentityKeyPair::generate(&mut OsRng);
    let attempter_identity = IdentityKeyPair::generate(&mut OsRng);
    let bob_long_term = SecretKey::generate(&mut OsRng);

    let mut attempter = Session::initiate(
        DefaultProvider::new(),
        RatchetConfig::default(),
        &attempter_identity,
        bob_identity.public_key(),
        bob_long_term.public_key(),
        None,
    )
    .unwrap();
    let first = attempter.encrypt(b"it's alice, honest").unwrap();

    // Bob expects Alice
    let result = Session::respond(
        DefaultProvider::new(),
        RatchetConfig::default(),
        alice_identity.public_key(),
        &bob_identity,
        &bob_long_term,
        None,
        &first,
    );
    assert_eq!(result.map(|_| ()), Err(Error::IdentityMismatch));
}

#[test]
fn test_identity_substitution_attempts() {
    let bob_identity = IdentityKeyPair::generate(&mut OsRng);
    let attempter_identity = IdentityKeyPair::generate(&mut OsRng);
    let bob_long_term = SecretKey::generate(&mut OsRng).public_key();
    let signature = sign_prekey(&bob_identity, &bob_long_term);

    assert!(xeddsa::verify(&bob_identity.public_key(), bob_long_term.as_bytes(), &signature).is_ok());

    // Attempt to replace identity key
    assert_eq!(
        xeddsa::verify(&attempter_identity.public_key(), bob_long_term.as_bytes(), &signature),
        Err(Error::SignatureVerificationFailed)
    );

    // Attempt to replace long-term prekey
    let attempter_prekey = SecretKey::generate(&mut OsRng).public_key();
    assert!(
        xeddsa::verify(&bob_identity.public_key(), attempter_prekey.as_bytes(), &signature).is_err(),
        "Prekey substitution should fail - breaks signature"
    );

    // Attempt to tamper with signature bytes
    let mut corrupted = signature;
    corrupted[0] ^= 0xFF;
    assert!(
        xeddsa::verify(&bob_identity.public_key(), bob_long_term.as_bytes(), &corrupted).is_err(),
        "Corrupted signature should fail"
    );
}

#[test]
fn test_xeddsa_signature_uniqueness() {
    // Same message signed twice gives different signatures, both valid
    let bob_identity = IdentityKeyPair::generate(&mut OsRng);
    let prekey = SecretKey::generate(&mut OsRng).public_key();

    let first = sign_prekey(&bob_identity, &prekey);
    let second = sign_prekey(&bob_identity, &prekey);

    assert_ne!(first, second, "XEdDSA signatures should be randomized");
    assert!(xeddsa::verify(&bob_identity.public_key(), prekey.as_bytes(), &first).is_ok());
    assert!(xeddsa::verify(&bob_identity.public_key(), prekey.as_bytes(), &second).is_ok());
}

#[test]
fn test_xeddsa_cross_identity_signature_reuse_fails() {
    let bob_identity = IdentityKeyPair::generate(&mut OsRng);
    let eve_identity = IdentityKeyPair::generate(&mut OsRng);
    let eve_prekey = SecretKey::generate(&mut OsRng).public_key();

    // Eve presents a signature Bob made over her prekey
    let stolen = sign_prekey(&bob_identity, &eve_prekey);
    assert!(
        xeddsa::verify(&eve_identity.public_key(), eve_prekey.as_bytes(), &stolen).is_err(),
        "Signature from different identity should not verify"
    );
}
