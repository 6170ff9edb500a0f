//! Pairwise session: X3DH handshake on top of the Double Ratchet.
//!
//! The initiator creates a session from the responder's published keys and
//! can encrypt immediately. Until the first reply arrives, every message
//! carries a [`PrekeyMessage`] so the responder can run its half of the
//! handshake from whichever message reaches it first.
//!
//! ```
//! use ratchet_session::{DefaultProvider, IdentityKeyPair, RatchetConfig, Session};
//! use rand_core::OsRng;
//!
//! let alice = IdentityKeyPair::generate(&mut OsRng);
//! let bob = IdentityKeyPair::generate(&mut OsRng);
//! let bob_long_term = ratchet_session::SecretKey::generate(&mut OsRng);
//!
//! let mut alice_session = Session::initiate(
//!     DefaultProvider::new(),
//!     RatchetConfig::default(),
//!     &alice,
//!     bob.public_key(),
//!     bob_long_term.public_key(),
//!     None,
//! )?;
//! let hello = alice_session.encrypt(b"hello")?;
//!
//! let mut bob_session = Session::respond(
//!     DefaultProvider::new(),
//!     RatchetConfig::default(),
//!     alice.public_key(),
//!     &bob,
//!     &bob_long_term,
//!     None,
//!     &hello,
//! )?;
//! assert_eq!(bob_session.decrypt(&hello)?, b"hello");
//! # Ok::<(), ratchet_session::Error>(())
//! ```

use crate::config::RatchetConfig;
use crate::error::{Error, Result};
use crate::keys::{IdentityKeyPair, PublicKey, SecretKey, KEY_SIZE_32};
use crate::message::{Message, PrekeyMessage};
use crate::provider::{CryptoProvider, DefaultProvider};
use crate::ratchet::Ratchet;
use crate::x3dh;

use tracing::{debug, warn};

const SESSION_ID_LABEL: &[u8] = b"RatchetSession_SessionId_v1";

const STATE_VERSION: u32 = 1;

/// Which side of the handshake this session played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Role {
    Initiator,
    Responder,
}

/// Serializable part of a session.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct SessionState {
    version: u32,
    role: Role,
    received_first_response: bool,
    handshake: PrekeyMessage,
    receiver_identity_key: PublicKey,
    config: RatchetConfig,
    ratchet: Ratchet,
}

/// Pairwise encrypted session.
///
/// Not internally synchronized. Share across threads through
/// [`SessionRegistry`](crate::registry::SessionRegistry) or your own
/// `Arc<Mutex<_>>`.
pub struct Session<P: CryptoProvider = DefaultProvider> {
    provider: P,
    state: SessionState,
}

impl<P: CryptoProvider> Session<P> {
    /// Starts a session as initiator.
    ///
    /// `receiver_long_term_key` is the responder's signed prekey; its
    /// signature must have been checked by the caller.
    pub fn initiate(
        mut provider: P,
        config: RatchetConfig,
        identity: &IdentityKeyPair,
        receiver_identity_key: PublicKey,
        receiver_long_term_key: PublicKey,
        receiver_one_time_key: Option<PublicKey>,
    ) -> Result<Self> {
        config.validate()?;

        let ephemeral = provider.generate_secret_key();
        let shared_secret = x3dh::initiator_secret(
            &provider,
            identity.secret_key(),
            &ephemeral,
            &receiver_identity_key,
            &receiver_long_term_key,
            receiver_one_time_key.as_ref(),
        )?;

        let ratchet = Ratchet::initiate(&mut provider, &config, shared_secret, &receiver_long_term_key)?;

        let handshake = PrekeyMessage {
            sender_identity_key: identity.public_key(),
            sender_ephemeral_key: ephemeral.public_key(),
            receiver_long_term_key,
            receiver_one_time_key,
        };

        debug!(
            target: "ratchet_session::session",
            peer = ?receiver_identity_key,
            one_time_key = receiver_one_time_key.is_some(),
            "initiated session"
        );

        Ok(Self {
            provider,
            state: SessionState {
                version: STATE_VERSION,
                role: Role::Initiator,
                received_first_response: false,
                handshake,
                receiver_identity_key,
                config,
                ratchet,
            },
        })
    }

    /// Answers a prekey message as responder.
    ///
    /// `sender_identity_key` is the identity the caller expects the
    /// initiator to have. The message is not decrypted; pass it to
    /// [`decrypt`](Self::decrypt) afterwards.
    pub fn respond(
        provider: P,
        config: RatchetConfig,
        sender_identity_key: PublicKey,
        identity: &IdentityKeyPair,
        long_term_key: &SecretKey,
        one_time_key: Option<&SecretKey>,
        message: &Message,
    ) -> Result<Self> {
        config.validate()?;

        let handshake = *message.prekey_message().ok_or(Error::BadMessageType)?;

        if handshake.sender_identity_key != sender_identity_key
            || handshake.receiver_long_term_key != long_term_key.public_key()
        {
            warn!(target: "ratchet_session::session", "prekey message names other keys");
            return Err(Error::IdentityMismatch);
        }
        match (handshake.receiver_one_time_key, one_time_key) {
            (None, None) => {}
            (Some(expected), Some(key)) if expected == key.public_key() => {}
            _ => {
                warn!(target: "ratchet_session::session", "one-time key mismatch");
                return Err(Error::IdentityMismatch);
            }
        }

        let shared_secret = x3dh::responder_secret(
            &provider,
            identity.secret_key(),
            long_term_key,
            one_time_key,
            &handshake.sender_identity_key,
            &handshake.sender_ephemeral_key,
        )?;

        let header = message.regular_message().header()?;
        let ratchet = Ratchet::respond(&provider, &config, shared_secret, long_term_key, &header)?;

        debug!(
            target: "ratchet_session::session",
            peer = ?sender_identity_key,
            one_time_key = one_time_key.is_some(),
            "responded to session"
        );

        Ok(Self {
            provider,
            state: SessionState {
                version: STATE_VERSION,
                role: Role::Responder,
                received_first_response: true,
                handshake,
                receiver_identity_key: identity.public_key(),
                config,
                ratchet,
            },
        })
    }

    /// Encrypts `plaintext`.
    ///
    /// The initiator attaches the handshake keys until it has decrypted a
    /// message from the responder.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Message> {
        self.state.config.check_plain_text(plaintext)?;

        let associated_data = self.associated_data();
        let regular = self
            .state
            .ratchet
            .encrypt(&mut self.provider, plaintext, &associated_data)?;

        let prekey = match self.state.role {
            Role::Initiator if !self.state.received_first_response => Some(self.state.handshake),
            _ => None,
        };
        Ok(Message::new(regular, prekey))
    }

    /// Decrypts a message from the peer.
    pub fn decrypt(&mut self, message: &Message) -> Result<Vec<u8>> {
        if let Some(prekey) = message.prekey_message() {
            if self.state.role == Role::Initiator {
                return Err(Error::BadMessageType);
            }
            if *prekey != self.state.handshake {
                warn!(target: "ratchet_session::session", "prekey message for another session");
                return Err(Error::IdentityMismatch);
            }
        }

        let associated_data = self.associated_data();
        let plaintext =
            self.state
                .ratchet
                .decrypt(&self.provider, message.regular_message(), &associated_data)?;

        if self.state.role == Role::Initiator && !self.state.received_first_response {
            debug!(target: "ratchet_session::session", "received first response");
            self.state.received_first_response = true;
        }
        Ok(plaintext)
    }

    /// Stable identifier, equal on both sides.
    #[must_use]
    pub fn id(&self) -> [u8; KEY_SIZE_32] {
        let handshake = &self.state.handshake;
        let one_time = handshake
            .receiver_one_time_key
            .as_ref()
            .map_or(&[][..], |key| key.as_bytes().as_slice());

        self.provider.hash(&[
            SESSION_ID_LABEL,
            handshake.sender_identity_key.as_bytes().as_slice(),
            self.state.receiver_identity_key.as_bytes().as_slice(),
            handshake.sender_ephemeral_key.as_bytes().as_slice(),
            handshake.receiver_long_term_key.as_bytes().as_slice(),
            one_time,
        ])
    }

    /// Identity key of the initiator followed by that of the responder.
    fn associated_data(&self) -> Vec<u8> {
        let mut ad = Vec::with_capacity(2 * KEY_SIZE_32);
        ad.extend_from_slice(self.state.handshake.sender_identity_key.as_bytes());
        ad.extend_from_slice(self.state.receiver_identity_key.as_bytes());
        ad
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.state.role
    }

    #[must_use]
    pub fn is_initiator(&self) -> bool {
        self.state.role == Role::Initiator
    }

    /// Whether the initiator has decrypted a message from the responder.
    /// Always true for the responder.
    #[must_use]
    pub fn received_first_response(&self) -> bool {
        self.state.received_first_response
    }

    #[must_use]
    pub fn sender_identity_key(&self) -> PublicKey {
        self.state.handshake.sender_identity_key
    }

    #[must_use]
    pub fn sender_ephemeral_key(&self) -> PublicKey {
        self.state.handshake.sender_ephemeral_key
    }

    #[must_use]
    pub fn receiver_identity_key(&self) -> PublicKey {
        self.state.receiver_identity_key
    }

    #[must_use]
    pub fn receiver_long_term_key(&self) -> PublicKey {
        self.state.handshake.receiver_long_term_key
    }

    #[must_use]
    pub fn receiver_one_time_key(&self) -> Option<PublicKey> {
        self.state.handshake.receiver_one_time_key
    }

    #[must_use]
    pub fn config(&self) -> &RatchetConfig {
        &self.state.config
    }

    #[must_use]
    pub fn ratchet(&self) -> &Ratchet {
        &self.state.ratchet
    }
}

#[cfg(feature = "serde")]
impl<P: CryptoProvider> Session<P> {
    /// Serializes the full session state, secrets included.
    pub fn serialize(&self) -> Result<zeroize::Zeroizing<Vec<u8>>> {
        let bytes = bincode::serde::encode_to_vec(&self.state, bincode::config::standard())?;
        Ok(zeroize::Zeroizing::new(bytes))
    }

    /// Restores a session serialized with [`serialize`](Self::serialize).
    pub fn deserialize(bytes: &[u8], provider: P) -> Result<Self> {
        let (state, _): (SessionState, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;

        if state.version != STATE_VERSION || !state.ratchet.is_consistent() {
            return Err(Error::DeserializationError);
        }
        state.config.validate()?;

        Ok(Self { provider, state })
    }
}

impl<P: CryptoProvider> std::fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.state.role)
            .field("received_first_response", &self.state.received_first_response)
            .field("ratchet", &self.state.ratchet)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use rand::{rngs::StdRng, SeedableRng};

    type SeededSession = Session<DefaultProvider<StdRng>>;

    fn provider(seed: u64) -> DefaultProvider<StdRng> {
        DefaultProvider::with_rng(StdRng::seed_from_u64(seed))
    }

    struct Bob {
        identity: IdentityKeyPair,
        long_term: SecretKey,
        one_time: SecretKey,
    }

    fn bob() -> Bob {
        let mut rng = StdRng::seed_from_u64(100);
        Bob {
            identity: IdentityKeyPair::generate(&mut rng),
            long_term: SecretKey::generate(&mut rng),
            one_time: SecretKey::generate(&mut rng),
        }
    }

    fn alice_session(alice: &IdentityKeyPair, bob: &Bob, with_one_time: bool) -> SeededSession {
        Session::initiate(
            provider(1),
            RatchetConfig::default(),
            alice,
            bob.identity.public_key(),
            bob.long_term.public_key(),
            with_one_time.then(|| bob.one_time.public_key()),
        )
        .unwrap()
    }

    #[test]
    fn test_prekey_until_first_response() {
        let alice = IdentityKeyPair::generate(&mut StdRng::seed_from_u64(7));
        let bob_keys = bob();
        let mut alice_session = alice_session(&alice, &bob_keys, true);

        let first = alice_session.encrypt(b"one").unwrap();
        let second = alice_session.encrypt(b"two").unwrap();
        assert_eq!(first.message_type(), MessageType::Prekey);
        assert_eq!(second.message_type(), MessageType::Prekey);

        let mut bob_session: SeededSession = Session::respond(
            provider(2),
            RatchetConfig::default(),
            alice.public_key(),
            &bob_keys.identity,
            &bob_keys.long_term,
            Some(&bob_keys.one_time),
            &second,
        )
        .unwrap();
        assert_eq!(bob_session.decrypt(&second).unwrap(), b"two");
        assert_eq!(bob_session.decrypt(&first).unwrap(), b"one");

        let reply = bob_session.encrypt(b"three").unwrap();
        assert_eq!(reply.message_type(), MessageType::Regular);
        assert!(!alice_session.received_first_response());
        assert_eq!(alice_session.decrypt(&reply).unwrap(), b"three");
        assert!(alice_session.received_first_response());

        let after = alice_session.encrypt(b"four").unwrap();
        assert_eq!(after.message_type(), MessageType::Regular);
        assert_eq!(alice_session.id(), bob_session.id());
    }

    #[test]
    fn test_respond_rejects_regular_message() {
        let alice = IdentityKeyPair::generate(&mut StdRng::seed_from_u64(7));
        let bob_keys = bob();
        let mut alice_session = alice_session(&alice, &bob_keys, false);
        let first = alice_session.encrypt(b"one").unwrap();

        let mut bob_session: SeededSession = Session::respond(
            provider(2),
            RatchetConfig::default(),
            alice.public_key(),
            &bob_keys.identity,
            &bob_keys.long_term,
            None,
            &first,
        )
        .unwrap();
        bob_session.decrypt(&first).unwrap();
        alice_session
            .decrypt(&bob_session.encrypt(b"ack").unwrap())
            .unwrap();

        let regular = alice_session.encrypt(b"regular").unwrap();
        let result: Result<SeededSession> = Session::respond(
            provider(3),
            RatchetConfig::default(),
            alice.public_key(),
            &bob_keys.identity,
            &bob_keys.long_term,
            None,
            &regular,
        );
        assert_eq!(result.unwrap_err(), Error::BadMessageType);
    }

    #[test]
    fn test_respond_checks_identities() {
        let alice = IdentityKeyPair::generate(&mut StdRng::seed_from_u64(7));
        let mallory = IdentityKeyPair::generate(&mut StdRng::seed_from_u64(8));
        let bob_keys = bob();
        let first = alice_session(&alice, &bob_keys, true)
            .encrypt(b"one")
            .unwrap();

        let wrong_sender: Result<SeededSession> = Session::respond(
            provider(2),
            RatchetConfig::default(),
            mallory.public_key(),
            &bob_keys.identity,
            &bob_keys.long_term,
            Some(&bob_keys.one_time),
            &first,
        );
        assert_eq!(wrong_sender.unwrap_err(), Error::IdentityMismatch);

        let missing_one_time: Result<SeededSession> = Session::respond(
            provider(2),
            RatchetConfig::default(),
            alice.public_key(),
            &bob_keys.identity,
            &bob_keys.long_term,
            None,
            &first,
        );
        assert_eq!(missing_one_time.unwrap_err(), Error::IdentityMismatch);
    }

    #[test]
    fn test_plain_text_limit() {
        let alice = IdentityKeyPair::generate(&mut StdRng::seed_from_u64(7));
        let bob_keys = bob();
        let mut session: SeededSession = Session::initiate(
            provider(1),
            RatchetConfig {
                max_plain_text_len: 8,
                ..RatchetConfig::default()
            },
            &alice,
            bob_keys.identity.public_key(),
            bob_keys.long_term.public_key(),
            None,
        )
        .unwrap();

        assert!(session.encrypt(&[0u8; 8]).is_ok());
        assert_eq!(session.encrypt(&[0u8; 9]).unwrap_err(), Error::PlainTextTooLong);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_restored_session_continues() {
        let alice = IdentityKeyPair::generate(&mut StdRng::seed_from_u64(7));
        let bob_keys = bob();
        let mut alice_session = alice_session(&alice, &bob_keys, false);
        let first = alice_session.encrypt(b"one").unwrap();
        let pending = alice_session.encrypt(b"two").unwrap();

        let mut bob_session: SeededSession = Session::respond(
            provider(2),
            RatchetConfig::default(),
            alice.public_key(),
            &bob_keys.identity,
            &bob_keys.long_term,
            None,
            &first,
        )
        .unwrap();
        bob_session.decrypt(&first).unwrap();

        let bytes = bob_session.serialize().unwrap();
        let mut restored: SeededSession = Session::deserialize(&bytes, provider(3)).unwrap();

        assert_eq!(restored.id(), bob_session.id());
        assert_eq!(restored.decrypt(&pending).unwrap(), b"two");
        let reply = restored.encrypt(b"three").unwrap();
        assert_eq!(alice_session.decrypt(&reply).unwrap(), b"three");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_garbage_state_rejected() {
        let result: Result<SeededSession> = Session::deserialize(&[0xFF; 16], provider(3));
        assert_eq!(result.unwrap_err(), Error::DeserializationError);
    }
}
