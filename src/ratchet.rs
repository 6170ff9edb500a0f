//! Double Ratchet core.
//!
//! Holds the root key, the current sending and receiving chains and the
//! skipped-key table. Every DH ratchet step mixes a fresh Diffie-Hellman
//! output into the root key. Every message advances a symmetric chain.
//!
//! The sending chain is created lazily. Receiving a new ratchet key from the
//! peer drops the current sending chain, and the next `encrypt` generates a
//! fresh key pair against the peer's latest key.
//!
//! Decryption is transactional. All derivations happen on copies, and state
//! changes only after the AEAD tag verifies. The one exception is a key taken
//! from the skipped table, which is consumed by the attempt.

use crate::config::RatchetConfig;
use crate::error::{Error, Result};
use crate::kdf::{kdf_root, ChainKey, MessageKey};
use crate::keys::{PublicKey, SecretKey, SymmetricKey};
use crate::message::{RegularMessage, RegularMessageHeader};
use crate::provider::{generate_nonce, CryptoProvider};
use crate::ring::EvictingRing;
use crate::skipped::SkippedMessages;

use tracing::{debug, trace, warn};

#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct SenderChain {
    private_key: SecretKey,
    public_key: PublicKey,
    chain_key: ChainKey,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct ReceiverChain {
    public_key: PublicKey,
    chain_key: ChainKey,
}

/// Double Ratchet state for one pairwise session.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ratchet {
    root_key: SymmetricKey,
    sender_chain: Option<SenderChain>,
    prev_sender_chain_count: u32,
    receiver_chain: Option<ReceiverChain>,
    skipped_messages: SkippedMessages,
    retired_receiver_keys: EvictingRing<PublicKey>,
    max_skipped_messages: u32,
}

impl Ratchet {
    fn empty(config: &RatchetConfig, root_key: SymmetricKey) -> Self {
        Self {
            root_key,
            sender_chain: None,
            prev_sender_chain_count: 0,
            receiver_chain: None,
            skipped_messages: SkippedMessages::new(
                config.max_skipped_epochs,
                config.skipped_capacity(),
            ),
            retired_receiver_keys: EvictingRing::new(config.max_skipped_epochs),
            max_skipped_messages: config.max_skipped_messages,
        }
    }

    /// Initiator state: the first sending chain is keyed against the
    /// responder's long-term key.
    pub fn initiate<P: CryptoProvider + ?Sized>(
        provider: &mut P,
        config: &RatchetConfig,
        shared_secret: SymmetricKey,
        receiver_long_term_key: &PublicKey,
    ) -> Result<Self> {
        let mut ratchet = Self::empty(config, shared_secret);
        ratchet.start_sender_chain(provider, receiver_long_term_key)?;
        Ok(ratchet)
    }

    /// Responder state: the first receiving chain is keyed from our
    /// long-term key and the initiator's first ratchet key.
    pub fn respond<P: CryptoProvider + ?Sized>(
        provider: &P,
        config: &RatchetConfig,
        shared_secret: SymmetricKey,
        receiver_long_term_key: &SecretKey,
        first_header: &RegularMessageHeader,
    ) -> Result<Self> {
        let mut ratchet = Self::empty(config, shared_secret);

        let dh = provider.diffie_hellman(receiver_long_term_key, &first_header.public_key)?;
        let (root_key, chain_key) = kdf_root(provider, &ratchet.root_key, &dh)?;
        ratchet.root_key = root_key;
        ratchet.receiver_chain = Some(ReceiverChain {
            public_key: first_header.public_key,
            chain_key,
        });

        Ok(ratchet)
    }

    fn start_sender_chain<P: CryptoProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        peer_public_key: &PublicKey,
    ) -> Result<()> {
        let private_key = provider.generate_secret_key();
        let dh = provider.diffie_hellman(&private_key, peer_public_key)?;
        let (root_key, chain_key) = kdf_root(&*provider, &self.root_key, &dh)?;

        let public_key = private_key.public_key();
        self.root_key = root_key;
        self.sender_chain = Some(SenderChain {
            private_key,
            public_key,
            chain_key,
        });

        debug!(
            target: "ratchet_session::ratchet",
            ratchet_key = ?public_key,
            peer = ?peer_public_key,
            prev_chain_count = self.prev_sender_chain_count,
            "started sending chain"
        );
        Ok(())
    }

    /// Encrypts `plaintext` with the next sending key.
    ///
    /// `associated_data` is authenticated together with the header.
    pub fn encrypt<P: CryptoProvider + ?Sized>(
        &mut self,
        provider: &mut P,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<RegularMessage> {
        if self.sender_chain.is_none() {
            let peer = self
                .receiver_chain
                .as_ref()
                .map(|chain| chain.public_key)
                .ok_or(Error::InvalidSessionState)?;
            self.start_sender_chain(provider, &peer)?;
        }

        let sender = self
            .sender_chain
            .as_mut()
            .ok_or(Error::InvalidSessionState)?;
        let (next, message_key) = sender.chain_key.advance(&*provider)?;

        let header = RegularMessageHeader {
            counter: message_key.index(),
            prev_chain_count: self.prev_sender_chain_count,
            public_key: sender.public_key,
        };
        let header_bytes = header.to_bytes();

        let nonce = generate_nonce(message_key.index(), header.public_key.as_bytes());
        let cipher_text = provider.aead_encrypt(
            message_key.key(),
            &nonce,
            plaintext,
            &authenticated_data(associated_data, &header_bytes),
        )?;
        sender.chain_key = next;

        trace!(
            target: "ratchet_session::ratchet",
            counter = header.counter,
            prev_chain_count = header.prev_chain_count,
            len = plaintext.len(),
            "encrypted message"
        );
        Ok(RegularMessage::new(header_bytes, cipher_text))
    }

    /// Decrypts a message from the peer.
    pub fn decrypt<P: CryptoProvider + ?Sized>(
        &mut self,
        provider: &P,
        message: &RegularMessage,
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        let header = message.header()?;

        let current = self
            .receiver_chain
            .as_ref()
            .filter(|chain| chain.public_key == header.public_key);

        if let Some(chain) = current {
            if header.counter < chain.chain_key.index() {
                return self.decrypt_skipped(provider, &header, message, associated_data);
            }

            let (next, skipped, message_key) =
                chain
                    .chain_key
                    .derive_to(provider, header.counter, self.max_skipped_messages)?;
            let plaintext = open(provider, &message_key, &header, message, associated_data)?;

            if let Some(chain) = self.receiver_chain.as_mut() {
                chain.chain_key = next;
            }
            self.skipped_messages.store_all(header.public_key, skipped);

            trace!(
                target: "ratchet_session::ratchet",
                counter = header.counter,
                "decrypted message on current chain"
            );
            return Ok(plaintext);
        }

        let retired = self
            .retired_receiver_keys
            .find(|key| *key == header.public_key)
            .is_some();
        if retired || self.skipped_messages.contains_epoch(&header.public_key) {
            return self.decrypt_skipped(provider, &header, message, associated_data);
        }

        self.decrypt_with_new_chain(provider, &header, message, associated_data)
    }

    fn decrypt_skipped<P: CryptoProvider + ?Sized>(
        &mut self,
        provider: &P,
        header: &RegularMessageHeader,
        message: &RegularMessage,
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        let Some(message_key) = self
            .skipped_messages
            .take(&header.public_key, header.counter)
        else {
            warn!(
                target: "ratchet_session::ratchet",
                counter = header.counter,
                ratchet_key = ?header.public_key,
                "no key for message"
            );
            return Err(Error::DuplicateOrMissingMessage);
        };

        trace!(
            target: "ratchet_session::ratchet",
            counter = header.counter,
            "decrypting with skipped key"
        );
        open(provider, &message_key, header, message, associated_data)
    }

    fn decrypt_with_new_chain<P: CryptoProvider + ?Sized>(
        &mut self,
        provider: &P,
        header: &RegularMessageHeader,
        message: &RegularMessage,
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        // A new peer ratchet key answers our sending chain. Without one the
        // header cannot be authentic.
        let Some(sender) = self.sender_chain.as_ref() else {
            warn!(
                target: "ratchet_session::ratchet",
                ratchet_key = ?header.public_key,
                "unknown ratchet key before any reply"
            );
            return Err(Error::AeadAuthenticationFailed);
        };

        // Keys the peer sent on its previous chain that have not arrived.
        let old_skipped = match &self.receiver_chain {
            Some(chain) if header.prev_chain_count > chain.chain_key.index() => {
                let (_, keys) = chain.chain_key.skip_to(
                    provider,
                    header.prev_chain_count,
                    self.max_skipped_messages,
                )?;
                Some((chain.public_key, keys))
            }
            _ => None,
        };

        let dh = provider.diffie_hellman(&sender.private_key, &header.public_key)?;
        let (root_key, chain_key) = kdf_root(provider, &self.root_key, &dh)?;
        let (next, skipped, message_key) =
            chain_key.derive_to(provider, header.counter, self.max_skipped_messages)?;
        let plaintext = open(provider, &message_key, header, message, associated_data)?;

        if let Some((public_key, keys)) = old_skipped {
            self.skipped_messages.store_all(public_key, keys);
        }
        if let Some(old) = self.receiver_chain.take() {
            self.retired_receiver_keys.push(old.public_key);
        }
        self.root_key = root_key;
        self.receiver_chain = Some(ReceiverChain {
            public_key: header.public_key,
            chain_key: next,
        });
        self.skipped_messages.store_all(header.public_key, skipped);
        if let Some(sender) = self.sender_chain.take() {
            self.prev_sender_chain_count = sender.chain_key.index();
        }

        debug!(
            target: "ratchet_session::ratchet",
            ratchet_key = ?header.public_key,
            counter = header.counter,
            skipped = self.skipped_messages.len(),
            "performed DH ratchet step"
        );
        Ok(plaintext)
    }

    /// Index of the next message key on the sending chain.
    #[must_use]
    pub fn sender_counter(&self) -> Option<u32> {
        self.sender_chain.as_ref().map(|c| c.chain_key.index())
    }

    /// Index of the next expected message on the receiving chain.
    #[must_use]
    pub fn receiver_counter(&self) -> Option<u32> {
        self.receiver_chain.as_ref().map(|c| c.chain_key.index())
    }

    /// Current sending ratchet public key.
    #[must_use]
    pub fn sender_public_key(&self) -> Option<PublicKey> {
        self.sender_chain.as_ref().map(|c| c.public_key)
    }

    #[must_use]
    pub fn prev_sender_chain_count(&self) -> u32 {
        self.prev_sender_chain_count
    }

    /// Number of message keys held for late delivery.
    #[must_use]
    pub fn skipped_message_count(&self) -> usize {
        self.skipped_messages.len()
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.skipped_messages.is_within_capacity() && self.retired_receiver_keys.is_within_capacity()
    }
}

impl std::fmt::Debug for Ratchet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ratchet")
            .field("root_key", &"[REDACTED]")
            .field("sender_counter", &self.sender_counter())
            .field("receiver_counter", &self.receiver_counter())
            .field("prev_sender_chain_count", &self.prev_sender_chain_count)
            .field("skipped_messages", &self.skipped_messages.len())
            .finish_non_exhaustive()
    }
}

fn authenticated_data(associated_data: &[u8], header_bytes: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(associated_data.len() + header_bytes.len());
    aad.extend_from_slice(associated_data);
    aad.extend_from_slice(header_bytes);
    aad
}

fn open<P: CryptoProvider + ?Sized>(
    provider: &P,
    message_key: &MessageKey,
    header: &RegularMessageHeader,
    message: &RegularMessage,
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    let nonce = generate_nonce(message_key.index(), header.public_key.as_bytes());
    provider
        .aead_decrypt(
            message_key.key(),
            &nonce,
            message.cipher_text(),
            &authenticated_data(associated_data, message.header_bytes()),
        )
        .map_err(|err| {
            warn!(
                target: "ratchet_session::ratchet",
                counter = header.counter,
                "message failed authentication"
            );
            err
        })
}
