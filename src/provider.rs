//! Primitive provider: the capability set sessions are generic over.
//!
//! Sessions never touch a cipher, hash or curve directly. Everything goes
//! through a [`CryptoProvider`], so a platform can plug in its own
//! implementations (hardware RNG, FIPS modules) and tests can run on a seeded
//! generator.

use crate::error::{Error, Result};
use crate::keys::{DhOutput, PublicKey, SecretKey, SymmetricKey, KEY_SIZE_32};
use crate::xeddsa::{self, Signature, SIGNING_RANDOM_LENGTH};

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::{CryptoRngCore, OsRng};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, Zeroizing};

pub const TAG_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;

/// Raw cryptographic operations used by the ratchet and group code.
///
/// Only [`fill_random`](Self::fill_random) and the operations that consume
/// randomness take `&mut self`.
pub trait CryptoProvider {
    /// Fills `dest` with cryptographically secure random bytes.
    fn fill_random(&mut self, dest: &mut [u8]);

    /// Generates a fresh X25519 secret key.
    fn generate_secret_key(&mut self) -> SecretKey;

    /// X25519 agreement; rejects low-order peer keys.
    fn diffie_hellman(&self, secret: &SecretKey, public: &PublicKey) -> Result<DhOutput>;

    /// HKDF-SHA256 extract-and-expand into `output`.
    fn hkdf(&self, salt: Option<&[u8]>, ikm: &[u8], info: &[u8], output: &mut [u8]) -> Result<()>;

    /// HMAC-SHA256.
    fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE_32]>>;

    /// SHA-256 over the concatenation of `parts`.
    fn hash(&self, parts: &[&[u8]]) -> [u8; KEY_SIZE_32];

    /// AEAD seal. Returns ciphertext with the tag appended.
    fn aead_encrypt(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>>;

    /// AEAD open. Fails with [`Error::AeadAuthenticationFailed`].
    fn aead_decrypt(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>>;

    /// Signs `message` with an X25519 identity key.
    fn sign(&mut self, secret: &SecretKey, message: &[u8]) -> Result<Signature>;

    /// Verifies a signature. Fails with [`Error::SignatureVerificationFailed`].
    fn verify(&self, public: &PublicKey, message: &[u8], signature: &Signature) -> Result<()>;
}

/// Provider backed by x25519-dalek, RustCrypto hashes and
/// ChaCha20-Poly1305.
///
/// ```
/// use ratchet_session::DefaultProvider;
///
/// let provider = DefaultProvider::new();
/// # let _ = provider;
/// ```
pub struct DefaultProvider<R: CryptoRngCore = OsRng> {
    rng: R,
}

impl DefaultProvider<OsRng> {
    /// Provider drawing randomness from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self { rng: OsRng }
    }
}

impl Default for DefaultProvider<OsRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CryptoRngCore> DefaultProvider<R> {
    /// Provider drawing randomness from `rng`.
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: CryptoRngCore> std::fmt::Debug for DefaultProvider<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultProvider").finish_non_exhaustive()
    }
}

impl<R: CryptoRngCore> CryptoProvider for DefaultProvider<R> {
    fn fill_random(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }

    fn generate_secret_key(&mut self) -> SecretKey {
        SecretKey::generate(&mut self.rng)
    }

    fn diffie_hellman(&self, secret: &SecretKey, public: &PublicKey) -> Result<DhOutput> {
        secret.diffie_hellman(public)
    }

    fn hkdf(&self, salt: Option<&[u8]>, ikm: &[u8], info: &[u8], output: &mut [u8]) -> Result<()> {
        Hkdf::<Sha256>::new(salt, ikm)
            .expand(info, output)
            .map_err(|_| Error::CryptoError)
    }

    fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE_32]>> {
        let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|_| Error::CryptoError)?;
        mac.update(data);
        let mut output = Zeroizing::new([0u8; KEY_SIZE_32]);
        output.copy_from_slice(&mac.finalize().into_bytes());
        Ok(output)
    }

    fn hash(&self, parts: &[&[u8]]) -> [u8; KEY_SIZE_32] {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }

    fn aead_encrypt(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_SIZE],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        use chacha20poly1305::{
            aead::{Aead, Payload},
            ChaCha20Poly1305, Key, KeyInit, Nonce,
        };

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let payload = Payload {
            msg: plaintext,
            aad: associated_data,
        };

        cipher
            .encrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| Error::CryptoError)
    }

    fn aead_decrypt(
        &self,
        key: &SymmetricKey,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        use chacha20poly1305::{
            aead::{Aead, Payload},
            ChaCha20Poly1305, Key, KeyInit, Nonce,
        };

        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        let payload = Payload {
            msg: ciphertext,
            aad: associated_data,
        };

        cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| Error::AeadAuthenticationFailed)
    }

    fn sign(&mut self, secret: &SecretKey, message: &[u8]) -> Result<Signature> {
        let mut random = [0u8; SIGNING_RANDOM_LENGTH];
        self.rng.fill_bytes(&mut random);
        let signature = xeddsa::sign(secret, message, &random);
        random.zeroize();
        Ok(signature)
    }

    fn verify(&self, public: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
        xeddsa::verify(public, message, signature)
    }
}

/// Deterministic nonce: `counter (4 bytes, LE) || chain_id[0..8]`.
///
/// Each message key is used exactly once, so a counter-derived nonce never
/// repeats under the same key.
#[must_use]
pub fn generate_nonce(counter: u32, chain_id: &[u8; 32]) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..4].copy_from_slice(&counter.to_le_bytes());
    nonce[4..].copy_from_slice(&chain_id[..8]);
    nonce
}
