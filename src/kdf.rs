//! Chain key engine and root key derivation.
//!
//! `(CK', MK) = KDF_CK(CK)` with `MK = HMAC(CK, 0x01)` and
//! `CK' = HMAC(CK, 0x02)`. The root step is
//! `(RK', CK) = HKDF(salt = RK, ikm = DH_out, info = ROOT_INFO)`.

use crate::error::{Error, Result};
use crate::keys::{DhOutput, SymmetricKey, KEY_SIZE_32, KEY_SIZE_64};
use crate::provider::CryptoProvider;

use zeroize::{Zeroize, ZeroizeOnDrop};

pub(crate) const ROOT_INFO: &[u8] = b"RatchetSession_Root_v1";

const MESSAGE_KEY_SEED: u8 = 0x01;
const CHAIN_KEY_SEED: u8 = 0x02;

/// Symmetric chain position: the key that derives message `index`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainKey {
    index: u32,
    key: SymmetricKey,
}

/// One-time key for the message at `index`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageKey {
    index: u32,
    key: SymmetricKey,
}

impl ChainKey {
    /// Chain key at position zero.
    #[must_use]
    pub fn new(key: SymmetricKey) -> Self {
        Self { index: 0, key }
    }

    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Derives the message key for the current index and the chain key for
    /// the next one. `self` is left untouched.
    pub fn advance<P: CryptoProvider + ?Sized>(&self, provider: &P) -> Result<(ChainKey, MessageKey)> {
        let next_index = self.index.checked_add(1).ok_or(Error::CounterOverflow)?;

        let message_key = SymmetricKey::from_bytes(
            *provider.hmac(self.key.as_bytes(), &[MESSAGE_KEY_SEED])?,
        );
        let chain_key = SymmetricKey::from_bytes(
            *provider.hmac(self.key.as_bytes(), &[CHAIN_KEY_SEED])?,
        );

        Ok((
            ChainKey {
                index: next_index,
                key: chain_key,
            },
            MessageKey {
                index: self.index,
                key: message_key,
            },
        ))
    }

    /// Derives the keys for every index in `self.index..target`.
    ///
    /// Returns the chain key positioned at `target` along with the skipped
    /// keys, oldest first. Fails with [`Error::TooManySkippedMessages`] when
    /// more than `max_skip` keys would be derived.
    pub fn skip_to<P: CryptoProvider + ?Sized>(
        &self,
        provider: &P,
        target: u32,
        max_skip: u32,
    ) -> Result<(ChainKey, Vec<MessageKey>)> {
        if target < self.index {
            return Err(Error::DuplicateOrMissingMessage);
        }
        let gap = target - self.index;
        if gap > max_skip {
            return Err(Error::TooManySkippedMessages);
        }

        let mut chain = self.clone();
        let mut skipped = Vec::with_capacity(gap as usize);
        while chain.index < target {
            let (next, message_key) = chain.advance(provider)?;
            skipped.push(message_key);
            chain = next;
        }
        Ok((chain, skipped))
    }

    /// Like [`skip_to`](Self::skip_to), then one more step for `target`
    /// itself. Returns `(chain at target + 1, skipped, key for target)`.
    pub fn derive_to<P: CryptoProvider + ?Sized>(
        &self,
        provider: &P,
        target: u32,
        max_skip: u32,
    ) -> Result<(ChainKey, Vec<MessageKey>, MessageKey)> {
        let (chain, skipped) = self.skip_to(provider, target, max_skip)?;
        let (next, message_key) = chain.advance(provider)?;
        Ok((next, skipped, message_key))
    }
}

impl MessageKey {
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainKey")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKey")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// Root KDF for the DH ratchet step.
///
/// Returns the new root key and a receiving or sending chain key at index 0.
pub fn kdf_root<P: CryptoProvider + ?Sized>(
    provider: &P,
    root_key: &SymmetricKey,
    dh_output: &DhOutput,
) -> Result<(SymmetricKey, ChainKey)> {
    let mut output = [0u8; KEY_SIZE_64];
    provider.hkdf(
        Some(root_key.as_bytes()),
        dh_output.as_bytes(),
        ROOT_INFO,
        &mut output,
    )?;

    let root = SymmetricKey::from_slice(&output[..KEY_SIZE_32]);
    let chain = SymmetricKey::from_slice(&output[KEY_SIZE_32..]);
    output.zeroize();

    Ok((root?, ChainKey::new(chain?)))
}
