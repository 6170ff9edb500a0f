//! Bounded storage for message keys derived ahead of delivery.
//!
//! Keys are grouped by epoch: the sender's ratchet public key for pairwise
//! sessions, or a `(participant, epoch)` slot for groups. Both levels evict
//! oldest-first, so the total never exceeds `max_epochs * max_keys_per_epoch`.

use crate::kdf::MessageKey;
use crate::keys::PublicKey;
use crate::ring::EvictingRing;

use tracing::warn;

/// Skipped keys of one epoch.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkippedKeys {
    keys: EvictingRing<MessageKey>,
}

impl SkippedKeys {
    #[must_use]
    pub fn new(max_keys: usize) -> Self {
        Self {
            keys: EvictingRing::new(max_keys),
        }
    }

    /// Stores a key, evicting this epoch's oldest key when full.
    pub fn store(&mut self, key: MessageKey) {
        if let Some(evicted) = self.keys.push(key) {
            warn!(
                target: "ratchet_session::skipped",
                index = evicted.index(),
                "evicted skipped message key"
            );
        }
    }

    /// Removes and returns the key for `index`. Keys are one-time.
    pub fn take(&mut self, index: u32) -> Option<MessageKey> {
        self.keys.take(|key| key.index() == index)
    }

    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.keys.find(|key| key.index() == index).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub(crate) fn is_within_capacity(&self) -> bool {
        self.keys.is_within_capacity()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
struct SkippedEpoch {
    public_key: PublicKey,
    keys: SkippedKeys,
}

/// Skipped keys of a pairwise ratchet, keyed by the sender's ratchet key.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkippedMessages {
    epochs: EvictingRing<SkippedEpoch>,
    max_keys_per_epoch: usize,
}

impl SkippedMessages {
    #[must_use]
    pub fn new(max_epochs: usize, max_keys_per_epoch: usize) -> Self {
        Self {
            epochs: EvictingRing::new(max_epochs),
            max_keys_per_epoch: max_keys_per_epoch.max(1),
        }
    }

    /// Stores `key` under `public_key`.
    ///
    /// A new epoch evicts the oldest epoch once `max_epochs` are tracked.
    pub fn store(&mut self, public_key: PublicKey, key: MessageKey) {
        if let Some(epoch) = self.epochs.find_mut(|e| e.public_key == public_key) {
            epoch.keys.store(key);
            return;
        }

        let mut keys = SkippedKeys::new(self.max_keys_per_epoch);
        keys.store(key);
        if let Some(evicted) = self.epochs.push(SkippedEpoch { public_key, keys }) {
            warn!(
                target: "ratchet_session::skipped",
                epoch = ?evicted.public_key,
                dropped = evicted.keys.len(),
                "evicted oldest skipped-key epoch"
            );
        }
    }

    /// Stores every key in `keys` under `public_key`.
    pub fn store_all(&mut self, public_key: PublicKey, keys: Vec<MessageKey>) {
        for key in keys {
            self.store(public_key, key);
        }
    }

    /// Removes and returns the key for `(public_key, index)`.
    ///
    /// An epoch left empty is dropped.
    pub fn take(&mut self, public_key: &PublicKey, index: u32) -> Option<MessageKey> {
        let epoch = self.epochs.find_mut(|e| &e.public_key == public_key)?;
        let key = epoch.keys.take(index);
        if epoch.keys.is_empty() {
            self.epochs.retain(|e| &e.public_key != public_key);
        }
        key
    }

    #[must_use]
    pub fn contains_epoch(&self, public_key: &PublicKey) -> bool {
        self.epochs.find(|e| &e.public_key == public_key).is_some()
    }

    /// Total number of retained keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.epochs.iter().map(|e| e.keys.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    #[must_use]
    pub fn epoch_count(&self) -> usize {
        self.epochs.len()
    }

    /// Upper bound on [`len`](Self::len).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.epochs.capacity().saturating_mul(self.max_keys_per_epoch)
    }

    pub fn clear(&mut self) {
        self.epochs.clear();
    }

    pub(crate) fn is_within_capacity(&self) -> bool {
        self.epochs.is_within_capacity()
            && self.epochs.iter().all(|e| e.keys.is_within_capacity())
    }
}
