//! Resource limits for pairwise and group sessions.
//!
//! A [`RatchetConfig`] is validated when a session is created and is then
//! stored inside the session state, so a restored session keeps the limits
//! it was created with.

use crate::error::{Error, Result};

/// Default number of message keys that may be skipped in one step, and the
/// number retained per DH epoch or group epoch.
pub const DEFAULT_MAX_SKIPPED_MESSAGES: u32 = 1000;

/// Default number of DH epochs tracked by the skipped-key store.
pub const DEFAULT_MAX_SKIPPED_EPOCHS: usize = 5;

/// Default number of trailing epochs retained per group participant.
pub const DEFAULT_MAX_GROUP_EPOCHS: usize = 5;

/// Default group size, not counting the local member.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 100;

/// Default plaintext size limit in bytes.
pub const DEFAULT_MAX_PLAIN_TEXT_LEN: usize = 30_000;

/// Limits applied by sessions.
///
/// ```
/// use ratchet_session::RatchetConfig;
///
/// let config = RatchetConfig {
///     max_skipped_messages: 64,
///     ..RatchetConfig::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct RatchetConfig {
    /// Upper bound on keys skipped in one step and on keys kept per epoch.
    pub max_skipped_messages: u32,
    /// Number of DH epochs whose skipped keys are retained.
    pub max_skipped_epochs: usize,
    /// Number of trailing epochs retained per group participant.
    pub max_group_epochs: usize,
    /// Group size, not counting the local member.
    pub max_participants: usize,
    /// Plaintext size limit in bytes.
    pub max_plain_text_len: usize,
}

impl Default for RatchetConfig {
    fn default() -> Self {
        Self {
            max_skipped_messages: DEFAULT_MAX_SKIPPED_MESSAGES,
            max_skipped_epochs: DEFAULT_MAX_SKIPPED_EPOCHS,
            max_group_epochs: DEFAULT_MAX_GROUP_EPOCHS,
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            max_plain_text_len: DEFAULT_MAX_PLAIN_TEXT_LEN,
        }
    }
}

impl RatchetConfig {
    /// Checks that every limit is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_skipped_messages == 0 {
            return Err(Error::InvalidConfig("max_skipped_messages must be non-zero"));
        }
        if self.max_skipped_epochs == 0 {
            return Err(Error::InvalidConfig("max_skipped_epochs must be non-zero"));
        }
        if self.max_group_epochs == 0 {
            return Err(Error::InvalidConfig("max_group_epochs must be non-zero"));
        }
        if self.max_participants == 0 {
            return Err(Error::InvalidConfig("max_participants must be non-zero"));
        }
        if self.max_plain_text_len == 0 {
            return Err(Error::InvalidConfig("max_plain_text_len must be non-zero"));
        }
        Ok(())
    }

    /// Per-epoch key capacity as a container size.
    pub(crate) fn skipped_capacity(&self) -> usize {
        usize::try_from(self.max_skipped_messages).unwrap_or(usize::MAX)
    }

    pub(crate) fn check_plain_text(&self, plaintext: &[u8]) -> Result<()> {
        if plaintext.len() > self.max_plain_text_len {
            return Err(Error::PlainTextTooLong);
        }
        Ok(())
    }
}
